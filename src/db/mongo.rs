//! MongoDB client and collection wrapper
//!
//! Thin typed wrapper that verifies connectivity upfront and applies
//! schema-declared indexes when a collection handle is created. The
//! unique indexes declared by the schemas are what give the store its
//! create-if-absent semantics.

use bson::{doc, Document};
use mongodb::{options::IndexOptions, Client, Collection, IndexModel};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::types::{Result, StampgateError};

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and verify with a ping
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // Bounded server selection so startup fails fast when MongoDB
        // is unreachable instead of hanging
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| StampgateError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StampgateError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection with its indexes applied
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    /// Raw MongoDB client (sessions, transactions)
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Database name
    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
{
    /// Create a collection handle and apply schema indexes
    pub async fn new(client: &Client, db_name: &str, collection_name: &str) -> Result<Self> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let wrapped = MongoCollection { inner: collection };
        wrapped.apply_indexes().await?;
        Ok(wrapped)
    }

    async fn apply_indexes(&self) -> Result<()> {
        let schema_indices = T::into_indices();
        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| StampgateError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Underlying collection for queries and transactional operations
    pub fn inner(&self) -> &Collection<T> {
        &self.inner
    }
}

/// Whether a MongoDB error is a unique-index violation
///
/// Conditional creation relies on this: inserting over an existing
/// key fails with code 11000, which the store maps to "already
/// exists" rather than an infrastructure error.
pub fn is_duplicate_key_error(e: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};

    match &*e.kind {
        ErrorKind::Write(WriteFailure::WriteError(we)) => we.code == 11000,
        ErrorKind::Command(ce) => ce.code == 11000,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    // Connection and index behavior require a running MongoDB
    // instance; covered by deployment smoke tests. The MemoryStore
    // provides the contract coverage for unit tests.
}
