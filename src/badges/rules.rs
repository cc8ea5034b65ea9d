//! Badge condition rules
//!
//! Badge documents are operator-managed, so their `condition` field is
//! parsed tolerantly: anything that does not match a known typed rule
//! becomes `ParsedRule::Skip` instead of failing the whole evaluation
//! pass.

use bson::Bson;
use chrono::{DateTime, Datelike, Duration, FixedOffset, TimeZone, Utc};
use serde_json::Value;

/// Lookback window for count-based rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    Month,
    Year,
    Unlimited,
}

impl Period {
    fn parse(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some("day") => Period::Day,
            Some("week") => Period::Week,
            Some("month") => Period::Month,
            Some("year") => Period::Year,
            _ => Period::Unlimited,
        }
    }

    /// Start of the current period in local time, as a UTC instant.
    /// `Unlimited` has no start.
    pub fn start(&self, now: DateTime<Utc>, tz: FixedOffset) -> Option<DateTime<Utc>> {
        let local = now.with_timezone(&tz);
        let local_midnight = tz
            .with_ymd_and_hms(local.year(), local.month(), local.day(), 0, 0, 0)
            .single()?;
        let start = match self {
            Period::Day => local_midnight,
            Period::Week => {
                // Weeks start on Monday
                let days_back = local.weekday().num_days_from_monday() as i64;
                local_midnight - Duration::days(days_back)
            }
            Period::Month => tz
                .with_ymd_and_hms(local.year(), local.month(), 1, 0, 0, 0)
                .single()?,
            Period::Year => tz.with_ymd_and_hms(local.year(), 1, 1, 0, 0, 0).single()?,
            Period::Unlimited => return None,
        };
        Some(start.with_timezone(&Utc))
    }
}

/// A badge condition reduced to the closed set of rules the evaluator
/// understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRule {
    FirstCheckin,
    CheckinsCount { threshold: u64, period: Period },
    UserLevel { threshold: u32 },
    BadgeCount { threshold: u64 },
    DayOfWeekCount { weekday: i32, threshold: u64, period: Period },
    UsageCount { threshold: u64, period: Period },
    VisitFrequency { threshold: u64, period: Period },
    /// Unknown or malformed condition; never satisfied
    Skip,
}

impl ParsedRule {
    pub fn parse(condition: &Bson) -> Self {
        let value: Value = condition.clone().into();
        if value.get("mode").and_then(Value::as_str) != Some("typed") {
            return ParsedRule::Skip;
        }
        let Some(rule) = value.get("rule") else {
            return ParsedRule::Skip;
        };
        let params = rule.get("params").unwrap_or(&Value::Null);
        let threshold = params
            .get("threshold")
            .and_then(Value::as_u64)
            .unwrap_or(1);
        let period = Period::parse(params.get("period"));

        match rule.get("type").and_then(Value::as_str) {
            Some("first_checkin") => ParsedRule::FirstCheckin,
            Some("checkins_count") => ParsedRule::CheckinsCount { threshold, period },
            Some("user_level") => ParsedRule::UserLevel {
                threshold: threshold.min(u32::MAX as u64) as u32,
            },
            Some("badge_count") => ParsedRule::BadgeCount { threshold },
            Some("day_of_week_count") => match params.get("dayOfWeek").and_then(Value::as_i64) {
                Some(weekday @ 0..=6) => ParsedRule::DayOfWeekCount {
                    weekday: weekday as i32,
                    threshold,
                    period,
                },
                _ => ParsedRule::Skip,
            },
            Some("usage_count") => ParsedRule::UsageCount { threshold, period },
            Some("visit_frequency") => ParsedRule::VisitFrequency { threshold, period },
            _ => ParsedRule::Skip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn tokyo() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    #[test]
    fn test_parse_typed_rules() {
        let condition = Bson::Document(doc! {
            "mode": "typed",
            "rule": {
                "type": "checkins_count",
                "params": { "threshold": 5i64, "period": "month" },
            },
        });
        assert_eq!(
            ParsedRule::parse(&condition),
            ParsedRule::CheckinsCount {
                threshold: 5,
                period: Period::Month,
            }
        );

        let condition = Bson::Document(doc! {
            "mode": "typed",
            "rule": { "type": "first_checkin" },
        });
        assert_eq!(ParsedRule::parse(&condition), ParsedRule::FirstCheckin);
    }

    #[test]
    fn test_parse_day_of_week() {
        let condition = Bson::Document(doc! {
            "mode": "typed",
            "rule": {
                "type": "day_of_week_count",
                "params": { "dayOfWeek": 0i64, "threshold": 3i64 },
            },
        });
        assert_eq!(
            ParsedRule::parse(&condition),
            ParsedRule::DayOfWeekCount {
                weekday: 0,
                threshold: 3,
                period: Period::Unlimited,
            }
        );

        // Out-of-range weekday is skipped, not clamped
        let condition = Bson::Document(doc! {
            "mode": "typed",
            "rule": {
                "type": "day_of_week_count",
                "params": { "dayOfWeek": 9i64, "threshold": 3i64 },
            },
        });
        assert_eq!(ParsedRule::parse(&condition), ParsedRule::Skip);
    }

    #[test]
    fn test_unknown_conditions_skip() {
        assert_eq!(ParsedRule::parse(&Bson::Null), ParsedRule::Skip);
        assert_eq!(
            ParsedRule::parse(&Bson::Document(doc! { "mode": "legacy" })),
            ParsedRule::Skip
        );
        assert_eq!(
            ParsedRule::parse(&Bson::Document(doc! {
                "mode": "typed",
                "rule": { "type": "mystery_rule" },
            })),
            ParsedRule::Skip
        );
    }

    #[test]
    fn test_missing_threshold_defaults_to_one() {
        let condition = Bson::Document(doc! {
            "mode": "typed",
            "rule": { "type": "usage_count", "params": {} },
        });
        assert_eq!(
            ParsedRule::parse(&condition),
            ParsedRule::UsageCount {
                threshold: 1,
                period: Period::Unlimited,
            }
        );
    }

    #[test]
    fn test_period_starts_in_local_time() {
        let tz = tokyo();
        // 2026-08-29 is a Saturday; 01:30 JST = 2026-08-28 16:30 UTC
        let now = Utc.with_ymd_and_hms(2026, 8, 28, 16, 30, 0).unwrap();

        let day = Period::Day.start(now, tz).unwrap();
        assert_eq!(day, Utc.with_ymd_and_hms(2026, 8, 28, 15, 0, 0).unwrap());

        // Monday of that week is 2026-08-24 JST
        let week = Period::Week.start(now, tz).unwrap();
        assert_eq!(week, Utc.with_ymd_and_hms(2026, 8, 23, 15, 0, 0).unwrap());

        let month = Period::Month.start(now, tz).unwrap();
        assert_eq!(month, Utc.with_ymd_and_hms(2026, 7, 31, 15, 0, 0).unwrap());

        let year = Period::Year.start(now, tz).unwrap();
        assert_eq!(year, Utc.with_ymd_and_hms(2025, 12, 31, 15, 0, 0).unwrap());

        assert!(Period::Unlimited.start(now, tz).is_none());
    }
}
