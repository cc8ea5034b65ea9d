//! Experience/level step function
//!
//! Each level costs `XP_BASE + (level - 1) * XP_INCREMENT` experience;
//! the level reached by a total experience amount is the largest level
//! whose cumulative cost does not exceed it. Experience is capped so
//! the level can never be computed past `LEVEL_MAX`.

/// Maximum reachable level
pub const LEVEL_MAX: u32 = 50;

/// Experience cost of the first level step
pub const XP_BASE: i64 = 20;

/// Additional cost per subsequent level step
pub const XP_INCREMENT: i64 = 10;

/// Experience required to advance from `level` to `level + 1`
///
/// `level` is clamped to `[1, LEVEL_MAX]`.
pub fn required_experience(level: u32) -> i64 {
    let level = level.clamp(1, LEVEL_MAX);
    XP_BASE + (level as i64 - 1) * XP_INCREMENT
}

/// Total experience needed to reach `level` from zero
///
/// Sum of `required_experience(i)` for `i` in `[1, level)`; level 1
/// costs nothing.
pub fn total_experience_to_reach_level(level: u32) -> i64 {
    let level = level.clamp(1, LEVEL_MAX);
    (1..level).map(required_experience).sum()
}

/// Hard cap on stored experience
///
/// Enough to reach LEVEL_MAX plus one full final step; anything above
/// is clamped at write time.
pub fn experience_cap() -> i64 {
    total_experience_to_reach_level(LEVEL_MAX) + required_experience(LEVEL_MAX)
}

/// Level reached by `total_experience`
///
/// Non-positive experience maps to level 1; the result never exceeds
/// `LEVEL_MAX`.
pub fn level_from_total_experience(total_experience: i64) -> u32 {
    if total_experience <= 0 {
        return 1;
    }

    let mut level = 1;
    while level < LEVEL_MAX
        && total_experience_to_reach_level(level + 1) <= total_experience
    {
        level += 1;
    }
    level
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_experience_values() {
        assert_eq!(required_experience(1), 20);
        assert_eq!(required_experience(2), 30);
        assert_eq!(required_experience(3), 40);
        assert_eq!(required_experience(4), 50);
        assert_eq!(required_experience(50), 510);
        // Clamped outside the range
        assert_eq!(required_experience(0), 20);
        assert_eq!(required_experience(99), 510);
    }

    #[test]
    fn test_cumulative_values() {
        assert_eq!(total_experience_to_reach_level(1), 0);
        assert_eq!(total_experience_to_reach_level(2), 20);
        assert_eq!(total_experience_to_reach_level(3), 50);
        assert_eq!(total_experience_to_reach_level(4), 90);
        assert_eq!(total_experience_to_reach_level(5), 140);
    }

    #[test]
    fn test_round_trip_all_levels() {
        for level in 1..=LEVEL_MAX {
            let total = total_experience_to_reach_level(level);
            assert_eq!(
                level_from_total_experience(total),
                level,
                "round trip failed at level {}",
                level
            );
        }
    }

    #[test]
    fn test_required_experience_non_decreasing() {
        for level in 1..LEVEL_MAX {
            assert!(required_experience(level + 1) >= required_experience(level));
        }
    }

    #[test]
    fn test_level_non_decreasing_in_experience() {
        let mut prev = level_from_total_experience(0);
        for xp in (0..experience_cap()).step_by(7) {
            let level = level_from_total_experience(xp);
            assert!(level >= prev, "level decreased at xp {}", xp);
            prev = level;
        }
    }

    #[test]
    fn test_zero_and_negative_experience() {
        assert_eq!(level_from_total_experience(0), 1);
        assert_eq!(level_from_total_experience(-50), 1);
    }

    #[test]
    fn test_level_capped_at_max() {
        assert_eq!(level_from_total_experience(experience_cap()), LEVEL_MAX);
        assert_eq!(level_from_total_experience(i64::MAX), LEVEL_MAX);
    }

    #[test]
    fn test_110_experience_is_level_4() {
        // 20 + 30 + 40 = 90 <= 110 < 140
        assert_eq!(level_from_total_experience(110), 4);
    }
}
