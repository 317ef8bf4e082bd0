use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;
use crate::types::AssetId;

/// Grace period applied when a soft-delete does not specify one.
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Longest window a caller may ask for, roughly a thousand years.
pub const MAX_RETENTION_DAYS: u32 = 365_000;

/// A validated, non-negative retention window measured in whole days.
///
/// Zero is allowed and makes the asset eligible for purge on the next sweep.
/// Windows longer than [`MAX_RETENTION_DAYS`] are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct RetentionDays(u32);

impl RetentionDays {
    /// Window of `days`, capped at [`MAX_RETENTION_DAYS`].
    #[must_use]
    pub const fn new(days: u32) -> Self {
        if days > MAX_RETENTION_DAYS {
            Self(MAX_RETENTION_DAYS)
        } else {
            Self(days)
        }
    }

    #[must_use]
    pub const fn days(self) -> u32 {
        self.0
    }

    /// Length of the window.
    #[must_use]
    pub fn duration(self) -> Duration {
        Duration::days(i64::from(self.0))
    }

    /// Parse a day count supplied as text by a caller.
    pub fn parse(value: &str) -> Result<Self, LifecycleError> {
        let parsed: i64 = value.trim().parse().map_err(|_| {
            LifecycleError::Validation(format!("retention days must be an integer, got {value:?}"))
        })?;
        Self::try_from(parsed)
    }
}

impl Default for RetentionDays {
    fn default() -> Self {
        Self(DEFAULT_RETENTION_DAYS)
    }
}

impl From<RetentionDays> for u32 {
    fn from(days: RetentionDays) -> Self {
        days.0
    }
}

impl TryFrom<i64> for RetentionDays {
    type Error = LifecycleError;

    fn try_from(days: i64) -> Result<Self, Self::Error> {
        let days = u32::try_from(days).map_err(|_| {
            LifecycleError::Validation(format!(
                "retention days must be a non-negative integer, got {days}"
            ))
        })?;
        if days > MAX_RETENTION_DAYS {
            return Err(LifecycleError::Validation(format!(
                "retention days must be at most {MAX_RETENTION_DAYS}, got {days}"
            )));
        }
        Ok(Self(days))
    }
}

impl std::fmt::Display for RetentionDays {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}d", self.0)
    }
}

/// Recycle-bin entry for a soft-deleted asset.
///
/// Exists exactly while its asset is soft-deleted; at most one per asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionRecord {
    pub asset_id: AssetId,
    pub deleted_at: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
}

impl RetentionRecord {
    /// Open a retention window starting at `deleted_at`.
    ///
    /// An expiry past the end of the calendar saturates at
    /// [`DateTime::<Utc>::MAX_UTC`].
    #[must_use]
    pub fn open(asset_id: AssetId, deleted_at: DateTime<Utc>, window: RetentionDays) -> Self {
        let expiry = deleted_at
            .checked_add_signed(window.duration())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            asset_id,
            deleted_at,
            expiry,
        }
    }

    /// Whether the asset may be purged at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window_is_seven_days() {
        assert_eq!(RetentionDays::default().days(), 7);
        assert_eq!(RetentionDays::default().duration(), Duration::days(7));
    }

    #[test]
    fn parse_accepts_non_negative_integers() {
        assert_eq!(RetentionDays::parse("0").unwrap().days(), 0);
        assert_eq!(RetentionDays::parse(" 30 ").unwrap().days(), 30);
    }

    #[test]
    fn parse_rejects_negative_and_non_integer() {
        assert!(matches!(
            RetentionDays::parse("-1"),
            Err(LifecycleError::Validation(_))
        ));
        assert!(matches!(
            RetentionDays::parse("2.5"),
            Err(LifecycleError::Validation(_))
        ));
        assert!(matches!(
            RetentionDays::parse("week"),
            Err(LifecycleError::Validation(_))
        ));
    }

    #[test]
    fn windows_past_the_cap_are_rejected() {
        assert_eq!(
            RetentionDays::parse("365000").unwrap().days(),
            MAX_RETENTION_DAYS
        );
        for input in ["365001", "200000000", "4000000000"] {
            assert!(
                matches!(
                    RetentionDays::parse(input),
                    Err(LifecycleError::Validation(_))
                ),
                "{input}"
            );
        }
        assert_eq!(RetentionDays::new(u32::MAX).days(), MAX_RETENTION_DAYS);
    }

    #[test]
    fn deserialize_applies_the_same_rules() {
        let days: RetentionDays = serde_json::from_str("30").unwrap();
        assert_eq!(days.days(), 30);
        assert!(serde_json::from_str::<RetentionDays>("-1").is_err());
        assert!(serde_json::from_str::<RetentionDays>("4000000000").is_err());
        assert_eq!(serde_json::to_string(&days).unwrap(), "30");
    }

    #[test]
    fn expiry_saturates_near_the_end_of_time() {
        let late = DateTime::<Utc>::MAX_UTC - Duration::days(1);
        let record = RetentionRecord::open(AssetId::new("a1"), late, RetentionDays::new(30));
        assert_eq!(record.expiry, DateTime::<Utc>::MAX_UTC);

        let now = Utc::now();
        let longest = RetentionRecord::open(
            AssetId::new("a1"),
            now,
            RetentionDays::new(MAX_RETENTION_DAYS),
        );
        assert_eq!(
            longest.expiry,
            now + Duration::days(i64::from(MAX_RETENTION_DAYS))
        );
    }

    #[test]
    fn record_expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let record = RetentionRecord::open(AssetId::new("a1"), now, RetentionDays::new(1));
        assert_eq!(record.expiry, now + Duration::days(1));
        assert!(!record.is_expired(now));
        assert!(record.is_expired(record.expiry));
        assert!(record.is_expired(record.expiry + Duration::seconds(1)));
    }

    #[test]
    fn zero_day_window_is_immediately_expired() {
        let now = Utc::now();
        let record = RetentionRecord::open(AssetId::new("a1"), now, RetentionDays::new(0));
        assert!(record.is_expired(now));
    }
}
