//! Share-link capability tokens.

use chrono::{DateTime, Duration, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;
use crate::types::{AssetId, ShareLinkId, UserId};

/// Bytes of OS randomness behind every token (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// What a share link lets its holder do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    #[default]
    View,
    Download,
}

impl Permission {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Download => "download",
        }
    }

    pub fn parse(value: &str) -> Result<Self, LifecycleError> {
        match value {
            "view" => Ok(Self::View),
            "download" => Ok(Self::Download),
            other => Err(LifecycleError::Validation(format!(
                "unknown share permission: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unguessable capability token.
///
/// Debug output is truncated so tokens do not leak into logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareToken(String);

impl ShareToken {
    /// Draw a fresh token from the operating system CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Wrap a token presented by a caller.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines.
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl std::fmt::Debug for ShareToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ShareToken({}...)", self.prefix())
    }
}

impl From<&str> for ShareToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Outcome of checking a link against the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareValidity {
    Valid,
    Expired,
}

/// A time-boxed capability bound to one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLink {
    pub id: ShareLinkId,
    pub asset_id: AssetId,
    pub token: ShareToken,
    pub created_by: UserId,
    pub permission: Permission,
    pub expires_at: Option<DateTime<Utc>>,
    pub access_count: u64,
    pub created_at: DateTime<Utc>,
}

impl ShareLink {
    /// Build a new link with a fresh token.
    ///
    /// `expires_in_days <= 0` produces a link that never expires. A positive
    /// count whose expiry cannot be represented is a validation error.
    pub fn issue(
        asset_id: AssetId,
        created_by: UserId,
        permission: Permission,
        expires_in_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, LifecycleError> {
        Ok(Self {
            id: ShareLinkId::generate(),
            asset_id,
            token: ShareToken::generate(),
            created_by,
            permission,
            expires_at: expiry_for(expires_in_days, now)?,
            access_count: 0,
            created_at: now,
        })
    }

    /// Replace the generated token.
    #[must_use]
    pub fn with_token(mut self, token: ShareToken) -> Self {
        self.token = token;
        self
    }

    /// Check validity at `now`. Links without an expiry are always valid.
    #[must_use]
    pub fn validity(&self, now: DateTime<Utc>) -> ShareValidity {
        match self.expires_at {
            Some(expires_at) if now >= expires_at => ShareValidity::Expired,
            _ => ShareValidity::Valid,
        }
    }

    #[must_use]
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.validity(now) == ShareValidity::Valid
    }
}

/// Expiry instant for a link issued at `now`, `None` when it never expires.
pub fn expiry_for(
    expires_in_days: i64,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, LifecycleError> {
    if expires_in_days <= 0 {
        return Ok(None);
    }
    Duration::try_days(expires_in_days)
        .and_then(|d| now.checked_add_signed(d))
        .map(Some)
        .ok_or_else(|| {
            LifecycleError::Validation(format!(
                "share expiry of {expires_in_days} days is out of range"
            ))
        })
}
