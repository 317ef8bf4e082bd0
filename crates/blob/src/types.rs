use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use mediakeep_core::BlobLocator;

/// Longest file extension carried over into a locator.
const MAX_EXTENSION_LEN: usize = 10;

/// Placement hint for [`BlobStore::put`](crate::BlobStore::put).
///
/// Stores lay blobs out as `{prefix}/YYYY/MM/DD/{uuid}[.ext]`, dated by
/// `at`. The extension is taken from `filename` when it is a short
/// alphanumeric suffix and dropped otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutHint {
    pub prefix: String,
    pub filename: Option<String>,
    pub at: DateTime<Utc>,
}

impl PutHint {
    /// Hint for an asset's original upload.
    #[must_use]
    pub fn upload(at: DateTime<Utc>) -> Self {
        Self {
            prefix: "uploads".into(),
            filename: None,
            at,
        }
    }

    /// Hint for a version of an existing asset.
    #[must_use]
    pub fn version(at: DateTime<Utc>) -> Self {
        Self {
            prefix: "versions".into(),
            filename: None,
            at,
        }
    }

    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    fn extension(&self) -> Option<String> {
        let name = self.filename.as_deref()?;
        let (_, ext) = name.rsplit_once('.')?;
        if ext.is_empty()
            || ext.len() > MAX_EXTENSION_LEN
            || !ext.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// Generate a fresh locator for this hint.
    #[must_use]
    pub fn locator(&self) -> BlobLocator {
        let prefix = self.prefix.trim_matches('/');
        let id = uuid::Uuid::new_v4().simple();
        let name = match self.extension() {
            Some(ext) => format!("{id}.{ext}"),
            None => id.to_string(),
        };
        BlobLocator::new(format!(
            "{prefix}/{:04}/{:02}/{:02}/{name}",
            self.at.year(),
            self.at.month(),
            self.at.day()
        ))
    }
}
