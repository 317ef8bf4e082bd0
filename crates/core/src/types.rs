use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! newtype_string {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Return the inner string as a str slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

/// Adds a `generate()` constructor producing a random UUID-v4 identifier.
macro_rules! generated_id {
    ($name:ident) => {
        impl $name {
            /// Generate a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }
        }
    };
}

newtype_string!(ClientId, "Identifies a client workspace.");
newtype_string!(ProjectId, "Identifies a project owned by a client.");
newtype_string!(AssetId, "Identifies a logical media asset.");
newtype_string!(VersionId, "Identifies a single historical version of an asset.");
newtype_string!(ShareLinkId, "Identifies a share link record.");
newtype_string!(UserId, "An already-authenticated user identity.");
newtype_string!(
    BlobLocator,
    "Opaque storage locator returned by a blob store."
);
newtype_string!(
    Fingerprint,
    "Content fingerprint used for exact duplicate detection."
);

generated_id!(ClientId);
generated_id!(ProjectId);
generated_id!(AssetId);
generated_id!(VersionId);
generated_id!(ShareLinkId);
