//! Boundaries to the underlying persistence media. The Plain backend talks to a
//! `KeyValueMedium`; the Gated backend talks to a `SecureItemStore` and must
//! present a `Grant` on every call.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use super::SecureStoreError;
use crate::auth::Grant;

/// Failure reported by a medium.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ItemError {
    #[error("item not found")]
    NotFound,
    #[error("medium failure [{code}]: {message}")]
    Failed { code: String, message: String },
}

impl ItemError {
    pub fn failed(code: impl Into<String>, message: impl ToString) -> Self {
        Self::Failed {
            code: code.into(),
            message: message.to_string(),
        }
    }
}

impl From<ItemError> for SecureStoreError {
    fn from(err: ItemError) -> Self {
        match err {
            ItemError::NotFound => SecureStoreError::backend("not_found", "item not found"),
            ItemError::Failed { code, message } => SecureStoreError::Backend { code, message },
        }
    }
}

/// When a protected item may be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessibility {
    WhenUnlocked,
    WhenUnlockedThisDeviceOnly,
}

/// Access-control policy a gated backend attaches to every item it writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPolicy {
    pub accessibility: Accessibility,
    pub user_presence: bool,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            accessibility: Accessibility::WhenUnlockedThisDeviceOnly,
            user_presence: true,
        }
    }
}

impl AccessPolicy {
    pub fn attributes(&self) -> ItemAttributes {
        let accessibility = match self.accessibility {
            Accessibility::WhenUnlocked => "when-unlocked",
            Accessibility::WhenUnlockedThisDeviceOnly => "when-unlocked-this-device-only",
        };
        let access_control = if self.user_presence {
            format!("{accessibility};user-presence")
        } else {
            accessibility.to_string()
        };
        ItemAttributes { access_control }
    }
}

/// Opaque attribute set stored alongside an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemAttributes {
    access_control: String,
}

impl ItemAttributes {
    pub fn access_control(&self) -> &str {
        &self.access_control
    }
}

impl fmt::Display for ItemAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.access_control)
    }
}

/// Unauthenticated key-value medium (a process "defaults" database or similar).
#[async_trait]
pub trait KeyValueMedium: Send + Sync {
    /// Store `value` under `key`, replacing any existing value.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), ItemError>;

    /// Current value for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ItemError>;

    /// Remove `key`; absent keys are not an error.
    async fn remove(&self, key: &str) -> Result<(), ItemError>;

    /// Largest value the medium accepts, if it imposes a limit.
    fn max_blob_len(&self) -> Option<usize> {
        None
    }
}

/// Access-controlled item store (platform keychain or equivalent).
///
/// `write` may reject an existing key, `update_attributes` and `erase` report
/// `ItemError::NotFound` for missing keys.
#[async_trait]
pub trait SecureItemStore: Send + Sync {
    async fn write(
        &self,
        grant: &Grant,
        key: &str,
        value: &[u8],
        attributes: &ItemAttributes,
    ) -> Result<(), ItemError>;

    async fn read(&self, grant: &Grant, key: &str) -> Result<Option<Vec<u8>>, ItemError>;

    async fn erase(&self, grant: &Grant, key: &str) -> Result<(), ItemError>;

    /// Replace value and attributes of an existing item in place.
    async fn update_attributes(
        &self,
        grant: &Grant,
        key: &str,
        value: &[u8],
        attributes: &ItemAttributes,
    ) -> Result<(), ItemError>;

    fn max_blob_len(&self) -> Option<usize> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_requires_presence_on_this_device() {
        let attrs = AccessPolicy::default().attributes();
        assert_eq!(
            attrs.access_control(),
            "when-unlocked-this-device-only;user-presence"
        );
    }

    #[test]
    fn policy_without_presence_omits_flag() {
        let attrs = AccessPolicy {
            accessibility: Accessibility::WhenUnlocked,
            user_presence: false,
        }
        .attributes();
        assert_eq!(attrs.to_string(), "when-unlocked");
    }

    #[test]
    fn failed_item_error_maps_code_verbatim() {
        let err: SecureStoreError = ItemError::failed("disk.full", "no space").into();
        assert_eq!(err, SecureStoreError::backend("disk.full", "no space"));
    }
}
