//! Secure item store backed by the OS keyring (macOS Keychain, Windows
//! Credential Manager, Secret Service).
//!
//! Each account maps to one keyring entry under the configured service. The
//! entry's secret is a small JSON envelope holding the base64 value and the
//! access-control attribute string.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use gatekeep_core::{
    storage::{ItemAttributes, ItemError, SecureItemStore},
    Grant,
};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Smallest secret limit across the platform stores. Windows Credential
/// Manager holds 2560 bytes of UTF-16, which is 1280 envelope characters.
const SECRET_LIMIT: usize = 1280;

/// Longest attribute string an `AccessPolicy` encodes to.
const LONGEST_ACCESS_CONTROL: &str = "when-unlocked-this-device-only;user-presence";

const ENVELOPE_OVERHEAD: usize =
    r#"{"value":"","access_control":""}"#.len() + LONGEST_ACCESS_CONTROL.len();

/// Largest value whose base64 envelope still fits within `SECRET_LIMIT`.
pub const MAX_BLOB_LEN: usize = (SECRET_LIMIT - ENVELOPE_OVERHEAD) / 4 * 3;

pub struct KeyringItemStore {
    service: String,
}

impl KeyringItemStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, key: &str) -> Result<Entry, ItemError> {
        Entry::new(&self.service, key).map_err(keyring_err)
    }

    fn exists(entry: &Entry) -> Result<bool, ItemError> {
        match entry.get_password() {
            Ok(_) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(err) => Err(keyring_err(err)),
        }
    }

    fn store(entry: &Entry, value: &[u8], attributes: &ItemAttributes) -> Result<(), ItemError> {
        entry
            .set_password(&Envelope::seal(value, attributes)?)
            .map_err(keyring_err)
    }

    fn insert(&self, key: &str, value: &[u8], attributes: &ItemAttributes) -> Result<(), ItemError> {
        let entry = self.entry(key)?;
        if Self::exists(&entry)? {
            return Err(ItemError::failed("keyring.duplicate_item", "item already exists"));
        }
        Self::store(&entry, value, attributes)
    }

    fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, ItemError> {
        match self.entry(key)?.get_password() {
            Ok(secret) => Envelope::open(&secret).map(Some),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(keyring_err(err)),
        }
    }

    fn remove(&self, key: &str) -> Result<(), ItemError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Err(ItemError::NotFound),
            Err(err) => Err(keyring_err(err)),
        }
    }

    fn replace(&self, key: &str, value: &[u8], attributes: &ItemAttributes) -> Result<(), ItemError> {
        let entry = self.entry(key)?;
        if !Self::exists(&entry)? {
            return Err(ItemError::NotFound);
        }
        Self::store(&entry, value, attributes)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    value: String,
    access_control: String,
}

impl Envelope {
    fn seal(value: &[u8], attributes: &ItemAttributes) -> Result<String, ItemError> {
        serde_json::to_string(&Envelope {
            value: STANDARD.encode(value),
            access_control: attributes.access_control().to_string(),
        })
        .map_err(|e| ItemError::failed("encoding", e))
    }

    fn open(secret: &str) -> Result<Vec<u8>, ItemError> {
        let envelope: Envelope =
            serde_json::from_str(secret).map_err(|e| ItemError::failed("encoding", e))?;
        STANDARD
            .decode(envelope.value)
            .map_err(|e| ItemError::failed("encoding", format!("value decode failed: {e}")))
    }
}

#[async_trait]
impl SecureItemStore for KeyringItemStore {
    #[instrument(skip_all, fields(service = %self.service, key = %key))]
    async fn write(
        &self,
        _grant: &Grant,
        key: &str,
        value: &[u8],
        attributes: &ItemAttributes,
    ) -> Result<(), ItemError> {
        self.insert(key, value, attributes)
    }

    #[instrument(skip_all, fields(service = %self.service, key = %key))]
    async fn read(&self, _grant: &Grant, key: &str) -> Result<Option<Vec<u8>>, ItemError> {
        self.fetch(key)
    }

    #[instrument(skip_all, fields(service = %self.service, key = %key))]
    async fn erase(&self, _grant: &Grant, key: &str) -> Result<(), ItemError> {
        self.remove(key)
    }

    #[instrument(skip_all, fields(service = %self.service, key = %key))]
    async fn update_attributes(
        &self,
        _grant: &Grant,
        key: &str,
        value: &[u8],
        attributes: &ItemAttributes,
    ) -> Result<(), ItemError> {
        self.replace(key, value, attributes)
    }

    fn max_blob_len(&self) -> Option<usize> {
        Some(MAX_BLOB_LEN)
    }
}

fn keyring_code(err: &keyring::Error) -> &'static str {
    match err {
        keyring::Error::NoEntry => "keyring.no_entry",
        keyring::Error::NoStorageAccess(_) => "keyring.no_storage_access",
        keyring::Error::PlatformFailure(_) => "keyring.platform_failure",
        keyring::Error::BadEncoding(_) => "keyring.bad_encoding",
        keyring::Error::TooLong(_, _) => "keyring.too_long",
        keyring::Error::Invalid(_, _) => "keyring.invalid",
        keyring::Error::Ambiguous(_) => "keyring.ambiguous",
        _ => "keyring",
    }
}

fn keyring_err(err: keyring::Error) -> ItemError {
    ItemError::failed(keyring_code(&err), err)
}
