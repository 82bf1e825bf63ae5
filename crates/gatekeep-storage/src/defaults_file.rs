use std::{
    collections::BTreeMap,
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use gatekeep_core::storage::{ItemError, KeyValueMedium};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

const FILE_NAME: &str = "defaults.json";
const FORMAT_VERSION: u32 = 1;

/// Unencrypted key-value medium persisted as a single JSON map.
/// Reads see the file as it is now; writes replace it atomically.
pub struct DefaultsFile {
    path: PathBuf,
    // Serialises read-modify-write cycles from this process.
    write_lock: Mutex<()>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DefaultsDocument {
    version: u32,
    entries: BTreeMap<String, String>,
}

impl DefaultsFile {
    /// Medium stored as `defaults.json` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::at_path(dir.as_ref().join(FILE_NAME))
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<DefaultsDocument, ItemError> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(DefaultsDocument::default()),
            Err(err) => return Err(ItemError::failed("io", err)),
        };
        if contents.iter().all(u8::is_ascii_whitespace) {
            return Ok(DefaultsDocument::default());
        }
        serde_json::from_slice(&contents).map_err(|e| ItemError::failed("encoding", e))
    }

    fn write_document(&self, document: &DefaultsDocument) -> Result<(), ItemError> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| ItemError::failed("io", "invalid defaults path"))?;
        fs::create_dir_all(parent).map_err(|e| ItemError::failed("io", e))?;

        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| ItemError::failed("io", e))?;
        let json =
            serde_json::to_vec_pretty(document).map_err(|e| ItemError::failed("encoding", e))?;
        tmp.write_all(&json).map_err(|e| ItemError::failed("io", e))?;
        tmp.persist(&self.path)
            .map_err(|e| ItemError::failed("io", e.error))?;
        debug!(entries = document.entries.len(), "defaults written");
        Ok(())
    }

    fn modify<F>(&self, change: F) -> Result<(), ItemError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|err| ItemError::failed("io", format!("lock poisoned: {err}")))?;

        let mut document = self.read_document()?;
        if !change(&mut document.entries) {
            return Ok(());
        }
        document.version = FORMAT_VERSION;
        self.write_document(&document)
    }
}

#[async_trait]
impl KeyValueMedium for DefaultsFile {
    #[instrument(skip_all, fields(key = %key))]
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), ItemError> {
        let encoded = STANDARD.encode(value);
        self.modify(|entries| {
            entries.insert(key.to_string(), encoded);
            true
        })
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ItemError> {
        let document = self.read_document()?;
        document
            .entries
            .get(key)
            .map(|encoded| {
                STANDARD
                    .decode(encoded)
                    .map_err(|e| ItemError::failed("encoding", format!("value decode failed: {e}")))
            })
            .transpose()
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn remove(&self, key: &str) -> Result<(), ItemError> {
        self.modify(|entries| entries.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use gatekeep_core::SecureStorage;

    use super::*;

    #[tokio::test]
    async fn missing_or_empty_file_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let defaults = DefaultsFile::in_dir(dir.path());
        assert_eq!(defaults.get("k").await.expect("get"), None);

        fs::write(defaults.path(), "  \n").expect("write empty");
        assert_eq!(defaults.get("k").await.expect("get"), None);
    }

    #[tokio::test]
    async fn values_persist_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        DefaultsFile::in_dir(dir.path())
            .set("theme", b"dark")
            .await
            .expect("set");

        let reopened = DefaultsFile::in_dir(dir.path());
        assert_eq!(reopened.get("theme").await.expect("get"), Some(b"dark".to_vec()));

        let raw = fs::read_to_string(reopened.path()).expect("read");
        let document: DefaultsDocument = serde_json::from_str(&raw).expect("parse");
        assert_eq!(document.version, FORMAT_VERSION);
    }

    #[tokio::test]
    async fn removing_absent_key_does_not_touch_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let defaults = DefaultsFile::in_dir(dir.path());
        defaults.remove("ghost").await.expect("remove");
        assert!(!defaults.path().exists());
    }

    #[tokio::test]
    async fn corrupt_file_surfaces_encoding_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let defaults = DefaultsFile::in_dir(dir.path());
        fs::write(defaults.path(), "{not json").expect("write");

        let err = defaults.get("k").await.expect_err("corrupt");
        assert!(matches!(err, ItemError::Failed { ref code, .. } if code == "encoding"));
    }

    #[tokio::test]
    async fn plain_storage_over_defaults_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = SecureStorage::plain(DefaultsFile::in_dir(dir.path()));

        storage.update("acct", b"one").await.expect("upsert");
        storage.save("acct", b"two").await.expect("overwrite");
        assert_eq!(storage.load("acct").await.expect("load"), Some(b"two".to_vec()));

        storage.delete("acct").await.expect("delete");
        storage.delete("acct").await.expect("delete again");
        assert_eq!(storage.load("acct").await.expect("load"), None);
    }
}
