use std::{
    fs::{self, File},
    io::{ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use gatekeep_core::{
    storage::{ItemAttributes, ItemError, SecureItemStore},
    Grant,
};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::instrument;

use crate::key_provider::{KeyMaterial, KeyProvider};

/// Secure item store keeping one AES-256-GCM sealed file per account.
/// The access-control attributes are sealed together with the value.
pub struct EncryptedFileItemStore<P: KeyProvider> {
    root: PathBuf,
    key_provider: P,
}

impl<P: KeyProvider> EncryptedFileItemStore<P> {
    pub fn new(root: impl Into<PathBuf>, key_provider: P) -> Self {
        Self {
            root: root.into(),
            key_provider,
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(sanitize_key(key))
    }

    async fn seal(&self, value: &[u8], attributes: &ItemAttributes) -> Result<StoredBlob, ItemError> {
        let cipher = self.cipher().await?;
        let item = SealedItem {
            value: URL_SAFE_NO_PAD.encode(value),
            access_control: attributes.access_control().to_string(),
        };
        let plaintext = serde_json::to_vec(&item).map_err(|e| ItemError::failed("encoding", e))?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|e| ItemError::failed("crypto", format!("encrypt failed: {e}")))?;

        Ok(StoredBlob {
            nonce: URL_SAFE_NO_PAD.encode(nonce.as_slice()),
            ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
        })
    }

    async fn unseal(&self, blob: StoredBlob) -> Result<SealedItem, ItemError> {
        let cipher = self.cipher().await?;
        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(blob.nonce)
            .map_err(|e| ItemError::failed("encoding", format!("nonce decode failed: {e}")))?;
        if nonce_bytes.len() != 12 {
            return Err(ItemError::failed("encoding", "nonce has wrong length"));
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(blob.ciphertext)
            .map_err(|e| ItemError::failed("encoding", format!("ciphertext decode failed: {e}")))?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|e| ItemError::failed("crypto", format!("decrypt failed: {e}")))?;
        serde_json::from_slice(&plaintext).map_err(|e| ItemError::failed("encoding", e))
    }

    async fn cipher(&self) -> Result<Aes256Gcm, ItemError> {
        let material = self
            .key_provider
            .get_or_create()
            .await
            .map_err(|e| ItemError::failed("key_provider", e))?;
        build_cipher(&material)
    }
}

/// On-disk layout.
#[derive(Debug, Serialize, Deserialize)]
struct StoredBlob {
    nonce: String,
    ciphertext: String,
}

/// Plaintext sealed inside `StoredBlob::ciphertext`.
#[derive(Debug, Serialize, Deserialize)]
struct SealedItem {
    value: String,
    access_control: String,
}

#[async_trait]
impl<P: KeyProvider> SecureItemStore for EncryptedFileItemStore<P> {
    #[instrument(skip_all, fields(key = %key))]
    async fn write(
        &self,
        _grant: &Grant,
        key: &str,
        value: &[u8],
        attributes: &ItemAttributes,
    ) -> Result<(), ItemError> {
        let blob = self.seal(value, attributes).await?;
        write_blob(&self.path_for(key), &blob, false)
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn read(&self, _grant: &Grant, key: &str) -> Result<Option<Vec<u8>>, ItemError> {
        let blob = match read_blob(&self.path_for(key))? {
            Some(blob) => blob,
            None => return Ok(None),
        };
        let item = self.unseal(blob).await?;
        URL_SAFE_NO_PAD
            .decode(item.value)
            .map(Some)
            .map_err(|e| ItemError::failed("encoding", format!("value decode failed: {e}")))
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn erase(&self, _grant: &Grant, key: &str) -> Result<(), ItemError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(ItemError::NotFound),
            Err(err) => Err(io_err(err)),
        }
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn update_attributes(
        &self,
        _grant: &Grant,
        key: &str,
        value: &[u8],
        attributes: &ItemAttributes,
    ) -> Result<(), ItemError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Err(ItemError::NotFound);
        }
        let blob = self.seal(value, attributes).await?;
        write_blob(&path, &blob, true)
    }
}

fn write_blob(path: &Path, blob: &StoredBlob, overwrite: bool) -> Result<(), ItemError> {
    let parent = path
        .parent()
        .ok_or_else(|| ItemError::failed("io", "invalid storage path"))?;
    fs::create_dir_all(parent).map_err(io_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(io_err)?;
    let json = serde_json::to_vec(blob).map_err(|e| ItemError::failed("encoding", e))?;
    tmp.write_all(&json).map_err(io_err)?;
    tmp.flush().map_err(io_err)?;

    let persisted = if overwrite {
        tmp.persist(path)
    } else {
        tmp.persist_noclobber(path)
    };
    match persisted {
        Ok(_) => Ok(()),
        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
            Err(ItemError::failed("duplicate_item", "item already exists"))
        }
        Err(err) => Err(io_err(err.error)),
    }
}

fn read_blob(path: &Path) -> Result<Option<StoredBlob>, ItemError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(err)),
    };

    let mut buf = Vec::new();
    file.read_to_end(&mut buf).map_err(io_err)?;
    serde_json::from_slice(&buf)
        .map(Some)
        .map_err(|e| ItemError::failed("encoding", e))
}

fn build_cipher(material: &KeyMaterial) -> Result<Aes256Gcm, ItemError> {
    Aes256Gcm::new_from_slice(&material.bytes)
        .map_err(|e| ItemError::failed("crypto", format!("cipher init failed: {e}")))
}

fn sanitize_key(key: &str) -> String {
    URL_SAFE_NO_PAD.encode(key)
}

fn io_err(err: std::io::Error) -> ItemError {
    ItemError::failed("io", err)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gatekeep_core::{auth::StaticAuthenticator, SecureStorage, SecureStoreError};

    use super::*;
    use crate::key_provider::InMemoryKeyProvider;

    fn storage(root: &Path, key: InMemoryKeyProvider) -> (SecureStorage, Arc<StaticAuthenticator>) {
        let auth = Arc::new(StaticAuthenticator::granting());
        let store = SecureStorage::gated(EncryptedFileItemStore::new(root, key), auth.clone());
        (store, auth)
    }

    #[tokio::test]
    async fn round_trip_encrypts_and_decrypts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, _) = storage(dir.path(), InMemoryKeyProvider::default());

        store.save("workspace/session", b"hello-gatekeep").await.expect("save");
        let loaded = store.load("workspace/session").await.expect("load");
        assert_eq!(loaded, Some(b"hello-gatekeep".to_vec()));

        // ensure plaintext is not present on disk
        let stored = fs::read_to_string(dir.path().join(sanitize_key("workspace/session")))
            .expect("read ciphertext");
        assert!(!stored.contains("hello-gatekeep"), "plaintext must not be stored");
        assert!(!stored.contains("user-presence"), "attributes are sealed too");
    }

    #[tokio::test]
    async fn save_replaces_and_update_upserts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, auth) = storage(dir.path(), InMemoryKeyProvider::default());

        store.save("a", b"v1").await.expect("save");
        store.save("a", b"v2").await.expect("save over existing");
        store.update("b", b"fresh").await.expect("upsert");
        store.update("a", b"v3").await.expect("update");

        assert_eq!(store.load("a").await.expect("load"), Some(b"v3".to_vec()));
        assert_eq!(store.load("b").await.expect("load"), Some(b"fresh".to_vec()));
        assert_eq!(auth.calls(), 6);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, _) = storage(dir.path(), InMemoryKeyProvider::default());
        store.save("k", b"v").await.expect("save");
        store.delete("k").await.expect("delete");
        store.delete("k").await.expect("delete again");

        assert_eq!(store.load("k").await.expect("load"), None);
    }

    #[tokio::test]
    async fn wrong_key_surfaces_crypto_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (writer, _) = storage(dir.path(), InMemoryKeyProvider::with_key([1u8; 32]));
        writer.save("k", b"v").await.expect("save");

        let (reader, _) = storage(dir.path(), InMemoryKeyProvider::with_key([2u8; 32]));
        let err = reader.load("k").await.expect_err("wrong key");
        assert!(matches!(err, SecureStoreError::Backend { ref code, .. } if code == "crypto"));
    }

    #[tokio::test]
    async fn denied_gate_writes_nothing_to_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (store, auth) = storage(dir.path(), InMemoryKeyProvider::default());
        auth.set_granted(false);

        store.save("k", b"v").await.expect_err("denied");
        assert_eq!(fs::read_dir(dir.path()).expect("read dir").count(), 0);
    }

    #[test]
    fn noclobber_write_reports_duplicate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("item");
        let blob = || StoredBlob {
            nonce: "n".into(),
            ciphertext: "c".into(),
        };

        write_blob(&path, &blob(), false).expect("first write");
        let err = write_blob(&path, &blob(), false).expect_err("duplicate");
        assert!(matches!(err, ItemError::Failed { ref code, .. } if code == "duplicate_item"));
        write_blob(&path, &blob(), true).expect("overwrite allowed");
    }

    #[tokio::test]
    async fn keyring_keyed_store_reads_back_after_reopen() {
        crate::test_keyring::install();
        let dir = tempfile::tempdir().expect("tempdir");
        let auth = Arc::new(StaticAuthenticator::granting());
        let open = || {
            SecureStorage::gated(
                EncryptedFileItemStore::new(
                    dir.path(),
                    crate::KeyringProvider::new("gatekeep-test-files", "store-key"),
                ),
                auth.clone(),
            )
        };

        open().save("acct1", b"hello").await.expect("save");
        assert_eq!(
            open().load("acct1").await.expect("load"),
            Some(b"hello".to_vec())
        );
    }
}
