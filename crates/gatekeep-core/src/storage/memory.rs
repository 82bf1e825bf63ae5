use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;

use super::medium::{ItemAttributes, ItemError, KeyValueMedium, SecureItemStore};
use crate::auth::Grant;

/// In-memory key-value medium for tests and smoke runs.
/// Clones share the same map, so a test can keep a handle for inspection.
#[derive(Debug, Default, Clone)]
pub struct InMemoryMedium {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl InMemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `code` until cleared with `None`.
    pub fn set_failure(&self, code: Option<&str>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = code.map(str::to_string);
        }
    }

    /// Number of stored entries. Injected failures do not apply here.
    pub fn len(&self) -> Result<usize, ItemError> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, ItemError> {
        Ok(self.len()? == 0)
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<u8>>>, ItemError> {
        self.inner
            .lock()
            .map_err(|err| ItemError::failed("memory.poisoned", format!("lock poisoned: {err}")))
    }

    fn map(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<u8>>>, ItemError> {
        let failure = self
            .failure
            .lock()
            .map_err(|err| ItemError::failed("memory.poisoned", format!("lock poisoned: {err}")))?;
        if let Some(code) = failure.as_deref() {
            return Err(ItemError::failed(code, "injected failure"));
        }

        self.entries()
    }
}

#[async_trait]
impl KeyValueMedium for InMemoryMedium {
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), ItemError> {
        self.map()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ItemError> {
        Ok(self.map()?.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<(), ItemError> {
        self.map()?.remove(key);
        Ok(())
    }
}

/// Boundary call recorded by `InMemoryItemStore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemOp {
    Write,
    Read,
    Erase,
    UpdateAttributes,
}

#[derive(Debug, Clone)]
struct StoredItem {
    value: Vec<u8>,
    attributes: ItemAttributes,
}

#[derive(Debug, Default)]
struct ItemState {
    items: HashMap<String, StoredItem>,
    calls: Vec<ItemOp>,
    failures: HashMap<ItemOp, String>,
}

/// In-memory stand-in for a platform keychain.
///
/// Rejects writes to existing keys the way a keychain reports duplicates,
/// records every boundary call, and can be told to fail a given operation.
#[derive(Debug, Default, Clone)]
pub struct InMemoryItemStore {
    state: Arc<Mutex<ItemState>>,
    max_blob_len: Option<usize>,
}

impl InMemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_blob_len(limit: usize) -> Self {
        Self {
            max_blob_len: Some(limit),
            ..Self::default()
        }
    }

    /// Fail every `op` with `code` until cleared with `None`.
    pub fn set_failure(&self, op: ItemOp, code: Option<&str>) {
        if let Ok(mut state) = self.state.lock() {
            match code {
                Some(code) => state.failures.insert(op, code.to_string()),
                None => state.failures.remove(&op),
            };
        }
    }

    /// Every boundary call made so far, in order.
    pub fn calls(&self) -> Vec<ItemOp> {
        self.state
            .lock()
            .map(|state| state.calls.clone())
            .unwrap_or_default()
    }

    /// Stored value, bypassing the gate.
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.items.get(key).map(|item| item.value.clone()))
    }

    /// Stored attributes, bypassing the gate.
    pub fn attributes_of(&self, key: &str) -> Option<ItemAttributes> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.items.get(key).map(|item| item.attributes.clone()))
    }

    fn begin(&self, op: ItemOp) -> Result<MutexGuard<'_, ItemState>, ItemError> {
        let mut state = self
            .state
            .lock()
            .map_err(|err| ItemError::failed("memory.poisoned", format!("lock poisoned: {err}")))?;
        state.calls.push(op);
        if let Some(code) = state.failures.get(&op) {
            return Err(ItemError::failed(code.clone(), "injected failure"));
        }
        Ok(state)
    }
}

#[async_trait]
impl SecureItemStore for InMemoryItemStore {
    async fn write(
        &self,
        _grant: &Grant,
        key: &str,
        value: &[u8],
        attributes: &ItemAttributes,
    ) -> Result<(), ItemError> {
        let mut state = self.begin(ItemOp::Write)?;
        if state.items.contains_key(key) {
            return Err(ItemError::failed("duplicate_item", "item already exists"));
        }
        state.items.insert(
            key.to_string(),
            StoredItem {
                value: value.to_vec(),
                attributes: attributes.clone(),
            },
        );
        Ok(())
    }

    async fn read(&self, _grant: &Grant, key: &str) -> Result<Option<Vec<u8>>, ItemError> {
        let state = self.begin(ItemOp::Read)?;
        state
            .items
            .get(key)
            .map(|item| Some(item.value.clone()))
            .ok_or(ItemError::NotFound)
    }

    async fn erase(&self, _grant: &Grant, key: &str) -> Result<(), ItemError> {
        let mut state = self.begin(ItemOp::Erase)?;
        state.items.remove(key).map(|_| ()).ok_or(ItemError::NotFound)
    }

    async fn update_attributes(
        &self,
        _grant: &Grant,
        key: &str,
        value: &[u8],
        attributes: &ItemAttributes,
    ) -> Result<(), ItemError> {
        let mut state = self.begin(ItemOp::UpdateAttributes)?;
        let item = state.items.get_mut(key).ok_or(ItemError::NotFound)?;
        item.value = value.to_vec();
        item.attributes = attributes.clone();
        Ok(())
    }

    fn max_blob_len(&self) -> Option<usize> {
        self.max_blob_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::medium::AccessPolicy;

    #[tokio::test]
    async fn medium_overwrites_and_removes() {
        let medium = InMemoryMedium::new();
        medium.set("k", b"v1").await.expect("set");
        medium.set("k", b"v2").await.expect("set again");
        assert_eq!(medium.get("k").await.expect("get"), Some(b"v2".to_vec()));

        medium.remove("k").await.expect("remove");
        medium.remove("k").await.expect("remove again");
        assert!(medium.is_empty().expect("is_empty"));
    }

    #[test]
    fn medium_len_reports_poisoned_lock() {
        let medium = InMemoryMedium::new();
        let shared = medium.clone();
        let _ = std::thread::spawn(move || {
            let _guard = shared.inner.lock().expect("lock");
            panic!("poison the map");
        })
        .join();

        let err = medium.len().expect_err("poisoned");
        assert!(matches!(err, ItemError::Failed { ref code, .. } if code == "memory.poisoned"));
        assert!(medium.is_empty().is_err());
    }

    #[tokio::test]
    async fn medium_failure_injection_applies_until_cleared() {
        let medium = InMemoryMedium::new();
        medium.set_failure(Some("medium.offline"));
        let err = medium.get("k").await.expect_err("should fail");
        assert_eq!(err, ItemError::failed("medium.offline", "injected failure"));

        medium.set_failure(None);
        assert_eq!(medium.get("k").await.expect("get"), None);
    }

    #[tokio::test]
    async fn item_store_rejects_duplicates_and_reports_missing() {
        let store = InMemoryItemStore::new();
        let grant = Grant::mint();
        let attrs = AccessPolicy::default().attributes();

        store.write(&grant, "k", b"v", &attrs).await.expect("write");
        let dup = store
            .write(&grant, "k", b"v", &attrs)
            .await
            .expect_err("duplicate");
        assert!(matches!(dup, ItemError::Failed { ref code, .. } if code == "duplicate_item"));

        assert_eq!(
            store.update_attributes(&grant, "missing", b"x", &attrs).await,
            Err(ItemError::NotFound)
        );
        assert_eq!(store.erase(&grant, "missing").await, Err(ItemError::NotFound));
        assert_eq!(
            store.calls(),
            vec![
                ItemOp::Write,
                ItemOp::Write,
                ItemOp::UpdateAttributes,
                ItemOp::Erase
            ]
        );
    }
}
