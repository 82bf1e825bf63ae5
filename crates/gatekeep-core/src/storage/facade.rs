use std::{future::Future, sync::Arc};

use tokio::task::JoinHandle;
use tracing::instrument;

use super::{
    backend::{Backend, GatedBackend, PlainBackend},
    medium::{KeyValueMedium, SecureItemStore},
    SecureStoreError,
};
use crate::auth::Authenticator;

/// Uniform save/load/update/delete surface over a backend bound at construction.
///
/// Every operation exists as an `async fn` and as a `*_with_callback` variant
/// that runs the same future on the current Tokio runtime and hands its result
/// to the callback exactly once. Cloning shares the bound backend.
#[derive(Clone)]
pub struct SecureStorage {
    backend: Arc<Backend>,
}

impl SecureStorage {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Storage over an unauthenticated medium.
    pub fn plain(medium: impl KeyValueMedium + 'static) -> Self {
        Self::new(Backend::Plain(PlainBackend::new(medium)))
    }

    /// Storage that requires a successful `authenticator` check per call.
    pub fn gated(
        items: impl SecureItemStore + 'static,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self::new(Backend::Gated(GatedBackend::new(items, authenticator)))
    }

    #[instrument(skip_all, fields(account = %account, backend = self.backend.label()))]
    pub async fn save(&self, account: &str, data: &[u8]) -> Result<(), SecureStoreError> {
        self.backend.save(account, data).await
    }

    #[instrument(skip_all, fields(account = %account, backend = self.backend.label()))]
    pub async fn load(&self, account: &str) -> Result<Option<Vec<u8>>, SecureStoreError> {
        self.backend.load(account).await
    }

    #[instrument(skip_all, fields(account = %account, backend = self.backend.label()))]
    pub async fn update(&self, account: &str, data: &[u8]) -> Result<(), SecureStoreError> {
        self.backend.update(account, data).await
    }

    #[instrument(skip_all, fields(account = %account, backend = self.backend.label()))]
    pub async fn delete(&self, account: &str) -> Result<(), SecureStoreError> {
        self.backend.delete(account).await
    }

    /// Callback form of [`save`](Self::save).
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn save_with_callback<F>(
        &self,
        account: impl Into<String>,
        data: impl Into<Vec<u8>>,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Result<(), SecureStoreError>) + Send + 'static,
    {
        let storage = self.clone();
        let (account, data) = (account.into(), data.into());
        complete(async move { storage.save(&account, &data).await }, callback)
    }

    /// Callback form of [`load`](Self::load).
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn load_with_callback<F>(&self, account: impl Into<String>, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<Option<Vec<u8>>, SecureStoreError>) + Send + 'static,
    {
        let storage = self.clone();
        let account = account.into();
        complete(async move { storage.load(&account).await }, callback)
    }

    /// Callback form of [`update`](Self::update).
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn update_with_callback<F>(
        &self,
        account: impl Into<String>,
        data: impl Into<Vec<u8>>,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Result<(), SecureStoreError>) + Send + 'static,
    {
        let storage = self.clone();
        let (account, data) = (account.into(), data.into());
        complete(async move { storage.update(&account, &data).await }, callback)
    }

    /// Callback form of [`delete`](Self::delete).
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn delete_with_callback<F>(&self, account: impl Into<String>, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<(), SecureStoreError>) + Send + 'static,
    {
        let storage = self.clone();
        let account = account.into();
        complete(async move { storage.delete(&account).await }, callback)
    }
}

fn complete<T, Fut, F>(operation: Fut, callback: F) -> JoinHandle<()>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T, SecureStoreError>> + Send + 'static,
    F: FnOnce(Result<T, SecureStoreError>) + Send + 'static,
{
    tokio::spawn(async move { callback(operation.await) })
}
