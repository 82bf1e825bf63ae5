use std::sync::Arc;

use tracing::{debug, warn};

use super::{
    error::validate,
    medium::{AccessPolicy, ItemAttributes, ItemError, KeyValueMedium, SecureItemStore},
    SecureStoreError,
};
use crate::auth::{Authenticator, Grant, Outcome};

/// Backend variant, chosen once when the facade is built.
pub enum Backend {
    Plain(PlainBackend),
    Gated(GatedBackend),
}

impl Backend {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::Plain(_) => "plain",
            Self::Gated(_) => "gated",
        }
    }

    pub async fn save(&self, account: &str, blob: &[u8]) -> Result<(), SecureStoreError> {
        match self {
            Self::Plain(backend) => backend.save(account, blob).await,
            Self::Gated(backend) => backend.save(account, blob).await,
        }
    }

    pub async fn load(&self, account: &str) -> Result<Option<Vec<u8>>, SecureStoreError> {
        match self {
            Self::Plain(backend) => backend.load(account).await,
            Self::Gated(backend) => backend.load(account).await,
        }
    }

    pub async fn update(&self, account: &str, blob: &[u8]) -> Result<(), SecureStoreError> {
        match self {
            Self::Plain(backend) => backend.update(account, blob).await,
            Self::Gated(backend) => backend.update(account, blob).await,
        }
    }

    pub async fn delete(&self, account: &str) -> Result<(), SecureStoreError> {
        match self {
            Self::Plain(backend) => backend.delete(account).await,
            Self::Gated(backend) => backend.delete(account).await,
        }
    }
}

/// Unauthenticated backend over a `KeyValueMedium`.
pub struct PlainBackend {
    medium: Arc<dyn KeyValueMedium>,
}

impl PlainBackend {
    pub fn new(medium: impl KeyValueMedium + 'static) -> Self {
        Self {
            medium: Arc::new(medium),
        }
    }

    pub async fn save(&self, account: &str, blob: &[u8]) -> Result<(), SecureStoreError> {
        validate(account, Some(blob), self.medium.max_blob_len())?;
        self.medium
            .set(account, blob)
            .await
            .map_err(|err| medium_failure("set", err))
    }

    pub async fn load(&self, account: &str) -> Result<Option<Vec<u8>>, SecureStoreError> {
        validate(account, None, None)?;
        match self.medium.get(account).await {
            Ok(value) => Ok(value),
            Err(ItemError::NotFound) => Ok(None),
            Err(err) => Err(medium_failure("get", err)),
        }
    }

    /// Same as `save`: a plain medium has no access control to re-apply.
    pub async fn update(&self, account: &str, blob: &[u8]) -> Result<(), SecureStoreError> {
        self.save(account, blob).await
    }

    pub async fn delete(&self, account: &str) -> Result<(), SecureStoreError> {
        validate(account, None, None)?;
        match self.medium.remove(account).await {
            Ok(()) | Err(ItemError::NotFound) => Ok(()),
            Err(err) => Err(medium_failure("remove", err)),
        }
    }
}

/// Backend that runs a fresh user-presence check before every operation and
/// tags every write with its access policy.
pub struct GatedBackend {
    items: Arc<dyn SecureItemStore>,
    authenticator: Arc<dyn Authenticator>,
    attributes: ItemAttributes,
}

impl GatedBackend {
    pub fn new(
        items: impl SecureItemStore + 'static,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self::with_policy(items, authenticator, AccessPolicy::default())
    }

    pub fn with_policy(
        items: impl SecureItemStore + 'static,
        authenticator: Arc<dyn Authenticator>,
        policy: AccessPolicy,
    ) -> Self {
        Self {
            items: Arc::new(items),
            authenticator,
            attributes: policy.attributes(),
        }
    }

    pub async fn save(&self, account: &str, blob: &[u8]) -> Result<(), SecureStoreError> {
        validate(account, Some(blob), self.items.max_blob_len())?;
        let grant = self.authorize("save").await?;
        self.commit(grant, account, blob).await
    }

    pub async fn load(&self, account: &str) -> Result<Option<Vec<u8>>, SecureStoreError> {
        validate(account, None, None)?;
        let grant = self.authorize("load").await?;
        match self.items.read(&grant, account).await {
            Ok(value) => Ok(value),
            Err(ItemError::NotFound) => Ok(None),
            Err(err) => Err(medium_failure("read", err)),
        }
    }

    /// In-place update; a missing item is written fresh under the same grant.
    pub async fn update(&self, account: &str, blob: &[u8]) -> Result<(), SecureStoreError> {
        validate(account, Some(blob), self.items.max_blob_len())?;
        let grant = self.authorize("update").await?;
        match self
            .items
            .update_attributes(&grant, account, blob, &self.attributes)
            .await
        {
            Ok(()) => Ok(()),
            Err(ItemError::NotFound) => {
                debug!(account, "no existing item, saving instead");
                self.commit(grant, account, blob).await
            }
            Err(err) => Err(medium_failure("update_attributes", err)),
        }
    }

    pub async fn delete(&self, account: &str) -> Result<(), SecureStoreError> {
        validate(account, None, None)?;
        let grant = self.authorize("delete").await?;
        match self.items.erase(&grant, account).await {
            Ok(()) | Err(ItemError::NotFound) => Ok(()),
            Err(err) => Err(medium_failure("erase", err)),
        }
    }

    async fn authorize(&self, operation: &'static str) -> Result<Grant, SecureStoreError> {
        match self.authenticator.authenticate().await {
            Outcome::Granted => Ok(Grant::mint()),
            Outcome::Denied(reason) => {
                warn!(operation, %reason, "user-presence check denied");
                Err(SecureStoreError::AuthenticationFailed { reason })
            }
        }
    }

    // Erase first: item stores reject writes over an existing key.
    async fn commit(&self, grant: Grant, account: &str, blob: &[u8]) -> Result<(), SecureStoreError> {
        match self.items.erase(&grant, account).await {
            Ok(()) | Err(ItemError::NotFound) => {}
            Err(err) => return Err(medium_failure("erase", err)),
        }
        self.items
            .write(&grant, account, blob, &self.attributes)
            .await
            .map_err(|err| medium_failure("write", err))
    }
}

fn medium_failure(call: &'static str, err: ItemError) -> SecureStoreError {
    let err = SecureStoreError::from(err);
    warn!(call, code = err.code().unwrap_or_default(), "backend call failed");
    err
}
