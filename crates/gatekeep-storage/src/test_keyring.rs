//! Process-wide keyring credential store for tests.
//!
//! Every `keyring::Entry` built after [`install`] resolves to the same map, so
//! an entry written through one handle is visible through the next. Tests pick
//! a unique service name to stay isolated from each other.

use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, Once},
};

use keyring::credential::{
    Credential, CredentialApi, CredentialBuilderApi, CredentialPersistence,
};

type Vault = Arc<Mutex<HashMap<(String, String), Vec<u8>>>>;

fn lock(vault: &Vault) -> MutexGuard<'_, HashMap<(String, String), Vec<u8>>> {
    vault.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
struct SharedCredential {
    vault: Vault,
    id: (String, String),
}

impl CredentialApi for SharedCredential {
    fn set_secret(&self, secret: &[u8]) -> keyring::Result<()> {
        lock(&self.vault).insert(self.id.clone(), secret.to_vec());
        Ok(())
    }

    fn get_secret(&self) -> keyring::Result<Vec<u8>> {
        lock(&self.vault)
            .get(&self.id)
            .cloned()
            .ok_or(keyring::Error::NoEntry)
    }

    fn delete_credential(&self) -> keyring::Result<()> {
        lock(&self.vault)
            .remove(&self.id)
            .map(|_| ())
            .ok_or(keyring::Error::NoEntry)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Default)]
struct SharedCredentialBuilder {
    vault: Vault,
}

impl CredentialBuilderApi for SharedCredentialBuilder {
    fn build(
        &self,
        _target: Option<&str>,
        service: &str,
        user: &str,
    ) -> keyring::Result<Box<Credential>> {
        Ok(Box::new(SharedCredential {
            vault: self.vault.clone(),
            id: (service.to_string(), user.to_string()),
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn persistence(&self) -> CredentialPersistence {
        CredentialPersistence::ProcessOnly
    }
}

/// Route all keyring entries in this test process through the shared map.
pub fn install() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        keyring::set_default_credential_builder(Box::new(SharedCredentialBuilder::default()));
    });
}

/// Whether `service`/`user` currently holds a secret.
pub fn contains(service: &str, user: &str) -> bool {
    install();
    keyring::Entry::new(service, user)
        .and_then(|entry| entry.get_secret())
        .is_ok()
}
