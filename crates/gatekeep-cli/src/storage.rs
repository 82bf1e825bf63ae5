use std::{path::PathBuf, sync::Arc};

use color_eyre::Result;
use dirs::data_dir;
use gatekeep_core::{
    auth::{Authenticator, PolicyAuthenticator},
    SecureStorage,
};
use gatekeep_storage::{DefaultsFile, EncryptedFileItemStore, KeyringItemStore, KeyringProvider};
use tracing::debug;

use crate::{
    config::{BackendChoice, Config, GatedStore},
    presence::TerminalPresence,
};

/// Keyring account holding the encrypted item store's key.
const STORE_KEY_ACCOUNT: &str = "store-key";

/// Resolve the default data directory for gatekeep.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("gatekeep"))
}

fn resolve_data_dir(config: &Config) -> Result<PathBuf> {
    match &config.data_dir {
        Some(root) => Ok(root.clone()),
        None => default_data_dir(),
    }
}

/// Build the facade for `backend`, prompting on the terminal when gated.
pub fn storage_from_config(config: &Config, backend: BackendChoice) -> Result<SecureStorage> {
    let gated = config.gated.clone().unwrap_or_default();
    let authenticator: Arc<dyn Authenticator> = Arc::new(PolicyAuthenticator::with_reason(
        TerminalPresence,
        gated.reason(),
    ));
    build(config, backend, authenticator)
}

fn build(
    config: &Config,
    backend: BackendChoice,
    authenticator: Arc<dyn Authenticator>,
) -> Result<SecureStorage> {
    let gated = config.gated.clone().unwrap_or_default();
    let storage = match (backend, gated.store) {
        (BackendChoice::Plain, _) => {
            let root = resolve_data_dir(config)?;
            debug!(?root, "initializing plain storage");
            SecureStorage::plain(DefaultsFile::in_dir(root))
        }
        (BackendChoice::Gated, GatedStore::Keyring) => {
            debug!(service = gated.service(), "initializing keyring-backed gated storage");
            SecureStorage::gated(KeyringItemStore::new(gated.service()), authenticator)
        }
        (BackendChoice::Gated, GatedStore::File) => {
            let root = resolve_data_dir(config)?.join("items");
            debug!(?root, "initializing file-backed gated storage");
            SecureStorage::gated(
                EncryptedFileItemStore::new(
                    root,
                    KeyringProvider::new(gated.service(), STORE_KEY_ACCOUNT),
                ),
                authenticator,
            )
        }
    };
    Ok(storage)
}

/// Helper for tests: storage over a temp dir with the given authenticator.
#[cfg(test)]
pub fn test_storage(
    root: impl Into<PathBuf>,
    backend: BackendChoice,
    authenticator: Arc<dyn Authenticator>,
) -> SecureStorage {
    match backend {
        BackendChoice::Plain => SecureStorage::plain(DefaultsFile::in_dir(root.into())),
        BackendChoice::Gated => SecureStorage::gated(
            EncryptedFileItemStore::new(
                root.into(),
                gatekeep_storage::InMemoryKeyProvider::default(),
            ),
            authenticator,
        ),
    }
}
