//! Concrete media for gatekeep: an OS keyring item store, an AES-GCM
//! encrypted file item store (keys from the OS keyring or test doubles), and
//! a plain defaults file for the unauthenticated backend.

pub mod defaults_file;
pub mod encrypted_items;
pub mod key_provider;
pub mod keyring_items;

#[cfg(test)]
mod test_keyring;

pub use defaults_file::DefaultsFile;
pub use encrypted_items::EncryptedFileItemStore;
pub use key_provider::{InMemoryKeyProvider, KeyProvider, KeyringProvider};
pub use keyring_items::KeyringItemStore;
