//! Secure storage: the facade, its Plain and Gated backends, the media
//! boundaries they drive, and in-memory doubles for each boundary.

mod backend;
mod error;
mod facade;
pub mod medium;
pub mod memory;

pub use backend::{Backend, GatedBackend, PlainBackend};
pub use error::SecureStoreError;
pub use facade::SecureStorage;
pub use medium::{
    AccessPolicy, Accessibility, ItemAttributes, ItemError, KeyValueMedium, SecureItemStore,
};
pub use memory::{InMemoryItemStore, InMemoryMedium, ItemOp};
