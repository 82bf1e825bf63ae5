//! Core of gatekeep: an authentication-gated secure storage facade.
//! Platform services (keychains, prompts) live behind the traits defined here.

pub mod auth;
pub mod storage;

pub use auth::{Authenticator, DenialReason, Grant, Outcome};
pub use storage::{SecureStorage, SecureStoreError};
