//! Per-artist OAuth credential persistence.

mod store;

pub use store::{CredentialStore, TokenGrant};
