//! Database module: models and schema for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `writes.rs`: insert/upsert payloads
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `actor.rs`: the single owner of the connection pool

pub mod actor;
pub mod models;
pub mod schema;
pub mod writes;

pub use models::{DbArtist, DbCredential, DbService, DbServiceOverride};
pub use schema::SQLITE_INIT;
pub use writes::{ArtistCreate, CredentialWrite, ServiceCreate, ServiceOverrideCreate};

pub use actor::{DbActorHandle, spawn};
