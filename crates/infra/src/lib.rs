//! Infrastructure implementations: the authenticated rate-gated HTTP
//! client for the Siscomex DUE API, the SQLite store, and the environment
//! configuration loader.

pub mod auth;
pub mod config;
pub mod database;
mod errors;
pub mod siscomex;

pub use auth::TokenAuthority;
pub use database::{DbManager, SqliteDueStore, SqliteLinkCache};
pub use siscomex::SiscomexClient;
