//! Shared types for the duesync workspace.
//!
//! This crate carries everything the other layers agree on: the error
//! taxonomy, configuration structs, the upstream payload models, the
//! normalized row models, and the situation partition that drives refresh
//! decisions. It has no I/O.

pub mod config;
pub mod errors;
pub mod payload;
pub mod rows;
pub mod situation;
pub mod time;

pub use config::Config;
pub use errors::{DueSyncError, Result};
pub use rows::NormalizedDue;
pub use situation::{SituationClass, SituationPartition};
