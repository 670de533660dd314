//! Core services: ports, the payload normalizer and the two
//! synchronization pipelines.
//!
//! Everything here is expressed against traits; the infra crate provides
//! the HTTP and SQLite implementations. Nothing in this crate performs I/O
//! of its own.

pub mod normalize;
pub mod ports;
pub mod sync;

pub use normalize::{normalize, normalize_bonded_acts};
pub use ports::{
    DueStore, LinkCache, RefreshRow, RevisionProbe, SiscomexGateway, StoreCounts, StoredRevision,
};
pub use sync::{
    DiscoveryConfig, DiscoveryPipeline, RefreshConfig, RefreshPipeline, RunError, RunReport,
};
