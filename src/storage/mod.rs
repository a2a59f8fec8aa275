//! Persistence for the content pools, the delivery ledger and channel credentials
//!
//! SQLite is the production store; the in-memory store backs tests. Both sit
//! behind the repository traits in [`repository`].

pub mod repository;
pub mod seed;

pub use repository::{
    IntegrationRepository, LedgerRepository, MemoryStore, PoolRepository, Repositories,
    SharedIntegrationRepository, SharedLedgerRepository, SharedPoolRepository, SqliteStore,
};
pub use seed::{import_seed, import_seed_file, ImportReport, SeedFile};
