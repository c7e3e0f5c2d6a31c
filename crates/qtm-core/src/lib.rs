//! qtm-core — domain model and collaborator contracts for qtm.
//!
//! Defines the suite/catalog data model, the source traits the
//! lifecycle engine consumes, the session-log contract, and the
//! file-backed and in-memory implementations that need no store.
//!
//! # Components
//!
//! - **`suite`** — SuiteItem/Suite, phase organization, suite sources
//! - **`catalog`** — CatalogItem and catalog sources
//! - **`session`** — session-log contract and in-memory manager
//! - **`config`** — operator config file (`qtm.yaml`)

pub mod catalog;
pub mod config;
pub mod session;
pub mod suite;

pub use catalog::{CatalogError, CatalogItem, CatalogSource};
pub use config::QtmConfig;
pub use session::{
    AppData, ConfigChange, MemorySessionManager, SessionData, SessionError, SessionManager,
    SessionOptions,
};
pub use suite::{organize_by_phase, PhaseMap, Suite, SuiteError, SuiteItem, SuiteSource};
