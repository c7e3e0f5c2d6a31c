//! qtm-store — embedded persistent store for qtm.
//!
//! A transactional key-value layer over [redb](https://docs.rs/redb)
//! holding the session log plus suite and catalog data. The same
//! cheaply-clonable `Store` handle feeds the persistent session
//! manager and the store-backed suite/catalog sources, so one file
//! serves a whole rollout.
//!
//! Writing a session header and its list entry happens in a single
//! transaction; see `store` for the layout guarantees.

pub mod error;
pub mod sources;
pub mod store;
pub mod tables;

pub use error::{StoreError, StoreResult};
pub use sources::{StoreCatalogSource, StoreSuiteSource};
pub use store::{Store, StoreSessionManager};
