//! qtm-lifecycle — the phased rollout engine.
//!
//! Deploys every app of phase `k` concurrently, waits for the phase
//! barrier, consults a decision policy, and either proceeds to phase
//! `k+1`, stops, or drives a rollback sweep in descending phase
//! order. Cancellation is observed at unit entry and after each
//! barrier; rollback after a cancellation runs under a fresh token so
//! it survives the operator's abort signal.
//!
//! # Components
//!
//! - **`engine`** — `deploy_all_phases`, `rollback_phase`,
//!   `rollback_all_phases`, `PhaseInfo`
//! - **`policy`** — decision policies consulted between phases
//! - **`deploy`** — the `Deployer` contract and reference mock
//! - **`rollback`** — the `Rollbacker` contract and reference mock

pub mod deploy;
pub mod engine;
pub mod policy;
pub mod rollback;

pub use deploy::{DeployStatus, Deployer, DeploymentResult, MockDeployer};
pub use engine::{
    deploy_all_phases, phase_infos_from_suite, rollback_all_phases, rollback_phase, PhaseInfo,
};
pub use policy::{default_policy, non_critical_policy, threshold_policy};
pub use rollback::{MockRollbacker, RollbackResult, RollbackStatus, Rollbacker};
