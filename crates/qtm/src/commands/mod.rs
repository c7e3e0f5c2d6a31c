//! Subcommand implementations and the flag surface they share.

pub mod rollback;
pub mod rollout;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;

use qtm_core::catalog::{CatalogSource, FileCatalogSource, MockCatalogSource};
use qtm_core::suite::{FileSuiteSource, MockSuiteSource, SuiteSource};
use qtm_core::QtmConfig;
use qtm_store::{Store, StoreCatalogSource, StoreSuiteSource};

/// Flags shared by `rollout` and `rollback`.
#[derive(Debug, Args)]
pub struct CommonOpts {
    /// Namespace to perform the operations in
    #[arg(long, default_value = "")]
    pub namespace: String,

    /// Perform a mock deployment without any real changes
    #[arg(long)]
    pub dry_run: bool,

    /// Use mock suite and catalog data for testing
    #[arg(long)]
    pub mock: bool,

    /// Remote store endpoint (reserved for the networked backend)
    #[arg(long, env = "QTM_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Read the suite from a local YAML file instead of the store
    #[arg(long)]
    pub suite_file: Option<PathBuf>,

    /// Session ID to use instead of prompting
    #[arg(long, default_value = "")]
    pub session: String,

    /// Path of the embedded store file (default: qtm.redb)
    #[arg(long)]
    pub store_path: Option<PathBuf>,
}

impl CommonOpts {
    /// Flag wins, then config, then the built-in default.
    pub(crate) fn resolved_endpoint(&self, config: &QtmConfig) -> String {
        self.endpoint
            .clone()
            .or_else(|| config.endpoint.clone())
            .unwrap_or_else(|| "localhost:2379".to_string())
    }
}

#[derive(Debug, Args)]
pub struct RolloutArgs {
    /// Suite to roll out
    pub suite: String,

    #[command(flatten)]
    pub common: CommonOpts,

    /// Phase to start at; earlier phases are skipped
    #[arg(long)]
    pub start_at: Option<i64>,

    /// Roll back only the current phase if it fails
    #[arg(long)]
    pub atomic: bool,

    /// Roll back every completed phase if one app fails
    #[arg(long)]
    pub nuclear: bool,

    /// Force a new session instead of prompting
    #[arg(long = "new")]
    pub new_session: bool,

    /// Read the catalog from a local YAML file instead of the store
    #[arg(long)]
    pub catalog_file: Option<PathBuf>,

    /// Keep the session log in memory only (nothing persisted)
    #[arg(long)]
    pub local: bool,

    /// YAML config file supplying defaults
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RollbackArgs {
    /// Suite to roll back
    pub suite: String,

    #[command(flatten)]
    pub common: CommonOpts,

    /// Phase for the rollback to stop at; earlier phases stay deployed
    #[arg(long)]
    pub stop_at: Option<i64>,
}

/// The operator identity recorded in session headers.
pub(crate) fn username(config: &QtmConfig) -> String {
    config
        .username
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "user".to_string())
}

pub(crate) fn open_store(common: &CommonOpts, config: &QtmConfig) -> anyhow::Result<Store> {
    let path = common
        .store_path
        .clone()
        .or_else(|| config.store_path.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("qtm.redb"));
    Store::open(&path).with_context(|| format!("failed to open store at {}", path.display()))
}

/// Pick the suite source: mock fixture, local file, or the store.
pub(crate) fn suite_source(
    common: &CommonOpts,
    store: Option<&Store>,
    suite: &str,
) -> anyhow::Result<Arc<dyn SuiteSource>> {
    if common.mock {
        return Ok(Arc::new(MockSuiteSource::new()));
    }
    if let Some(path) = &common.suite_file {
        let source = FileSuiteSource::new(path, suite)
            .with_context(|| format!("failed to load suite file {}", path.display()))?;
        return Ok(Arc::new(source));
    }
    let store = store
        .cloned()
        .context("suite lookup needs the store, but none was opened")?;
    Ok(Arc::new(StoreSuiteSource::new(store, suite)))
}

/// Pick the catalog source: mock fixture, local file, or the store.
pub(crate) fn catalog_source(
    mock: bool,
    catalog_file: Option<&PathBuf>,
    store: Option<&Store>,
) -> anyhow::Result<Arc<dyn CatalogSource>> {
    if mock {
        return Ok(Arc::new(MockCatalogSource::new()));
    }
    if let Some(path) = catalog_file {
        let source = FileCatalogSource::new(path)
            .with_context(|| format!("failed to load catalog file {}", path.display()))?;
        return Ok(Arc::new(source));
    }
    let store = store
        .cloned()
        .context("catalog lookup needs the store, but none was opened")?;
    Ok(Arc::new(StoreCatalogSource::new(store)))
}
