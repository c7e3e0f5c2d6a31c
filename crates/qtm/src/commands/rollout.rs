//! `qtm rollout` — deploy a suite phase by phase.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use qtm_core::session::{MemorySessionManager, SessionManager, SessionOptions};
use qtm_core::suite::organize_by_phase;
use qtm_core::QtmConfig;
use qtm_lifecycle::{
    default_policy, deploy_all_phases, Deployer, MockDeployer, MockRollbacker, Rollbacker,
};
use qtm_store::StoreSessionManager;

use crate::commands::{self, RolloutArgs};
use crate::prompt;

pub async fn run(cancel: CancellationToken, args: RolloutArgs) -> anyhow::Result<bool> {
    let config = match &args.config {
        Some(path) => QtmConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => QtmConfig::default(),
    };

    info!(
        suite = %args.suite,
        namespace = %args.common.namespace,
        endpoint = %args.common.resolved_endpoint(&config),
        dry_run = args.common.dry_run,
        mock = args.common.mock,
        atomic = args.atomic,
        nuclear = args.nuclear,
        "rollout starting"
    );

    if !(args.common.dry_run || args.common.mock) {
        anyhow::bail!("no production deployer is wired up yet; run with --dry-run");
    }

    // The store backs the session log (unless --local) and any source
    // not served from a file or the mock fixture.
    let use_store_suite = !args.common.mock && args.common.suite_file.is_none();
    let use_store_catalog = !args.common.mock && args.catalog_file.is_none();
    let store = if !args.local || use_store_suite || use_store_catalog {
        Some(commands::open_store(&args.common, &config)?)
    } else {
        None
    };

    let username = commands::username(&config);
    let sessions: Arc<dyn SessionManager> = if args.local {
        Arc::new(MemorySessionManager::new(&username))
    } else {
        let store = store.clone().context("session log needs the store")?;
        Arc::new(StoreSessionManager::new(store, &username))
    };

    let session_opts = SessionOptions {
        session: args.common.session.clone(),
        new_session: args.new_session,
    };
    let session_id = prompt::create_or_fetch_session(sessions.as_ref(), &session_opts)?;
    sessions.set_session_id(&session_id);
    sessions
        .register_new_session(&session_id)
        .context("failed to register session")?;
    info!(session = %session_id, "session ready");

    let suite_source = commands::suite_source(&args.common, store.as_ref(), &args.suite)?;
    let catalog = commands::catalog_source(
        args.common.mock,
        args.catalog_file.as_ref(),
        store.as_ref(),
    )?;

    let suite = suite_source
        .fetch_suite()
        .await
        .context("failed to fetch suite")?;
    debug!(items = suite.items.len(), "suite fetched");

    let mut phase_map = organize_by_phase(&suite);
    if let Some(start_at) = args.start_at {
        phase_map.retain(|&phase, _| phase >= start_at);
        info!(start_at, phases = phase_map.len(), "phases filtered");
    }

    let deployer: Arc<dyn Deployer> = Arc::new(MockDeployer::new(Duration::ZERO));
    let rollbacker: Option<Arc<dyn Rollbacker>> = (args.atomic || args.nuclear)
        .then(|| Arc::new(MockRollbacker::new(Duration::ZERO)) as Arc<dyn Rollbacker>);

    let success = deploy_all_phases(
        cancel,
        deployer,
        rollbacker,
        catalog,
        sessions,
        &phase_map,
        default_policy,
        args.nuclear,
    )
    .await;

    if success {
        println!("Deployment completed successfully");
    } else {
        println!("Deployment failed or was cancelled");
    }
    Ok(success)
}
