//! `qtm rollback` — reverse a recorded session, highest phase first.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use qtm_core::session::{SessionManager, SessionOptions};
use qtm_core::QtmConfig;
use qtm_lifecycle::{phase_infos_from_suite, rollback_all_phases, MockRollbacker, Rollbacker};
use qtm_store::StoreSessionManager;

use crate::commands::{self, RollbackArgs};
use crate::prompt;

pub async fn run(cancel: CancellationToken, args: RollbackArgs) -> anyhow::Result<bool> {
    let config = QtmConfig::default();

    info!(
        suite = %args.suite,
        namespace = %args.common.namespace,
        endpoint = %args.common.resolved_endpoint(&config),
        stop_at = args.stop_at,
        "rollback starting"
    );

    if !(args.common.dry_run || args.common.mock) {
        anyhow::bail!("no production rollbacker is wired up yet; run with --dry-run");
    }

    let store = commands::open_store(&args.common, &config)?;
    let sessions: Arc<dyn SessionManager> = Arc::new(StoreSessionManager::new(
        store.clone(),
        &commands::username(&config),
    ));

    let session_opts = SessionOptions {
        session: args.common.session.clone(),
        new_session: false,
    };
    let session_id = prompt::create_or_fetch_session(sessions.as_ref(), &session_opts)?;
    sessions.set_session_id(&session_id);
    info!(session = %session_id, "session selected");

    let suite_source = commands::suite_source(&args.common, Some(&store), &args.suite)?;
    let suite = suite_source
        .fetch_suite()
        .await
        .context("failed to fetch suite")?;

    // No recorded run to consult: treat every suite item as deployed.
    let mut phase_infos = phase_infos_from_suite(&suite);
    if let Some(stop_at) = args.stop_at {
        phase_infos.retain(|&phase, _| phase >= stop_at);
        info!(stop_at, phases = phase_infos.len(), "phases filtered");
    }
    let Some(&up_to_phase) = phase_infos.keys().next_back() else {
        println!("Nothing to roll back");
        return Ok(true);
    };

    let rollbacker: Arc<dyn Rollbacker> = Arc::new(MockRollbacker::new(Duration::ZERO));

    rollback_all_phases(
        cancel.clone(),
        rollbacker,
        Arc::clone(&sessions),
        &phase_infos,
        up_to_phase,
    )
    .await;

    if cancel.is_cancelled() {
        println!("Rollback cancelled");
        return Ok(false);
    }

    // Keep the session while it still records apps: those are failed
    // rollbacks a later run can retry.
    if sessions.is_empty().context("failed to inspect session")? {
        sessions
            .remove_session()
            .context("failed to remove session")?;
        info!(session = %session_id, "session removed");
    } else {
        warn!(session = %session_id, "session retains apps after rollback; keeping it");
    }

    println!("Rollback completed");
    Ok(true)
}
