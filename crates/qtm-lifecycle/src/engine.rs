//! The phase scheduler.
//!
//! `deploy_all_phases` walks phases in ascending order. Each phase
//! fans out one task per app over a bounded result channel, waits for
//! every task at the phase barrier, then consults the decision
//! policy. A phase that fails under a stopping policy triggers either
//! a rollback of that phase alone or an unwind of every recorded
//! phase in descending order.
//!
//! Cancellation is observed at unit entry and again after each
//! barrier. Rollback after an observed cancellation runs under a
//! fresh token — it must survive the operator's abort signal to leave
//! the cluster clean.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use qtm_core::catalog::CatalogSource;
use qtm_core::session::SessionManager;
use qtm_core::suite::{PhaseMap, Suite, SuiteItem};

use crate::deploy::{DeployStatus, Deployer, DeploymentResult};
use crate::rollback::{RollbackStatus, Rollbacker};

/// What one phase produced: the apps whose deploy succeeded before
/// the barrier closed, and whether the phase as a whole succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseInfo {
    pub successful_apps: Vec<String>,
    pub is_successful: bool,
}

impl Default for PhaseInfo {
    fn default() -> Self {
        Self {
            successful_apps: Vec::new(),
            is_successful: true,
        }
    }
}

/// One deployment unit: catalog lookup, deploy call, session record.
///
/// Cancellation observed before starting emits nothing; the barrier
/// still closes because the task itself finishes.
async fn deploy_app(
    cancel: CancellationToken,
    deployer: Arc<dyn Deployer>,
    catalog: Arc<dyn CatalogSource>,
    sessions: Arc<dyn SessionManager>,
    item: SuiteItem,
    phase: i64,
    results: mpsc::Sender<DeploymentResult>,
) {
    if cancel.is_cancelled() {
        return;
    }

    let catalog_item = match catalog.fetch(&item.name, &item.group).await {
        Ok(catalog_item) => catalog_item,
        Err(e) => {
            warn!(app = %item.name, group = %item.group, phase, error = %e, "catalog lookup failed");
            let _ = results
                .send(DeploymentResult::fail(&item.name, phase, e.to_string()))
                .await;
            return;
        }
    };

    let result = deployer.deploy(cancel, &item, &catalog_item, phase).await;

    if result.status == DeployStatus::Success {
        // The deployment itself succeeded; a session write failure
        // must not downgrade the result.
        if let Err(e) = sessions.add_app(&item, &catalog_item.version) {
            warn!(app = %item.name, phase, error = %e, "failed to record app in session");
        }
    }

    let _ = results.send(result).await;
}

/// Deploy every phase of `phase_map` in ascending order.
///
/// Returns `true` iff every attempted phase completed successfully,
/// the policy never stopped the rollout, and no cancellation was
/// observed. `rollback_everything` selects the unwind scope when the
/// policy halts a failed phase; `rollbacker` may be `None` if the
/// caller never wants rollback.
#[allow(clippy::too_many_arguments)]
pub async fn deploy_all_phases(
    cancel: CancellationToken,
    deployer: Arc<dyn Deployer>,
    rollbacker: Option<Arc<dyn Rollbacker>>,
    catalog: Arc<dyn CatalogSource>,
    sessions: Arc<dyn SessionManager>,
    phase_map: &PhaseMap,
    policy: impl Fn(i64, bool) -> bool,
    rollback_everything: bool,
) -> bool {
    info!(
        phases = phase_map.len(),
        rollback_everything, "starting deployment"
    );

    let mut phase_infos: BTreeMap<i64, PhaseInfo> = BTreeMap::new();

    for (&phase, apps) in phase_map {
        info!(phase, apps = apps.len(), "starting phase");

        // Capacity matches the phase size so unit sends never block.
        let (tx, mut rx) = mpsc::channel::<DeploymentResult>(apps.len().max(1));
        let mut units = Vec::with_capacity(apps.len());
        for item in apps {
            info!(app = %item.name, group = %item.group, phase, "deploying app");
            units.push(tokio::spawn(deploy_app(
                cancel.clone(),
                Arc::clone(&deployer),
                Arc::clone(&catalog),
                Arc::clone(&sessions),
                item.clone(),
                phase,
                tx.clone(),
            )));
        }
        drop(tx);

        // Phase barrier: every unit has terminated past this point.
        for unit in units {
            let _ = unit.await;
        }

        let mut info = PhaseInfo::default();
        while let Some(result) = rx.recv().await {
            match result.status {
                DeployStatus::Fail => {
                    warn!(
                        app = %result.app_id,
                        phase,
                        error = %result.error_msg,
                        "app failed to deploy"
                    );
                    info.is_successful = false;
                }
                _ => info.successful_apps.push(result.app_id),
            }
        }

        if cancel.is_cancelled() {
            warn!(phase, "deployment cancelled, rolling back current phase");
            if let Some(rollbacker) = &rollbacker {
                // Fresh token: the rollback must outlive the abort.
                rollback_phase(
                    CancellationToken::new(),
                    Arc::clone(rollbacker),
                    Arc::clone(&sessions),
                    phase,
                    &info.successful_apps,
                )
                .await;
            }
            return false;
        }

        let phase_success = info.is_successful;
        phase_infos.insert(phase, info);

        if !policy(phase, phase_success) {
            if !phase_success {
                match &rollbacker {
                    Some(rollbacker) if rollback_everything => {
                        rollback_all_phases(
                            cancel.clone(),
                            Arc::clone(rollbacker),
                            Arc::clone(&sessions),
                            &phase_infos,
                            phase,
                        )
                        .await;
                    }
                    Some(rollbacker) => {
                        rollback_phase(
                            cancel.clone(),
                            Arc::clone(rollbacker),
                            Arc::clone(&sessions),
                            phase,
                            &phase_infos[&phase].successful_apps,
                        )
                        .await;
                    }
                    None => warn!(phase, "phase failed and no rollbacker configured"),
                }
            }
            return false;
        }

        info!(phase, phase_success, "phase completed");
    }

    info!("deployment completed successfully");
    true
}

/// Roll back a set of apps deployed in one phase, concurrently, and
/// wait for all of them.
///
/// A successful rollback removes the app from the session log; a
/// failed one leaves the entry in place so a later run can retry.
pub async fn rollback_phase(
    cancel: CancellationToken,
    rollbacker: Arc<dyn Rollbacker>,
    sessions: Arc<dyn SessionManager>,
    phase: i64,
    apps: &[String],
) {
    if apps.is_empty() {
        return;
    }
    info!(phase, apps = apps.len(), "rolling back phase");

    let mut units = Vec::with_capacity(apps.len());
    for app in apps {
        let cancel = cancel.clone();
        let rollbacker = Arc::clone(&rollbacker);
        let sessions = Arc::clone(&sessions);
        let app = app.clone();
        units.push(tokio::spawn(async move {
            let result = rollbacker.rollback(cancel, &app, phase).await;
            match result.status {
                RollbackStatus::Success => {
                    if let Err(e) = sessions.remove_app(&app) {
                        warn!(app = %app, phase, error = %e, "failed to remove app from session");
                    }
                }
                RollbackStatus::Fail => {
                    error!(app = %app, phase, error = %result.error_msg, "rollback failed");
                }
            }
        }));
    }
    for unit in units {
        let _ = unit.await;
    }
}

/// Roll back every recorded phase up to and including `up_to_phase`,
/// in descending phase order, with a barrier between phases.
///
/// Phases with no recorded `PhaseInfo` are skipped.
pub async fn rollback_all_phases(
    cancel: CancellationToken,
    rollbacker: Arc<dyn Rollbacker>,
    sessions: Arc<dyn SessionManager>,
    phase_infos: &BTreeMap<i64, PhaseInfo>,
    up_to_phase: i64,
) {
    for (&phase, info) in phase_infos.range(..=up_to_phase).rev() {
        rollback_phase(
            cancel.clone(),
            Arc::clone(&rollbacker),
            Arc::clone(&sessions),
            phase,
            &info.successful_apps,
        )
        .await;
    }
}

/// Treat every suite item as successfully deployed in its phase.
///
/// The standalone rollback command has no recorded run to consult, so
/// it reconstructs phase infos from the suite itself.
pub fn phase_infos_from_suite(suite: &Suite) -> BTreeMap<i64, PhaseInfo> {
    let mut infos: BTreeMap<i64, PhaseInfo> = BTreeMap::new();
    for item in &suite.items {
        infos
            .entry(item.rollout_phase)
            .or_default()
            .successful_apps
            .push(item.name.clone());
    }
    infos
}
