//! Deployer contract — one app's deployment as a unit of work.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use qtm_core::catalog::CatalogItem;
use qtm_core::suite::SuiteItem;

/// Status of one deployment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeployStatus {
    Pending,
    Success,
    Fail,
}

/// The outcome of deploying one app in one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub app_id: String,
    pub phase: i64,
    pub status: DeployStatus,
    pub error_msg: String,
}

impl DeploymentResult {
    pub fn success(app_id: &str, phase: i64) -> Self {
        Self {
            app_id: app_id.to_string(),
            phase,
            status: DeployStatus::Success,
            error_msg: String::new(),
        }
    }

    pub fn fail(app_id: &str, phase: i64, error_msg: impl Into<String>) -> Self {
        Self {
            app_id: app_id.to_string(),
            phase,
            status: DeployStatus::Fail,
            error_msg: error_msg.into(),
        }
    }

    pub fn cancelled(app_id: &str, phase: i64) -> Self {
        Self::fail(app_id, phase, "deployment cancelled")
    }
}

/// Performs one app's deployment.
///
/// The engine owns concurrency: implementations must be safe under N
/// concurrent calls for distinct apps, and must honour the
/// cancellation token by returning a cancelled `Fail` promptly,
/// without side effects.
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(
        &self,
        cancel: CancellationToken,
        item: &SuiteItem,
        catalog_item: &CatalogItem,
        phase: i64,
    ) -> DeploymentResult;
}

// ── Mock deployer ──────────────────────────────────────────────────

#[derive(Default)]
struct MockDeployerState {
    /// Scripted outcomes for `(app_id, phase)`.
    results: HashMap<(String, i64), DeploymentResult>,
    deployed: HashSet<String>,
    calls: Vec<(String, i64)>,
}

/// Reference deployer: scripted outcomes, optional artificial delay,
/// defaults to `Success`. Backs `--dry-run` and the engine tests.
pub struct MockDeployer {
    state: Mutex<MockDeployerState>,
    delay: Duration,
}

impl MockDeployer {
    pub fn new(delay: Duration) -> Self {
        Self {
            state: Mutex::new(MockDeployerState::default()),
            delay,
        }
    }

    /// Script the outcome for a specific `(app, phase)`.
    pub fn set_result(&self, app_id: &str, phase: i64, result: DeploymentResult) {
        let mut state = self.state.lock().unwrap();
        state.results.insert((app_id.to_string(), phase), result);
    }

    /// Whether a successful deploy was recorded for `app_id`.
    pub fn deployed(&self, app_id: &str) -> bool {
        self.state.lock().unwrap().deployed.contains(app_id)
    }

    /// Total deploy calls that got past the cancellation check.
    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    /// Whether a deploy call was made for `(app_id, phase)`.
    pub fn was_called(&self, app_id: &str, phase: i64) -> bool {
        self.state
            .lock()
            .unwrap()
            .calls
            .contains(&(app_id.to_string(), phase))
    }
}

#[async_trait]
impl Deployer for MockDeployer {
    async fn deploy(
        &self,
        cancel: CancellationToken,
        item: &SuiteItem,
        catalog_item: &CatalogItem,
        phase: i64,
    ) -> DeploymentResult {
        if cancel.is_cancelled() {
            return DeploymentResult::cancelled(&item.name, phase);
        }

        {
            let mut state = self.state.lock().unwrap();
            state.calls.push((item.name.clone(), phase));
            if let Some(result) = state.results.get(&(item.name.clone(), phase)) {
                return result.clone();
            }
        }

        info!(
            app = %item.name,
            group = %item.group,
            phase,
            version = %catalog_item.version,
            chart = %catalog_item.helm_chart,
            "mock deploy"
        );

        if !self.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = cancel.cancelled() => {
                    return DeploymentResult::cancelled(&item.name, phase);
                }
            }
        }

        self.state
            .lock()
            .unwrap()
            .deployed
            .insert(item.name.clone());
        DeploymentResult::success(&item.name, phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str) -> SuiteItem {
        SuiteItem {
            name: name.to_string(),
            group: "test".to_string(),
            rollout_phase: 1,
        }
    }

    fn chart(name: &str) -> CatalogItem {
        CatalogItem {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            helm_chart: format!("{name}-1.0.0.tgz"),
        }
    }

    #[tokio::test]
    async fn defaults_to_success() {
        let deployer = MockDeployer::new(Duration::ZERO);
        let result = deployer
            .deploy(CancellationToken::new(), &item("web"), &chart("web"), 1)
            .await;

        assert_eq!(result.status, DeployStatus::Success);
        assert!(deployer.deployed("web"));
    }

    #[tokio::test]
    async fn scripted_failure_wins() {
        let deployer = MockDeployer::new(Duration::ZERO);
        deployer.set_result("web", 2, DeploymentResult::fail("web", 2, "simulated failure"));

        let result = deployer
            .deploy(CancellationToken::new(), &item("web"), &chart("web"), 2)
            .await;
        assert_eq!(result.status, DeployStatus::Fail);
        assert_eq!(result.error_msg, "simulated failure");
        assert!(!deployer.deployed("web"));

        // Other phases are unaffected by the script.
        let result = deployer
            .deploy(CancellationToken::new(), &item("web"), &chart("web"), 1)
            .await;
        assert_eq!(result.status, DeployStatus::Success);
    }

    #[tokio::test]
    async fn pre_cancelled_token_fails_immediately() {
        let deployer = MockDeployer::new(Duration::from_secs(30));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = deployer
            .deploy(cancel, &item("web"), &chart("web"), 1)
            .await;
        assert_eq!(result.status, DeployStatus::Fail);
        assert_eq!(result.error_msg, "deployment cancelled");
        assert!(!deployer.deployed("web"));
    }

    #[tokio::test]
    async fn cancellation_interrupts_delay() {
        let deployer = MockDeployer::new(Duration::from_secs(30));
        let cancel = CancellationToken::new();

        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            })
        };

        let result = deployer
            .deploy(cancel, &item("web"), &chart("web"), 1)
            .await;
        assert_eq!(result.status, DeployStatus::Fail);
        assert_eq!(result.error_msg, "deployment cancelled");
        handle.await.unwrap();
    }
}
