//! Rollbacker contract — reversing one app's deployment.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Status of one rollback attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollbackStatus {
    Success,
    Fail,
}

/// The outcome of rolling back one app in one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackResult {
    pub app_id: String,
    pub phase: i64,
    pub status: RollbackStatus,
    pub error_msg: String,
}

impl RollbackResult {
    pub fn success(app_id: &str, phase: i64) -> Self {
        Self {
            app_id: app_id.to_string(),
            phase,
            status: RollbackStatus::Success,
            error_msg: String::new(),
        }
    }

    pub fn fail(app_id: &str, phase: i64, error_msg: impl Into<String>) -> Self {
        Self {
            app_id: app_id.to_string(),
            phase,
            status: RollbackStatus::Fail,
            error_msg: error_msg.into(),
        }
    }
}

/// Reverses one app's deployment.
///
/// Must be idempotent — a second rollback of an already-reversed
/// `(app, phase)` succeeds — and must honour cancellation.
#[async_trait]
pub trait Rollbacker: Send + Sync {
    async fn rollback(
        &self,
        cancel: CancellationToken,
        app_id: &str,
        phase: i64,
    ) -> RollbackResult;

    /// Whether `(app_id, phase)` has been rolled back. Used by tests.
    fn is_rolled_back(&self, app_id: &str, phase: i64) -> bool;
}

// ── Mock rollbacker ────────────────────────────────────────────────

#[derive(Default)]
struct MockRollbackerState {
    rolled_back: HashSet<(String, i64)>,
    /// Completion order, for ordering assertions.
    log: Vec<(String, i64)>,
}

/// Reference rollbacker: records what it reversed, optional delay,
/// always succeeds. Backs `--dry-run` and the engine tests.
pub struct MockRollbacker {
    state: Mutex<MockRollbackerState>,
    delay: Duration,
}

impl MockRollbacker {
    pub fn new(delay: Duration) -> Self {
        Self {
            state: Mutex::new(MockRollbackerState::default()),
            delay,
        }
    }

    /// App IDs rolled back in any phase, sorted, for assertions.
    pub fn rolled_back_apps(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut apps: Vec<String> = state.log.iter().map(|(app, _)| app.clone()).collect();
        apps.sort();
        apps.dedup();
        apps
    }

    /// Rollbacks in completion order.
    pub fn log(&self) -> Vec<(String, i64)> {
        self.state.lock().unwrap().log.clone()
    }
}

#[async_trait]
impl Rollbacker for MockRollbacker {
    async fn rollback(
        &self,
        cancel: CancellationToken,
        app_id: &str,
        phase: i64,
    ) -> RollbackResult {
        if cancel.is_cancelled() {
            return RollbackResult::fail(app_id, phase, "rollback cancelled");
        }

        if !self.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = cancel.cancelled() => {
                    return RollbackResult::fail(app_id, phase, "rollback cancelled");
                }
            }
        }

        info!(app = app_id, phase, "mock rollback");
        let mut state = self.state.lock().unwrap();
        if state.rolled_back.insert((app_id.to_string(), phase)) {
            state.log.push((app_id.to_string(), phase));
        }
        RollbackResult::success(app_id, phase)
    }

    fn is_rolled_back(&self, app_id: &str, phase: i64) -> bool {
        self.state
            .lock()
            .unwrap()
            .rolled_back
            .contains(&(app_id.to_string(), phase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_rollback_per_phase() {
        let rollbacker = MockRollbacker::new(Duration::ZERO);
        let cancel = CancellationToken::new();

        let result = rollbacker.rollback(cancel, "web", 2).await;
        assert_eq!(result.status, RollbackStatus::Success);

        assert!(rollbacker.is_rolled_back("web", 2));
        assert!(!rollbacker.is_rolled_back("web", 1));
        assert!(!rollbacker.is_rolled_back("api", 2));
    }

    #[tokio::test]
    async fn rollback_is_idempotent() {
        let rollbacker = MockRollbacker::new(Duration::ZERO);

        let first = rollbacker
            .rollback(CancellationToken::new(), "web", 1)
            .await;
        let second = rollbacker
            .rollback(CancellationToken::new(), "web", 1)
            .await;

        assert_eq!(first.status, RollbackStatus::Success);
        assert_eq!(second.status, RollbackStatus::Success);
        assert_eq!(rollbacker.rolled_back_apps(), vec!["web"]);
    }

    #[tokio::test]
    async fn cancelled_rollback_fails_and_records_nothing() {
        let rollbacker = MockRollbacker::new(Duration::ZERO);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = rollbacker.rollback(cancel, "web", 1).await;
        assert_eq!(result.status, RollbackStatus::Fail);
        assert_eq!(result.error_msg, "rollback cancelled");
        assert!(!rollbacker.is_rolled_back("web", 1));
    }
}
