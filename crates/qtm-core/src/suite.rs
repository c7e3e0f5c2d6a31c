//! Suite model and suite sources.
//!
//! A suite is an operator-authored list of applications, each tagged
//! with the rollout phase it belongs to. `organize_by_phase` turns a
//! suite into the phase map the lifecycle engine iterates.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One application within a suite. Identity is `(name, group)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuiteItem {
    pub name: String,
    pub group: String,
    #[serde(rename = "rolloutPhase")]
    pub rollout_phase: i64,
}

/// An operator-authored suite: a named, ordered list of items.
///
/// Mutable only at parse time; the engine treats it as read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Suite {
    pub name: String,
    pub items: Vec<SuiteItem>,
}

/// Phase number → items deployed concurrently in that phase.
///
/// A `BTreeMap` so forward iteration is ascending by phase; items
/// within a phase keep their suite order.
pub type PhaseMap = BTreeMap<i64, Vec<SuiteItem>>;

/// Errors from suite sources.
#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("failed to read suite file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse suite: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("suite not found: {0}")]
    NotFound(String),

    #[error("suite store error: {0}")]
    Store(String),
}

/// Produces a suite for the engine to deploy.
#[async_trait]
pub trait SuiteSource: Send + Sync {
    async fn fetch_suite(&self) -> Result<Suite, SuiteError>;
}

/// Group suite items by rollout phase.
///
/// Every item lands in the bucket for its own `rollout_phase`; any
/// integer phase is accepted. Insertion order within a phase follows
/// suite order.
pub fn organize_by_phase(suite: &Suite) -> PhaseMap {
    let mut phases = PhaseMap::new();
    for item in &suite.items {
        phases
            .entry(item.rollout_phase)
            .or_default()
            .push(item.clone());
    }
    phases
}

// ── File source ────────────────────────────────────────────────────

/// Suite source backed by a local YAML file: a sequence of SuiteItem.
///
/// The file carries no suite name; the caller supplies it. Parsing
/// happens at construction so a bad file fails fast.
#[derive(Debug)]
pub struct FileSuiteSource {
    suite: Suite,
}

impl FileSuiteSource {
    pub fn new(path: &Path, suite_name: &str) -> Result<Self, SuiteError> {
        let data = std::fs::read_to_string(path)?;
        let items: Vec<SuiteItem> = serde_yaml::from_str(&data)?;
        Ok(Self {
            suite: Suite {
                name: suite_name.to_string(),
                items,
            },
        })
    }
}

#[async_trait]
impl SuiteSource for FileSuiteSource {
    async fn fetch_suite(&self) -> Result<Suite, SuiteError> {
        Ok(self.suite.clone())
    }
}

// ── Mock source ────────────────────────────────────────────────────

/// In-memory fixture source: three phases, each deploying
/// `app1`..`app3` of group `test`. Used by `--mock` and tests.
pub struct MockSuiteSource {
    fail: bool,
}

impl MockSuiteSource {
    pub fn new() -> Self {
        Self { fail: false }
    }

    /// A source whose fetch always fails, for exercising error paths.
    pub fn failing() -> Self {
        Self { fail: true }
    }

    pub fn fixture() -> Suite {
        let mut items = Vec::new();
        for phase in 1..=3 {
            for app in ["app1", "app2", "app3"] {
                items.push(SuiteItem {
                    name: app.to_string(),
                    group: "test".to_string(),
                    rollout_phase: phase,
                });
            }
        }
        Suite {
            name: "mock".to_string(),
            items,
        }
    }
}

impl Default for MockSuiteSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SuiteSource for MockSuiteSource {
    async fn fetch_suite(&self) -> Result<Suite, SuiteError> {
        if self.fail {
            return Err(SuiteError::NotFound("mock".to_string()));
        }
        Ok(Self::fixture())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn item(name: &str, group: &str, phase: i64) -> SuiteItem {
        SuiteItem {
            name: name.to_string(),
            group: group.to_string(),
            rollout_phase: phase,
        }
    }

    #[test]
    fn organize_groups_by_phase() {
        let suite = Suite {
            name: "s".to_string(),
            items: vec![
                item("a", "g", 2),
                item("b", "g", 1),
                item("c", "g", 2),
                item("d", "g", 1),
            ],
        };

        let phases = organize_by_phase(&suite);

        assert_eq!(phases.len(), 2);
        assert_eq!(phases[&1], vec![item("b", "g", 1), item("d", "g", 1)]);
        assert_eq!(phases[&2], vec![item("a", "g", 2), item("c", "g", 2)]);
    }

    #[test]
    fn organize_iterates_phases_ascending() {
        let suite = Suite {
            name: "s".to_string(),
            items: vec![item("a", "g", 30), item("b", "g", -1), item("c", "g", 5)],
        };

        let phases = organize_by_phase(&suite);
        let keys: Vec<i64> = phases.keys().copied().collect();
        assert_eq!(keys, vec![-1, 5, 30]);
    }

    #[test]
    fn organize_empty_suite() {
        let phases = organize_by_phase(&Suite::default());
        assert!(phases.is_empty());
    }

    #[test]
    fn organize_preserves_all_items() {
        let suite = MockSuiteSource::fixture();
        let phases = organize_by_phase(&suite);
        let total: usize = phases.values().map(Vec::len).sum();
        assert_eq!(total, suite.items.len());
        for (phase, items) in &phases {
            assert!(items.iter().all(|i| i.rollout_phase == *phase));
        }
    }

    #[tokio::test]
    async fn file_source_parses_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "- name: web\n  group: frontend\n  rolloutPhase: 0\n- name: api\n  group: backend\n  rolloutPhase: 1"
        )
        .unwrap();

        let source = FileSuiteSource::new(file.path(), "prod").unwrap();
        let suite = source.fetch_suite().await.unwrap();

        assert_eq!(suite.name, "prod");
        assert_eq!(suite.items.len(), 2);
        assert_eq!(suite.items[0], item("web", "frontend", 0));
        assert_eq!(suite.items[1], item("api", "backend", 1));
    }

    #[test]
    fn file_source_rejects_bad_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, ": not a suite").unwrap();
        assert!(matches!(
            FileSuiteSource::new(file.path(), "prod"),
            Err(SuiteError::Parse(_))
        ));
    }

    #[test]
    fn file_source_missing_file() {
        let err = FileSuiteSource::new(Path::new("/nonexistent/suite.yaml"), "prod").unwrap_err();
        assert!(matches!(err, SuiteError::Io(_)));
    }

    #[tokio::test]
    async fn mock_source_fixture_shape() {
        let suite = MockSuiteSource::new().fetch_suite().await.unwrap();
        assert_eq!(suite.name, "mock");
        assert_eq!(suite.items.len(), 9);

        let phases = organize_by_phase(&suite);
        assert_eq!(phases.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        for items in phases.values() {
            let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
            assert_eq!(names, vec!["app1", "app2", "app3"]);
        }
    }

    #[tokio::test]
    async fn mock_source_error_mode() {
        let err = MockSuiteSource::failing().fetch_suite().await.unwrap_err();
        assert!(matches!(err, SuiteError::NotFound(_)));
    }
}
