//! Catalog model and catalog sources.
//!
//! The catalog answers "which version and artifact do I deploy for
//! this app" — one lookup per deployment unit, keyed by
//! `(name, group)`.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A catalog entry: the version and chart artifact for one app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogItem {
    pub name: String,
    pub version: String,
    #[serde(rename = "helmChart")]
    pub helm_chart: String,
}

/// Errors from catalog sources.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("catalog not found")]
    CatalogNotFound,

    #[error("no catalog item for {group}/{name}")]
    ItemNotFound { name: String, group: String },

    #[error("no version recorded for {group}/{name}")]
    VersionNotFound { name: String, group: String },

    #[error("catalog store error: {0}")]
    Store(String),
}

/// Resolves `(name, group)` to the catalog item to deploy.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self, name: &str, group: &str) -> Result<CatalogItem, CatalogError>;
}

// ── File source ────────────────────────────────────────────────────

/// Catalog source backed by a local YAML file: a sequence of
/// CatalogItem. Lookups ignore the group (a file catalog is flat).
pub struct FileCatalogSource {
    items: HashMap<String, CatalogItem>,
}

impl FileCatalogSource {
    pub fn new(path: &Path) -> Result<Self, CatalogError> {
        let data = std::fs::read_to_string(path)?;
        let items: Vec<CatalogItem> = serde_yaml::from_str(&data)?;
        Ok(Self {
            items: items.into_iter().map(|i| (i.name.clone(), i)).collect(),
        })
    }
}

#[async_trait]
impl CatalogSource for FileCatalogSource {
    async fn fetch(&self, name: &str, group: &str) -> Result<CatalogItem, CatalogError> {
        self.items
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::ItemNotFound {
                name: name.to_string(),
                group: group.to_string(),
            })
    }
}

// ── Mock source ────────────────────────────────────────────────────

/// Scripted failure modes for [`MockCatalogSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockCatalogBehavior {
    #[default]
    Normal,
    CatalogNotFound,
    ItemNotFound,
    VersionNotFound,
}

/// In-memory catalog preseeded for the mock suite fixture
/// (`app1`..`app3` of group `test`), with injectable error modes.
pub struct MockCatalogSource {
    items: HashMap<(String, String), CatalogItem>,
    behavior: MockCatalogBehavior,
}

impl MockCatalogSource {
    pub fn new() -> Self {
        Self::with_behavior(MockCatalogBehavior::Normal)
    }

    pub fn with_behavior(behavior: MockCatalogBehavior) -> Self {
        let mut source = Self {
            items: HashMap::new(),
            behavior,
        };
        for (app, version) in [("app1", "1.1.1"), ("app2", "2.2.2"), ("app3", "3.3.3")] {
            source.insert(
                "test",
                CatalogItem {
                    name: app.to_string(),
                    version: version.to_string(),
                    helm_chart: format!("{app}-{version}.tgz"),
                },
            );
        }
        source
    }

    /// Seed an additional entry.
    pub fn insert(&mut self, group: &str, item: CatalogItem) {
        self.items.insert((item.name.clone(), group.to_string()), item);
    }
}

impl Default for MockCatalogSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogSource for MockCatalogSource {
    async fn fetch(&self, name: &str, group: &str) -> Result<CatalogItem, CatalogError> {
        match self.behavior {
            MockCatalogBehavior::CatalogNotFound => return Err(CatalogError::CatalogNotFound),
            MockCatalogBehavior::ItemNotFound => {
                return Err(CatalogError::ItemNotFound {
                    name: name.to_string(),
                    group: group.to_string(),
                })
            }
            MockCatalogBehavior::VersionNotFound => {
                return Err(CatalogError::VersionNotFound {
                    name: name.to_string(),
                    group: group.to_string(),
                })
            }
            MockCatalogBehavior::Normal => {}
        }
        self.items
            .get(&(name.to_string(), group.to_string()))
            .cloned()
            .ok_or_else(|| CatalogError::ItemNotFound {
                name: name.to_string(),
                group: group.to_string(),
            })
    }
}
