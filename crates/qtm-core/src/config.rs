//! Operator config file.
//!
//! An optional YAML file (`--config`) supplying defaults the flags
//! can override: store endpoint, namespace, store path, username.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QtmConfig {
    /// Remote store endpoint (reserved for the networked backend).
    pub endpoint: Option<String>,
    pub namespace: Option<String>,
    /// Path of the embedded session store file.
    #[serde(rename = "storePath")]
    pub store_path: Option<String>,
    pub username: Option<String>,
}

impl QtmConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&data)?)
    }
}
