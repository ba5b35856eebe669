use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FleetError, Result};

pub const CLUSTERS_CONFIG_FILE: &str = "clusters-config.json";
const ADMIN_SUFFIX: &str = "-admin";

/// One cluster known to the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterEntry {
    #[serde(alias = "cluster_name")]
    pub cluster_name: String,
    #[serde(alias = "resource_group")]
    pub resource_group: String,
    #[serde(default)]
    pub subscription: String,
}

impl ClusterEntry {
    /// Name without the kubeconfig `-admin` suffix, as Azure knows it.
    pub fn azure_name(&self) -> &str {
        strip_admin(&self.cluster_name)
    }
}

/// Clusters read from `clusters-config.json`.
#[derive(Debug, Clone, Default)]
pub struct ClusterDirectory {
    entries: Vec<ClusterEntry>,
    source: Option<PathBuf>,
}

impl ClusterDirectory {
    pub fn new(entries: Vec<ClusterEntry>) -> Self {
        Self {
            entries,
            source: None,
        }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            FleetError::ClusterConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        let entries: Vec<ClusterEntry> = serde_json::from_str(&content).map_err(|e| {
            FleetError::ClusterConfig(format!("failed to parse {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), clusters = entries.len(), "Clusters config loaded");

        Ok(Self {
            entries,
            source: Some(path.to_path_buf()),
        })
    }

    /// Locate the clusters config: the explicit path if given, otherwise
    /// `~/.poolshift/`, the executable's directory, then the working
    /// directory. Returns `None` when no file exists anywhere.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        let mut candidates = Vec::new();
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".poolshift").join(CLUSTERS_CONFIG_FILE));
        }
        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            candidates.push(exe_dir.join(CLUSTERS_CONFIG_FILE));
        }
        if let Ok(cwd) = std::env::current_dir() {
            candidates.push(cwd.join(CLUSTERS_CONFIG_FILE));
        }

        candidates.into_iter().find(|p| p.exists())
    }

    /// Look up a cluster by kubeconfig context or Azure name. A trailing
    /// `-admin` is ignored on both sides.
    pub fn find(&self, cluster: &str) -> Option<&ClusterEntry> {
        let wanted = strip_admin(cluster);
        self.entries
            .iter()
            .find(|entry| entry.azure_name() == wanted || entry.cluster_name == cluster)
    }

    pub fn require(&self, cluster: &str) -> Result<&ClusterEntry> {
        self.find(cluster)
            .ok_or_else(|| FleetError::ClusterNotFound(cluster.to_string()))
    }

    pub fn entries(&self) -> &[ClusterEntry] {
        &self.entries
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

pub(crate) fn strip_admin(name: &str) -> &str {
    name.strip_suffix(ADMIN_SUFFIX).unwrap_or(name)
}
