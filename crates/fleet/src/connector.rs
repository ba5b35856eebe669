use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::azure::AzCli;
use crate::clusters::{strip_admin, ClusterDirectory};
use crate::error::Result;
use crate::kubectl::{KubectlEvacuator, DEFAULT_POOL_LABEL};
use crate::traits::{Collaborators, FleetConnector, NodePoolInfo};

/// How the CLI-backed connector reaches the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSettings {
    pub az_binary: String,
    pub kubectl_binary: String,
    /// Node label holding the pool name
    pub node_pool_label: String,
    /// Explicit clusters config; searched for when unset
    pub clusters_config: Option<PathBuf>,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            az_binary: "az".to_string(),
            kubectl_binary: "kubectl".to_string(),
            node_pool_label: DEFAULT_POOL_LABEL.to_string(),
            clusters_config: None,
        }
    }
}

/// Binds clusters to `az` and `kubectl` collaborators.
///
/// The clusters config is re-read on every call so edits take effect without
/// a restart.
#[derive(Debug, Clone, Default)]
pub struct CliFleetConnector {
    settings: FleetSettings,
}

impl CliFleetConnector {
    pub fn new(settings: FleetSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &FleetSettings {
        &self.settings
    }

    async fn directory(&self) -> Result<Option<ClusterDirectory>> {
        match ClusterDirectory::locate(self.settings.clusters_config.as_deref()) {
            Some(path) => Ok(Some(ClusterDirectory::load(&path).await?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl FleetConnector for CliFleetConnector {
    async fn connect(&self, cluster: &str) -> Result<Collaborators> {
        let (cluster_name, default_subscription) = match self.directory().await? {
            Some(directory) => {
                let entry = directory.require(cluster)?;
                (entry.azure_name().to_string(), entry.subscription.clone())
            }
            None => {
                warn!(
                    cluster,
                    "No clusters config found, using the cluster id as the AKS cluster name"
                );
                (strip_admin(cluster).to_string(), String::new())
            }
        };

        info!(cluster, aks_cluster = %cluster_name, "Connected to cluster");

        let capacity = AzCli::new(&self.settings.az_binary)
            .with_default_subscription(default_subscription);
        let evacuator = KubectlEvacuator::new(&self.settings.kubectl_binary)
            .with_context(cluster)
            .with_pool_label(&self.settings.node_pool_label);

        Ok(Collaborators {
            cluster_name,
            capacity: Arc::new(capacity),
            evacuator: Arc::new(evacuator),
        })
    }

    async fn list_node_pools(&self, cluster: &str) -> Result<Vec<NodePoolInfo>> {
        let directory = self.directory().await?.unwrap_or_default();
        let entry = directory.require(cluster)?;

        AzCli::new(&self.settings.az_binary)
            .list_node_pools(entry.azure_name(), &entry.resource_group, &entry.subscription)
            .await
    }
}
