//! Node pool capacity through the Azure CLI.

use async_trait::async_trait;
use poolshift_core::CapacitySpec;
use serde::Deserialize;
use tracing::{debug, info};

use crate::command;
use crate::error::{FleetError, Result};
use crate::traits::{CapacityMutator, NodePoolInfo, PoolTarget};

/// `az aks nodepool` output, only the fields we read.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureNodePool {
    name: String,
    #[serde(default)]
    vm_size: String,
    #[serde(default)]
    count: Option<u32>,
    #[serde(default)]
    min_count: Option<u32>,
    #[serde(default)]
    max_count: Option<u32>,
    #[serde(default)]
    enable_auto_scaling: Option<bool>,
    #[serde(default)]
    mode: String,
    #[serde(default)]
    provisioning_state: String,
}

impl AzureNodePool {
    fn into_info(self, cluster_name: &str, resource_group: &str) -> NodePoolInfo {
        NodePoolInfo {
            is_system_pool: self.mode.eq_ignore_ascii_case("system"),
            name: self.name,
            vm_size: self.vm_size,
            node_count: self.count.unwrap_or(0),
            min_node_count: self.min_count.unwrap_or(0),
            max_node_count: self.max_count.unwrap_or(0),
            autoscaling_enabled: self.enable_auto_scaling.unwrap_or(false),
            status: self.provisioning_state,
            cluster_name: cluster_name.to_string(),
            resource_group: resource_group.to_string(),
        }
    }
}

/// Azure CLI client for AKS node pools.
///
/// Every command carries `--subscription` explicitly instead of switching the
/// CLI's active account, so concurrent runs against different subscriptions
/// do not interfere.
#[derive(Debug, Clone)]
pub struct AzCli {
    binary: String,
    default_subscription: Option<String>,
}

impl Default for AzCli {
    fn default() -> Self {
        Self::new("az")
    }
}

impl AzCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            default_subscription: None,
        }
    }

    /// Subscription used for pools that do not name their own.
    pub fn with_default_subscription(mut self, subscription: impl Into<String>) -> Self {
        let subscription = subscription.into();
        self.default_subscription = (!subscription.is_empty()).then_some(subscription);
        self
    }

    fn resolve(&self, target: &PoolTarget) -> PoolTarget {
        let mut target = target.clone();
        if target.subscription.is_empty() {
            if let Some(default) = &self.default_subscription {
                target.subscription = default.clone();
            }
        }
        target
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub async fn list_node_pools(
        &self,
        cluster_name: &str,
        resource_group: &str,
        subscription: &str,
    ) -> Result<Vec<NodePoolInfo>> {
        let mut args = strings(&[
            "aks",
            "nodepool",
            "list",
            "--cluster-name",
            cluster_name,
            "--resource-group",
            resource_group,
            "-o",
            "json",
        ]);
        push_subscription(&mut args, subscription);

        let output = command::run_az(&self.binary, &args).await?;
        parse_node_pools(&output, cluster_name, resource_group)
    }

    async fn show(&self, target: &PoolTarget) -> Result<AzureNodePool> {
        let mut args = pool_args("show", target);
        args.extend(strings(&["-o", "json"]));

        let output = command::run_az(&self.binary, &args).await?;
        serde_json::from_str(&output).map_err(|e| {
            FleetError::Parse(format!(
                "invalid node pool output for {}: {}",
                target.pool_name, e
            ))
        })
    }
}

#[async_trait]
impl CapacityMutator for AzCli {
    async fn apply_capacity(&self, target: &PoolTarget, spec: &CapacitySpec) -> Result<()> {
        info!(
            cluster = %target.cluster_name,
            pool = %target.pool_name,
            capacity = %spec.describe(),
            "Applying node pool capacity"
        );

        let target = self.resolve(target);
        let current = self.show(&target).await?;
        let autoscaler_on = current.enable_auto_scaling.unwrap_or(false);

        for args in capacity_commands(&target, spec, autoscaler_on) {
            command::run_az(&self.binary, &args).await?;
        }

        debug!(pool = %target.pool_name, "Node pool capacity applied");
        Ok(())
    }
}

/// Commands needed to bring a pool to `spec`, given whether its autoscaler is
/// currently enabled.
fn capacity_commands(
    target: &PoolTarget,
    spec: &CapacitySpec,
    autoscaler_on: bool,
) -> Vec<Vec<String>> {
    if spec.autoscaling {
        let mut args = pool_args("update", target);
        args.push(if autoscaler_on {
            "--update-cluster-autoscaler".to_string()
        } else {
            "--enable-cluster-autoscaler".to_string()
        });
        args.extend([
            "--min-count".to_string(),
            spec.min_nodes.to_string(),
            "--max-count".to_string(),
            spec.max_nodes.to_string(),
        ]);
        return vec![args];
    }

    let mut commands = Vec::new();
    if autoscaler_on {
        let mut disable = pool_args("update", target);
        disable.push("--disable-cluster-autoscaler".to_string());
        commands.push(disable);
    }

    let mut scale = pool_args("scale", target);
    scale.extend(["--node-count".to_string(), spec.node_count.to_string()]);
    commands.push(scale);
    commands
}

fn pool_args(verb: &str, target: &PoolTarget) -> Vec<String> {
    let mut args = strings(&[
        "aks",
        "nodepool",
        verb,
        "--cluster-name",
        &target.cluster_name,
        "--resource-group",
        &target.resource_group,
        "--name",
        &target.pool_name,
    ]);
    push_subscription(&mut args, &target.subscription);
    args
}

fn push_subscription(args: &mut Vec<String>, subscription: &str) {
    if !subscription.is_empty() {
        args.push("--subscription".to_string());
        args.push(subscription.to_string());
    }
}

fn parse_node_pools(
    output: &str,
    cluster_name: &str,
    resource_group: &str,
) -> Result<Vec<NodePoolInfo>> {
    let pools: Vec<AzureNodePool> = serde_json::from_str(output)
        .map_err(|e| FleetError::Parse(format!("invalid node pool list: {}", e)))?;

    Ok(pools
        .into_iter()
        .map(|p| p.into_info(cluster_name, resource_group))
        .collect())
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}
