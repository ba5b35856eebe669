//! Host cordoning and draining through `kubectl`.

use async_trait::async_trait;
use poolshift_core::EvacuationOptions;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::command;
use crate::error::{FleetError, Result};
use crate::traits::WorkloadEvacuator;

pub const DEFAULT_POOL_LABEL: &str = "agentpool";
const MIRROR_POD_ANNOTATION: &str = "kubernetes.io/config.mirror";

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: PodMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodMetadata {
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    annotations: std::collections::HashMap<String, String>,
    #[serde(default)]
    owner_references: Vec<OwnerReference>,
}

#[derive(Debug, Deserialize)]
struct OwnerReference {
    kind: String,
}

impl Pod {
    /// DaemonSet and static pods are bound to the host and never evicted.
    fn is_node_bound(&self) -> bool {
        self.metadata.annotations.contains_key(MIRROR_POD_ANNOTATION)
            || self
                .metadata
                .owner_references
                .iter()
                .any(|owner| owner.kind == "DaemonSet")
    }
}

/// Cordons and drains hosts of one cluster.
#[derive(Debug, Clone)]
pub struct KubectlEvacuator {
    binary: String,
    context: Option<String>,
    pool_label: String,
}

impl Default for KubectlEvacuator {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

impl KubectlEvacuator {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            context: None,
            pool_label: DEFAULT_POOL_LABEL.to_string(),
        }
    }

    /// Target a specific kubeconfig context instead of the current one.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Node label that names a host's pool.
    pub fn with_pool_label(mut self, label: impl Into<String>) -> Self {
        self.pool_label = label.into();
        self
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    fn args<I, S>(&self, rest: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = Vec::new();
        if let Some(context) = &self.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        args.extend(rest.into_iter().map(Into::into));
        args
    }

    async fn kubectl<I, S>(&self, rest: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        command::run(&self.binary, &self.args(rest)).await
    }
}

#[async_trait]
impl WorkloadEvacuator for KubectlEvacuator {
    async fn list_hosts(&self, pool: &str) -> Result<Vec<String>> {
        let selector = format!("{}={}", self.pool_label, pool);
        let output = self
            .kubectl([
                "get",
                "nodes",
                "-l",
                &selector,
                "-o",
                "jsonpath={.items[*].metadata.name}",
            ])
            .await?;

        let hosts: Vec<String> = output.split_whitespace().map(str::to_string).collect();
        debug!(pool, hosts = hosts.len(), "Listed pool hosts");
        Ok(hosts)
    }

    async fn cordon(&self, host: &str) -> Result<()> {
        self.kubectl(["cordon", host]).await?;
        info!(host, "Host cordoned");
        Ok(())
    }

    async fn evict(&self, host: &str, options: &EvacuationOptions) -> Result<()> {
        self.kubectl(drain_args(host, options)).await?;
        info!(host, "Host drained");
        Ok(())
    }

    async fn is_fully_evacuated(&self, host: &str) -> Result<bool> {
        let selector = format!(
            "spec.nodeName={},status.phase!=Succeeded,status.phase!=Failed",
            host
        );
        let output = self
            .kubectl([
                "get",
                "pods",
                "--all-namespaces",
                "--field-selector",
                &selector,
                "-o",
                "json",
            ])
            .await?;

        let remaining = remaining_pods(&output)?;
        if !remaining.is_empty() {
            warn!(host, pods = ?remaining, "Workloads still running on host");
        }
        Ok(remaining.is_empty())
    }
}

fn drain_args(host: &str, options: &EvacuationOptions) -> Vec<String> {
    let mut args = vec![
        "drain".to_string(),
        host.to_string(),
        format!("--grace-period={}", options.grace_period),
        format!("--timeout={}s", options.timeout),
        format!("--chunk-size={}", options.chunk_size),
    ];
    if options.force {
        args.push("--force".to_string());
    }
    if options.ignore_daemonsets {
        args.push("--ignore-daemonsets".to_string());
    }
    if options.delete_emptydir_data {
        args.push("--delete-emptydir-data".to_string());
    }
    args
}

/// `namespace/name` of every evictable pod still on the host.
fn remaining_pods(output: &str) -> Result<Vec<String>> {
    let list: PodList = serde_json::from_str(output)
        .map_err(|e| FleetError::Parse(format!("invalid pod list: {}", e)))?;

    Ok(list
        .items
        .iter()
        .filter(|pod| !pod.is_node_bound())
        .map(|pod| format!("{}/{}", pod.metadata.namespace, pod.metadata.name))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_args_defaults() {
        let args = drain_args("aks-pool-a-0", &EvacuationOptions::default());
        assert_eq!(
            args,
            vec![
                "drain",
                "aks-pool-a-0",
                "--grace-period=300",
                "--timeout=600s",
                "--chunk-size=5",
                "--ignore-daemonsets",
            ]
        );
    }

    #[test]
    fn test_drain_args_all_flags() {
        let options = EvacuationOptions {
            grace_period: 0,
            timeout: 30,
            force: true,
            ignore_daemonsets: false,
            delete_emptydir_data: true,
            chunk_size: 1,
        };
        let args = drain_args("h", &options).join(" ");
        assert_eq!(
            args,
            "drain h --grace-period=0 --timeout=30s --chunk-size=1 --force --delete-emptydir-data"
        );
    }

    #[test]
    fn test_context_prefix() {
        let evacuator = KubectlEvacuator::default().with_context("aks-prod-admin");
        let args = evacuator.args(["cordon", "h"]);
        assert_eq!(args, vec!["--context", "aks-prod-admin", "cordon", "h"]);

        let bare = KubectlEvacuator::default().args(["cordon", "h"]);
        assert_eq!(bare, vec!["cordon", "h"]);
    }

    #[test]
    fn test_remaining_pods_ignores_node_bound() {
        let output = r#"{"items": [
            {"metadata": {"name": "kube-proxy-x", "namespace": "kube-system",
                          "ownerReferences": [{"kind": "DaemonSet"}]}},
            {"metadata": {"name": "etcd-h", "namespace": "kube-system",
                          "annotations": {"kubernetes.io/config.mirror": "abc"}}},
            {"metadata": {"name": "api-7d9f", "namespace": "shop",
                          "ownerReferences": [{"kind": "ReplicaSet"}]}}
        ]}"#;

        assert_eq!(remaining_pods(output).unwrap(), vec!["shop/api-7d9f"]);
    }

    #[test]
    fn test_remaining_pods_empty_list() {
        assert!(remaining_pods(r#"{"items": []}"#).unwrap().is_empty());
        assert!(remaining_pods("{}").unwrap().is_empty());
    }

    #[test]
    fn test_remaining_pods_invalid_output() {
        assert!(matches!(
            remaining_pods("No resources found").unwrap_err(),
            FleetError::Parse(_)
        ));
    }
}
