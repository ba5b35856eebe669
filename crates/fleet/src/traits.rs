use std::sync::Arc;

use async_trait::async_trait;
use poolshift_core::{CapacitySpec, EvacuationOptions, PoolSpec};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::Result;

/// Fully qualified node pool, as the capacity backend needs to address it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolTarget {
    pub cluster_name: String,
    pub pool_name: String,
    pub resource_group: String,
    pub subscription: String,
}

impl PoolTarget {
    pub fn for_pool(cluster_name: impl Into<String>, pool: &PoolSpec) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            pool_name: pool.name.clone(),
            resource_group: pool.resource_group.clone(),
            subscription: pool.subscription.clone(),
        }
    }
}

/// Node pool as reported by the capacity backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct NodePoolInfo {
    pub name: String,
    pub vm_size: String,
    pub node_count: u32,
    pub min_node_count: u32,
    pub max_node_count: u32,
    pub autoscaling_enabled: bool,
    pub status: String,
    pub is_system_pool: bool,
    pub cluster_name: String,
    pub resource_group: String,
}

/// Changes the capacity of a node pool.
#[async_trait]
pub trait CapacityMutator: Send + Sync {
    /// Apply `spec` to the pool. Synchronous from the caller's view and never
    /// retried.
    async fn apply_capacity(&self, target: &PoolTarget, spec: &CapacitySpec) -> Result<()>;
}

/// Cordons hosts and evicts their workloads.
#[async_trait]
pub trait WorkloadEvacuator: Send + Sync {
    /// Hosts belonging to `pool`, in a stable enumeration order.
    async fn list_hosts(&self, pool: &str) -> Result<Vec<String>>;

    /// Mark a host unschedulable. Running workloads are left alone.
    async fn cordon(&self, host: &str) -> Result<()>;

    /// Evict the workloads running on a host.
    async fn evict(&self, host: &str, options: &EvacuationOptions) -> Result<()>;

    /// Whether nothing but node-bound workloads remain on the host.
    async fn is_fully_evacuated(&self, host: &str) -> Result<bool>;
}

/// Collaborators bound to a single cluster.
#[derive(Clone)]
pub struct Collaborators {
    /// Cluster name as the capacity backend knows it
    pub cluster_name: String,
    pub capacity: Arc<dyn CapacityMutator>,
    pub evacuator: Arc<dyn WorkloadEvacuator>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("cluster_name", &self.cluster_name)
            .finish_non_exhaustive()
    }
}

/// Resolves a cluster identifier into its collaborators.
#[async_trait]
pub trait FleetConnector: Send + Sync {
    async fn connect(&self, cluster: &str) -> Result<Collaborators>;

    async fn list_node_pools(&self, cluster: &str) -> Result<Vec<NodePoolInfo>>;
}
