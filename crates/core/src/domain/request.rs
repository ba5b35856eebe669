use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{CoreError, Result};

pub const DEFAULT_GRACE_PERIOD_SECS: i64 = 300;
pub const DEFAULT_DRAIN_TIMEOUT_SECS: i64 = 600;
pub const DEFAULT_CHUNK_SIZE: i64 = 5;

/// Capacity to apply to a node pool, either a fixed node count or an
/// autoscaler range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct CapacitySpec {
    #[serde(default)]
    pub autoscaling: bool,
    #[serde(default)]
    pub node_count: u32,
    #[serde(default)]
    pub min_nodes: u32,
    #[serde(default)]
    pub max_nodes: u32,
}

impl CapacitySpec {
    pub fn fixed(node_count: u32) -> Self {
        Self {
            autoscaling: false,
            node_count,
            min_nodes: 0,
            max_nodes: 0,
        }
    }

    pub fn autoscale(min_nodes: u32, max_nodes: u32) -> Self {
        Self {
            autoscaling: true,
            node_count: 0,
            min_nodes,
            max_nodes,
        }
    }

    /// Short human-readable form used in progress messages.
    pub fn describe(&self) -> String {
        if self.autoscaling {
            format!("autoscaling {}..{}", self.min_nodes, self.max_nodes)
        } else {
            format!("{} nodes (autoscaling off)", self.node_count)
        }
    }
}

/// How workloads are evicted from a host during the drain phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(default)]
pub struct EvacuationOptions {
    /// Seconds each pod is given to terminate
    pub grace_period: i64,
    /// Seconds before a single host drain gives up
    pub timeout: i64,
    /// Evict pods not managed by a controller
    pub force: bool,
    /// Leave DaemonSet-managed pods in place
    pub ignore_daemonsets: bool,
    /// Allow deleting pods that use emptyDir volumes
    pub delete_emptydir_data: bool,
    /// Pods evicted per batch
    pub chunk_size: i64,
}

impl Default for EvacuationOptions {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD_SECS,
            timeout: DEFAULT_DRAIN_TIMEOUT_SECS,
            force: false,
            ignore_daemonsets: true,
            delete_emptydir_data: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl EvacuationOptions {
    pub fn validate(&self) -> Result<()> {
        if self.grace_period < 0 {
            return Err(CoreError::InvalidDrainOptions(
                "grace period must be >= 0".to_string(),
            ));
        }
        if self.chunk_size < 1 {
            return Err(CoreError::InvalidDrainOptions(
                "chunk size must be >= 1".to_string(),
            ));
        }
        if self.timeout < 1 {
            return Err(CoreError::InvalidDrainOptions(
                "timeout must be >= 1 second".to_string(),
            ));
        }
        Ok(())
    }
}

/// One side of the migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct PoolSpec {
    pub name: String,
    pub resource_group: String,
    #[serde(default)]
    pub subscription: String,
    /// 1 marks the origin pool, 2 the destination pool
    pub sequence_order: u8,
    /// Applied before evacuation (usually scales the destination up)
    #[serde(default, rename = "pre_drain_changes")]
    pub pre_migration_capacity: Option<CapacitySpec>,
    /// Applied after evacuation (usually scales the origin down)
    #[serde(default, rename = "post_drain_changes")]
    pub post_migration_capacity: Option<CapacitySpec>,
}

impl PoolSpec {
    pub fn new(
        name: impl Into<String>,
        resource_group: impl Into<String>,
        sequence_order: u8,
    ) -> Self {
        Self {
            name: name.into(),
            resource_group: resource_group.into(),
            subscription: String::new(),
            sequence_order,
            pre_migration_capacity: None,
            post_migration_capacity: None,
        }
    }

    pub fn with_subscription(mut self, subscription: impl Into<String>) -> Self {
        self.subscription = subscription.into();
        self
    }

    pub fn with_pre_migration(mut self, capacity: CapacitySpec) -> Self {
        self.pre_migration_capacity = Some(capacity);
        self
    }

    pub fn with_post_migration(mut self, capacity: CapacitySpec) -> Self {
        self.post_migration_capacity = Some(capacity);
        self
    }
}

/// Request body accepted by the sequencing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct MigrationRequest {
    #[serde(rename = "cluster")]
    pub cluster_id: String,
    #[serde(rename = "node_pools")]
    pub pools: Vec<PoolSpec>,
    #[serde(default)]
    pub cordon_enabled: bool,
    #[serde(default, rename = "drain_enabled")]
    pub evacuation_enabled: bool,
    #[serde(default, rename = "drain_options")]
    pub evacuation_options: EvacuationOptions,
}

/// A request that passed validation, with the pools resolved into their roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    pub cluster_id: String,
    pub origin: PoolSpec,
    pub destination: PoolSpec,
    pub cordon_enabled: bool,
    pub evacuation_enabled: bool,
    pub evacuation_options: EvacuationOptions,
}

impl MigrationRequest {
    /// Check the request invariants and split the pools into origin and
    /// destination.
    pub fn validate(self) -> Result<MigrationPlan> {
        if self.pools.len() != 2 {
            return Err(CoreError::InvalidPoolCount(self.pools.len()));
        }

        self.evacuation_options.validate()?;

        if self.evacuation_enabled && !self.cordon_enabled {
            return Err(CoreError::DrainRequiresCordon);
        }

        let mut pools = self.pools.into_iter();
        let (Some(first), Some(second)) = (pools.next(), pools.next()) else {
            return Err(CoreError::InvalidPoolCount(0));
        };

        let (origin, destination) = match (first.sequence_order, second.sequence_order) {
            (1, 2) => (first, second),
            (2, 1) => (second, first),
            (a, b) => {
                return Err(CoreError::InvalidSequenceOrder {
                    first: a,
                    second: b,
                })
            }
        };

        if self.cluster_id.trim().is_empty() {
            return Err(CoreError::Validation("cluster is required".to_string()));
        }
        for pool in [&origin, &destination] {
            validate_pool(pool)?;
        }

        Ok(MigrationPlan {
            cluster_id: self.cluster_id,
            origin,
            destination,
            cordon_enabled: self.cordon_enabled,
            evacuation_enabled: self.evacuation_enabled,
            evacuation_options: self.evacuation_options,
        })
    }
}

fn validate_pool(pool: &PoolSpec) -> Result<()> {
    if pool.name.trim().is_empty() {
        return Err(CoreError::Validation("node pool name is required".to_string()));
    }
    if pool.resource_group.trim().is_empty() {
        return Err(CoreError::Validation(format!(
            "resource group is required for node pool '{}'",
            pool.name
        )));
    }
    for capacity in [&pool.pre_migration_capacity, &pool.post_migration_capacity]
        .into_iter()
        .flatten()
    {
        if capacity.autoscaling && capacity.min_nodes > capacity.max_nodes {
            return Err(CoreError::Validation(format!(
                "node pool '{}': min_nodes ({}) exceeds max_nodes ({})",
                pool.name, capacity.min_nodes, capacity.max_nodes
            )));
        }
    }
    Ok(())
}
