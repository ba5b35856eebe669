use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use fleet::{NodePoolInfo, PoolTarget};
use poolshift_core::{CapacitySpec, CoreError, EvacuationOptions};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct NodePoolsQuery {
    /// Cluster id, as in the kubeconfig context
    pub cluster: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct NodePoolsResponse {
    pub success: bool,
    pub data: Vec<NodePoolInfo>,
}

/// Capacity change for a single pool, optionally preceded by cordoning and
/// draining its hosts.
#[derive(Debug, Deserialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct UpdateNodePoolRequest {
    pub capacity: CapacitySpec,
    #[serde(default)]
    pub cordon_enabled: bool,
    #[serde(default, rename = "drain_enabled")]
    pub evacuation_enabled: bool,
    #[serde(default, rename = "drain_options")]
    pub evacuation_options: EvacuationOptions,
    /// Overrides the cluster's subscription from the clusters config
    #[serde(default)]
    pub subscription: Option<String>,
}

impl UpdateNodePoolRequest {
    fn validate(&self) -> Result<(), CoreError> {
        if self.evacuation_enabled {
            if !self.cordon_enabled {
                return Err(CoreError::DrainRequiresCordon);
            }
            self.evacuation_options.validate()?;
        }
        if self.capacity.autoscaling && self.capacity.min_nodes > self.capacity.max_nodes {
            return Err(CoreError::Validation(format!(
                "min_nodes ({}) exceeds max_nodes ({})",
                self.capacity.min_nodes, self.capacity.max_nodes
            )));
        }
        Ok(())
    }
}

#[derive(Serialize, ToSchema)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct NodePoolResponse {
    pub success: bool,
    pub message: String,
    pub data: NodePoolInfo,
}

#[utoipa::path(
    get,
    path = "/api/v1/nodepools",
    params(NodePoolsQuery),
    responses(
        (status = 200, description = "Node pools of the cluster", body = NodePoolsResponse),
        (status = 400, description = "Missing cluster parameter", body = crate::error::ErrorResponse),
        (status = 404, description = "Cluster not in the clusters config", body = crate::error::ErrorResponse),
        (status = 502, description = "Azure CLI failed", body = crate::error::ErrorResponse)
    ),
    tag = "nodepools"
)]
pub async fn list_node_pools(
    State(state): State<AppState>,
    Query(query): Query<NodePoolsQuery>,
) -> Result<Json<NodePoolsResponse>, AppError> {
    let cluster = query
        .cluster
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::missing_parameter("cluster"))?;

    let pools = state.connector().list_node_pools(&cluster).await?;
    tracing::debug!(cluster = %cluster, pools = pools.len(), "Listed node pools");

    Ok(Json(NodePoolsResponse {
        success: true,
        data: pools,
    }))
}

#[utoipa::path(
    put,
    path = "/api/v1/nodepools/{cluster}/{resource_group}/{name}",
    params(
        ("cluster" = String, Path, description = "Cluster id, as in the kubeconfig context"),
        ("resource_group" = String, Path, description = "Resource group of the node pool"),
        ("name" = String, Path, description = "Node pool name")
    ),
    request_body = UpdateNodePoolRequest,
    responses(
        (status = 200, description = "Node pool after the update", body = NodePoolResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 404, description = "Cluster or node pool not found", body = crate::error::ErrorResponse),
        (status = 502, description = "Cluster operation failed", body = crate::error::ErrorResponse)
    ),
    tag = "nodepools"
)]
pub async fn update_node_pool(
    State(state): State<AppState>,
    Path((cluster, resource_group, name)): Path<(String, String, String)>,
    payload: Result<Json<UpdateNodePoolRequest>, JsonRejection>,
) -> Result<Json<NodePoolResponse>, AppError> {
    let Json(request) = payload
        .map_err(|e| AppError::invalid_request(format!("Invalid request body: {}", e.body_text())))?;
    request.validate()?;

    let collaborators = state.connector().connect(&cluster).await?;

    if request.cordon_enabled {
        let hosts = collaborators.evacuator.list_hosts(&name).await?;
        for host in &hosts {
            collaborators.evacuator.cordon(host).await?;
        }
        if request.evacuation_enabled {
            for host in &hosts {
                collaborators
                    .evacuator
                    .evict(host, &request.evacuation_options)
                    .await?;
            }
        }
        tracing::info!(cluster = %cluster, pool = %name, hosts = hosts.len(), "Node pool hosts cordoned");
    }

    let target = PoolTarget {
        cluster_name: collaborators.cluster_name.clone(),
        pool_name: name.clone(),
        resource_group,
        subscription: request.subscription.unwrap_or_default(),
    };
    collaborators
        .capacity
        .apply_capacity(&target, &request.capacity)
        .await?;

    let pool = state
        .connector()
        .list_node_pools(&cluster)
        .await?
        .into_iter()
        .find(|pool| pool.name == name)
        .ok_or_else(|| AppError::NotFound {
            code: "NODE_POOL_NOT_FOUND",
            message: format!("Node pool '{}' not found after update", name),
        })?;

    Ok(Json(NodePoolResponse {
        success: true,
        message: format!("Node pool '{}' updated successfully", name),
        data: pool,
    }))
}
