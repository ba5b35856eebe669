//! Cluster collaborators used by the sequencing orchestrator.
//!
//! Pool capacity is changed through the Azure CLI and hosts are cordoned and
//! drained through `kubectl`. Both sit behind the traits in [`traits`], so the
//! orchestrator never depends on a concrete client.

pub mod azure;
pub mod clusters;
mod command;
pub mod connector;
pub mod error;
pub mod kubectl;
pub mod traits;

pub use azure::AzCli;
pub use clusters::{ClusterDirectory, ClusterEntry};
pub use connector::{CliFleetConnector, FleetSettings};
pub use error::{FleetError, Result};
pub use kubectl::KubectlEvacuator;
pub use traits::{
    CapacityMutator, Collaborators, FleetConnector, NodePoolInfo, PoolTarget, WorkloadEvacuator,
};
