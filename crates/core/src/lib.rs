//! Domain model for node pool sequencing.
//!
//! A sequencing run migrates workloads from an origin node pool to a
//! destination node pool. This crate holds the request types callers submit,
//! their validation, and the identifiers and phase state used while a run is
//! in flight.

pub mod domain;
pub mod error;

pub use domain::*;
pub use error::{CoreError, Result};
