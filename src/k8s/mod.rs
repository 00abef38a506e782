//! Kubernetes integration
//!
//! This module handles all interactions with the cluster:
//! - Discovering worker machines and placing pods on them
//! - Server-side applying and deleting node pods
//! - Creating, replacing and pruning Topology and Route objects

mod client;
pub mod placement;
mod resources;

pub use client::{classify, ClusterClients, SyncReport, FIELD_MANAGER};
pub use placement::{place, PlacementInput};
pub use resources::{bootstrap_command, create_pod_spec, node_labels, MANAGED_SELECTOR};
