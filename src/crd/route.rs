use kube::CustomResource;
use serde::{Deserialize, Serialize};

use crate::reconcile::Keyed;

/// Forwarding entries of one pod
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "sdn.dtn-satellite-sdn",
    version = "v1",
    kind = "Route",
    plural = "routes",
    namespaced,
    status = "RouteStatus",
    schema = "disabled"
)]
pub struct RouteSpec {
    #[serde(default)]
    pub podip: String,
    #[serde(default)]
    pub subpaths: Vec<SubPath>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteStatus {
    /// `None` until the first successful push
    #[serde(default)]
    pub subpaths: Option<Vec<SubPath>>,
}

/// Route towards one destination pod
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubPath {
    /// Destination UUID
    pub name: String,
    pub targetip: String,
    pub nextip: String,
}

impl Keyed for SubPath {
    type Key = String;

    fn key(&self) -> String {
        self.name.clone()
    }

    fn identity_eq(&self, other: &Self) -> bool {
        self.name == other.name
    }

    fn mutable_eq(&self, other: &Self) -> bool {
        self.nextip == other.nextip && self.targetip == other.targetip
    }

    fn lock_key(&self) -> Option<u64> {
        None
    }
}
