//! Custom resources consumed by the network agents
//!
//! - `Topology` (`y-young.github.io/v1`): the links of one pod, applied by the node agent
//! - `Route` (`sdn.dtn-satellite-sdn/v1`): the forwarding table of one pod, applied in-pod

pub mod addressing;
mod builder;
mod route;
mod topology;

pub use builder::{build_routes, build_topologies, propagation_latency};
pub use route::{Route, RouteSpec, RouteStatus, SubPath};
pub use topology::{Link, LinkProperties, Topology, TopologySpec, TopologyStatus};
