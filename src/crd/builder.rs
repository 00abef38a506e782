//! Desired Topology and Route objects derived from a computed network

use crate::k8s::node_labels;
use crate::network::Network;

use super::addressing::{global_ip, link_name, link_uid, vxlan_ip};
use super::{Link, LinkProperties, Route, RouteSpec, SubPath, Topology, TopologySpec};

/// Speed of light in km per millisecond
const LIGHT_KM_PER_MS: f64 = 299.792_458;

/// One-way propagation delay over `distance_km`, as a duration string.
pub fn propagation_latency(distance_km: f64) -> String {
    format!("{:.3}ms", distance_km.max(0.0) / LIGHT_KM_PER_MS)
}

fn link(uuids: &[String], network: &Network, local: usize, peer: usize, uid: i64) -> Link {
    let latency = network.distances()[local][peer];
    Link {
        local_intf: link_name(&uuids[peer]),
        local_ip: vxlan_ip(local, peer),
        peer_intf: link_name(&uuids[local]),
        peer_ip: vxlan_ip(peer, local),
        peer_pod: uuids[peer].clone(),
        uid,
        properties: LinkProperties::with_latency(propagation_latency(latency)),
        ..Default::default()
    }
}

/// One Topology per node, named by UUID. Each edge yields a link on both endpoints.
pub fn build_topologies(uuids: &[String], network: &Network) -> Vec<Topology> {
    let mut specs = vec![TopologySpec::default(); uuids.len()];
    for (i, j) in network.topo_edges() {
        let uid = link_uid(i, j);
        specs[i].links.push(link(uuids, network, i, j, uid));
        specs[j].links.push(link(uuids, network, j, i, uid));
    }
    uuids
        .iter()
        .zip(specs)
        .map(|(uuid, spec)| {
            let mut topology = Topology::new(uuid, spec);
            topology.metadata.labels = Some(node_labels(uuid));
            topology
        })
        .collect()
}

/// One Route per node, named by UUID. Unreachable destinations get no subpath.
pub fn build_routes(uuids: &[String], network: &Network, pod_ips: &[String]) -> Vec<Route> {
    let routes = network.routes();
    uuids
        .iter()
        .enumerate()
        .map(|(i, uuid)| {
            let subpaths = routes[i]
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .filter_map(|(j, hop)| {
                    hop.map(|next| SubPath {
                        name: uuids[j].clone(),
                        targetip: global_ip(j),
                        nextip: vxlan_ip(next, i),
                    })
                })
                .collect();
            let spec = RouteSpec {
                podip: pod_ips.get(i).cloned().unwrap_or_default(),
                subpaths,
            };
            let mut route = Route::new(uuid, spec);
            route.metadata.labels = Some(node_labels(uuid));
            route
        })
        .collect()
}
