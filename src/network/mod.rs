//! Topology and route engine
//!
//! [`Network::compute`] turns an [`OrbitModel`] into a distance map, a symmetric topology graph
//! and a next-hop route table. All queries are index-based; UUID translation is done by the
//! control client. There is no internal locking.

pub mod pool;
mod route;
mod topology;

pub use pool::RowStripedPool;
pub use route::{LinkGraph, UNREACHABLE};

use std::time::Instant;

use chrono::{DateTime, Utc};
use petgraph::graph::NodeIndex;
use petgraph::visit::{Bfs, NodeFiltered};
use serde::Serialize;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::{Eci, NodeType};
use crate::orbit::OrbitModel;

#[derive(Debug, Clone)]
pub struct NetworkParams {
    pub same_orbit_threshold_km: f64,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            same_orbit_threshold_km: 500.0,
        }
    }
}

/// One discovery step of a hop-level fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HopLink {
    pub level: usize,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct Network {
    timestamp: DateTime<Utc>,
    distances: Vec<Vec<f64>>,
    topology: Vec<Vec<bool>>,
    graph: LinkGraph,
    routes: Vec<Vec<Option<usize>>>,
    low_orbit: Vec<bool>,
}

impl Network {
    /// Recompute distances, links and routes for the model's current positions.
    pub fn compute(model: &OrbitModel, pool: &RowStripedPool, params: &NetworkParams) -> Self {
        let started = Instant::now();
        let timestamp = model.timestamp();
        let n = model.len();

        let positions: Vec<Eci> = model.nodes().map(|node| node.position_at(timestamp)).collect();
        let distances = pool.map_rows(n, |i| {
            (0..n)
                .map(|j| positions[i].distance(&positions[j]))
                .collect::<Vec<f64>>()
        });

        let inputs = topology::LinkInputs::new(model, &positions, &distances);
        let topology = topology::build(&inputs, pool, params.same_orbit_threshold_km);

        let graph = route::link_graph(&distances, &topology);
        let routes = pool.map_rows(n, |i| route::first_hops(i, &graph));

        let low_orbit = model
            .nodes()
            .map(|node| node.node_type == NodeType::LowOrbitSat)
            .collect();

        let network = Self {
            timestamp,
            distances,
            topology,
            graph,
            routes,
            low_orbit,
        };
        debug!(
            nodes = n,
            edges = network.edge_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Network recomputed"
        );
        network
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn len(&self) -> usize {
        self.topology.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topology.is_empty()
    }

    fn check_index(&self, i: usize) -> AppResult<()> {
        if i < self.len() {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("node index {} out of range", i)))
        }
    }

    pub fn check_connection(&self, i: usize, j: usize) -> AppResult<bool> {
        self.check_index(i)?;
        self.check_index(j)?;
        Ok(self.topology[i][j])
    }

    pub fn distance(&self, i: usize, j: usize) -> AppResult<f64> {
        self.check_index(i)?;
        self.check_index(j)?;
        Ok(self.distances[i][j])
    }

    pub fn distances(&self) -> &[Vec<f64>] {
        &self.distances
    }

    pub fn topology(&self) -> &[Vec<bool>] {
        &self.topology
    }

    pub fn routes(&self) -> &[Vec<Option<usize>>] {
        &self.routes
    }

    pub fn graph(&self) -> &LinkGraph {
        &self.graph
    }

    #[cfg(test)]
    pub(crate) fn set_next_hop(&mut self, i: usize, j: usize, hop: Option<usize>) {
        self.routes[i][j] = hop;
    }

    /// Next hop from `i` towards `j`.
    pub fn next_hop(&self, i: usize, j: usize) -> AppResult<Option<usize>> {
        self.check_index(i)?;
        self.check_index(j)?;
        Ok(self.routes[i][j])
    }

    /// Undirected edges as ascending `(i, j)` pairs with `i < j`.
    pub fn topo_edges(&self) -> Vec<(usize, usize)> {
        let mut edges = Vec::new();
        for (i, row) in self.topology.iter().enumerate() {
            for (j, &linked) in row.iter().enumerate().skip(i + 1) {
                if linked {
                    edges.push((i, j));
                }
            }
        }
        edges
    }

    pub fn edge_count(&self) -> usize {
        self.topology
            .iter()
            .enumerate()
            .map(|(i, row)| row.iter().skip(i + 1).filter(|&&l| l).count())
            .sum()
    }

    /// Walk next hops from `i` to `j`. The path includes both endpoints.
    pub fn route_from_to(&self, i: usize, j: usize) -> AppResult<Vec<usize>> {
        self.check_index(i)?;
        self.check_index(j)?;

        let mut path = vec![i];
        let mut visited = vec![false; self.len()];
        visited[i] = true;
        let mut current = i;
        while current != j {
            let next = self.routes[current][j].ok_or_else(|| AppError::NoRoute {
                from: i.to_string(),
                to: j.to_string(),
            })?;
            if visited[next] {
                return Err(AppError::RoutingLoop(next.to_string()));
            }
            visited[next] = true;
            path.push(next);
            current = next;
        }
        Ok(path)
    }

    /// Path length in nodes, including both endpoints, for each target. `None` when unreachable.
    pub fn route_hops(&self, i: usize, targets: &[usize]) -> AppResult<Vec<Option<usize>>> {
        targets
            .iter()
            .map(|&j| match self.route_from_to(i, j) {
                Ok(path) => Ok(Some(path.len())),
                Err(AppError::NoRoute { .. }) => Ok(None),
                Err(e) => Err(e),
            })
            .collect()
    }

    /// Breadth-first fan-out from `i` over low-orbit satellites, one entry per discovered node.
    pub fn spread_by_hop(&self, i: usize) -> AppResult<Vec<HopLink>> {
        self.check_index(i)?;

        let source = NodeIndex::new(i);
        let low_orbit = NodeFiltered::from_fn(&self.graph, |v: NodeIndex| {
            v == source || self.low_orbit[v.index()]
        });

        // a node's discoverer is its earliest visited neighbour
        let mut visited_at: Vec<Option<usize>> = vec![None; self.len()];
        let mut level = vec![0usize; self.len()];
        let mut spread = Vec::new();
        let mut bfs = Bfs::new(&low_orbit, source);
        let mut visits = 0;
        while let Some(v) = bfs.next(&low_orbit) {
            visited_at[v.index()] = Some(visits);
            visits += 1;
            if v == source {
                continue;
            }
            let parent = self
                .graph
                .neighbors(v)
                .filter_map(|u| visited_at[u.index()].map(|at| (at, u.index())))
                .min();
            if let Some((_, start)) = parent {
                level[v.index()] = level[start] + 1;
                spread.push(HopLink {
                    level: level[v.index()],
                    start,
                    end: v.index(),
                });
            }
        }
        Ok(spread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PositionSnapshot, SatelliteRecord, SiteRecord};

    fn ring(count: usize, height: f64) -> PositionSnapshot {
        let satellites = (0..count)
            .map(|k| SatelliteRecord {
                uuid: format!("s{}", k),
                lat: 0.0,
                lon: k as f64 * 360.0 / count as f64,
                height,
                track_id: 0,
                in_track_id: k as i64,
            })
            .collect();
        PositionSnapshot {
            unix_time_stamp: 1_700_000_000_000,
            satellites,
            ..Default::default()
        }
    }

    fn compute(snapshot: &PositionSnapshot) -> Network {
        let model = OrbitModel::from_snapshot(snapshot, 30000.0).unwrap();
        let pool = RowStripedPool::new(2).unwrap();
        Network::compute(&model, &pool, &NetworkParams::default())
    }

    #[test]
    fn test_single_plane_forms_a_ring() {
        let network = compute(&ring(6, 550.0));
        assert_eq!(network.edge_count(), 6);
        assert!(network.check_connection(0, 1).unwrap());
        assert!(network.check_connection(0, 5).unwrap());
        assert!(!network.check_connection(0, 3).unwrap());
    }

    #[test]
    fn test_route_walk_and_hops() {
        let network = compute(&ring(6, 550.0));
        let path = network.route_from_to(0, 3).unwrap();
        assert_eq!(path.len(), 4);
        assert_eq!(path.first(), Some(&0));
        assert_eq!(path.last(), Some(&3));
        assert_eq!(network.route_hops(0, &[0, 1, 2]).unwrap(), vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn test_high_orbit_is_unreachable() {
        let mut snapshot = ring(4, 550.0);
        snapshot.satellites.push(SatelliteRecord {
            uuid: "geo".into(),
            lat: 0.0,
            lon: 0.0,
            height: 35786.0,
            track_id: 9,
            in_track_id: 0,
        });
        let network = compute(&snapshot);
        assert!(matches!(
            network.route_from_to(0, 4),
            Err(AppError::NoRoute { .. })
        ));
        assert_eq!(network.route_hops(0, &[4]).unwrap(), vec![None]);
        assert_eq!(network.next_hop(4, 4).unwrap(), Some(4));
    }

    #[test]
    fn test_spread_skips_access_nodes() {
        let mut snapshot = ring(4, 550.0);
        snapshot.stations.push(SiteRecord {
            uuid: "gs".into(),
            lat: 0.0,
            lon: 1.0,
            height: 0.0,
        });
        let network = compute(&snapshot);

        let from_station = network.spread_by_hop(4).unwrap();
        assert_eq!(from_station[0], HopLink { level: 1, start: 4, end: 0 });
        assert_eq!(from_station.len(), 4);
        assert!(from_station.iter().all(|l| l.end != 4));

        let from_sat = network.spread_by_hop(0).unwrap();
        assert_eq!(from_sat.len(), 3);
        assert_eq!(from_sat.iter().map(|l| l.level).max(), Some(2));
    }

    #[test]
    fn test_route_walk_detects_loops() {
        let mut network = compute(&ring(6, 550.0));
        network.routes[0][3] = Some(1);
        network.routes[1][3] = Some(0);

        assert!(matches!(
            network.route_from_to(0, 3),
            Err(AppError::RoutingLoop(at)) if at == "0"
        ));
        assert!(matches!(
            network.route_hops(0, &[3]),
            Err(AppError::RoutingLoop(_))
        ));
        // other destinations are unaffected
        assert_eq!(network.route_from_to(0, 2).unwrap().len(), 3);
    }

    #[test]
    fn test_spread_levels_follow_hop_distance() {
        let network = compute(&ring(6, 550.0));
        let spread = network.spread_by_hop(0).unwrap();
        let levels: Vec<usize> = spread.iter().map(|l| l.level).collect();
        assert_eq!(levels, vec![1, 1, 2, 2, 3]);
        assert!(spread.iter().all(|l| network.check_connection(l.start, l.end).unwrap()));
        assert_eq!(spread.last().map(|l| l.end), Some(3));
    }

    #[test]
    fn test_out_of_range_index() {
        let network = compute(&ring(3, 550.0));
        assert!(matches!(network.distance(0, 9), Err(AppError::NotFound(_))));
    }
}
