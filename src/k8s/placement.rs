//! Assignment of emulated nodes to worker machines

use std::collections::{BTreeMap, HashMap};

use tracing::info;

use crate::config::PlacementStrategy;
use crate::error::{AppError, AppResult};
use crate::models::NodeType;
use crate::network::Network;
use crate::orbit::OrbitModel;
use crate::partition::{hash_partition, linear_cut, LinearCutParams};

/// Inputs shared by all strategies
pub struct PlacementInput<'a> {
    pub model: &'a OrbitModel,
    pub network: &'a Network,
    pub machines: &'a [String],
    pub default_capacity: u32,
    pub capacities: &'a BTreeMap<String, u32>,
    pub partition: LinearCutParams,
}

impl PlacementInput<'_> {
    fn capacity_of(&self, machine: &str) -> u32 {
        self.capacities
            .get(machine)
            .copied()
            .unwrap_or(self.default_capacity)
            .max(1)
    }
}

/// UUID to machine. Nodes without an entry are left to the scheduler.
pub fn place(strategy: PlacementStrategy, input: &PlacementInput<'_>) -> AppResult<HashMap<String, String>> {
    if input.machines.is_empty() {
        return Err(AppError::BadRequest("no machines to place pods on".to_string()));
    }
    let placement = match strategy {
        PlacementStrategy::Capacity => by_capacity(input),
        PlacementStrategy::LinearCut => {
            let nodes: Vec<usize> = (0..input.model.len()).collect();
            let groups = linear_cut(
                &nodes,
                &input.network.topo_edges(),
                input.machines.len(),
                input.partition,
            )?;
            from_groups(input, groups)
        }
        PlacementStrategy::Hash => {
            let nodes: Vec<usize> = (0..input.model.len()).collect();
            from_groups(input, hash_partition(&nodes, input.machines.len())?)
        }
    };
    info!(
        strategy = %strategy,
        placed = placement.len(),
        machines = input.machines.len(),
        "Computed pod placement"
    );
    Ok(placement)
}

/// Whole low-orbit planes per machine. Each plane uses one unit of capacity; an exhausted
/// machine hands over to the next one, whose capacity is restored.
fn by_capacity(input: &PlacementInput<'_>) -> HashMap<String, String> {
    let machines = input.machines;
    let mut placement = HashMap::new();
    let mut current = 0;
    let mut remaining = input.capacity_of(&machines[current]);

    for group in input.model.groups() {
        if group.node_type != NodeType::LowOrbitSat {
            continue;
        }
        for node in &group.nodes {
            placement.insert(node.uuid.clone(), machines[current].clone());
        }
        remaining -= 1;
        if remaining == 0 {
            current = (current + 1) % machines.len();
            remaining = input.capacity_of(&machines[current]);
        }
    }
    placement
}

fn from_groups(input: &PlacementInput<'_>, groups: Vec<Vec<usize>>) -> HashMap<String, String> {
    let mut placement = HashMap::new();
    for (machine, group) in input.machines.iter().zip(groups) {
        for index in group {
            if let Some(uuid) = input.model.uuid_of(index) {
                placement.insert(uuid.to_string(), machine.clone());
            }
        }
    }
    placement
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PositionSnapshot, SatelliteRecord, SiteRecord};
    use crate::network::{NetworkParams, RowStripedPool};

    fn constellation(planes: i64, per_plane: i64) -> PositionSnapshot {
        let mut satellites = Vec::new();
        for t in 0..planes {
            for k in 0..per_plane {
                satellites.push(SatelliteRecord {
                    uuid: format!("p{}-s{}", t, k),
                    lat: (t * 10) as f64,
                    lon: (k * 360 / per_plane) as f64,
                    height: 550.0,
                    track_id: t,
                    in_track_id: k,
                });
            }
        }
        PositionSnapshot {
            unix_time_stamp: 1_700_000_000_000,
            satellites,
            stations: vec![SiteRecord {
                uuid: "gs".into(),
                lat: 0.0,
                lon: 0.0,
                height: 0.0,
            }],
            ..Default::default()
        }
    }

    fn setup(planes: i64) -> (OrbitModel, Network) {
        let model = OrbitModel::from_snapshot(&constellation(planes, 4), 30000.0).unwrap();
        let pool = RowStripedPool::new(2).unwrap();
        let network = Network::compute(&model, &pool, &NetworkParams::default());
        (model, network)
    }

    #[test]
    fn test_capacity_walk_wraps_around() {
        let (model, network) = setup(5);
        let machines = vec!["m0".to_string(), "m1".to_string()];
        let capacities = BTreeMap::from([("m0".to_string(), 2)]);
        let input = PlacementInput {
            model: &model,
            network: &network,
            machines: &machines,
            default_capacity: 1,
            capacities: &capacities,
            partition: LinearCutParams::default(),
        };

        let placement = place(PlacementStrategy::Capacity, &input).unwrap();
        // planes 0,1 -> m0; plane 2 -> m1; planes 3,4 -> m0
        assert_eq!(placement["p0-s0"], "m0");
        assert_eq!(placement["p1-s3"], "m0");
        assert_eq!(placement["p2-s1"], "m1");
        assert_eq!(placement["p3-s0"], "m0");
        assert_eq!(placement["p4-s2"], "m0");
        assert!(!placement.contains_key("gs"));
    }

    #[test]
    fn test_partition_strategies_place_every_node() {
        let (model, network) = setup(3);
        let machines = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let capacities = BTreeMap::new();
        let input = PlacementInput {
            model: &model,
            network: &network,
            machines: &machines,
            default_capacity: 1,
            capacities: &capacities,
            partition: LinearCutParams::default(),
        };

        for strategy in [PlacementStrategy::LinearCut, PlacementStrategy::Hash] {
            let placement = place(strategy, &input).unwrap();
            assert_eq!(placement.len(), model.len());
        }
    }
}
