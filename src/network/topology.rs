//! Link selection: same-orbit ring neighbours, cross-orbit nearest neighbours, access links

use crate::models::{Eci, NodeType};
use crate::orbit::OrbitModel;

use super::pool::RowStripedPool;

/// Cross-orbit links picked by each low-orbit satellite
const CROSS_ORBIT_LINKS: usize = 2;

/// Per-node view used by the link search
pub(super) struct LinkInputs<'a> {
    pub positions: &'a [Eci],
    pub distances: &'a [Vec<f64>],
    pub altitudes: Vec<f64>,
    pub node_types: Vec<NodeType>,
    /// Low-orbit plane of each index, `None` for everything else
    pub plane_of: Vec<Option<usize>>,
    pub planes: Vec<std::ops::Range<usize>>,
}

impl<'a> LinkInputs<'a> {
    pub fn new(model: &OrbitModel, positions: &'a [Eci], distances: &'a [Vec<f64>]) -> Self {
        let planes = model.low_orbit_planes();
        let mut plane_of = vec![None; model.len()];
        for (p, range) in planes.iter().enumerate() {
            for i in range.clone() {
                plane_of[i] = Some(p);
            }
        }
        let (altitudes, node_types) = model.nodes().map(|n| (n.altitude, n.node_type)).unzip();
        Self {
            positions,
            distances,
            altitudes,
            node_types,
            plane_of,
            planes,
        }
    }

    fn len(&self) -> usize {
        self.node_types.len()
    }

    fn low_orbit(&self) -> impl Iterator<Item = usize> + '_ {
        self.planes.iter().flat_map(|r| r.clone())
    }
}

/// Build the symmetric adjacency matrix.
pub(super) fn build(
    inputs: &LinkInputs<'_>,
    pool: &RowStripedPool,
    same_orbit_threshold_km: f64,
) -> Vec<Vec<bool>> {
    let n = inputs.len();
    let picks = pool.map_rows(n, |i| match inputs.node_types[i] {
        NodeType::LowOrbitSat => {
            let mut picks = same_orbit_neighbours(inputs, i, same_orbit_threshold_km);
            picks.extend(cross_orbit_neighbours(inputs, i));
            picks
        }
        NodeType::HighOrbitSat => Vec::new(),
        NodeType::GroundStation | NodeType::Missile | NodeType::User => {
            nearest_low_orbit(inputs, i).into_iter().collect()
        }
    });

    let mut adjacency = vec![vec![false; n]; n];
    for (i, row) in picks.into_iter().enumerate() {
        for j in row {
            adjacency[i][j] = true;
            adjacency[j][i] = true;
        }
    }
    adjacency
}

/// Nearest plane mate in each angular direction.
fn same_orbit_neighbours(inputs: &LinkInputs<'_>, i: usize, threshold_km: f64) -> Vec<usize> {
    let Some(plane) = inputs.plane_of[i] else {
        return Vec::new();
    };

    let mut ahead: Option<(usize, f64)> = None;
    let mut behind: Option<(usize, f64)> = None;
    for j in inputs.planes[plane].clone() {
        if j == i || (inputs.altitudes[i] - inputs.altitudes[j]).abs() >= threshold_km {
            continue;
        }
        let delta = inputs.positions[i].angle_delta(&inputs.positions[j]);
        let side = if delta > 0.0 { &mut ahead } else { &mut behind };
        if side.map_or(true, |(_, best)| delta.abs() < best) {
            *side = Some((j, delta.abs()));
        }
    }

    ahead.into_iter().chain(behind).map(|(j, _)| j).collect()
}

/// The physically nearest low-orbit satellites outside the node's own plane.
fn cross_orbit_neighbours(inputs: &LinkInputs<'_>, i: usize) -> Vec<usize> {
    let own = inputs.plane_of[i];
    let mut candidates: Vec<(f64, usize)> = inputs
        .low_orbit()
        .filter(|&j| inputs.plane_of[j] != own)
        .map(|j| (inputs.distances[i][j], j))
        .collect();
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    candidates
        .into_iter()
        .take(CROSS_ORBIT_LINKS)
        .map(|(_, j)| j)
        .collect()
}

fn nearest_low_orbit(inputs: &LinkInputs<'_>, i: usize) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for j in inputs.low_orbit() {
        let d = inputs.distances[i][j];
        if best.map_or(true, |(_, b)| d < b) {
            best = Some((j, d));
        }
    }
    best.map(|(j, _)| j)
}
