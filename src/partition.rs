//! Node partitioning across worker machines
//!
//! Both partitioners return exactly `k` disjoint groups whose union is the input node set.
//! Groups may be empty.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{AppError, AppResult};

/// Tunables for [`linear_cut`]
#[derive(Debug, Clone, Copy)]
pub struct LinearCutParams {
    /// Capacity slack: a partition is considered full at `beta * N / K` nodes
    pub beta: f64,
    pub max_iterations: usize,
}

impl Default for LinearCutParams {
    fn default() -> Self {
        Self {
            beta: 1.0,
            max_iterations: 100,
        }
    }
}

fn check_parts(k: usize) -> AppResult<()> {
    if k == 0 {
        return Err(AppError::BadRequest(
            "partition count must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// `partition(id) = id mod k`
pub fn hash_partition(nodes: &[usize], k: usize) -> AppResult<Vec<Vec<usize>>> {
    check_parts(k)?;
    let mut groups = vec![Vec::new(); k];
    for &node in nodes {
        groups[node % k].push(node);
    }
    Ok(groups)
}

/// Iterative local search that keeps linked nodes together while penalising overfull parts.
///
/// Starts from the hash partition. Each step removes a node from its part and moves it to the part
/// with the best `neighbours_in(p) * (1 - |p| / C)` score; staying wins ties. Passes repeat until
/// nothing moves or `max_iterations` passes have run.
pub fn linear_cut(
    nodes: &[usize],
    edges: &[(usize, usize)],
    k: usize,
    params: LinearCutParams,
) -> AppResult<Vec<Vec<usize>>> {
    check_parts(k)?;
    if nodes.is_empty() {
        return Ok(vec![Vec::new(); k]);
    }

    let mut part: HashMap<usize, usize> = nodes.iter().map(|&n| (n, n % k)).collect();
    let mut sizes = vec![0usize; k];
    for &p in part.values() {
        sizes[p] += 1;
    }

    let mut neighbours: HashMap<usize, Vec<usize>> = HashMap::new();
    for &(a, b) in edges {
        if a == b || !part.contains_key(&a) || !part.contains_key(&b) {
            continue;
        }
        neighbours.entry(a).or_default().push(b);
        neighbours.entry(b).or_default().push(a);
    }

    let capacity = params.beta * nodes.len() as f64 / k as f64;
    let mut passes = 0;
    while passes < params.max_iterations {
        passes += 1;
        let mut moved = 0usize;

        for &node in nodes {
            let current = part[&node];
            sizes[current] -= 1;

            let mut linked = vec![0usize; k];
            for peer in neighbours.get(&node).into_iter().flatten() {
                linked[part[peer]] += 1;
            }
            let score = |p: usize| {
                let fill = if capacity > 0.0 { sizes[p] as f64 / capacity } else { 1.0 };
                linked[p] as f64 * (1.0 - fill)
            };

            let mut best = current;
            let mut best_score = score(current);
            for p in 0..k {
                let s = score(p);
                if s > best_score {
                    best = p;
                    best_score = s;
                }
            }

            sizes[best] += 1;
            if best != current {
                part.insert(node, best);
                moved += 1;
            }
        }

        if moved == 0 {
            break;
        }
    }
    debug!(nodes = nodes.len(), parts = k, passes, "Linear cut converged");

    let mut groups = vec![Vec::new(); k];
    for &node in nodes {
        groups[part[&node]].push(node);
    }
    Ok(groups)
}

/// Number of edges whose endpoints land in different groups.
pub fn cross_edges(groups: &[Vec<usize>], edges: &[(usize, usize)]) -> usize {
    let part: HashMap<usize, usize> = groups
        .iter()
        .enumerate()
        .flat_map(|(p, g)| g.iter().map(move |&n| (n, p)))
        .collect();
    edges
        .iter()
        .filter(|(a, b)| match (part.get(a), part.get(b)) {
            (Some(pa), Some(pb)) => pa != pb,
            _ => false,
        })
        .count()
}
