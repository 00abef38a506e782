//! Partitioner properties

use std::collections::BTreeSet;

use constellation_sdn::partition::{cross_edges, hash_partition, linear_cut, LinearCutParams};

fn assert_covers(groups: &[Vec<usize>], nodes: &[usize], k: usize) {
    assert_eq!(groups.len(), k);
    let total: usize = groups.iter().map(Vec::len).sum();
    assert_eq!(total, nodes.len(), "groups overlap");
    let union: BTreeSet<usize> = groups.iter().flatten().copied().collect();
    assert_eq!(union, nodes.iter().copied().collect::<BTreeSet<_>>());
}

fn chain(n: usize) -> Vec<(usize, usize)> {
    (0..n - 1).map(|i| (i, i + 1)).collect()
}

#[test]
fn test_seven_nodes_into_three_parts() {
    let nodes: Vec<usize> = (0..7).collect();
    let edges = chain(7);

    let hashed = hash_partition(&nodes, 3).unwrap();
    assert_covers(&hashed, &nodes, 3);
    assert_eq!(hashed[0], vec![0, 3, 6]);

    let cut = linear_cut(&nodes, &edges, 3, LinearCutParams::default()).unwrap();
    assert_covers(&cut, &nodes, 3);
}

#[test]
fn test_linear_cut_does_not_cut_more_than_hash() {
    let nodes: Vec<usize> = (0..12).collect();
    let mut edges = chain(12);
    edges.push((11, 0));

    let hashed = hash_partition(&nodes, 3).unwrap();
    let cut = linear_cut(&nodes, &edges, 3, LinearCutParams::default()).unwrap();
    assert_covers(&cut, &nodes, 3);
    assert!(cross_edges(&cut, &edges) <= cross_edges(&hashed, &edges));
}

#[test]
fn test_more_parts_than_nodes() {
    let nodes = vec![4, 9];
    let groups = linear_cut(&nodes, &[(4, 9)], 5, LinearCutParams::default()).unwrap();
    assert_covers(&groups, &nodes, 5);
    assert!(hash_partition(&nodes, 0).is_err());
}
