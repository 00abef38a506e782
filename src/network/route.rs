use petgraph::algo::dijkstra;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

/// Distance used for pairs without a direct link
pub const UNREACHABLE: f64 = f64::INFINITY;

/// Undirected link graph weighted by distance in km. Graph node `k` is model index `k`.
pub type LinkGraph = UnGraph<(), f64>;

pub(super) fn link_graph(distances: &[Vec<f64>], adjacency: &[Vec<bool>]) -> LinkGraph {
    let n = adjacency.len();
    let mut graph = LinkGraph::with_capacity(n, n * 3);
    for _ in 0..n {
        graph.add_node(());
    }
    for (i, row) in adjacency.iter().enumerate() {
        for (j, &linked) in row.iter().enumerate().skip(i + 1) {
            if linked {
                graph.add_edge(NodeIndex::new(i), NodeIndex::new(j), distances[i][j]);
            }
        }
    }
    graph
}

/// Single-source shortest paths from `src`, reduced to the first hop towards every destination:
/// `Some(src)` for the source itself, `None` for unreachable destinations.
///
/// Destinations are settled in ascending cost, so a predecessor's first hop is always known
/// before the nodes it leads to.
pub(super) fn first_hops(src: usize, graph: &LinkGraph) -> Vec<Option<usize>> {
    let n = graph.node_count();
    let mut first: Vec<Option<usize>> = vec![None; n];
    if src >= n {
        return first;
    }
    let source = NodeIndex::new(src);
    let cost = dijkstra(graph, source, None, |e| *e.weight());

    let mut settled: Vec<(NodeIndex, f64)> = cost.iter().map(|(&v, &c)| (v, c)).collect();
    settled.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    first[src] = Some(src);
    for (v, c) in settled {
        if v == source {
            continue;
        }
        // tightest incoming edge among already settled neighbours
        let predecessor = graph
            .edges(v)
            .filter(|e| first[e.target().index()].is_some())
            .filter_map(|e| cost.get(&e.target()).map(|&cu| (e.target(), (cu + *e.weight() - c).abs())))
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(u, _)| u);

        first[v.index()] = match predecessor {
            Some(u) if u == source => Some(v.index()),
            Some(u) => first[u.index()],
            None => None,
        };
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> (Vec<Vec<f64>>, Vec<Vec<bool>>) {
        let mut adjacency = vec![vec![false; n]; n];
        for i in 0..n - 1 {
            adjacency[i][i + 1] = true;
            adjacency[i + 1][i] = true;
        }
        let distances = (0..n)
            .map(|i| (0..n).map(|j| (i as f64 - j as f64).abs()).collect())
            .collect();
        (distances, adjacency)
    }

    #[test]
    fn test_link_graph_has_one_edge_per_link() {
        let (d, a) = line(4);
        let graph = link_graph(&d, &a);
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn test_first_hops_on_a_line() {
        let (d, a) = line(4);
        let g = link_graph(&d, &a);
        assert_eq!(first_hops(0, &g), vec![Some(0), Some(1), Some(1), Some(1)]);
        assert_eq!(first_hops(2, &g), vec![Some(1), Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn test_unreachable_is_none() {
        let (d, mut a) = line(3);
        a[1][2] = false;
        a[2][1] = false;
        let g = link_graph(&d, &a);
        assert_eq!(first_hops(0, &g), vec![Some(0), Some(1), None]);
        assert_eq!(first_hops(2, &g), vec![None, None, Some(2)]);
    }

    #[test]
    fn test_prefers_shorter_detour() {
        // 0-1 direct is long, 0-2-1 is short
        let d = vec![
            vec![0.0, 10.0, 1.0],
            vec![10.0, 0.0, 1.0],
            vec![1.0, 1.0, 0.0],
        ];
        let a = vec![vec![false, true, true], vec![true, false, true], vec![true, true, false]];
        let g = link_graph(&d, &a);
        assert_eq!(first_hops(0, &g)[1], Some(2));
        assert_eq!(first_hops(1, &g)[0], Some(2));
    }

    #[test]
    fn test_first_hop_propagates_down_the_tree() {
        // 0 - 1 - 2 - 3 with a long 0-3 chord
        let (mut d, mut a) = line(4);
        a[0][3] = true;
        a[3][0] = true;
        d[0][3] = 100.0;
        d[3][0] = 100.0;
        let g = link_graph(&d, &a);
        assert_eq!(first_hops(0, &g), vec![Some(0), Some(1), Some(1), Some(1)]);
        assert_eq!(first_hops(3, &g)[0], Some(2));
    }
}
