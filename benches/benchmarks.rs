//! Performance benchmarks for the constellation SDN engine
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use constellation_sdn::models::{PositionSnapshot, SatelliteRecord, SiteRecord};
use constellation_sdn::network::{Network, NetworkParams, RowStripedPool};
use constellation_sdn::orbit::OrbitModel;
use constellation_sdn::partition::{hash_partition, linear_cut, LinearCutParams};

/// Walker-style constellation: `planes` inclined planes of `per_plane` satellites and a few stations.
fn constellation(planes: usize, per_plane: usize) -> PositionSnapshot {
    let mut satellites = Vec::with_capacity(planes * per_plane);
    for p in 0..planes {
        for k in 0..per_plane {
            let phase = k as f64 * 360.0 / per_plane as f64;
            satellites.push(SatelliteRecord {
                uuid: format!("sat-{}-{}", p, k),
                lat: 53.0 * (phase.to_radians()).sin(),
                lon: (p as f64 * 360.0 / planes as f64 + phase) % 360.0 - 180.0,
                height: 550.0,
                track_id: p as i64,
                in_track_id: k as i64,
            });
        }
    }
    let stations = (0..8)
        .map(|s| SiteRecord {
            uuid: format!("gs-{}", s),
            lat: 30.0,
            lon: s as f64 * 45.0 - 180.0,
            height: 0.0,
        })
        .collect();
    PositionSnapshot {
        unix_time_stamp: 1_700_000_000_000,
        satellites,
        stations,
        ..Default::default()
    }
}

fn bench_network_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("network_compute");
    group.sample_size(10);
    let pool = RowStripedPool::new(8).unwrap();

    for (planes, per_plane) in [(4, 10), (8, 16), (12, 24)] {
        let model = OrbitModel::from_snapshot(&constellation(planes, per_plane), 30000.0).unwrap();
        group.throughput(Throughput::Elements(model.len() as u64));
        group.bench_with_input(BenchmarkId::new("compute", model.len()), &model, |b, model| {
            b.iter(|| Network::compute(black_box(model), &pool, &NetworkParams::default()));
        });
    }

    group.finish();
}

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");
    let pool = RowStripedPool::new(8).unwrap();

    for (planes, per_plane) in [(4, 10), (12, 24)] {
        let model = OrbitModel::from_snapshot(&constellation(planes, per_plane), 30000.0).unwrap();
        let network = Network::compute(&model, &pool, &NetworkParams::default());
        let nodes: Vec<usize> = (0..model.len()).collect();
        let edges = network.topo_edges();

        group.bench_with_input(BenchmarkId::new("hash", nodes.len()), &nodes, |b, nodes| {
            b.iter(|| hash_partition(black_box(nodes), 4).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("linear_cut", nodes.len()), &nodes, |b, nodes| {
            b.iter(|| linear_cut(black_box(nodes), &edges, 4, LinearCutParams::default()).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_network_compute, bench_partition);
criterion_main!(benches);
