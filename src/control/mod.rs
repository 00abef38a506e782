//! Control client: owns the orbit model and the computed network
//!
//! All queries take the read side of one `RwLock`. A refresh fetches the next snapshot and
//! recomputes the network on the worker pool without holding the lock, then swaps the new pair in
//! under the write lock. A separate mutex keeps refreshes from overlapping.

pub mod source;
pub mod sync;

pub use source::{HttpPositionSource, PositionSource, StaticPositionSource};
pub use sync::run_sync_loop;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::config::{Config, RefreshPolicy};
use crate::crd::{build_routes, build_topologies};
use crate::error::{AppError, AppResult};
use crate::k8s::{create_pod_spec, place, ClusterClients, PlacementInput, SyncReport};
use crate::models::NodeType;
use crate::network::{Network, NetworkParams, RowStripedPool};
use crate::orbit::OrbitModel;

/// One step of a hop-level fan-out, by UUID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SpreadLink {
    pub level: usize,
    pub start: String,
    pub end: String,
}

/// What a refresh changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub membership_changed: bool,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Surviving nodes whose index moved; their pods carry a stale global address
    pub reindexed: Vec<String>,
}

/// Summary of the installed state
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StateSummary {
    pub timestamp: DateTime<Utc>,
    pub nodes: usize,
    pub edges: usize,
    pub node_types: BTreeMap<String, usize>,
}

pub struct ControlState {
    pub orbit: OrbitModel,
    pub network: Network,
}

pub struct ControlClient {
    source: Arc<dyn PositionSource>,
    state: RwLock<ControlState>,
    refresh: Mutex<()>,
    pool: Arc<RowStripedPool>,
    params: NetworkParams,
    config: Config,
    cluster: Option<ClusterClients>,
}

impl ControlClient {
    /// Fetch the first snapshot under the startup retry policy and compute the network.
    #[instrument(skip_all)]
    pub async fn connect(
        config: &Config,
        source: Arc<dyn PositionSource>,
        cluster: Option<ClusterClients>,
    ) -> AppResult<Self> {
        let pool = Arc::new(RowStripedPool::new(config.worker_threads)?);
        let params = NetworkParams {
            same_orbit_threshold_km: config.same_orbit_threshold_km,
        };

        let fetcher = source.clone();
        let snapshot = config
            .startup_retry()
            .run("position fetch", |_| {
                let fetcher = fetcher.clone();
                async move { fetcher.fetch().await }
            })
            .await?;
        let orbit = OrbitModel::from_snapshot(&snapshot, config.high_orbit_altitude_km)?;
        let (orbit, network) = recompute(pool.clone(), params.clone(), orbit).await?;

        info!(
            nodes = orbit.len(),
            low_orbit = orbit.count(NodeType::LowOrbitSat),
            edges = network.edge_count(),
            "Control client ready"
        );

        Ok(Self {
            source,
            state: RwLock::new(ControlState { orbit, network }),
            refresh: Mutex::new(()),
            pool,
            params,
            config: config.clone(),
            cluster,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn has_cluster(&self) -> bool {
        self.cluster.is_some()
    }

    fn cluster(&self) -> AppResult<&ClusterClients> {
        self.cluster
            .as_ref()
            .ok_or_else(|| AppError::Unavailable("no cluster configured".to_string()))
    }

    /// Re-fetch positions, apply the refresh policy and recompute the network.
    pub async fn fetch_and_update(&self) -> AppResult<RefreshOutcome> {
        let _refresh = self.refresh.lock().await;
        let result = self.refresh_locked().await;
        let label = if result.is_ok() { "ok" } else { "error" };
        counter!("sdn_refresh_total", 1, "result" => label);
        result
    }

    async fn refresh_locked(&self) -> AppResult<RefreshOutcome> {
        let snapshot = self.source.fetch().await?;
        let mut orbit = self.state.read().await.orbit.clone();
        let report = orbit.update(&snapshot)?;

        let mut outcome = RefreshOutcome::default();
        if report.membership_changed() {
            match self.config.refresh_policy {
                RefreshPolicy::Rebuild => {
                    info!(
                        added = report.unknown.len(),
                        removed = report.missing.len(),
                        "Node set changed, rebuilding orbit model"
                    );
                    let rebuilt =
                        OrbitModel::from_snapshot(&snapshot, self.config.high_orbit_altitude_km)?;
                    let reindexed = rebuilt.meta().reindexed_since(orbit.meta());
                    orbit = rebuilt;
                    outcome = RefreshOutcome {
                        membership_changed: true,
                        added: report.unknown,
                        removed: report.missing,
                        reindexed,
                    };
                }
                RefreshPolicy::RetainStale => {
                    warn!(
                        missing = report.missing.len(),
                        unknown = report.unknown.len(),
                        "Node set changed, keeping stale positions"
                    );
                }
                RefreshPolicy::Strict => {
                    return Err(AppError::BadRequest(format!(
                        "snapshot node set changed: {} missing, {} unknown",
                        report.missing.len(),
                        report.unknown.len()
                    )));
                }
            }
        }

        let (orbit, network) = recompute(self.pool.clone(), self.params.clone(), orbit).await?;
        *self.state.write().await = ControlState { orbit, network };
        Ok(outcome)
    }

    /// Server-side apply the pod of every node.
    pub async fn apply_pods(&self) -> AppResult<usize> {
        self.apply_pods_matching(None).await
    }

    /// Server-side apply pods for the given UUIDs only.
    pub async fn apply_pods_for(&self, uuids: &[String]) -> AppResult<usize> {
        let wanted: HashSet<&str> = uuids.iter().map(String::as_str).collect();
        self.apply_pods_matching(Some(&wanted)).await
    }

    async fn apply_pods_matching(&self, only: Option<&HashSet<&str>>) -> AppResult<usize> {
        let cluster = self.cluster()?;
        let machines = cluster.worker_machines(self.config.machine_count).await?;

        let pods = {
            let state = self.state.read().await;
            let placement = place(
                self.config.placement,
                &PlacementInput {
                    model: &state.orbit,
                    network: &state.network,
                    machines: &machines,
                    default_capacity: self.config.default_machine_capacity,
                    capacities: &self.config.machine_capacity,
                    partition: self.config.partition_params(),
                },
            )?;
            state
                .orbit
                .nodes()
                .enumerate()
                .filter(|(_, node)| only.map_or(true, |set| set.contains(node.uuid.as_str())))
                .map(|(index, node)| {
                    create_pod_spec(
                        &node.uuid,
                        index,
                        &self.config.pod_image,
                        placement.get(&node.uuid).map(String::as_str),
                    )
                })
                .collect::<Vec<_>>()
        };

        for pod in &pods {
            cluster.apply_pod(pod).await?;
        }
        info!(count = pods.len(), "Applied pods");
        Ok(pods.len())
    }

    /// Delete pods and wait until they are gone, so the same names can be applied again.
    pub async fn delete_pods(&self, uuids: &[String]) -> AppResult<()> {
        let cluster = self.cluster()?;
        for uuid in uuids {
            cluster.delete_pod(uuid).await?;
        }
        let policy = self.config.agent_retry();
        for uuid in uuids {
            cluster.wait_pod_deleted(uuid, &policy).await?;
        }
        Ok(())
    }

    /// Create the Topology object of every node.
    pub async fn apply_topologies(&self) -> AppResult<SyncReport> {
        let cluster = self.cluster()?;
        let objects = {
            let state = self.state.read().await;
            build_topologies(state.orbit.meta().uuids(), &state.network)
        };
        cluster.create_objects(&objects).await
    }

    /// Replace Topology objects with the current links and prune unknown ones.
    pub async fn update_topologies(&self) -> AppResult<SyncReport> {
        let cluster = self.cluster()?;
        let objects = {
            let state = self.state.read().await;
            build_topologies(state.orbit.meta().uuids(), &state.network)
        };
        cluster.sync_objects(objects, true).await
    }

    /// Create the Route object of every node, waiting for pod addresses first.
    pub async fn apply_routes(&self) -> AppResult<SyncReport> {
        let cluster = self.cluster()?;
        let uuids = self.uuids().await;
        let policy = self.config.agent_retry();

        let mut pod_ips = std::collections::HashMap::with_capacity(uuids.len());
        for uuid in &uuids {
            let ip = cluster.wait_pod_ip(uuid, &policy).await?;
            pod_ips.insert(uuid.clone(), ip);
        }

        let objects = self.route_objects(&pod_ips).await;
        cluster.create_objects(&objects).await
    }

    /// Replace Route objects with the current next hops and prune unknown ones.
    /// Pods without an address yet get an empty `podip`; the reconciler resolves it later.
    pub async fn update_routes(&self) -> AppResult<SyncReport> {
        let cluster = self.cluster()?;
        let uuids = self.uuids().await;

        let mut pod_ips = std::collections::HashMap::with_capacity(uuids.len());
        for uuid in &uuids {
            if let Some(ip) = cluster.pod_ip(uuid).await? {
                pod_ips.insert(uuid.clone(), ip);
            }
        }

        let objects = self.route_objects(&pod_ips).await;
        cluster.sync_objects(objects, true).await
    }

    async fn route_objects(
        &self,
        pod_ips: &std::collections::HashMap<String, String>,
    ) -> Vec<crate::crd::Route> {
        let state = self.state.read().await;
        let uuids = state.orbit.meta().uuids();
        let by_index: Vec<String> = uuids
            .iter()
            .map(|u| pod_ips.get(u).cloned().unwrap_or_default())
            .collect();
        build_routes(uuids, &state.network, &by_index)
    }

    async fn uuids(&self) -> Vec<String> {
        self.state.read().await.orbit.meta().uuids().to_vec()
    }

    // Queries

    pub async fn summary(&self) -> StateSummary {
        let state = self.state.read().await;
        let node_types = [
            NodeType::LowOrbitSat,
            NodeType::HighOrbitSat,
            NodeType::GroundStation,
            NodeType::Missile,
            NodeType::User,
        ]
        .into_iter()
        .map(|t| (t.to_string(), state.orbit.count(t)))
        .collect();
        StateSummary {
            timestamp: state.orbit.timestamp(),
            nodes: state.orbit.len(),
            edges: state.network.edge_count(),
            node_types,
        }
    }

    /// Undirected edges as UUID pairs, in ascending index order.
    pub async fn topology_graph(&self) -> Vec<[String; 2]> {
        let state = self.state.read().await;
        let meta = state.orbit.meta();
        state
            .network
            .topo_edges()
            .into_iter()
            .filter_map(|(i, j)| Some([meta.uuid_of(i)?.to_string(), meta.uuid_of(j)?.to_string()]))
            .collect()
    }

    pub async fn connection(&self, src: &str, dst: &str) -> AppResult<bool> {
        let state = self.state.read().await;
        let (i, j) = (index(&state, src)?, index(&state, dst)?);
        state.network.check_connection(i, j)
    }

    pub async fn distance(&self, src: &str, dst: &str) -> AppResult<f64> {
        let state = self.state.read().await;
        let (i, j) = (index(&state, src)?, index(&state, dst)?);
        state.network.distance(i, j)
    }

    /// Route as UUIDs including both endpoints, `None` when unreachable.
    pub async fn route(&self, src: &str, dst: &str) -> AppResult<Option<Vec<String>>> {
        let state = self.state.read().await;
        let (i, j) = (index(&state, src)?, index(&state, dst)?);
        match state.network.route_from_to(i, j) {
            Ok(path) => Ok(Some(uuids_of(&state, &path))),
            Err(AppError::NoRoute { .. }) => Ok(None),
            Err(e) => Err(named_loop(&state, e)),
        }
    }

    /// Path length in nodes from `src` to each target, `None` for unreachable targets.
    pub async fn route_hops(&self, src: &str, targets: &[String]) -> AppResult<Vec<Option<usize>>> {
        let state = self.state.read().await;
        let i = index(&state, src)?;
        let targets = targets
            .iter()
            .map(|t| index(&state, t))
            .collect::<AppResult<Vec<_>>>()?;
        state
            .network
            .route_hops(i, &targets)
            .map_err(|e| named_loop(&state, e))
    }

    pub async fn spread(&self, src: &str) -> AppResult<Vec<SpreadLink>> {
        let state = self.state.read().await;
        let i = index(&state, src)?;
        let links = state.network.spread_by_hop(i)?;
        Ok(links
            .into_iter()
            .filter_map(|l| {
                Some(SpreadLink {
                    level: l.level,
                    start: state.orbit.uuid_of(l.start)?.to_string(),
                    end: state.orbit.uuid_of(l.end)?.to_string(),
                })
            })
            .collect())
    }
}

#[cfg(test)]
impl ControlClient {
    pub(crate) async fn edit_network(&self, edit: impl FnOnce(&mut Network)) {
        edit(&mut self.state.write().await.network);
    }
}

fn index(state: &ControlState, uuid: &str) -> AppResult<usize> {
    state
        .orbit
        .index_of(uuid)
        .ok_or_else(|| AppError::unknown_uuid(uuid))
}

/// Report a routing loop by UUID instead of index.
fn named_loop(state: &ControlState, e: AppError) -> AppError {
    match e {
        AppError::RoutingLoop(at) => AppError::RoutingLoop(
            at.parse::<usize>()
                .ok()
                .and_then(|k| state.orbit.uuid_of(k))
                .map(str::to_string)
                .unwrap_or(at),
        ),
        other => other,
    }
}

fn uuids_of(state: &ControlState, path: &[usize]) -> Vec<String> {
    path.iter()
        .filter_map(|&k| state.orbit.uuid_of(k).map(str::to_string))
        .collect()
}

/// Compute the network off the async executor.
async fn recompute(
    pool: Arc<RowStripedPool>,
    params: NetworkParams,
    orbit: OrbitModel,
) -> AppResult<(OrbitModel, Network)> {
    let started = Instant::now();
    let (orbit, network) = tokio::task::spawn_blocking(move || {
        let network = Network::compute(&orbit, &pool, &params);
        (orbit, network)
    })
    .await
    .map_err(|e| AppError::Internal(format!("network computation failed: {}", e)))?;

    histogram!("sdn_recompute_seconds", started.elapsed().as_secs_f64());
    gauge!("sdn_nodes", orbit.len() as f64);
    gauge!("sdn_topology_edges", network.edge_count() as f64);
    Ok((orbit, network))
}
