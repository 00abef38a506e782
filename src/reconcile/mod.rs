//! Level-triggered reconcilers for Topology and Route objects
//!
//! Each reconcile walks `NeedsDiff -> Pushing -> Committing -> Converged`: diff the pushed status
//! against `spec`, push deletions then additions then updates to the owning agent, and finally
//! record the pushed entries in status. Re-running on an unchanged object pushes nothing.

pub mod agent;
pub mod controller;
pub mod diff;
pub mod locks;
pub mod state;
pub mod store;

pub use agent::{AgentApi, AgentKind, AgentOp, HttpAgent};
pub use diff::{converged, diff, Keyed, Plan};
pub use locks::ShardedLocks;
pub use state::{Phase, ReconcileOutcome};
pub use controller::{run_all, run_controller, Context};
pub use store::{KubeStore, ObjectStore};

use std::fmt::Debug;
use std::sync::Arc;

use kube::{Resource, ResourceExt};
use metrics::counter;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::crd::{Link, Route, RouteStatus, SubPath, Topology, TopologyStatus};
use crate::error::{AppError, AppResult};
use crate::retry::{retry_on_conflict, RetryPolicy};

/// A custom resource whose spec is pushed to a network agent
pub trait Reconciled: Resource + Clone + Debug + Send + Sync + 'static {
    type Entry: Keyed + PartialEq + Serialize + Debug + Send + Sync;

    const KIND: AgentKind;

    fn desired(&self) -> &[Self::Entry];

    /// Entries last pushed, `None` if never pushed.
    fn observed(&self) -> Option<&[Self::Entry]>;

    /// Record pushed entries in status. Agent-owned status fields are left alone.
    fn commit(&mut self, pushed: Vec<Self::Entry>);

    /// Agent address carried by the object, if any.
    fn agent_host(&self) -> Option<String>;
}

impl Reconciled for Topology {
    type Entry = Link;

    const KIND: AgentKind = AgentKind::Topology;

    fn desired(&self) -> &[Link] {
        &self.spec.links
    }

    fn observed(&self) -> Option<&[Link]> {
        self.status.as_ref().and_then(|s| s.links.as_deref())
    }

    fn commit(&mut self, pushed: Vec<Link>) {
        self.status
            .get_or_insert_with(TopologyStatus::default)
            .links = Some(pushed);
    }

    fn agent_host(&self) -> Option<String> {
        self.status
            .as_ref()
            .map(|s| s.src_ip.clone())
            .filter(|ip| !ip.is_empty())
    }
}

impl Reconciled for Route {
    type Entry = SubPath;

    const KIND: AgentKind = AgentKind::Route;

    fn desired(&self) -> &[SubPath] {
        &self.spec.subpaths
    }

    fn observed(&self) -> Option<&[SubPath]> {
        self.status.as_ref().and_then(|s| s.subpaths.as_deref())
    }

    fn commit(&mut self, pushed: Vec<SubPath>) {
        self.status
            .get_or_insert_with(RouteStatus::default)
            .subpaths = Some(pushed);
    }

    fn agent_host(&self) -> Option<String> {
        Some(self.spec.podip.clone()).filter(|ip| !ip.is_empty())
    }
}

pub struct Reconciler<K: Reconciled> {
    store: Arc<dyn ObjectStore<K>>,
    agent: Arc<dyn AgentApi>,
    locks: Arc<ShardedLocks>,
    pod_ip_retry: RetryPolicy,
    conflict_attempts: u32,
}

impl<K: Reconciled> Reconciler<K> {
    pub fn new(
        store: Arc<dyn ObjectStore<K>>,
        agent: Arc<dyn AgentApi>,
        locks: Arc<ShardedLocks>,
        pod_ip_retry: RetryPolicy,
        conflict_attempts: u32,
    ) -> Self {
        Self {
            store,
            agent,
            locks,
            pod_ip_retry,
            conflict_attempts,
        }
    }

    /// Drive the object named `name` to its desired state.
    #[instrument(skip(self), fields(kind = %K::KIND))]
    pub async fn reconcile(&self, name: &str) -> AppResult<ReconcileOutcome> {
        let result = self.run(name).await;
        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(_) => "error",
        };
        counter!(
            "sdn_reconcile_total",
            1,
            "kind" => K::KIND.to_string(),
            "result" => label
        );
        result
    }

    async fn run(&self, name: &str) -> AppResult<ReconcileOutcome> {
        let object = match self.store.get(name).await {
            Ok(Some(object)) => object,
            Ok(None) => return Ok(ReconcileOutcome::Deleted),
            Err(e) if e.is_not_found() => return Ok(ReconcileOutcome::Deleted),
            Err(e) => return Err(e),
        };
        let desired = object.desired().to_vec();

        let mut outcome = ReconcileOutcome::UpToDate;
        let mut phase: Phase<K::Entry> = Phase::NeedsDiff;
        loop {
            debug!(phase = phase.name(), "Reconcile step");
            phase = match phase {
                Phase::NeedsDiff => {
                    if converged(object.observed(), &desired) {
                        Phase::Converged
                    } else {
                        Phase::Pushing(diff(object.observed(), &desired))
                    }
                }
                Phase::Pushing(plan) => {
                    self.push(&object, &plan).await?;
                    Phase::Committing(plan)
                }
                Phase::Committing(plan) => {
                    self.commit(name, &desired).await?;
                    outcome = ReconcileOutcome::Pushed {
                        del: plan.del.len(),
                        add: plan.add.len(),
                        update: plan.update.len(),
                    };
                    info!(
                        name,
                        del = plan.del.len(),
                        add = plan.add.len(),
                        update = plan.update.len(),
                        "Reconciled"
                    );
                    Phase::Converged
                }
                Phase::Converged => break,
            };
        }
        Ok(outcome)
    }

    async fn resolve_host(&self, object: &K) -> AppResult<String> {
        if let Some(host) = object.agent_host() {
            return Ok(host);
        }
        let name = object.name_any();
        match K::KIND {
            AgentKind::Route => {
                let store = &self.store;
                let name = name.as_str();
                self.pod_ip_retry
                    .run("pod ip", |_| async move {
                        store.pod_ip(name).await?.ok_or_else(|| {
                            AppError::Unavailable(format!("pod {} has no IP yet", name))
                        })
                    })
                    .await
            }
            AgentKind::Topology => Err(AppError::Unavailable(format!(
                "topology {} has no agent address yet",
                name
            ))),
        }
    }

    async fn push(&self, object: &K, plan: &Plan<K::Entry>) -> AppResult<()> {
        if plan.is_empty() {
            return Ok(());
        }
        let host = self.resolve_host(object).await?;
        let _guards = self.locks.lock_many(plan.lock_keys()).await;

        for (op, entries) in [
            (AgentOp::Del, &plan.del),
            (AgentOp::Apply, &plan.add),
            (AgentOp::Update, &plan.update),
        ] {
            if entries.is_empty() {
                continue;
            }
            let body = serde_json::to_value(entries)?;
            self.agent.push(K::KIND, &host, op, body).await?;
        }
        Ok(())
    }

    async fn commit(&self, name: &str, pushed: &[K::Entry]) -> AppResult<()> {
        let store = &self.store;
        retry_on_conflict(self.conflict_attempts, || async move {
            let Some(mut latest) = store.get(name).await? else {
                return Ok(());
            };
            latest.commit(pushed.to_vec());
            store.replace_status(&latest).await.map(|_| ())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::agent::MockAgentApi;
    use super::*;
    use crate::crd::{LinkProperties, RouteSpec, TopologySpec};
    use async_trait::async_trait;
    use mockall::Sequence;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory object store with injectable write conflicts
    struct FakeStore<K> {
        objects: Mutex<HashMap<String, K>>,
        pod_ips: Mutex<HashMap<String, String>>,
        conflicts: AtomicU32,
        status_writes: AtomicU32,
    }

    impl<K: Reconciled> FakeStore<K> {
        fn with(object: K) -> Arc<Self> {
            let mut objects = HashMap::new();
            objects.insert(object.name_any(), object);
            Arc::new(Self {
                objects: Mutex::new(objects),
                pod_ips: Mutex::new(HashMap::new()),
                conflicts: AtomicU32::new(0),
                status_writes: AtomicU32::new(0),
            })
        }

        fn object(&self, name: &str) -> K {
            self.objects.lock().unwrap()[name].clone()
        }
    }

    #[async_trait]
    impl<K: Reconciled> ObjectStore<K> for FakeStore<K> {
        async fn get(&self, name: &str) -> AppResult<Option<K>> {
            Ok(self.objects.lock().unwrap().get(name).cloned())
        }

        async fn replace_status(&self, object: &K) -> AppResult<K> {
            if self.conflicts.load(Ordering::SeqCst) > 0 {
                self.conflicts.fetch_sub(1, Ordering::SeqCst);
                return Err(AppError::Conflict("stale resourceVersion".into()));
            }
            self.status_writes.fetch_add(1, Ordering::SeqCst);
            self.objects
                .lock()
                .unwrap()
                .insert(object.name_any(), object.clone());
            Ok(object.clone())
        }

        async fn pod_ip(&self, name: &str) -> AppResult<Option<String>> {
            Ok(self.pod_ips.lock().unwrap().get(name).cloned())
        }
    }

    fn sub(name: &str, nextip: &str) -> SubPath {
        SubPath {
            name: name.to_string(),
            targetip: format!("10.233.0.{}", name.len()),
            nextip: nextip.to_string(),
        }
    }

    fn route(podip: &str, spec: Vec<SubPath>, status: Option<Vec<SubPath>>) -> Route {
        let mut route = Route::new(
            "sat-0",
            RouteSpec {
                podip: podip.to_string(),
                subpaths: spec,
            },
        );
        route.status = status.map(|s| RouteStatus { subpaths: Some(s) });
        route
    }

    fn reconciler<K: Reconciled>(store: Arc<FakeStore<K>>, agent: MockAgentApi) -> Reconciler<K> {
        Reconciler::new(
            store,
            Arc::new(agent),
            Arc::new(ShardedLocks::new(8)),
            RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)),
            5,
        )
    }

    #[tokio::test]
    async fn test_second_reconcile_pushes_nothing() {
        let store = FakeStore::with(route("10.42.0.5", vec![sub("A", "ip1"), sub("B", "ip2")], None));
        let mut agent = MockAgentApi::new();
        agent
            .expect_push()
            .withf(|kind, _, op, body| {
                *kind == AgentKind::Route
                    && *op == AgentOp::Apply
                    && body.as_array().map(Vec::len) == Some(2)
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let reconciler = reconciler(store.clone(), agent);

        let first = reconciler.reconcile("sat-0").await.unwrap();
        assert_eq!(first, ReconcileOutcome::Pushed { del: 0, add: 2, update: 0 });

        let second = reconciler.reconcile("sat-0").await.unwrap();
        assert_eq!(second, ReconcileOutcome::UpToDate);
        assert_eq!(store.status_writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_push_order_is_del_add_update() {
        let store = FakeStore::with(route(
            "10.42.0.5",
            vec![sub("B", "ip3"), sub("C", "ip4")],
            Some(vec![sub("A", "ip1"), sub("B", "ip2")]),
        ));
        let mut agent = MockAgentApi::new();
        let mut seq = Sequence::new();
        for expected in [AgentOp::Del, AgentOp::Apply, AgentOp::Update] {
            agent
                .expect_push()
                .withf(move |_, _, op, _| *op == expected)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _, _, _| Ok(()));
        }
        let reconciler = reconciler(store.clone(), agent);

        let outcome = reconciler.reconcile("sat-0").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Pushed { del: 1, add: 1, update: 1 });
        let status = store.object("sat-0").status.unwrap().subpaths.unwrap();
        assert_eq!(status, vec![sub("B", "ip3"), sub("C", "ip4")]);
    }

    #[tokio::test]
    async fn test_failed_push_leaves_status_untouched() {
        let store = FakeStore::with(route("10.42.0.5", vec![sub("A", "ip1")], None));
        let mut agent = MockAgentApi::new();
        agent
            .expect_push()
            .returning(|_, _, _, _| Err(AppError::Unavailable("agent down".into())));
        let reconciler = reconciler(store.clone(), agent);

        assert!(reconciler.reconcile("sat-0").await.is_err());
        assert!(store.object("sat-0").status.is_none());
    }

    #[tokio::test]
    async fn test_commit_retries_conflicts_and_keeps_agent_fields() {
        let mut topology = Topology::new(
            "sat-0",
            TopologySpec {
                links: vec![Link {
                    uid: 1,
                    peer_pod: "sat-1".into(),
                    properties: LinkProperties::with_latency("1.000ms".into()),
                    ..Default::default()
                }],
            },
        );
        topology.status = Some(TopologyStatus {
            skipped: vec!["sat-9".into()],
            src_ip: "192.168.0.2".into(),
            net_ns: "/var/run/netns/sat-0".into(),
            links: None,
        });
        let store = FakeStore::with(topology);
        store.conflicts.store(2, Ordering::SeqCst);

        let mut agent = MockAgentApi::new();
        agent
            .expect_push()
            .withf(|kind, host, op, _| {
                *kind == AgentKind::Topology && host == "192.168.0.2" && *op == AgentOp::Apply
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let reconciler = reconciler(store.clone(), agent);

        reconciler.reconcile("sat-0").await.unwrap();
        let status = store.object("sat-0").status.unwrap();
        assert_eq!(status.src_ip, "192.168.0.2");
        assert_eq!(status.skipped, vec!["sat-9".to_string()]);
        assert_eq!(status.links.map(|l| l.len()), Some(1));
    }

    #[tokio::test]
    async fn test_topology_without_agent_address_is_retried_later() {
        let store = FakeStore::with(Topology::new(
            "sat-0",
            TopologySpec {
                links: vec![Link {
                    uid: 1,
                    ..Default::default()
                }],
            },
        ));
        let agent = MockAgentApi::new();
        let reconciler = reconciler(store, agent);

        let err = reconciler.reconcile("sat-0").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_route_resolves_pod_ip() {
        let store = FakeStore::with(route("", vec![sub("A", "ip1")], None));
        store
            .pod_ips
            .lock()
            .unwrap()
            .insert("sat-0".into(), "10.42.1.9".into());
        let mut agent = MockAgentApi::new();
        agent
            .expect_push()
            .withf(|_, host, _, _| host == "10.42.1.9")
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let reconciler = reconciler(store, agent);

        reconciler.reconcile("sat-0").await.unwrap();
    }

    #[tokio::test]
    async fn test_deleted_object_is_done() {
        let store = FakeStore::with(route("10.42.0.5", vec![], None));
        store.objects.lock().unwrap().clear();
        let reconciler = reconciler(store, MockAgentApi::new());
        assert_eq!(
            reconciler.reconcile("sat-0").await.unwrap(),
            ReconcileOutcome::Deleted
        );
    }
}
