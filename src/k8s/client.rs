//! Kubernetes client wrapper for the control plane

use std::collections::HashMap;
use std::fmt::Debug;

use k8s_openapi::api::core::v1::{Node as ClusterNode, Pod};
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    Client, Resource, ResourceExt,
};
use metrics::counter;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::crd::{Route, Topology};
use crate::error::{AppError, AppResult};
use crate::retry::RetryPolicy;

use super::resources::MANAGED_SELECTOR;

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "constellation-sdn";

const CONTROL_PLANE_LABELS: [&str; 2] = [
    "node-role.kubernetes.io/control-plane",
    "node-role.kubernetes.io/master",
];

/// Map API status codes onto the application taxonomy.
pub fn classify(e: kube::Error, what: &str) -> AppError {
    match e {
        kube::Error::Api(ref resp) if resp.code == 404 => {
            AppError::NotFound(format!("{} not found", what))
        }
        kube::Error::Api(ref resp) if resp.code == 409 => {
            AppError::Conflict(format!("{} was modified concurrently", what))
        }
        other => AppError::Kubernetes(other),
    }
}

/// Outcome of pushing a batch of objects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub replaced: usize,
    pub deleted: usize,
}

/// Cluster access shared by every component, constructed once per process
#[derive(Clone)]
pub struct ClusterClients {
    client: Client,
    namespace: String,
}

impl ClusterClients {
    /// Connect using the default kubeconfig or in-cluster config
    #[instrument(skip_all)]
    pub async fn new(namespace: Option<&str>) -> AppResult<Self> {
        let client = Client::try_default().await?;
        let namespace = namespace
            .map(str::to_string)
            .unwrap_or_else(|| client.default_namespace().to_string());

        info!(namespace = %namespace, "Connected to Kubernetes cluster");
        Ok(Self { client, namespace })
    }

    pub fn from_client(client: Client, namespace: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Typed API for a namespaced kind in the working namespace
    pub fn namespaced<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    pub fn pods(&self) -> Api<Pod> {
        self.namespaced()
    }

    pub fn topologies(&self) -> Api<Topology> {
        self.namespaced()
    }

    pub fn routes(&self) -> Api<Route> {
        self.namespaced()
    }

    /// Schedulable worker machines, control-plane nodes excluded, sorted by name.
    #[instrument(skip(self))]
    pub async fn worker_machines(&self, limit: usize) -> AppResult<Vec<String>> {
        let nodes: Api<ClusterNode> = Api::all(self.client.clone());
        let list = nodes.list(&ListParams::default()).await?;

        let mut machines: Vec<String> = list
            .items
            .iter()
            .filter(|node| {
                let labels = node.labels();
                !CONTROL_PLANE_LABELS.iter().any(|l| labels.contains_key(*l))
            })
            .map(|node| node.name_any())
            .collect();
        machines.sort();
        machines.truncate(limit);

        if machines.is_empty() {
            return Err(AppError::Unavailable(
                "no worker machines available in the cluster".to_string(),
            ));
        }
        info!(count = machines.len(), "Discovered worker machines");
        Ok(machines)
    }

    /// Server-side apply a pod
    #[instrument(skip(self, pod), fields(pod_name = %pod.name_any()))]
    pub async fn apply_pod(&self, pod: &Pod) -> AppResult<Pod> {
        let name = pod.name_any();
        let params = PatchParams::apply(FIELD_MANAGER).force();
        let applied = self
            .pods()
            .patch(&name, &params, &Patch::Apply(pod))
            .await
            .map_err(|e| classify(e, &format!("pod {}", name)))?;
        debug!("Applied pod");
        Ok(applied)
    }

    /// Delete a pod; a pod that is already gone is not an error
    #[instrument(skip(self))]
    pub async fn delete_pod(&self, name: &str) -> AppResult<()> {
        match self.pods().delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(name, "Deleted pod");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Current pod IP, `None` while unassigned
    pub async fn pod_ip(&self, name: &str) -> AppResult<Option<String>> {
        match self.pods().get_opt(name).await? {
            Some(pod) => Ok(pod
                .status
                .and_then(|s| s.pod_ip)
                .filter(|ip| !ip.is_empty())),
            None => Ok(None),
        }
    }

    /// Poll the pod IP under `policy` until it is assigned.
    pub async fn wait_pod_ip(&self, name: &str, policy: &RetryPolicy) -> AppResult<String> {
        policy
            .run("pod ip", |_| async move {
                self.pod_ip(name)
                    .await?
                    .ok_or_else(|| AppError::Unavailable(format!("pod {} has no IP yet", name)))
            })
            .await
    }

    /// Poll under `policy` until the pod no longer exists.
    pub async fn wait_pod_deleted(&self, name: &str, policy: &RetryPolicy) -> AppResult<()> {
        policy
            .run("pod deletion", |_| async move {
                match self.pods().get_opt(name).await? {
                    Some(_) => Err(AppError::Unavailable(format!("pod {} is still terminating", name))),
                    None => Ok(()),
                }
            })
            .await
    }

    /// Create every object, replacing those that already exist.
    #[instrument(skip(self, objects), fields(count = objects.len()))]
    pub async fn create_objects<K>(&self, objects: &[K]) -> AppResult<SyncReport>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + Serialize + DeserializeOwned,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = self.namespaced();
        let mut report = SyncReport::default();
        for object in objects {
            let name = object.name_any();
            match api.create(&PostParams::default(), object).await {
                Ok(_) => report.created += 1,
                Err(kube::Error::Api(e)) if e.code == 409 => {
                    debug!(name = %name, "Object exists, replacing");
                    self.replace_current(&api, object.clone()).await?;
                    report.replaced += 1;
                }
                Err(e) => return Err(classify(e, &name)),
            }
        }
        self.record_sync::<K>(&report);
        Ok(report)
    }

    /// Replace every object at its current resourceVersion, creating missing ones.
    /// With `prune`, owned objects (matching [`MANAGED_SELECTOR`]) whose names are not in
    /// `objects` are deleted; objects of other owners are never listed.
    #[instrument(skip(self, objects), fields(count = objects.len()))]
    pub async fn sync_objects<K>(&self, objects: Vec<K>, prune: bool) -> AppResult<SyncReport>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + Serialize + DeserializeOwned,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = self.namespaced();
        let existing: HashMap<String, Option<String>> = api
            .list(&ListParams::default().labels(MANAGED_SELECTOR))
            .await?
            .items
            .into_iter()
            .map(|o| (o.name_any(), o.resource_version()))
            .collect();

        let mut report = SyncReport::default();
        let mut desired = std::collections::HashSet::with_capacity(objects.len());
        for mut object in objects {
            let name = object.name_any();
            desired.insert(name.clone());
            match existing.get(&name) {
                Some(version) => {
                    object.meta_mut().resource_version = version.clone();
                    match api.replace(&name, &PostParams::default(), &object).await {
                        Ok(_) => report.replaced += 1,
                        Err(kube::Error::Api(e)) if e.code == 409 => {
                            self.replace_current(&api, object).await?;
                            report.replaced += 1;
                        }
                        Err(e) => return Err(classify(e, &name)),
                    }
                }
                None => match api.create(&PostParams::default(), &object).await {
                    Ok(_) => report.created += 1,
                    // exists without our label, adopt it
                    Err(kube::Error::Api(e)) if e.code == 409 => {
                        self.replace_current(&api, object).await?;
                        report.replaced += 1;
                    }
                    Err(e) => return Err(classify(e, &name)),
                },
            }
        }

        if prune {
            for name in existing.keys().filter(|n| !desired.contains(*n)) {
                match api.delete(name, &DeleteParams::default()).await {
                    Ok(_) => report.deleted += 1,
                    Err(kube::Error::Api(e)) if e.code == 404 => {}
                    Err(e) => warn!(name = %name, error = %e, "Failed to prune object"),
                }
            }
        }

        self.record_sync::<K>(&report);
        Ok(report)
    }

    /// Re-read the live resourceVersion and replace.
    async fn replace_current<K>(&self, api: &Api<K>, mut object: K) -> AppResult<()>
    where
        K: Resource + Clone + Debug + Serialize + DeserializeOwned,
    {
        let name = object.name_any();
        let live = api.get(&name).await.map_err(|e| classify(e, &name))?;
        object.meta_mut().resource_version = live.resource_version();
        api.replace(&name, &PostParams::default(), &object)
            .await
            .map_err(|e| classify(e, &name))?;
        Ok(())
    }

    fn record_sync<K>(&self, report: &SyncReport)
    where
        K: Resource,
        <K as Resource>::DynamicType: Default,
    {
        let kind = K::kind(&Default::default()).to_string();
        info!(
            kind = %kind,
            created = report.created,
            replaced = report.replaced,
            deleted = report.deleted,
            "Synced objects"
        );
        counter!("sdn_cluster_sync_total", 1, "kind" => kind);
    }

    /// Check if cluster is reachable
    pub async fn health_check(&self) -> AppResult<bool> {
        let version = self.client.apiserver_version().await?;
        info!(version = %version.git_version, "Kubernetes cluster is healthy");
        Ok(true)
    }
}
