use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, PostParams};
use kube::{Resource, ResourceExt};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::AppResult;
use crate::k8s::{classify, ClusterClients};

/// Object access needed by the reconcilers
#[async_trait]
pub trait ObjectStore<K>: Send + Sync {
    /// Latest version of the object, `None` once deleted.
    async fn get(&self, name: &str) -> AppResult<Option<K>>;

    /// Write the status subresource. A stale resourceVersion fails with `Conflict`.
    async fn replace_status(&self, object: &K) -> AppResult<K>;

    /// IP of the pod named `name`, `None` while unassigned.
    async fn pod_ip(&self, name: &str) -> AppResult<Option<String>>;
}

/// [`ObjectStore`] backed by the API server
pub struct KubeStore<K>
where
    K: Resource,
{
    api: Api<K>,
    clients: ClusterClients,
}

impl<K> KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    pub fn new(clients: &ClusterClients) -> Self {
        Self {
            api: clients.namespaced(),
            clients: clients.clone(),
        }
    }
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore<K>
where
    K: Resource + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
    <K as Resource>::DynamicType: Default,
{
    async fn get(&self, name: &str) -> AppResult<Option<K>> {
        self.api
            .get_opt(name)
            .await
            .map_err(|e| classify(e, name))
    }

    async fn replace_status(&self, object: &K) -> AppResult<K> {
        let name = object.name_any();
        let body = serde_json::to_vec(object)?;
        self.api
            .replace_status(&name, &PostParams::default(), body)
            .await
            .map_err(|e| classify(e, &name))
    }

    async fn pod_ip(&self, name: &str) -> AppResult<Option<String>> {
        self.clients.pod_ip(name).await
    }
}
