//! Watch-driven controllers for Topology and Route objects

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    runtime::{controller::Action, watcher, Controller},
    Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{HttpAgent, KubeStore, Reconciled, Reconciler, ShardedLocks};
use crate::config::Config;
use crate::crd::{Route, Topology};
use crate::error::AppError;
use crate::k8s::ClusterClients;

/// Shared state handed to every reconcile call of one controller
pub struct Context<K: Reconciled> {
    pub reconciler: Reconciler<K>,
    pub requeue: Duration,
}

async fn reconcile<K: Reconciled>(object: Arc<K>, ctx: Arc<Context<K>>) -> Result<Action, AppError> {
    ctx.reconciler.reconcile(&object.name_any()).await?;
    Ok(Action::await_change())
}

fn error_policy<K: Reconciled>(object: Arc<K>, error: &AppError, ctx: Arc<Context<K>>) -> Action {
    warn!(
        kind = %K::KIND,
        name = %object.name_any(),
        error = %error,
        "Reconcile failed, requeueing"
    );
    Action::requeue(ctx.requeue)
}

/// Run one controller until `shutdown` fires.
pub async fn run_controller<K>(clients: &ClusterClients, ctx: Arc<Context<K>>, shutdown: CancellationToken)
where
    K: Reconciled + DeserializeOwned + Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default + Eq + Hash + Clone + Debug + Unpin,
{
    info!(kind = %K::KIND, namespace = clients.namespace(), "Starting controller");
    Controller::new(clients.namespaced::<K>(), watcher::Config::default())
        .graceful_shutdown_on(async move { shutdown.cancelled().await })
        .run(reconcile::<K>, error_policy::<K>, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(name = %object.name, "Reconciled object"),
                Err(e) => warn!(error = %e, "Controller error"),
            }
        })
        .await;
    info!(kind = %K::KIND, "Controller stopped");
}

/// Run the Topology and Route controllers side by side.
pub async fn run_all(clients: ClusterClients, config: &Config, shutdown: CancellationToken) {
    let agent = Arc::new(HttpAgent::new(
        config.route_agent_port,
        config.topology_agent_port,
    ));
    let locks = Arc::new(ShardedLocks::default());
    let requeue = Duration::from_secs(config.requeue_secs);

    let topologies = Arc::new(Context {
        reconciler: Reconciler::<Topology>::new(
            Arc::new(KubeStore::new(&clients)),
            agent.clone(),
            locks.clone(),
            config.agent_retry(),
            config.conflict_retry_attempts,
        ),
        requeue,
    });
    let routes = Arc::new(Context {
        reconciler: Reconciler::<Route>::new(
            Arc::new(KubeStore::new(&clients)),
            agent,
            locks,
            config.agent_retry(),
            config.conflict_retry_attempts,
        ),
        requeue,
    });

    tokio::join!(
        run_controller(&clients, topologies, shutdown.clone()),
        run_controller(&clients, routes, shutdown),
    );
}
