//! Periodic refresh: re-fetch positions, then push pods, topologies and routes

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{ControlClient, RefreshOutcome};
use crate::error::AppResult;

/// Run until `shutdown` fires. A failed refresh skips the cluster pushes of that tick.
pub async fn run_sync_loop(client: Arc<ControlClient>, interval: Duration, shutdown: CancellationToken) {
    info!(interval_secs = interval.as_secs(), "Starting sync loop");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let result = match client.fetch_and_update().await {
            Ok(outcome) => sync_once(&client, &outcome).await,
            Err(e) => {
                warn!(error = %e, "Position refresh failed, skipping this tick");
                counter!("sdn_sync_iterations_total", 1, "result" => "skipped");
                continue;
            }
        };

        match result {
            Ok(()) => counter!("sdn_sync_iterations_total", 1, "result" => "ok"),
            Err(e) => {
                error!(error = %e, "Cluster sync failed");
                counter!("sdn_sync_iterations_total", 1, "result" => "error");
            }
        }
    }
    info!("Sync loop stopped");
}

async fn sync_once(client: &ControlClient, outcome: &RefreshOutcome) -> AppResult<()> {
    if !client.has_cluster() {
        return Ok(());
    }
    if outcome.membership_changed {
        let (stale, fresh) = pod_changes(outcome);
        if !stale.is_empty() {
            client.delete_pods(&stale).await?;
        }
        if !fresh.is_empty() {
            client.apply_pods_for(&fresh).await?;
        }
    }

    let topologies = client.update_topologies().await?;
    let routes = client.update_routes().await?;
    info!(
        topologies_replaced = topologies.replaced,
        topologies_created = topologies.created,
        routes_replaced = routes.replaced,
        routes_created = routes.created,
        "Pushed refreshed state"
    );
    Ok(())
}

/// Pods to delete and pods to apply after a rebuild. Pod arguments are immutable, so a
/// reindexed node is deleted and applied again with its new global address.
fn pod_changes(outcome: &RefreshOutcome) -> (Vec<String>, Vec<String>) {
    let stale = outcome.removed.iter().chain(&outcome.reindexed).cloned().collect();
    let fresh = outcome.added.iter().chain(&outcome.reindexed).cloned().collect();
    (stale, fresh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::control::StaticPositionSource;
    use crate::models::{PositionSnapshot, SatelliteRecord};

    #[test]
    fn test_pod_changes_recreate_reindexed_nodes() {
        let outcome = RefreshOutcome {
            membership_changed: true,
            added: vec!["d".into()],
            removed: vec!["a".into()],
            reindexed: vec!["b".into(), "c".into()],
        };
        let (stale, fresh) = pod_changes(&outcome);
        assert_eq!(stale, vec!["a", "b", "c"]);
        assert_eq!(fresh, vec!["d", "b", "c"]);
    }

    #[tokio::test]
    async fn test_loop_stops_on_cancel() {
        let snapshot = PositionSnapshot {
            unix_time_stamp: 1_700_000_000_000,
            satellites: vec![SatelliteRecord {
                uuid: "sat-0".into(),
                lat: 0.0,
                lon: 0.0,
                height: 550.0,
                track_id: 0,
                in_track_id: 0,
            }],
            ..Default::default()
        };
        let config = Config {
            worker_threads: 1,
            ..Config::default()
        };
        let client = Arc::new(
            ControlClient::connect(&config, Arc::new(StaticPositionSource::new(snapshot)), None)
                .await
                .unwrap(),
        );

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_sync_loop(client, Duration::from_millis(10), token.clone()));
        tokio::time::sleep(Duration::from_millis(35)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
