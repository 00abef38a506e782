use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use constellation_sdn::{
    api::AppState,
    config::Config,
    control::{run_sync_loop, ControlClient, HttpPositionSource},
    create_router,
    k8s::ClusterClients,
    reconcile,
};

#[derive(Parser)]
#[command(name = "constellation-sdn", version, about = "SDN control plane for constellation emulation")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy topologies, pods and routes, then keep them in sync with the position service
    Init {
        /// Position service URL
        #[arg(long)]
        url: Option<String>,
        /// Number of worker machines to place pods on
        #[arg(long)]
        node: Option<usize>,
        /// Refresh interval in seconds, negative to disable
        #[arg(long, allow_hyphen_values = true)]
        interval: Option<i64>,
    },
    /// Serve the query API without touching the cluster
    Serve {
        /// Position service URL
        #[arg(long)]
        url: Option<String>,
        /// Refresh interval in seconds, negative to disable
        #[arg(long, allow_hyphen_values = true)]
        interval: Option<i64>,
    },
    /// Run the Topology and Route reconcilers
    Controller,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load().context("failed to load configuration")?;
    config.log_json |= cli.log_json;

    init_tracing(config.log_json);
    tracing::info!("Starting constellation SDN");

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            token.cancel();
        }
    });

    match cli.command {
        Command::Init { url, node, interval } => {
            apply_overrides(&mut config, url, node, interval)?;
            run_init(config, shutdown).await
        }
        Command::Serve { url, interval } => {
            apply_overrides(&mut config, url, None, interval)?;
            run_serve(config, shutdown).await
        }
        Command::Controller => {
            let cluster = ClusterClients::new(config.namespace.as_deref()).await?;
            cluster.health_check().await?;
            reconcile::run_all(cluster, &config, shutdown).await;
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer()))
        .init();
}

fn apply_overrides(
    config: &mut Config,
    url: Option<String>,
    node: Option<usize>,
    interval: Option<i64>,
) -> Result<()> {
    if let Some(url) = url {
        config.position_url = url;
    }
    if let Some(node) = node {
        config.machine_count = node;
    }
    if let Some(interval) = interval {
        config.update_interval_secs = interval;
    }
    config.validate()?;
    Ok(())
}

async fn run_init(config: Config, shutdown: CancellationToken) -> Result<()> {
    let cluster = ClusterClients::new(config.namespace.as_deref()).await?;
    cluster.health_check().await?;

    let source = Arc::new(HttpPositionSource::new(&config.position_url));
    let control = Arc::new(ControlClient::connect(&config, source, Some(cluster)).await?);

    let topologies = control.apply_topologies().await?;
    tracing::info!(created = topologies.created, replaced = topologies.replaced, "Topologies applied");
    let pods = control.apply_pods().await?;
    tracing::info!(count = pods, "Pods applied");
    let routes = control.apply_routes().await?;
    tracing::info!(created = routes.created, replaced = routes.replaced, "Routes applied");

    serve(config, control, shutdown).await
}

async fn run_serve(config: Config, shutdown: CancellationToken) -> Result<()> {
    let source = Arc::new(HttpPositionSource::new(&config.position_url));
    let control = Arc::new(ControlClient::connect(&config, source, None).await?);
    serve(config, control, shutdown).await
}

/// Start the refresh loop if enabled and serve the query API until shutdown.
async fn serve(config: Config, control: Arc<ControlClient>, shutdown: CancellationToken) -> Result<()> {
    let sync = config.update_interval().map(|interval| {
        tokio::spawn(run_sync_loop(control.clone(), interval, shutdown.clone()))
    });

    let mut state = AppState::new(control);
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "Metrics recorder not installed"),
    }
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    if let Some(handle) = sync {
        shutdown.cancel();
        handle.await?;
    }
    Ok(())
}
