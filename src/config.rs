use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use strum::{Display, EnumString};

use crate::error::{AppError, AppResult};
use crate::partition::LinearCutParams;
use crate::retry::RetryPolicy;

/// How pods are spread over worker machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlacementStrategy {
    #[default]
    Capacity,
    LinearCut,
    Hash,
}

/// What a periodic refresh does when the snapshot's node set differs from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RefreshPolicy {
    #[default]
    Rebuild,
    RetainStale,
    Strict,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_position_url")]
    pub position_url: String,

    #[serde(default = "default_machine_count")]
    pub machine_count: usize,

    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: i64,

    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default = "default_route_agent_port")]
    pub route_agent_port: u16,

    #[serde(default = "default_topology_agent_port")]
    pub topology_agent_port: u16,

    #[serde(default = "default_same_orbit_threshold_km")]
    pub same_orbit_threshold_km: f64,

    #[serde(default = "default_high_orbit_altitude_km")]
    pub high_orbit_altitude_km: f64,

    #[serde(default)]
    pub placement: PlacementStrategy,

    #[serde(default = "default_machine_capacity")]
    pub default_machine_capacity: u32,

    #[serde(default)]
    pub machine_capacity: BTreeMap<String, u32>,

    #[serde(default = "default_partition_beta")]
    pub partition_beta: f64,

    #[serde(default = "default_partition_max_iterations")]
    pub partition_max_iterations: usize,

    #[serde(default = "default_agent_retry_min_ms")]
    pub agent_retry_min_ms: u64,

    #[serde(default = "default_agent_retry_max_ms")]
    pub agent_retry_max_ms: u64,

    #[serde(default = "default_agent_retry_attempts")]
    pub agent_retry_attempts: u32,

    #[serde(default = "default_conflict_retry_attempts")]
    pub conflict_retry_attempts: u32,

    #[serde(default = "default_startup_fetch_attempts")]
    pub startup_fetch_attempts: u32,

    #[serde(default)]
    pub refresh_policy: RefreshPolicy,

    #[serde(default = "default_pod_image")]
    pub pod_image: String,

    #[serde(default = "default_requeue_secs")]
    pub requeue_secs: u64,

    #[serde(default)]
    pub log_json: bool,
}

fn default_port() -> u16 {
    30101
}

fn default_position_url() -> String {
    "http://127.0.0.1:8000/position".to_string()
}

fn default_machine_count() -> usize {
    3
}

fn default_update_interval_secs() -> i64 {
    -1
}

fn default_worker_threads() -> usize {
    64
}

fn default_route_agent_port() -> u16 {
    8080
}

fn default_topology_agent_port() -> u16 {
    51112
}

fn default_same_orbit_threshold_km() -> f64 {
    500.0
}

fn default_high_orbit_altitude_km() -> f64 {
    30000.0
}

fn default_machine_capacity() -> u32 {
    1
}

fn default_partition_beta() -> f64 {
    1.0
}

fn default_partition_max_iterations() -> usize {
    100
}

fn default_agent_retry_min_ms() -> u64 {
    3000
}

fn default_agent_retry_max_ms() -> u64 {
    5000
}

fn default_agent_retry_attempts() -> u32 {
    20
}

fn default_conflict_retry_attempts() -> u32 {
    5
}

fn default_startup_fetch_attempts() -> u32 {
    5
}

fn default_pod_image() -> String {
    "electronicwaste/podserver:v10".to_string()
}

fn default_requeue_secs() -> u64 {
    5
}

impl Config {
    pub fn load() -> AppResult<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("sdn").required(false))
            .add_source(
                config::Environment::with_prefix("SDN")
                    .try_parsing(true)
                    .separator("__"),
            )
            .build()?;

        let settings: Config = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.update_interval_secs == 0 {
            return Err(AppError::BadRequest(
                "update interval must be positive, or negative to disable the loop".to_string(),
            ));
        }
        if self.machine_count == 0 {
            return Err(AppError::BadRequest(
                "machine count must be at least 1".to_string(),
            ));
        }
        if self.agent_retry_min_ms > self.agent_retry_max_ms {
            return Err(AppError::BadRequest(format!(
                "agent retry window is inverted: {}ms > {}ms",
                self.agent_retry_min_ms, self.agent_retry_max_ms
            )));
        }
        Ok(())
    }

    /// Periodic loop interval, `None` when the loop is disabled.
    pub fn update_interval(&self) -> Option<Duration> {
        u64::try_from(self.update_interval_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn agent_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.agent_retry_attempts,
            Duration::from_millis(self.agent_retry_min_ms),
            Duration::from_millis(self.agent_retry_max_ms),
        )
    }

    pub fn startup_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.startup_fetch_attempts,
            Duration::from_millis(self.agent_retry_min_ms),
            Duration::from_millis(self.agent_retry_max_ms),
        )
    }

    pub fn partition_params(&self) -> LinearCutParams {
        LinearCutParams {
            beta: self.partition_beta,
            max_iterations: self.partition_max_iterations,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            position_url: default_position_url(),
            machine_count: default_machine_count(),
            update_interval_secs: default_update_interval_secs(),
            worker_threads: default_worker_threads(),
            namespace: None,
            route_agent_port: default_route_agent_port(),
            topology_agent_port: default_topology_agent_port(),
            same_orbit_threshold_km: default_same_orbit_threshold_km(),
            high_orbit_altitude_km: default_high_orbit_altitude_km(),
            placement: PlacementStrategy::default(),
            default_machine_capacity: default_machine_capacity(),
            machine_capacity: BTreeMap::new(),
            partition_beta: default_partition_beta(),
            partition_max_iterations: default_partition_max_iterations(),
            agent_retry_min_ms: default_agent_retry_min_ms(),
            agent_retry_max_ms: default_agent_retry_max_ms(),
            agent_retry_attempts: default_agent_retry_attempts(),
            conflict_retry_attempts: default_conflict_retry_attempts(),
            startup_fetch_attempts: default_startup_fetch_attempts(),
            refresh_policy: RefreshPolicy::default(),
            pod_image: default_pod_image(),
            requeue_secs: default_requeue_secs(),
            log_json: false,
        }
    }
}
