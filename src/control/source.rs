use std::sync::RwLock;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::error::{AppError, AppResult};
use crate::models::PositionSnapshot;

/// Where position snapshots come from
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn fetch(&self) -> AppResult<PositionSnapshot>;
}

/// Orbit propagation service reached over HTTP
pub struct HttpPositionSource {
    client: reqwest::Client,
    url: String,
}

impl HttpPositionSource {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PositionSource for HttpPositionSource {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> AppResult<PositionSnapshot> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Unavailable(format!(
                "position service answered {}",
                response.status()
            )));
        }
        let body = response.bytes().await?;
        let snapshot: PositionSnapshot = serde_json::from_slice(&body)?;
        debug!(nodes = snapshot.node_count(), "Fetched position snapshot");
        Ok(snapshot)
    }
}

/// Fixed snapshot, replaceable at runtime. Used for offline runs and tests.
#[derive(Default)]
pub struct StaticPositionSource {
    snapshot: RwLock<PositionSnapshot>,
}

impl StaticPositionSource {
    pub fn new(snapshot: PositionSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
        }
    }

    pub fn set(&self, snapshot: PositionSnapshot) {
        if let Ok(mut current) = self.snapshot.write() {
            *current = snapshot;
        }
    }
}

#[async_trait]
impl PositionSource for StaticPositionSource {
    async fn fetch(&self) -> AppResult<PositionSnapshot> {
        self.snapshot
            .read()
            .map(|s| s.clone())
            .map_err(|_| AppError::internal("position snapshot lock poisoned"))
    }
}
