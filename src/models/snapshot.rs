//! Position snapshot served by the orbit propagation service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

/// One snapshot of every node's position
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PositionSnapshot {
    /// Unix time in milliseconds
    #[serde(deserialize_with = "integral")]
    pub unix_time_stamp: i64,
    #[serde(default)]
    pub satellites: Vec<SatelliteRecord>,
    #[serde(default)]
    pub stations: Vec<SiteRecord>,
    #[serde(default)]
    pub missiles: Vec<SiteRecord>,
    #[serde(default)]
    pub users: Vec<SiteRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SatelliteRecord {
    pub uuid: String,
    pub lat: f64,
    pub lon: f64,
    /// Altitude in km
    pub height: f64,
    #[serde(rename = "trackID", deserialize_with = "integral")]
    pub track_id: i64,
    #[serde(rename = "inTrackID", deserialize_with = "integral")]
    pub in_track_id: i64,
}

/// A ground station, missile or user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SiteRecord {
    pub uuid: String,
    pub lat: f64,
    pub lon: f64,
    pub height: f64,
}

impl PositionSnapshot {
    pub fn timestamp(&self) -> AppResult<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.unix_time_stamp).ok_or_else(|| {
            AppError::BadRequest(format!(
                "snapshot timestamp {} is out of range",
                self.unix_time_stamp
            ))
        })
    }

    pub fn node_count(&self) -> usize {
        self.satellites.len() + self.stations.len() + self.missiles.len() + self.users.len()
    }
}

/// The position service encodes integers as JSON numbers that may carry a fraction.
fn integral<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() {
        return Err(serde::de::Error::custom("expected a finite number"));
    }
    Ok(value as i64)
}
