use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

use super::geodesy::{lla_to_eci, Eci};
use super::snapshot::{SatelliteRecord, SiteRecord};

/// Kind of constellation node
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeType {
    LowOrbitSat,
    HighOrbitSat,
    GroundStation,
    Missile,
    User,
}

impl NodeType {
    pub fn is_satellite(&self) -> bool {
        matches!(self, NodeType::LowOrbitSat | NodeType::HighOrbitSat)
    }
}

/// A node of the emulated network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Node {
    pub uuid: String,
    pub node_type: NodeType,
    /// Orbital plane, zero for non-satellites
    pub track_id: i64,
    /// Ordinal inside the orbital plane, zero for non-satellites
    pub in_track_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude in km
    pub altitude: f64,
}

impl Node {
    /// Classify a satellite record by altitude.
    pub fn satellite(record: &SatelliteRecord, high_orbit_altitude_km: f64) -> Self {
        let node_type = if record.height >= high_orbit_altitude_km {
            NodeType::HighOrbitSat
        } else {
            NodeType::LowOrbitSat
        };
        Self {
            uuid: record.uuid.clone(),
            node_type,
            track_id: record.track_id,
            in_track_id: record.in_track_id,
            latitude: record.lat,
            longitude: record.lon,
            altitude: record.height,
        }
    }

    pub fn site(record: &SiteRecord, node_type: NodeType) -> Self {
        Self {
            uuid: record.uuid.clone(),
            node_type,
            track_id: 0,
            in_track_id: 0,
            latitude: record.lat,
            longitude: record.lon,
            altitude: record.height,
        }
    }

    /// Overwrite position fields only; identity and orbit fields stay put.
    pub fn set_position(&mut self, latitude: f64, longitude: f64, altitude: f64) {
        self.latitude = latitude;
        self.longitude = longitude;
        self.altitude = altitude;
    }

    pub fn position_at(&self, at: DateTime<Utc>) -> Eci {
        lla_to_eci(self.latitude, self.longitude, self.altitude, at)
    }

    /// Distance in km at `at`.
    pub fn distance_at(&self, other: &Node, at: DateTime<Utc>) -> f64 {
        self.position_at(at).distance(&other.position_at(at))
    }

    pub fn angle_at(&self, at: DateTime<Utc>) -> f64 {
        self.position_at(at).angle()
    }

    /// Angle of `other` minus angle of `self` in the inertial x-y plane, in `(-π, π]`.
    pub fn angle_delta_at(&self, other: &Node, at: DateTime<Utc>) -> f64 {
        self.position_at(at).angle_delta(&other.position_at(at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sat(uuid: &str, lon: f64, height: f64) -> Node {
        Node::satellite(
            &SatelliteRecord {
                uuid: uuid.to_string(),
                lat: 0.0,
                lon,
                height,
                track_id: 1,
                in_track_id: 0,
            },
            30000.0,
        )
    }

    #[test]
    fn test_classify_by_altitude() {
        assert_eq!(sat("leo", 0.0, 550.0).node_type, NodeType::LowOrbitSat);
        assert_eq!(sat("geo", 0.0, 35786.0).node_type, NodeType::HighOrbitSat);
        assert_eq!(sat("edge", 0.0, 30000.0).node_type, NodeType::HighOrbitSat);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let at = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap();
        let a = sat("a", 10.0, 550.0);
        let b = sat("b", 70.0, 600.0);
        let d1 = a.distance_at(&b, at);
        let d2 = b.distance_at(&a, at);
        assert!(d1 > 0.0);
        assert!((d1 - d2).abs() < 1e-9);
    }

    #[test]
    fn test_angle_delta_sign() {
        let at = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap();
        let a = sat("a", 0.0, 550.0);
        let b = sat("b", 30.0, 550.0);
        assert!(a.angle_delta_at(&b, at) > 0.0);
        assert!(b.angle_delta_at(&a, at) < 0.0);
    }

    #[test]
    fn test_node_type_display() {
        assert_eq!(NodeType::GroundStation.to_string(), "ground_station");
        assert_eq!("missile".parse::<NodeType>().unwrap(), NodeType::Missile);
    }
}
