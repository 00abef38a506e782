//! Orbit model: classifies snapshot records into orbit groups and owns the dense index space
//!
//! Index assignment walks groups in a fixed order (low-orbit planes by ascending track,
//! high-orbit planes by ascending track, ground stations, missiles, users), so two models built
//! from the same snapshot always agree on every index.

mod meta;

pub use meta::OrbitMeta;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::crd::addressing::MAX_NODES;
use crate::error::{AppError, AppResult};
use crate::models::{Node, NodeType, PositionSnapshot};

/// Nodes sharing a type, and a track for satellites
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub node_type: NodeType,
    pub track_id: Option<i64>,
    pub nodes: Vec<Node>,
}

impl Group {
    fn new(node_type: NodeType, track_id: Option<i64>) -> Self {
        Self {
            node_type,
            track_id,
            nodes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn sort_by_in_track(&mut self) {
        self.nodes
            .sort_by(|a, b| a.in_track_id.cmp(&b.in_track_id).then_with(|| a.uuid.cmp(&b.uuid)));
    }
}

/// Result of a position-only refresh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReport {
    /// Known nodes absent from the snapshot; their previous position is kept
    pub missing: Vec<String>,
    /// Snapshot records that the model does not know about
    pub unknown: Vec<String>,
}

impl UpdateReport {
    pub fn membership_changed(&self) -> bool {
        !self.missing.is_empty() || !self.unknown.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct OrbitModel {
    groups: Vec<Group>,
    meta: OrbitMeta,
    high_orbit_altitude_km: f64,
}

impl OrbitModel {
    /// Build groups from a snapshot and assign indices.
    pub fn from_snapshot(snapshot: &PositionSnapshot, high_orbit_altitude_km: f64) -> AppResult<Self> {
        let timestamp = snapshot.timestamp()?;
        if snapshot.node_count() > MAX_NODES {
            return Err(AppError::BadRequest(format!(
                "snapshot has {} nodes, link addressing supports at most {}",
                snapshot.node_count(),
                MAX_NODES
            )));
        }

        let mut seen = HashSet::with_capacity(snapshot.node_count());
        let uuids = snapshot
            .satellites
            .iter()
            .map(|s| &s.uuid)
            .chain(snapshot.stations.iter().map(|s| &s.uuid))
            .chain(snapshot.missiles.iter().map(|s| &s.uuid))
            .chain(snapshot.users.iter().map(|s| &s.uuid));
        for uuid in uuids {
            if uuid.is_empty() {
                return Err(AppError::BadRequest("snapshot contains an empty uuid".to_string()));
            }
            if !seen.insert(uuid.as_str()) {
                return Err(AppError::BadRequest(format!(
                    "snapshot contains duplicate uuid {}",
                    uuid
                )));
            }
        }

        let mut low: BTreeMap<i64, Group> = BTreeMap::new();
        let mut high: BTreeMap<i64, Group> = BTreeMap::new();
        for record in &snapshot.satellites {
            let node = Node::satellite(record, high_orbit_altitude_km);
            let planes = match node.node_type {
                NodeType::HighOrbitSat => &mut high,
                _ => &mut low,
            };
            planes
                .entry(node.track_id)
                .or_insert_with(|| Group::new(node.node_type, Some(node.track_id)))
                .nodes
                .push(node);
        }

        let mut groups: Vec<Group> = low.into_values().chain(high.into_values()).collect();
        for group in &mut groups {
            group.sort_by_in_track();
        }

        for (records, node_type) in [
            (&snapshot.stations, NodeType::GroundStation),
            (&snapshot.missiles, NodeType::Missile),
            (&snapshot.users, NodeType::User),
        ] {
            let mut group = Group::new(node_type, None);
            group.nodes = records.iter().map(|r| Node::site(r, node_type)).collect();
            groups.push(group);
        }

        let mut model = Self {
            groups,
            meta: OrbitMeta::empty(timestamp),
            high_orbit_altitude_km,
        };
        model.refresh_meta();
        Ok(model)
    }

    /// Reassign the dense index space. Only call when node membership changed.
    pub fn refresh_meta(&mut self) {
        self.meta = OrbitMeta::build(&self.groups, self.meta.timestamp);
        debug!(nodes = self.meta.len(), "Orbit metadata refreshed");
    }

    /// Refresh positions in place by UUID. Indices never move here.
    pub fn update(&mut self, snapshot: &PositionSnapshot) -> AppResult<UpdateReport> {
        let timestamp = snapshot.timestamp()?;

        let mut positions: HashMap<&str, (f64, f64, f64)> =
            HashMap::with_capacity(snapshot.node_count());
        for s in &snapshot.satellites {
            positions.insert(&s.uuid, (s.lat, s.lon, s.height));
        }
        for s in snapshot
            .stations
            .iter()
            .chain(&snapshot.missiles)
            .chain(&snapshot.users)
        {
            positions.insert(&s.uuid, (s.lat, s.lon, s.height));
        }

        let mut report = UpdateReport::default();
        for group in &mut self.groups {
            for node in &mut group.nodes {
                match positions.remove(node.uuid.as_str()) {
                    Some((lat, lon, alt)) => node.set_position(lat, lon, alt),
                    None => report.missing.push(node.uuid.clone()),
                }
            }
        }
        report.unknown = positions.into_keys().map(str::to_string).collect();
        report.unknown.sort();

        self.meta.timestamp = timestamp;
        Ok(report)
    }

    pub fn meta(&self) -> &OrbitMeta {
        &self.meta
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.meta.timestamp
    }

    pub fn high_orbit_altitude_km(&self) -> f64 {
        self.high_orbit_altitude_km
    }

    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.len() == 0
    }

    pub fn index_of(&self, uuid: &str) -> Option<usize> {
        self.meta.index_of(uuid)
    }

    pub fn uuid_of(&self, index: usize) -> Option<&str> {
        self.meta.uuid_of(index)
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        let (g, pos) = self.meta.locate(index)?;
        self.groups.get(g)?.nodes.get(pos)
    }

    pub fn node_by_uuid(&self, uuid: &str) -> Option<&Node> {
        self.node(self.index_of(uuid)?)
    }

    /// Nodes in index order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        (0..self.len()).filter_map(move |i| self.node(i))
    }

    pub fn count(&self, node_type: NodeType) -> usize {
        self.meta.count(node_type)
    }

    /// Index range of each low-orbit plane, in index order.
    pub fn low_orbit_planes(&self) -> Vec<Range<usize>> {
        let mut ranges = Vec::new();
        let mut start = 0;
        for group in &self.groups {
            let end = start + group.len();
            if group.node_type == NodeType::LowOrbitSat {
                ranges.push(start..end);
            }
            start = end;
        }
        ranges
    }
}
