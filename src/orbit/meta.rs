use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use super::Group;
use crate::models::NodeType;

/// Dense index space over all known nodes.
///
/// `index_uuid` and `uuid_index` are inverse maps over `[0, N)`; `locator` points each index at
/// its group and position so node lookups never copy.
#[derive(Debug, Clone)]
pub struct OrbitMeta {
    pub timestamp: DateTime<Utc>,
    index_uuid: Vec<String>,
    uuid_index: HashMap<String, usize>,
    locator: Vec<(usize, usize)>,
    counts: BTreeMap<NodeType, usize>,
}

impl OrbitMeta {
    pub(super) fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            index_uuid: Vec::new(),
            uuid_index: HashMap::new(),
            locator: Vec::new(),
            counts: BTreeMap::new(),
        }
    }

    pub(super) fn build(groups: &[Group], timestamp: DateTime<Utc>) -> Self {
        let mut meta = Self::empty(timestamp);
        for (g, group) in groups.iter().enumerate() {
            for (pos, node) in group.nodes.iter().enumerate() {
                let index = meta.index_uuid.len();
                meta.index_uuid.push(node.uuid.clone());
                meta.uuid_index.insert(node.uuid.clone(), index);
                meta.locator.push((g, pos));
                *meta.counts.entry(node.node_type).or_insert(0) += 1;
            }
        }
        meta
    }

    pub fn len(&self) -> usize {
        self.index_uuid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_uuid.is_empty()
    }

    pub fn index_of(&self, uuid: &str) -> Option<usize> {
        self.uuid_index.get(uuid).copied()
    }

    pub fn uuid_of(&self, index: usize) -> Option<&str> {
        self.index_uuid.get(index).map(String::as_str)
    }

    pub fn uuids(&self) -> &[String] {
        &self.index_uuid
    }

    pub fn count(&self, node_type: NodeType) -> usize {
        self.counts.get(&node_type).copied().unwrap_or(0)
    }

    /// UUIDs present in both index spaces whose index differs, in `self` order.
    pub fn reindexed_since(&self, previous: &OrbitMeta) -> Vec<String> {
        self.index_uuid
            .iter()
            .enumerate()
            .filter(|(index, uuid)| previous.index_of(uuid).is_some_and(|old| old != *index))
            .map(|(_, uuid)| uuid.clone())
            .collect()
    }

    pub(super) fn locate(&self, index: usize) -> Option<(usize, usize)> {
        self.locator.get(index).copied()
    }
}
