use kube::CustomResource;
use serde::{Deserialize, Serialize};

use crate::reconcile::Keyed;

/// Desired links of one pod
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "y-young.github.io",
    version = "v1",
    kind = "Topology",
    plural = "topologies",
    namespaced,
    status = "TopologyStatus",
    schema = "disabled"
)]
pub struct TopologySpec {
    #[serde(default)]
    pub links: Vec<Link>,
}

/// Links the node agent has installed, plus agent-owned fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyStatus {
    /// Peers the agent skipped, owned by the agent
    #[serde(default)]
    pub skipped: Vec<String>,

    /// Address of the node agent serving this pod
    #[serde(default)]
    pub src_ip: String,

    #[serde(default)]
    pub net_ns: String,

    /// `None` until the first successful push
    #[serde(default)]
    pub links: Option<Vec<Link>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub local_intf: String,
    #[serde(default)]
    pub local_ip: String,
    #[serde(default)]
    pub local_mac: String,
    #[serde(default)]
    pub peer_intf: String,
    #[serde(default)]
    pub peer_ip: String,
    #[serde(default)]
    pub peer_mac: String,
    #[serde(default)]
    pub peer_pod: String,
    pub uid: i64,
    #[serde(default, skip_serializing_if = "LinkProperties::is_empty")]
    pub properties: LinkProperties,
}

/// netem-style shaping applied by the node agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_corr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss_corr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_corr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reorder_prob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reorder_corr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrupt_prob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrupt_corr: Option<String>,
}

impl LinkProperties {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn with_latency(latency: String) -> Self {
        Self {
            latency: Some(latency),
            ..Default::default()
        }
    }
}

impl Link {
    /// Same link apart from shaping properties.
    pub fn same_endpoints(&self, other: &Link) -> bool {
        self.uid == other.uid
            && self.local_intf == other.local_intf
            && self.local_ip == other.local_ip
            && self.local_mac == other.local_mac
            && self.peer_intf == other.peer_intf
            && self.peer_ip == other.peer_ip
            && self.peer_mac == other.peer_mac
            && self.peer_pod == other.peer_pod
    }
}

impl Keyed for Link {
    type Key = i64;

    fn key(&self) -> i64 {
        self.uid
    }

    fn identity_eq(&self, other: &Self) -> bool {
        self.same_endpoints(other)
    }

    fn mutable_eq(&self, other: &Self) -> bool {
        self.properties == other.properties
    }

    fn lock_key(&self) -> Option<u64> {
        Some(self.uid as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_without_links_is_none() {
        let status: TopologyStatus =
            serde_json::from_value(json!({"src_ip": "10.0.0.5", "links": null})).unwrap();
        assert!(status.links.is_none());
        assert_eq!(status.src_ip, "10.0.0.5");

        let status: TopologyStatus = serde_json::from_value(json!({"links": []})).unwrap();
        assert_eq!(status.links, Some(vec![]));
    }

    #[test]
    fn test_empty_properties_are_omitted() {
        let link = Link {
            uid: 7,
            peer_pod: "sat-1".into(),
            ..Default::default()
        };
        let value = serde_json::to_value(&link).unwrap();
        assert!(value.get("properties").is_none());

        let shaped = Link {
            properties: LinkProperties::with_latency("3.000ms".into()),
            ..link
        };
        let value = serde_json::to_value(&shaped).unwrap();
        assert_eq!(value["properties"], json!({"latency": "3.000ms"}));
    }
}
