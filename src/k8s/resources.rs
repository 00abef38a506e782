//! Kubernetes resource builders for emulated nodes

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Capabilities, Container, ContainerPort, Pod, PodSpec, SecurityContext,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::crd::addressing::global_ip;

/// Offset added to a node index to form the in-pod `POD_IDX`
pub const POD_INDEX_OFFSET: usize = 5000;

pub const AGENT_PORT: i32 = 8080;
pub const PROMETHEUS_PORT: i32 = 2112;

pub const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGER: &str = "constellation-sdn";

/// Label selector matching every object the control plane owns
pub const MANAGED_SELECTOR: &str = "app.kubernetes.io/managed-by=constellation-sdn";

/// Labels carried by every pod, Topology and Route the control plane owns
pub fn node_labels(uuid: &str) -> BTreeMap<String, String> {
    [
        (MANAGED_BY_LABEL.to_string(), MANAGER.to_string()),
        ("constellation-sdn/uuid".to_string(), uuid.to_string()),
    ]
    .into_iter()
    .collect()
}

/// Shell command that boots the in-pod agent with its index and global address.
pub fn bootstrap_command(index: usize) -> String {
    format!(
        "export POD_IDX={};export GLOBAL_IP={};/bootstrap.sh",
        index + POD_INDEX_OFFSET,
        global_ip(index)
    )
}

/// Pod for node `index`, pinned to `machine` when placed.
pub fn create_pod_spec(uuid: &str, index: usize, image: &str, machine: Option<&str>) -> Pod {
    let node_selector = machine.map(|m| {
        [(HOSTNAME_LABEL.to_string(), m.to_string())]
            .into_iter()
            .collect()
    });

    Pod {
        metadata: ObjectMeta {
            name: Some(uuid.to_string()),
            labels: Some(node_labels(uuid)),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "podserver".to_string(),
                image: Some(image.to_string()),
                image_pull_policy: Some("IfNotPresent".to_string()),
                command: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
                args: Some(vec![bootstrap_command(index)]),
                ports: Some(vec![
                    ContainerPort {
                        container_port: AGENT_PORT,
                        name: Some("http".to_string()),
                        protocol: Some("TCP".to_string()),
                        ..Default::default()
                    },
                    ContainerPort {
                        container_port: PROMETHEUS_PORT,
                        name: Some("prometheus".to_string()),
                        protocol: Some("TCP".to_string()),
                        ..Default::default()
                    },
                ]),
                security_context: Some(SecurityContext {
                    capabilities: Some(Capabilities {
                        add: Some(vec!["NET_ADMIN".to_string()]),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            node_selector,
            ..Default::default()
        }),
        ..Default::default()
    }
}
