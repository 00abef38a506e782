//! Push API of the network agents
//!
//! Route agents run inside each pod; topology agents run per machine and are found through
//! `status.src_ip` of the Topology object.

use async_trait::async_trait;
use metrics::counter;
use serde_json::Value;
use strum::{Display, EnumString};
use tracing::{debug, instrument};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum AgentKind {
    Route,
    Topology,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum AgentOp {
    Del,
    Apply,
    Update,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentApi: Send + Sync {
    /// Send the changed entries (a JSON array) to the agent at `host`.
    async fn push(&self, kind: AgentKind, host: &str, op: AgentOp, body: Value) -> AppResult<()>;
}

/// HTTP client for the agents
#[derive(Clone)]
pub struct HttpAgent {
    client: reqwest::Client,
    route_port: u16,
    topology_port: u16,
}

impl HttpAgent {
    pub fn new(route_port: u16, topology_port: u16) -> Self {
        Self {
            client: reqwest::Client::new(),
            route_port,
            topology_port,
        }
    }

    pub fn url(&self, kind: AgentKind, host: &str, op: AgentOp) -> String {
        let port = match kind {
            AgentKind::Route => self.route_port,
            AgentKind::Topology => self.topology_port,
        };
        format!("http://{}:{}/{}/{}", host, port, kind, op)
    }
}

#[async_trait]
impl AgentApi for HttpAgent {
    #[instrument(skip(self, body), fields(kind = %kind, op = %op))]
    async fn push(&self, kind: AgentKind, host: &str, op: AgentOp, body: Value) -> AppResult<()> {
        let url = self.url(kind, host, op);
        let result = match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(AppError::Unavailable(format!(
                "agent {} answered {}",
                url,
                response.status()
            ))),
            Err(e) => Err(AppError::Http(e)),
        };

        let outcome = if result.is_ok() { "ok" } else { "error" };
        counter!(
            "sdn_agent_push_total",
            1,
            "kind" => kind.to_string(),
            "op" => op.to_string(),
            "result" => outcome
        );
        debug!(url, outcome, "Agent push finished");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_urls() {
        let agent = HttpAgent::new(8080, 51112);
        assert_eq!(
            agent.url(AgentKind::Route, "10.42.0.7", AgentOp::Del),
            "http://10.42.0.7:8080/route/del"
        );
        assert_eq!(
            agent.url(AgentKind::Topology, "192.168.1.3", AgentOp::Apply),
            "http://192.168.1.3:51112/topology/apply"
        );
    }
}
