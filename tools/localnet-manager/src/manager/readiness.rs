// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::config::topology::AuthorityNode;
use crate::error::LocalnetError;
use crate::helpers::ProgressCtx;
use crate::manager::{LocalnetCtx, LocalnetManager};
use crate::process::CommandRunner;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

/// Answers whether the node exposing the given rpc port is ready to accept requests.
pub(crate) trait ReadinessProbe {
    async fn is_ready(&self, rpc_port: u16) -> bool;
}

#[derive(Deserialize)]
struct HealthResponse {
    result: Option<serde_json::Value>,
}

pub(crate) struct RpcHealthProbe {
    client: reqwest::Client,
}

impl RpcHealthProbe {
    pub(crate) fn new(request_timeout: Duration) -> Result<Self, LocalnetError> {
        Ok(RpcHealthProbe {
            client: reqwest::Client::builder().timeout(request_timeout).build()?,
        })
    }

    async fn system_health(&self, rpc_port: u16) -> Result<bool, LocalnetError> {
        let response = self
            .client
            .post(format!("http://127.0.0.1:{rpc_port}"))
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "system_health",
                "params": []
            }))
            .send()
            .await?
            .error_for_status()?;

        let health: HealthResponse = response.json().await?;
        Ok(health.result.is_some())
    }
}

impl ReadinessProbe for RpcHealthProbe {
    async fn is_ready(&self, rpc_port: u16) -> bool {
        match self.system_health(rpc_port).await {
            Ok(ready) => ready,
            Err(err) => {
                trace!("node at rpc port {rpc_port} is not ready yet: {err}");
                false
            }
        }
    }
}

impl<R: CommandRunner, P: ReadinessProbe> LocalnetManager<R, P> {
    async fn wait_for_node(&self, node: &AuthorityNode) -> Result<(), LocalnetError> {
        let readiness = &self.config.readiness;
        let deadline = Instant::now() + readiness.timeout;

        loop {
            if self.probe.is_ready(node.rpc_port).await {
                debug!("node at {} is ready", node.rpc_http_endpoint());
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(LocalnetError::NodeReadinessTimeout {
                    rpc_port: node.rpc_port,
                    timeout: readiness.timeout,
                });
            }
            sleep(readiness.poll_interval).await;
        }
    }

    pub(crate) async fn wait_for_readiness(
        &self,
        ctx: &LocalnetCtx,
        nodes: &[AuthorityNode],
    ) -> Result<(), LocalnetError> {
        for node in nodes {
            ctx.set_pb_message(format!(
                "waiting for the node at {} to start answering rpc requests...",
                node.base_path.display()
            ));
            ctx.async_with_progress(self.wait_for_node(node)).await?;
            ctx.println(format!(
                "\t✅ node at {} is ready (rpc port {})",
                node.base_path.display(),
                node.rpc_port
            ));
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeProbe;
    use super::*;
    use crate::config::topology::ChainTopologyConfig;
    use crate::manager::testing::TestLocalnet;

    #[tokio::test(start_paused = true)]
    async fn waits_until_nodes_answer() {
        let localnet = TestLocalnet::with_probe(FakeProbe::ready_after(3));
        let topology = ChainTopologyConfig::default_local();

        localnet
            .manager
            .wait_for_readiness(&LocalnetCtx::hidden(), &topology.authority_nodes)
            .await
            .unwrap();

        assert_eq!(localnet.manager.probe.probes(9944), 4);
        assert_eq!(localnet.manager.probe.probes(9945), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_nodes_time_out() {
        let localnet = TestLocalnet::with_probe(FakeProbe::never_ready());
        let topology = ChainTopologyConfig::default_local();

        let err = localnet
            .manager
            .wait_for_readiness(&LocalnetCtx::hidden(), &topology.authority_nodes)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LocalnetError::NodeReadinessTimeout { rpc_port: 9944, .. }
        ));
        // the second node is never probed
        assert_eq!(localnet.manager.probe.probes(9945), 0);
    }

    #[tokio::test]
    async fn closed_rpc_port_is_not_ready() {
        let probe = RpcHealthProbe::new(Duration::from_millis(500)).unwrap();
        // nothing should be listening on the discard port
        assert!(!probe.is_ready(9).await);
    }
}
