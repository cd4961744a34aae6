// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::config::topology::{AuthorityNode, ChainTopologyConfig};
use crate::error::LocalnetError;
use crate::helpers::ProgressCtx;
use crate::manager::readiness::ReadinessProbe;
use crate::manager::state::{RunState, TrackedNode};
use crate::manager::{LocalnetCtx, LocalnetManager};
use crate::process::{CommandRunner, Invocation, ProcessStatus};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

const NODE_KEY_FILE: &str = "secret_ed25519";

/// Artifacts required for launching any of the authority nodes.
pub(crate) struct NodeArtifacts {
    pub(crate) binary: PathBuf,
    pub(crate) chainspec: PathBuf,
}

/// What the pid of a tracked node points at right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeProcess {
    Running,
    Exited,

    /// The node is gone and its pid got reused by an unrelated process.
    Reused,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct StopReport {
    pub(crate) stopped: Vec<u32>,
    pub(crate) not_running: Vec<u32>,
    pub(crate) stale: Vec<u32>,
    pub(crate) failed: Vec<u32>,
}

fn runs_node(command_line: &[String], binary_name: &str, base_path: &Path) -> bool {
    let Some(program) = command_line.first() else {
        return false;
    };
    let same_binary = Path::new(program)
        .file_name()
        .is_some_and(|name| name == binary_name);
    let same_base_path = command_line
        .windows(2)
        .any(|pair| pair[0] == "--base-path" && Path::new(&pair[1]) == base_path);

    same_binary && same_base_path
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct PurgeReport {
    pub(crate) stopped: StopReport,
    pub(crate) removed: Vec<PathBuf>,
    pub(crate) missing: Vec<PathBuf>,
    pub(crate) failed: Vec<PathBuf>,
}

impl<R: CommandRunner, P: ReadinessProbe> LocalnetManager<R, P> {
    pub(crate) fn node_key_path(&self, node: &AuthorityNode) -> PathBuf {
        node.base_path
            .join("chains")
            .join(&self.config.node.chain_id)
            .join("network")
            .join(NODE_KEY_FILE)
    }

    /// Generates the network identity of every node that doesn't have one yet.
    /// Existing keys are never replaced. Returns the number of generated keys.
    pub(crate) async fn ensure_node_keys(
        &self,
        ctx: &LocalnetCtx,
        artifacts: &NodeArtifacts,
        nodes: &[AuthorityNode],
    ) -> Result<usize, LocalnetError> {
        let mut generated = 0;
        for node in nodes {
            let key_path = self.node_key_path(node);
            if key_path.exists() {
                info!(
                    "node at {} already has its network key",
                    node.base_path.display()
                );
                continue;
            }

            ctx.set_pb_message(format!(
                "generating network key for the node at {}...",
                node.base_path.display()
            ));
            let invocation = Invocation::new(artifacts.binary.display().to_string())
                .args(["key", "generate-node-key"])
                .arg(format!("--chain={}", artifacts.chainspec.display()))
                .arg("--base-path")
                .path_arg(&node.base_path);
            ctx.async_with_progress(self.runner.run_checked(&invocation))
                .await
                .map_err(|source| LocalnetError::NodeKeyGenerationFailure {
                    base_path: node.base_path.clone(),
                    source: Box::new(source),
                })?;

            ctx.println(format!(
                "\tgenerated network key for the node at {}",
                node.base_path.display()
            ));
            generated += 1;
        }
        Ok(generated)
    }

    /// Builds the binary, generates the chain specification and the node keys, if any are missing.
    pub(crate) async fn prepare_node_artifacts(
        &self,
        ctx: &LocalnetCtx,
        topology: &ChainTopologyConfig,
    ) -> Result<NodeArtifacts, LocalnetError> {
        let binary = self.ensure_binary(ctx, &topology.binary_features).await?;
        let chainspec = self.ensure_chainspec(ctx, &binary).await?;
        let artifacts = NodeArtifacts { binary, chainspec };

        self.ensure_node_keys(ctx, &artifacts, &topology.authority_nodes)
            .await?;
        Ok(artifacts)
    }

    /// Checks whether the tracked pid still belongs to the node we launched.
    /// Where the command line can't be inspected, a live pid is trusted.
    pub(crate) fn tracked_process(&self, node: &TrackedNode) -> NodeProcess {
        match self.runner.inspect(node.pid) {
            ProcessStatus::Gone => NodeProcess::Exited,
            ProcessStatus::Running(None) => NodeProcess::Running,
            ProcessStatus::Running(Some(command_line))
                if runs_node(&command_line, &self.config.node.binary_name, &node.base_path) =>
            {
                NodeProcess::Running
            }
            ProcessStatus::Running(Some(command_line)) => {
                warn!(
                    "pid {} tracked for the node at {} since {} now belongs to '{}'",
                    node.pid,
                    node.base_path.display(),
                    node.started_at,
                    command_line.join(" ")
                );
                NodeProcess::Reused
            }
        }
    }

    fn launch_invocation(&self, artifacts: &NodeArtifacts, node: &AuthorityNode) -> Invocation {
        Invocation::new(artifacts.binary.display().to_string())
            .arg("--base-path")
            .path_arg(&node.base_path)
            .arg("--chain")
            .path_arg(&artifacts.chainspec)
            .arg("--port")
            .arg(node.listen_port.to_string())
            .arg("--rpc-port")
            .arg(node.rpc_port.to_string())
            .args(node.flags())
    }

    /// Starts every authority node that isn't already running in the background
    /// and records it in the run state. Returns the number of launched nodes.
    pub(crate) async fn launch_nodes(
        &self,
        ctx: &LocalnetCtx,
        artifacts: &NodeArtifacts,
        topology: &ChainTopologyConfig,
        state: &mut RunState,
    ) -> Result<usize, LocalnetError> {
        let mut launched = 0;
        for node in &topology.authority_nodes {
            if let Some(tracked) = state.tracked_node(&node.base_path) {
                match self.tracked_process(tracked) {
                    NodeProcess::Running => {
                        ctx.println(format!(
                            "\tnode at {} is already running (pid {})",
                            node.base_path.display(),
                            tracked.pid
                        ));
                        continue;
                    }
                    NodeProcess::Exited => warn!(
                        "node at {} (pid {}) is no longer running. relaunching it",
                        node.base_path.display(),
                        tracked.pid
                    ),
                    NodeProcess::Reused => {
                        warn!("relaunching the node at {}", node.base_path.display())
                    }
                }
            }

            let invocation = self.launch_invocation(artifacts, node);
            let pid = self.runner.spawn_detached(&invocation).await?;
            state.track_node(TrackedNode::new(node.base_path.clone(), pid, node.rpc_port));
            state.save()?;

            ctx.println(format!(
                "\tlaunched node at {} (pid {pid}, rpc port {})",
                node.base_path.display(),
                node.rpc_port
            ));
            launched += 1;
        }
        Ok(launched)
    }

    async fn kill_by_name(&self) {
        let binary_name = &self.config.node.binary_name;
        let invocation = Invocation::new("pkill")
            .args(["-9", "-x"])
            .arg(binary_name);

        match self.runner.run(&invocation).await {
            Ok(output) if output.success() => info!("killed all remaining '{binary_name}' processes"),
            // pkill exits with 1 if nothing matched
            Ok(output) if output.code == Some(1) => info!("no other '{binary_name}' processes were running"),
            Ok(output) => error!(
                "failed to kill the remaining '{binary_name}' processes: {}",
                output.stderr.trim()
            ),
            Err(err) => error!("failed to kill the remaining '{binary_name}' processes: {err}"),
        }
    }

    async fn terminate_tracked_nodes(&self, state: &mut RunState, force: bool) -> StopReport {
        let mut report = StopReport::default();

        for node in state.take_nodes() {
            match self.tracked_process(&node) {
                NodeProcess::Running => {}
                NodeProcess::Exited => {
                    warn!(
                        "node at {} (pid {}) was no longer running",
                        node.base_path.display(),
                        node.pid
                    );
                    report.not_running.push(node.pid);
                    continue;
                }
                NodeProcess::Reused => {
                    report.stale.push(node.pid);
                    continue;
                }
            }

            match self.runner.terminate(node.pid) {
                Ok(true) => {
                    info!(
                        "stopped node at {} (pid {})",
                        node.base_path.display(),
                        node.pid
                    );
                    report.stopped.push(node.pid);
                }
                Ok(false) => {
                    warn!(
                        "node at {} (pid {}) was no longer running",
                        node.base_path.display(),
                        node.pid
                    );
                    report.not_running.push(node.pid);
                }
                Err(err) => {
                    error!("failed to stop node at {}: {err}", node.base_path.display());
                    report.failed.push(node.pid);
                    state.track_node(node);
                }
            }
        }

        if force {
            self.kill_by_name().await;
        }
        report
    }

    /// Stops all nodes launched by this tool. With `force`, any process named after
    /// the node binary is killed as well.
    pub(crate) async fn stop_nodes(&self, force: bool) -> Result<StopReport, LocalnetError> {
        let mut state = self.load_state()?;
        if state.nodes.is_empty() && !force {
            warn!("there are no tracked nodes to stop");
        }

        let report = self.terminate_tracked_nodes(&mut state, force).await;
        state.save()?;
        Ok(report)
    }

    fn remove_base_path(&self, base_path: &Path, report: &mut PurgeReport) {
        if !base_path.exists() {
            error!("the directory '{}' does not exist", base_path.display());
            report.missing.push(base_path.to_path_buf());
            return;
        }

        match fs::remove_dir_all(base_path) {
            Ok(()) => {
                info!(
                    "directory '{}' has been removed successfully",
                    base_path.display()
                );
                report.removed.push(base_path.to_path_buf());
            }
            Err(err) => {
                error!("failed to remove '{}': {err}", base_path.display());
                report.failed.push(base_path.to_path_buf());
            }
        }
    }

    /// Stops the nodes and wipes their on-disk chain state, so the next start begins from genesis.
    pub(crate) async fn purge_chain_state(&self, force: bool) -> Result<PurgeReport, LocalnetError> {
        let topology = self.load_topology()?;
        let mut state = self.load_state()?;

        let mut report = PurgeReport {
            stopped: self.terminate_tracked_nodes(&mut state, force).await,
            ..Default::default()
        };
        for node in &topology.authority_nodes {
            self.remove_base_path(&node.base_path, &mut report);
        }

        state.reset_chain();
        state.save()?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::state::Phase;
    use crate::manager::testing::TestLocalnet;
    use crate::process::testing::{failed_output, FakeRunner};

    async fn prepared(localnet: &TestLocalnet) -> (ChainTopologyConfig, NodeArtifacts) {
        let topology = localnet.manager.load_topology().unwrap();
        let artifacts = localnet
            .manager
            .prepare_node_artifacts(&LocalnetCtx::hidden(), &topology)
            .await
            .unwrap();
        (topology, artifacts)
    }

    #[tokio::test]
    async fn node_keys_are_generated_only_once() {
        let localnet = TestLocalnet::new();
        let (topology, artifacts) = prepared(&localnet).await;
        let keygen = || {
            localnet
                .runner()
                .invocations()
                .into_iter()
                .filter(|inv| inv.has_arg("generate-node-key"))
                .count()
        };
        assert_eq!(keygen(), 2);
        for node in &topology.authority_nodes {
            assert!(localnet.manager.node_key_path(node).exists());
        }

        let generated = localnet
            .manager
            .ensure_node_keys(&LocalnetCtx::hidden(), &artifacts, &topology.authority_nodes)
            .await
            .unwrap();
        assert_eq!(generated, 0);
        assert_eq!(keygen(), 2);
    }

    #[tokio::test]
    async fn failed_key_generation_is_fatal() {
        let localnet = TestLocalnet::with_runner(FakeRunner::with_handler(|_| {
            failed_output("invalid chain spec")
        }));
        let topology = localnet.manager.load_topology().unwrap();
        let artifacts = NodeArtifacts {
            binary: "/bin/node".into(),
            chainspec: "/specs/local.json".into(),
        };

        let err = localnet
            .manager
            .ensure_node_keys(&LocalnetCtx::hidden(), &artifacts, &topology.authority_nodes)
            .await
            .unwrap_err();
        assert!(matches!(err, LocalnetError::NodeKeyGenerationFailure { .. }));
    }

    #[tokio::test]
    async fn launching_nodes_tracks_their_processes() {
        let localnet = TestLocalnet::new();
        let (topology, artifacts) = prepared(&localnet).await;
        let mut state = localnet.manager.load_state().unwrap();

        let launched = localnet
            .manager
            .launch_nodes(&LocalnetCtx::hidden(), &artifacts, &topology, &mut state)
            .await
            .unwrap();
        assert_eq!(launched, 2);

        let alice = &topology.authority_nodes[0];
        let launch = localnet
            .runner()
            .invocations()
            .into_iter()
            .find(|inv| inv.has_arg("--rpc-port") && inv.has_arg("--alice"))
            .unwrap();
        assert_eq!(
            launch.flag_value("--base-path"),
            Some(alice.base_path.display().to_string().as_str())
        );
        assert_eq!(launch.flag_value("--port"), Some("30334"));
        assert_eq!(launch.flag_value("--rpc-port"), Some("9944"));

        // the default flags got used for the node without explicit ones
        let bob = localnet
            .runner()
            .invocations()
            .into_iter()
            .find(|inv| inv.has_arg("--rpc-port") && inv.flag_value("--port") == Some("30335"))
            .unwrap();
        assert!(bob.has_arg("--validator"));
        assert!(bob.has_arg("--unsafe-force-node-key-generation"));

        // tracked state got persisted
        let persisted: Vec<_> = localnet.state().nodes.iter().map(|n| n.pid).collect();
        let tracked: Vec<_> = state.nodes.iter().map(|n| n.pid).collect();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted, tracked);
    }

    #[tokio::test]
    async fn dead_nodes_get_relaunched() {
        let localnet = TestLocalnet::new();
        let (topology, artifacts) = prepared(&localnet).await;
        let mut state = localnet.manager.load_state().unwrap();
        let ctx = LocalnetCtx::hidden();

        localnet
            .manager
            .launch_nodes(&ctx, &artifacts, &topology, &mut state)
            .await
            .unwrap();
        let alice_pid = state.nodes[0].pid;
        localnet.runner().terminate(alice_pid).unwrap();

        let relaunched = localnet
            .manager
            .launch_nodes(&ctx, &artifacts, &topology, &mut state)
            .await
            .unwrap();
        assert_eq!(relaunched, 1);
        assert_eq!(state.nodes.len(), 2);
        assert!(state.nodes.iter().all(|node| node.pid != alice_pid));
    }

    #[tokio::test]
    async fn stopping_terminates_tracked_processes() {
        let localnet = TestLocalnet::new();
        let (topology, artifacts) = prepared(&localnet).await;
        let mut state = localnet.manager.load_state().unwrap();
        localnet
            .manager
            .launch_nodes(&LocalnetCtx::hidden(), &artifacts, &topology, &mut state)
            .await
            .unwrap();
        let pids: Vec<_> = state.nodes.iter().map(|node| node.pid).collect();
        localnet.runner().terminate(pids[1]).unwrap();

        let report = localnet.manager.stop_nodes(false).await.unwrap();
        assert_eq!(report.stopped, vec![pids[0]]);
        assert_eq!(report.not_running, vec![pids[1]]);
        assert_eq!(localnet.runner().terminated(), vec![pids[1], pids[0]]);
        assert!(localnet.runner().calls("pkill", &[]).is_empty());
        assert!(localnet.state().nodes.is_empty());
    }

    #[tokio::test]
    async fn stopping_exited_nodes_is_not_an_error() {
        let localnet = TestLocalnet::new();
        let home = localnet.home.path();
        let mut state = localnet.manager.load_state().unwrap();
        state.track_node(TrackedNode::new(home.join("alice"), 4242, 9944));
        state.save().unwrap();

        let report = localnet.manager.stop_nodes(false).await.unwrap();
        assert_eq!(report.not_running, vec![4242]);
        assert!(report.stopped.is_empty());
        assert!(report.failed.is_empty());
        assert!(localnet.runner().terminated().is_empty());
        assert!(localnet.state().nodes.is_empty());
    }

    #[tokio::test]
    async fn reused_pids_are_never_killed() {
        let localnet = TestLocalnet::new();
        let home = localnet.home.path();
        let mut state = localnet.manager.load_state().unwrap();
        state.track_node(TrackedNode::new(home.join("alice"), 4242, 9944));
        state.track_node(TrackedNode::new(home.join("bob"), 4243, 9945));
        state.save().unwrap();

        localnet.runner().mark_running(4242, &["sleep", "600"]);
        // same binary, but serving another chain
        localnet.runner().mark_running(
            4243,
            &["/opt/node-subtensor", "--base-path", "/srv/other-chain"],
        );

        let report = localnet.manager.stop_nodes(false).await.unwrap();
        assert_eq!(report.stale, vec![4242, 4243]);
        assert!(report.stopped.is_empty());
        assert!(localnet.runner().terminated().is_empty());
        assert!(localnet.state().nodes.is_empty());
    }

    #[tokio::test]
    async fn nodes_whose_pid_got_reused_are_relaunched() {
        let localnet = TestLocalnet::new();
        let (topology, artifacts) = prepared(&localnet).await;
        let ctx = LocalnetCtx::hidden();
        let mut state = localnet.manager.load_state().unwrap();
        localnet
            .manager
            .launch_nodes(&ctx, &artifacts, &topology, &mut state)
            .await
            .unwrap();

        let alice_pid = state.nodes[0].pid;
        localnet.runner().terminate(alice_pid).unwrap();
        localnet.runner().mark_running(alice_pid, &["sleep", "600"]);

        let relaunched = localnet
            .manager
            .launch_nodes(&ctx, &artifacts, &topology, &mut state)
            .await
            .unwrap();
        assert_eq!(relaunched, 1);
        assert!(state.nodes.iter().all(|node| node.pid != alice_pid));
        // only the explicit termination above, the unrelated process is left alone
        assert_eq!(localnet.runner().terminated(), vec![alice_pid]);
    }

    #[test]
    fn node_identity_requires_binary_and_base_path() {
        let base_path = Path::new("/tmp/alice");
        let command_line = |args: &[&str]| args.iter().map(|a| a.to_string()).collect::<Vec<_>>();

        assert!(runs_node(
            &command_line(&["/x/target/release/node-subtensor", "--base-path", "/tmp/alice"]),
            "node-subtensor",
            base_path
        ));
        assert!(!runs_node(
            &command_line(&["/x/target/release/node-subtensor", "--base-path", "/tmp/bob"]),
            "node-subtensor",
            base_path
        ));
        assert!(!runs_node(
            &command_line(&["/usr/bin/python3", "--base-path", "/tmp/alice"]),
            "node-subtensor",
            base_path
        ));
        assert!(!runs_node(&[], "node-subtensor", base_path));
    }

    #[tokio::test]
    async fn forced_stop_kills_by_process_name() {
        let localnet = TestLocalnet::new();

        let report = localnet.manager.stop_nodes(true).await.unwrap();
        assert_eq!(report, StopReport::default());

        let kills = localnet.runner().calls("pkill", &["-9", "-x"]);
        assert_eq!(kills.len(), 1);
        assert!(kills[0].has_arg("node-subtensor"));
    }

    #[tokio::test]
    async fn purging_removes_existing_base_paths_and_reports_missing_ones() {
        let localnet = TestLocalnet::new();
        let home = localnet.home.path();
        let topology = format!(
            r#"
authorityNodes:
  - base-path: {}
  - base-path: {}
    subtensor_rpc_port: 9945
  - base-path: {}
    subtensor_rpc_port: 9946
"#,
            home.join("alice").display(),
            home.join("bob").display(),
            home.join("charlie").display()
        );
        fs::write(localnet.manager.config().topology(), topology).unwrap();
        for name in ["alice", "bob"] {
            fs::create_dir_all(home.join(name).join("chains")).unwrap();
        }

        let mut state = localnet.manager.load_state().unwrap();
        state.advance_to(Phase::NetworkConfigured);
        state.track_node(TrackedNode::new(home.join("alice"), 4242, 9944));
        state.chain_setup.validator_staked = true;
        state.save().unwrap();
        localnet.runner().mark_alive(4242);

        let report = localnet.manager.purge_chain_state(false).await.unwrap();
        assert_eq!(report.stopped.stopped, vec![4242]);
        assert_eq!(report.removed, vec![home.join("alice"), home.join("bob")]);
        assert_eq!(report.missing, vec![home.join("charlie")]);
        assert!(report.failed.is_empty());
        assert!(!home.join("alice").exists());
        assert!(!home.join("bob").exists());

        let state = localnet.state();
        assert_eq!(state.phase, Phase::DependenciesInstalled);
        assert!(state.nodes.is_empty());
        assert!(!state.chain_setup.validator_staked);
    }
}
