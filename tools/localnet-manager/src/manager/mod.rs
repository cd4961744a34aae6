// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::config::topology::ChainTopologyConfig;
use crate::config::Config;
use crate::error::LocalnetError;
use crate::helpers::{step, ProgressCtx, ProgressTracker};
use crate::manager::readiness::{ReadinessProbe, RpcHealthProbe};
use crate::manager::state::{Phase, RunState};
use crate::process::{CommandRunner, SystemRunner};
use std::path::Path;
use tracing::info;

pub(crate) mod binary;
pub(crate) mod chain;
pub(crate) mod nodes;
pub(crate) mod readiness;
pub(crate) mod repos;
pub(crate) mod state;
pub(crate) mod wallet_cli;
pub(crate) mod wallets;

const START_STEPS: usize = 5;

pub(crate) struct LocalnetCtx {
    progress: ProgressTracker,
}

impl ProgressCtx for LocalnetCtx {
    fn progress_tracker(&self) -> &ProgressTracker {
        &self.progress
    }
}

impl LocalnetCtx {
    pub(crate) fn new<S: AsRef<str>>(msg: S, show_progress: bool) -> Self {
        if show_progress {
            LocalnetCtx {
                progress: ProgressTracker::new(msg),
            }
        } else {
            LocalnetCtx::hidden()
        }
    }

    pub(crate) fn hidden() -> Self {
        LocalnetCtx {
            progress: ProgressTracker::hidden(),
        }
    }
}

pub(crate) type SystemManager = LocalnetManager<SystemRunner, RpcHealthProbe>;

pub(crate) struct LocalnetManager<R, P> {
    config: Config,
    runner: R,
    probe: P,
    show_progress: bool,
}

impl SystemManager {
    pub(crate) fn new(config: Config, show_progress: bool) -> Result<Self, LocalnetError> {
        let probe = RpcHealthProbe::new(config.readiness.request_timeout)?;
        Ok(LocalnetManager::with_components(config, SystemRunner, probe).with_progress(show_progress))
    }
}

impl<R: CommandRunner, P: ReadinessProbe> LocalnetManager<R, P> {
    pub(crate) fn with_components(config: Config, runner: R, probe: P) -> Self {
        LocalnetManager {
            config,
            runner,
            probe,
            show_progress: false,
        }
    }

    #[must_use]
    pub(crate) fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    fn ctx<S: AsRef<str>>(&self, msg: S) -> LocalnetCtx {
        LocalnetCtx::new(msg, self.show_progress)
    }

    pub(crate) fn load_topology(&self) -> Result<ChainTopologyConfig, LocalnetError> {
        ChainTopologyConfig::load(self.config.topology())
    }

    pub(crate) fn load_state(&self) -> Result<RunState, LocalnetError> {
        RunState::load(self.config.state_file())
    }

    /// Brings the whole localnet up: installs the dependencies (on the first run), launches the nodes,
    /// makes sure all wallets exist and configures the chain.
    pub(crate) async fn start<D: AsRef<Path>>(&self, wallet_dir: D) -> Result<(), LocalnetError> {
        let wallet_dir = wallet_dir.as_ref();
        let ctx = self.ctx(format!(
            "\n🚀 starting the localnet defined in {}",
            self.config.topology().display()
        ));

        let topology = self.load_topology()?;
        let mut state = self.load_state()?;
        let first_run = !state.dependencies_installed();

        if first_run {
            ctx.println(format!(
                "📥 {}Installing dependencies...",
                step(1, START_STEPS)
            ));
            info!("dependencies are not yet installed. beginning their installation");
            self.clone_repositories(&ctx).await?;
            ctx.println("\t✅ all repositories are available");
        } else {
            ctx.println(format!(
                "📥 {}Dependencies are already installed",
                step(1, START_STEPS)
            ));
        }

        ctx.println(format!(
            "🔨 {}Preparing the node binary, chain specification and node keys...",
            step(2, START_STEPS)
        ));
        let artifacts = self.prepare_node_artifacts(&ctx, &topology).await?;

        ctx.println(format!(
            "🌐 {}Launching the authority nodes...",
            step(3, START_STEPS)
        ));
        self.launch_nodes(&ctx, &artifacts, &topology, &mut state)
            .await?;
        self.wait_for_readiness(&ctx, &topology.authority_nodes)
            .await?;

        if first_run {
            state.advance_to(Phase::DependenciesInstalled);
            state.save()?;
        }

        let endpoint = topology.primary_node()?.rpc_ws_endpoint();
        let cli = self.wallet_cli(wallet_dir, endpoint.clone());

        ctx.println(format!("👛 {}Ensuring wallets exist...", step(4, START_STEPS)));
        let inventory = self.ensure_wallets(&ctx, &cli).await?;

        ctx.println(format!("⛓️ {}Configuring the chain...", step(5, START_STEPS)));
        self.configure_chain(&ctx, &cli, &inventory, &mut state)
            .await?;

        state.advance_to(Phase::NetworkConfigured);
        state.save()?;

        ctx.println(format!("🎉 the localnet is up. rpc endpoint: {endpoint}"));
        Ok(())
    }
}
