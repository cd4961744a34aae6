// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::config::Config;
use crate::error::LocalnetError;
use crate::manager::SystemManager;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

mod fund;
mod init;
mod purge;
mod start;
mod stop;

#[derive(clap::Args, Debug)]
pub(crate) struct CommonArgs {
    /// Directory holding the localnet configuration, the yaml descriptors and the run state
    #[clap(long, env = "LOCALNET_HOME", default_value = ".")]
    pub(crate) home: PathBuf,

    /// Explicit path to the localnet config file. Defaults to `<home>/localnet.toml`
    #[clap(long, env = "LOCALNET_CONFIG")]
    pub(crate) config: Option<PathBuf>,

    /// Wallet cli executable to use instead of the configured one
    #[clap(long, env = "LOCALNET_WALLET_CLI")]
    pub(crate) wallet_cli: Option<String>,
}

impl CommonArgs {
    pub(crate) fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| Config::default_location(&self.home))
    }

    pub(crate) fn load_config(&self) -> Result<Config, LocalnetError> {
        Ok(Config::load(&self.home, self.config.as_deref())?.with_override(self))
    }

    pub(crate) fn localnet_manager(&self, show_progress: bool) -> Result<SystemManager, LocalnetError> {
        SystemManager::new(self.load_config()?, show_progress)
    }
}

#[derive(Parser, Debug)]
#[clap(author = "Nymtech", version, about)]
pub(crate) struct Cli {
    /// Only log warnings and errors and hide the progress output
    #[clap(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Log debug information
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

impl Cli {
    pub(crate) fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::WARN
        } else if self.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        }
    }

    pub(crate) async fn execute(self) -> Result<(), LocalnetError> {
        let show_progress = !self.quiet;
        match self.command {
            Commands::Init(args) => init::execute(args),
            Commands::Start(args) => start::execute(args, show_progress).await,
            Commands::Stop(args) => stop::execute(args).await,
            Commands::Purge(args) => purge::execute(args).await,
            Commands::Fund(args) => fund::execute(args, show_progress).await,
        }
    }
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Write the default config file, repository manifest and chain topology into the home directory
    Init(init::Args),

    /// Bring the localnet up: install the dependencies on the first run, launch the nodes,
    /// ensure the wallets exist and configure the chain
    Start(start::Args),

    /// Stop all nodes launched by this tool
    Stop(stop::Args),

    /// Stop the nodes and remove all of their chain data
    Purge(purge::Args),

    /// Send funds from the admin wallet to an arbitrary address
    Fund(fund::Args),
}
