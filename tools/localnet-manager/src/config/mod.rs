// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::config::balance::Balance;
use crate::config::r#override::ConfigOverride;
use crate::config::template::{toml_escape, CONFIG_TEMPLATE};
use crate::error::LocalnetError;
use crate::helpers::write_atomically;
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub mod balance;
pub mod manifest;
pub mod r#override;
pub mod topology;
pub mod wallets;
mod template;

pub const DEFAULT_CONFIG_FILENAME: &str = "localnet.toml";

const DEFAULT_REPO_STORE: &str = "repo_store";
const DEFAULT_REPOSITORY_MANIFEST: &str = "utils/git_sources.yaml";
const DEFAULT_TOPOLOGY: &str = "utils/subtensor_config.yaml";
const DEFAULT_WALLET_INVENTORY: &str = "wallets.yaml";
const DEFAULT_STATE_FILE: &str = ".localnet-state.json";
const DEFAULT_NODE_PROJECT: &str = "repo_store/subtensor";
const DEFAULT_SCRIPTS_DIR: &str = "repo_store/subtensor/scripts";

const DEFAULT_NODE_BINARY: &str = "node-subtensor";
const DEFAULT_CHAIN_ID: &str = "bittensor";
const DEFAULT_BUILD_PROFILE: &str = "release";

const DEFAULT_WALLET_CLI: &str = "btcli";
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);

const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_READINESS_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_READINESS_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

const DEFAULT_TARGET_NETUID: u16 = 2;
const DEFAULT_VALIDATOR_MIN_BALANCE: u64 = 100;
const DEFAULT_VALIDATOR_STAKE: u64 = 100;
const DEFAULT_FAUCET_BATCH_SIZE: u64 = 1000;
const DEFAULT_FAUCET_FEE_BUFFER: u64 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    // directory against which all relative paths get resolved
    #[serde(skip)]
    pub(crate) home: PathBuf,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub wallet_cli: WalletCliConfig,

    #[serde(default)]
    pub readiness: ReadinessConfig,

    #[serde(default)]
    pub chain: ChainConfig,
}

impl Config {
    pub fn new<P: AsRef<Path>>(home: P) -> Self {
        Config {
            home: home.as_ref().to_path_buf(),
            paths: Default::default(),
            node: Default::default(),
            wallet_cli: Default::default(),
            readiness: Default::default(),
            chain: Default::default(),
        }
    }

    pub fn default_location<P: AsRef<Path>>(home: P) -> PathBuf {
        home.as_ref().join(DEFAULT_CONFIG_FILENAME)
    }

    pub fn with_override<O: ConfigOverride>(mut self, r#override: O) -> Self {
        r#override.override_config(&mut self);
        self
    }

    /// Loads the config from the explicitly provided path or, if none was given,
    /// from the default location within `home`, falling back to the defaults if no file exists there.
    pub fn load<P: AsRef<Path>>(home: P, explicit: Option<&Path>) -> Result<Self, LocalnetError> {
        let home = home.as_ref();
        let mut config = match explicit {
            Some(path) => Self::read_from_path(path)?,
            None => {
                let default_location = Self::default_location(home);
                if default_location.exists() {
                    Self::read_from_path(default_location)?
                } else {
                    debug!(
                        "no config file found at {}. using the defaults",
                        default_location.display()
                    );
                    Config::new(home)
                }
            }
        };
        config.home = home.to_path_buf();
        config.ensure_is_valid()?;
        Ok(config)
    }

    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self, LocalnetError> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|source| LocalnetError::ConfigLoadFailure {
                path: path.to_path_buf(),
                source,
            })?;
        let loaded = toml::from_str(&content).map_err(|source| LocalnetError::MalformedToml {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("loaded config file from {}", path.display());
        Ok(loaded)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), LocalnetError> {
        let path = path.as_ref();

        let mut reg = Handlebars::new();
        reg.register_escape_fn(toml_escape);
        let rendered = reg
            .render_template(CONFIG_TEMPLATE, self)
            .map_err(|err| LocalnetError::ConfigTemplateFailure {
                reason: err.to_string(),
            })?;

        write_atomically(path, rendered.as_bytes()).map_err(|source| {
            LocalnetError::ConfigSaveFailure {
                path: path.to_path_buf(),
                source,
            }
        })?;
        debug!("saved config file to {}", path.display());
        Ok(())
    }

    pub fn ensure_is_valid(&self) -> Result<(), LocalnetError> {
        if self.wallet_cli.retry.max_attempts == 0 {
            return Err(LocalnetError::InvalidConfig {
                reason: "wallet_cli.retry.max_attempts must be at least 1".into(),
            });
        }
        if self.readiness.poll_interval.is_zero() {
            return Err(LocalnetError::InvalidConfig {
                reason: "readiness.poll_interval must be non-zero".into(),
            });
        }
        if self.chain.faucet_batch_size == 0 {
            return Err(LocalnetError::InvalidConfig {
                reason: "chain.faucet_batch_size must be non-zero".into(),
            });
        }
        if self.node.binary_name.is_empty() || self.wallet_cli.program.is_empty() {
            return Err(LocalnetError::InvalidConfig {
                reason: "executable names must not be empty".into(),
            });
        }
        Ok(())
    }

    pub fn resolve<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.home.join(path)
        }
    }

    pub fn repo_store(&self) -> PathBuf {
        self.resolve(&self.paths.repo_store)
    }

    pub fn repository_manifest(&self) -> PathBuf {
        self.resolve(&self.paths.repository_manifest)
    }

    pub fn topology(&self) -> PathBuf {
        self.resolve(&self.paths.topology)
    }

    pub fn wallet_inventory(&self) -> PathBuf {
        self.resolve(&self.paths.wallet_inventory)
    }

    pub fn state_file(&self) -> PathBuf {
        self.resolve(&self.paths.state_file)
    }

    pub fn node_project(&self) -> PathBuf {
        self.resolve(&self.paths.node_project)
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.resolve(&self.paths.scripts_dir)
    }

    pub fn node_manifest_path(&self) -> PathBuf {
        self.node_project().join("Cargo.toml")
    }

    pub fn node_binary_path(&self) -> PathBuf {
        self.node_project()
            .join("target")
            .join(&self.node.build_profile)
            .join(&self.node.binary_name)
    }

    pub fn chainspec_path(&self) -> PathBuf {
        self.scripts_dir().join("specs").join("local.json")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub repo_store: PathBuf,
    pub repository_manifest: PathBuf,
    pub topology: PathBuf,
    pub wallet_inventory: PathBuf,
    pub state_file: PathBuf,
    pub node_project: PathBuf,
    pub scripts_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            repo_store: DEFAULT_REPO_STORE.into(),
            repository_manifest: DEFAULT_REPOSITORY_MANIFEST.into(),
            topology: DEFAULT_TOPOLOGY.into(),
            wallet_inventory: DEFAULT_WALLET_INVENTORY.into(),
            state_file: DEFAULT_STATE_FILE.into(),
            node_project: DEFAULT_NODE_PROJECT.into(),
            scripts_dir: DEFAULT_SCRIPTS_DIR.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    pub binary_name: String,
    pub chain_id: String,
    pub build_profile: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            binary_name: DEFAULT_NODE_BINARY.to_string(),
            chain_id: DEFAULT_CHAIN_ID.to_string(),
            build_profile: DEFAULT_BUILD_PROFILE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WalletCliConfig {
    pub program: String,
    pub retry: RetryPolicy,
}

impl Default for WalletCliConfig {
    fn default() -> Self {
        WalletCliConfig {
            program: DEFAULT_WALLET_CLI.to_string(),
            retry: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    pub max_attempts: u32,

    #[serde(with = "humantime_serde")]
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Delay preceding the provided (1-indexed) attempt.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadinessConfig {
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        ReadinessConfig {
            timeout: DEFAULT_READINESS_TIMEOUT,
            poll_interval: DEFAULT_READINESS_POLL_INTERVAL,
            request_timeout: DEFAULT_READINESS_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChainConfig {
    pub target_netuid: u16,

    /// Expressed in whole tokens.
    pub validator_min_balance: u64,

    /// Expressed in whole tokens.
    pub validator_stake: u64,

    pub faucet_batch_size: u64,
    pub faucet_fee_buffer: u64,
}

impl ChainConfig {
    pub fn validator_min_balance(&self) -> Balance {
        Balance::from_whole_units(self.validator_min_balance)
    }

    pub fn validator_stake(&self) -> Balance {
        Balance::from_whole_units(self.validator_stake)
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            target_netuid: DEFAULT_TARGET_NETUID,
            validator_min_balance: DEFAULT_VALIDATOR_MIN_BALANCE,
            validator_stake: DEFAULT_VALIDATOR_STAKE,
            faucet_batch_size: DEFAULT_FAUCET_BATCH_SIZE,
            faucet_fee_buffer: DEFAULT_FAUCET_FEE_BUFFER,
        }
    }
}
