// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::error::LocalnetError;
use crate::helpers::write_atomically;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Phase {
    #[default]
    Fresh,

    /// Repositories got cloned, the node binary got built and the nodes got launched at least once.
    DependenciesInstalled,

    /// The whole chain configuration pipeline finished successfully.
    NetworkConfigured,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TrackedNode {
    pub(crate) base_path: PathBuf,
    pub(crate) pid: u32,
    pub(crate) rpc_port: u16,

    #[serde(with = "time::serde::rfc3339")]
    pub(crate) started_at: OffsetDateTime,
}

impl TrackedNode {
    pub(crate) fn new(base_path: PathBuf, pid: u32, rpc_port: u16) -> Self {
        TrackedNode {
            base_path,
            pid,
            rpc_port,
            started_at: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ChainSetup {
    /// Names of wallets that already own a registered subnet.
    #[serde(default)]
    pub(crate) registered_subnets: BTreeSet<String>,

    /// Hotkeys, in the `wallet/hotkey` form, registered to the target subnet.
    #[serde(default)]
    pub(crate) registered_hotkeys: BTreeSet<String>,

    #[serde(default)]
    pub(crate) validator_staked: bool,
}

impl ChainSetup {
    pub(crate) fn hotkey_id(wallet_name: &str, hotkey_name: &str) -> String {
        format!("{wallet_name}/{hotkey_name}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RunState {
    #[serde(skip)]
    path: PathBuf,

    #[serde(default)]
    pub(crate) phase: Phase,

    #[serde(default)]
    pub(crate) nodes: Vec<TrackedNode>,

    #[serde(default)]
    pub(crate) chain_setup: ChainSetup,
}

impl RunState {
    /// Loads the state persisted at the provided path or returns a fresh state if none exists yet.
    pub(crate) fn load<P: AsRef<Path>>(path: P) -> Result<Self, LocalnetError> {
        let path = path.as_ref();
        if !path.exists() {
            trace!("no run state at {}", path.display());
            return Ok(RunState {
                path: path.to_path_buf(),
                ..Default::default()
            });
        }

        let content = fs::read(path).map_err(|source| LocalnetError::ConfigLoadFailure {
            path: path.to_path_buf(),
            source,
        })?;
        let mut state: RunState = serde_json::from_slice(&content)?;
        state.path = path.to_path_buf();
        debug!(
            "loaded run state from {} (phase: {:?}, tracked nodes: {})",
            path.display(),
            state.phase,
            state.nodes.len()
        );
        Ok(state)
    }

    pub(crate) fn save(&self) -> Result<(), LocalnetError> {
        let content = serde_json::to_vec_pretty(self)?;
        write_atomically(&self.path, &content).map_err(|source| {
            LocalnetError::ConfigSaveFailure {
                path: self.path.clone(),
                source,
            }
        })
    }

    pub(crate) fn dependencies_installed(&self) -> bool {
        self.phase >= Phase::DependenciesInstalled
    }

    /// Moves the phase forward. It never goes backwards.
    pub(crate) fn advance_to(&mut self, phase: Phase) {
        self.phase = self.phase.max(phase)
    }

    pub(crate) fn tracked_node(&self, base_path: &Path) -> Option<&TrackedNode> {
        self.nodes.iter().find(|node| node.base_path == base_path)
    }

    pub(crate) fn track_node(&mut self, node: TrackedNode) {
        self.nodes.retain(|tracked| tracked.base_path != node.base_path);
        self.nodes.push(node)
    }

    pub(crate) fn take_nodes(&mut self) -> Vec<TrackedNode> {
        std::mem::take(&mut self.nodes)
    }

    /// Forgets everything tied to the on-disk chain data. Installed dependencies remain untouched.
    pub(crate) fn reset_chain(&mut self) {
        self.nodes.clear();
        self.chain_setup = ChainSetup::default();
        self.phase = self.phase.min(Phase::DependenciesInstalled);
    }
}
