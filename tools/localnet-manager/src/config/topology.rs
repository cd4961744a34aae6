// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::error::LocalnetError;
use crate::helpers::write_atomically;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_LISTEN_PORT: u16 = 30333;
pub const DEFAULT_RPC_PORT: u16 = 9944;

const COMMON_NODE_FLAGS: &str =
    "--rpc-cors=all --allow-private-ipv4 --discover-local --unsafe-force-node-key-generation";

fn default_listen_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

fn default_rpc_port() -> u16 {
    DEFAULT_RPC_PORT
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    #[default]
    Validator,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityNode {
    /// Root of the node's on-disk state. Doubles as the node's identity within the localnet.
    #[serde(rename = "base-path")]
    pub base_path: PathBuf,

    #[serde(rename = "subtensor_port", default = "default_listen_port")]
    pub listen_port: u16,

    #[serde(rename = "subtensor_rpc_port", default = "default_rpc_port")]
    pub rpc_port: u16,

    /// Explicit flags passed to the node. If not provided, they're derived from the node role.
    #[serde(
        rename = "subtensor_flags",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cli_flags: Option<String>,

    #[serde(default)]
    pub role: NodeRole,
}

impl AuthorityNode {
    pub fn flags(&self) -> Vec<String> {
        let flags = match &self.cli_flags {
            Some(flags) => flags.clone(),
            None => match self.role {
                NodeRole::Validator => format!("--validator {COMMON_NODE_FLAGS}"),
                NodeRole::Full => COMMON_NODE_FLAGS.to_string(),
            },
        };
        flags.split_whitespace().map(str::to_string).collect()
    }

    pub fn rpc_http_endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.rpc_port)
    }

    pub fn rpc_ws_endpoint(&self) -> String {
        format!("ws://127.0.0.1:{}", self.rpc_port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainTopologyConfig {
    #[serde(skip)]
    source: PathBuf,

    pub authority_nodes: Vec<AuthorityNode>,

    #[serde(default)]
    pub binary_features: String,
}

impl ChainTopologyConfig {
    /// Two validators (alice and bob) running on the default local ports.
    pub fn default_local() -> Self {
        ChainTopologyConfig {
            source: PathBuf::new(),
            authority_nodes: vec![
                AuthorityNode {
                    base_path: PathBuf::from("/tmp/alice"),
                    listen_port: 30334,
                    rpc_port: DEFAULT_RPC_PORT,
                    cli_flags: Some(format!("--alice --validator {COMMON_NODE_FLAGS}")),
                    role: NodeRole::Validator,
                },
                AuthorityNode {
                    base_path: PathBuf::from("/tmp/bob"),
                    listen_port: 30335,
                    rpc_port: DEFAULT_RPC_PORT + 1,
                    cli_flags: Some(format!("--bob --validator {COMMON_NODE_FLAGS}")),
                    role: NodeRole::Validator,
                },
            ],
            binary_features: "pow-faucet".to_string(),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LocalnetError> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|source| LocalnetError::ConfigLoadFailure {
                path: path.to_path_buf(),
                source,
            })?;
        let mut topology: ChainTopologyConfig =
            serde_yaml::from_str(&content).map_err(|source| LocalnetError::MalformedYaml {
                path: path.to_path_buf(),
                source,
            })?;
        topology.source = path.to_path_buf();
        topology.validate()?;

        debug!(
            "loaded topology with {} authority nodes from {}",
            topology.authority_nodes.len(),
            path.display()
        );
        Ok(topology)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), LocalnetError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)?;
        write_atomically(path, content.as_bytes()).map_err(|source| {
            LocalnetError::ConfigSaveFailure {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    fn validate(&self) -> Result<(), LocalnetError> {
        if self.authority_nodes.is_empty() {
            return Err(LocalnetError::NoAuthorityNodes {
                path: self.source.clone(),
            });
        }

        let mut seen = HashSet::new();
        for node in &self.authority_nodes {
            if !seen.insert(&node.base_path) {
                return Err(LocalnetError::DuplicateBasePath {
                    base_path: node.base_path.clone(),
                });
            }
        }
        Ok(())
    }

    /// The node whose rpc endpoint is used for all wallet operations.
    pub fn primary_node(&self) -> Result<&AuthorityNode, LocalnetError> {
        self.authority_nodes
            .first()
            .ok_or_else(|| LocalnetError::NoAuthorityNodes {
                path: self.source.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPOLOGY: &str = r#"
authorityNodes:
  - base-path: /tmp/alice
    subtensor_port: 30334
    subtensor_rpc_port: 9944
    subtensor_flags: "--alice --validator --rpc-cors=all"
  - base-path: /tmp/bob
  - base-path: /tmp/charlie
    role: full
binaryFeatures: "pow-faucet"
"#;

    fn write(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subtensor_config.yaml");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn loading_topology_with_defaults() {
        let (_dir, path) = write(TOPOLOGY);
        let topology = ChainTopologyConfig::load(&path).unwrap();

        assert_eq!(topology.binary_features, "pow-faucet");
        assert_eq!(topology.authority_nodes.len(), 3);

        let alice = &topology.authority_nodes[0];
        assert_eq!(alice.rpc_port, 9944);
        assert_eq!(alice.flags(), vec!["--alice", "--validator", "--rpc-cors=all"]);
        assert_eq!(alice.rpc_ws_endpoint(), "ws://127.0.0.1:9944");

        let bob = &topology.authority_nodes[1];
        assert_eq!(bob.listen_port, DEFAULT_LISTEN_PORT);
        assert_eq!(bob.rpc_port, DEFAULT_RPC_PORT);
        assert_eq!(bob.flags().first().map(String::as_str), Some("--validator"));

        let charlie = &topology.authority_nodes[2];
        assert!(!charlie.flags().contains(&"--validator".to_string()));

        assert_eq!(topology.primary_node().unwrap().base_path, alice.base_path);
    }

    #[test]
    fn base_paths_must_be_unique() {
        let (_dir, path) = write(
            r#"
authorityNodes:
  - base-path: /tmp/alice
  - base-path: /tmp/alice
    subtensor_rpc_port: 9945
"#,
        );
        let err = ChainTopologyConfig::load(&path).unwrap_err();
        assert!(matches!(err, LocalnetError::DuplicateBasePath { .. }));
    }

    #[test]
    fn at_least_one_node_is_required() {
        let (_dir, path) = write("authorityNodes: []\n");
        let err = ChainTopologyConfig::load(&path).unwrap_err();
        assert!(matches!(err, LocalnetError::NoAuthorityNodes { .. }));
    }

    #[test]
    fn missing_topology_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ChainTopologyConfig::load(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, LocalnetError::ConfigLoadFailure { .. }));
    }

    #[test]
    fn default_topology_survives_being_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.yaml");

        let topology = ChainTopologyConfig::default_local();
        topology.save(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("authorityNodes"));
        assert!(raw.contains("base-path"));
        assert!(raw.contains("binaryFeatures"));

        let loaded = ChainTopologyConfig::load(&path).unwrap();
        assert_eq!(loaded.authority_nodes, topology.authority_nodes);
    }
}
