// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocalnetError {
    #[error("experienced an i/o failure: {0}")]
    IoFailure(#[from] io::Error),

    #[error("failed to initialise the path at '{}': {source}", path.display())]
    PathInitFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
    "failed to load config file using path '{}'. detailed message: {source}", path.display()
    )]
    ConfigLoadFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
    "failed to save config file using path '{}'. detailed message: {source}", path.display()
    )]
    ConfigSaveFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to render the config template: {reason}")]
    ConfigTemplateFailure { reason: String },

    #[error("the provided config is invalid: {reason}")]
    InvalidConfig { reason: String },

    #[error("there already exists a file at: {}. if you want to overwrite its content, use --force flag", path.display())]
    ExistingFile { path: PathBuf },

    #[error("the file at '{}' is not valid yaml: {source}", path.display())]
    MalformedYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("the file at '{}' is not valid toml: {source}", path.display())]
    MalformedToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialise yaml data: {0}")]
    YamlSerialisationFailure(#[from] serde_yaml::Error),

    #[error("failed to (de)serialise json data: {0}")]
    JsonFailure(#[from] serde_json::Error),

    #[error("encountered a malformed url: {0}")]
    MalformedUrl(#[from] url::ParseError),

    #[error("the repository manifest could not be found at '{}'", path.display())]
    MissingRepositoryManifest { path: PathBuf },

    #[error("the chain topology at '{}' does not define any authority nodes", path.display())]
    NoAuthorityNodes { path: PathBuf },

    #[error("base path '{}' is used by more than one authority node", base_path.display())]
    DuplicateBasePath { base_path: PathBuf },

    #[error("the wallet inventory is malformed: {reason}")]
    MalformedWalletInventory { reason: String },

    #[error("failed to spawn '{program}': {source}")]
    CommandSpawnFailure {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("'{command}' did not finish successfully (exit code: {code:?}): {stderr}")]
    CommandFailure {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("could not find the build toolchain ('{program}'). make sure it is installed and available on $PATH")]
    BuildToolchainMissing { program: String },

    #[error("failed to build the node binary with features '{features}': {source}")]
    BinaryBuildFailure {
        features: String,
        #[source]
        source: Box<LocalnetError>,
    },

    #[error("the build finished but the node binary is still missing from '{}'", path.display())]
    MissingNodeBinary { path: PathBuf },

    #[error("failed to generate the chain specification at '{}': {source}", path.display())]
    ChainspecGenerationFailure {
        path: PathBuf,
        #[source]
        source: Box<LocalnetError>,
    },

    #[error("failed to generate node key for the node at '{}': {source}", base_path.display())]
    NodeKeyGenerationFailure {
        base_path: PathBuf,
        #[source]
        source: Box<LocalnetError>,
    },

    #[error("node with rpc port {rpc_port} did not become ready within {}", humantime::format_duration(*timeout))]
    NodeReadinessTimeout { rpc_port: u16, timeout: Duration },

    #[error("failed to read the key file at '{}': {source}", path.display())]
    KeyFileReadFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("the key file at '{}' does not contain a secret phrase", path.display())]
    MissingSecretPhrase { path: PathBuf },

    #[error("wallet '{wallet}' does not have a known chain address")]
    MissingChainAddress { wallet: String },

    #[error("could not parse balance out of the wallet cli output: '{output}'")]
    BalanceParseFailure { output: String },

    #[error("failed to terminate process {pid}: {source}")]
    ProcessTerminationFailure {
        pid: u32,
        #[source]
        source: nix::Error,
    },

    #[error("failed to query the node rpc endpoint: {0}")]
    RpcFailure(#[from] reqwest::Error),
}

impl LocalnetError {
    pub(crate) fn command_failure<S: Into<String>>(command: S, code: Option<i32>, stderr: &str) -> Self {
        LocalnetError::CommandFailure {
            command: command.into(),
            code,
            stderr: stderr.trim().to_string(),
        }
    }
}
