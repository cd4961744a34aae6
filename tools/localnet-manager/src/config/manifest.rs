// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::error::LocalnetError;
use crate::helpers::write_atomically;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;
use url::Url;

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySource {
    #[serde(rename = "repo_name")]
    pub name: String,

    #[serde(rename = "repo_url")]
    pub url: Url,

    #[serde(default, skip_serializing_if = "is_blank")]
    pub release_tag: Option<String>,

    #[serde(default, skip_serializing_if = "is_blank")]
    pub branch: Option<String>,

    /// Command (program followed by its arguments) executed within the cloned repository
    /// every time dependencies get installed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub install_command: Vec<String>,
}

impl RepositorySource {
    /// Reference to check out. If both are specified, the branch wins over the tag.
    pub fn git_ref(&self) -> Option<&str> {
        [&self.branch, &self.release_tag]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|reference| !reference.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryManifest {
    pub repositories: Vec<RepositorySource>,
}

impl RepositoryManifest {
    pub fn default_sources() -> Result<Self, LocalnetError> {
        let subtensor = "https://github.com/opentensor/subtensor.git".parse()?;
        let template = "https://github.com/opentensor/bittensor-subnet-template.git".parse()?;

        Ok(RepositoryManifest {
            repositories: vec![
                RepositorySource {
                    name: "subtensor".to_string(),
                    url: subtensor,
                    release_tag: None,
                    branch: Some("main".to_string()),
                    install_command: Vec::new(),
                },
                RepositorySource {
                    name: "bittensor-subnet-template".to_string(),
                    url: template,
                    release_tag: None,
                    branch: Some("main".to_string()),
                    install_command: ["python", "-m", "pip", "install", "-e", "."]
                        .map(String::from)
                        .to_vec(),
                },
            ],
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LocalnetError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                LocalnetError::MissingRepositoryManifest {
                    path: path.to_path_buf(),
                }
            } else {
                LocalnetError::ConfigLoadFailure {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let manifest: RepositoryManifest =
            serde_yaml::from_str(&content).map_err(|source| LocalnetError::MalformedYaml {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(
            "loaded {} repository sources from {}",
            manifest.repositories.len(),
            path.display()
        );
        Ok(manifest)
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
}
