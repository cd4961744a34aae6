// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::config::manifest::{RepositoryManifest, RepositorySource};
use crate::error::LocalnetError;
use crate::helpers::{init_path, ProgressCtx};
use crate::manager::readiness::ReadinessProbe;
use crate::manager::{LocalnetCtx, LocalnetManager};
use crate::process::{CommandRunner, Invocation};
use std::path::Path;
use tracing::{info, warn};

fn clone_invocation(source: &RepositorySource, dest: &Path) -> Invocation {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let name = dest
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.name.clone());

    let invocation = Invocation::new("git")
        .arg("-C")
        .path_arg(parent)
        .arg("clone")
        .arg(source.url.as_str())
        .arg(name);
    match source.git_ref() {
        Some(reference) => invocation.arg("--branch").arg(reference),
        None => invocation,
    }
}

impl<R: CommandRunner, P: ReadinessProbe> LocalnetManager<R, P> {
    /// Clones the repository into `dest` unless something already exists there.
    /// Returns whether a clone took place.
    pub(crate) async fn ensure_repo(
        &self,
        ctx: &LocalnetCtx,
        source: &RepositorySource,
        dest: &Path,
    ) -> Result<bool, LocalnetError> {
        if dest.exists() {
            info!(
                "repository '{}' already exists at {}. skipping",
                source.name,
                dest.display()
            );
            return Ok(false);
        }

        if let Some(parent) = dest.parent() {
            init_path(parent)?;
        }

        ctx.set_pb_message(format!("cloning {}...", source.url));
        let invocation = clone_invocation(source, dest);
        ctx.async_with_progress(self.runner.run_checked(&invocation))
            .await?;
        ctx.println(format!(
            "\tcloned '{}' ({}) into {}",
            source.name,
            source.git_ref().unwrap_or("default branch"),
            dest.display()
        ));
        Ok(true)
    }

    async fn run_install_command(
        &self,
        ctx: &LocalnetCtx,
        source: &RepositorySource,
        repo_dir: &Path,
    ) -> Result<(), LocalnetError> {
        let Some((program, args)) = source.install_command.split_first() else {
            return Ok(());
        };

        ctx.set_pb_message(format!("installing '{}'...", source.name));
        let invocation = Invocation::new(program)
            .args(args)
            .current_dir(repo_dir);
        ctx.async_with_progress(self.runner.run_checked(&invocation))
            .await?;
        ctx.println(format!("\tinstalled '{}'", source.name));
        Ok(())
    }

    /// Makes sure every repository listed in the manifest is available locally and installed.
    pub(crate) async fn clone_repositories(&self, ctx: &LocalnetCtx) -> Result<(), LocalnetError> {
        let manifest = RepositoryManifest::load(self.config.repository_manifest())?;
        if manifest.repositories.is_empty() {
            warn!("the repository manifest does not list any repositories");
        }

        let repo_store = self.config.repo_store();
        for source in &manifest.repositories {
            let dest = repo_store.join(&source.name);
            self.ensure_repo(ctx, source, &dest).await?;
            self.run_install_command(ctx, source, &dest).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::testing::TestLocalnet;
    use std::path::PathBuf;

    fn source(branch: Option<&str>, tag: Option<&str>) -> RepositorySource {
        RepositorySource {
            name: "subtensor".to_string(),
            url: "https://github.com/opentensor/subtensor.git".parse().unwrap(),
            release_tag: tag.map(str::to_string),
            branch: branch.map(str::to_string),
            install_command: Vec::new(),
        }
    }

    #[test]
    fn branch_takes_priority_over_tag() {
        let dest = PathBuf::from("/repos/subtensor");
        let invocation = clone_invocation(&source(Some("main"), Some("v1.0.0")), &dest);
        assert_eq!(
            invocation.to_string(),
            "git -C /repos clone https://github.com/opentensor/subtensor.git subtensor --branch main"
        );

        let invocation = clone_invocation(&source(None, Some("v1.0.0")), &dest);
        assert_eq!(invocation.flag_value("--branch"), Some("v1.0.0"));

        let invocation = clone_invocation(&source(None, None), &dest);
        assert!(!invocation.has_arg("--branch"));
    }

    #[tokio::test]
    async fn ensuring_a_repository_twice_clones_it_once() {
        let localnet = TestLocalnet::new();
        let dest = localnet.manager.config().repo_store().join("subtensor");
        let ctx = LocalnetCtx::hidden();
        let source = source(Some("main"), None);

        assert!(localnet
            .manager
            .ensure_repo(&ctx, &source, &dest)
            .await
            .unwrap());
        assert!(!localnet
            .manager
            .ensure_repo(&ctx, &source, &dest)
            .await
            .unwrap());

        assert_eq!(localnet.runner().calls("git", &["-C"]).len(), 1);
    }

    #[tokio::test]
    async fn cloning_all_repositories_runs_their_install_commands() {
        let localnet = TestLocalnet::new();
        let ctx = LocalnetCtx::hidden();

        localnet.manager.clone_repositories(&ctx).await.unwrap();

        let store = localnet.manager.config().repo_store();
        assert!(store.join("subtensor").is_dir());
        assert!(store.join("bittensor-subnet-template").is_dir());

        let installs = localnet
            .runner()
            .calls("python", &["-m", "pip", "install", "-e", "."]);
        assert_eq!(installs.len(), 1);
        assert_eq!(
            installs[0].working_dir(),
            Some(store.join("bittensor-subnet-template").as_path())
        );
    }

    #[tokio::test]
    async fn missing_manifest_is_fatal() {
        let localnet = TestLocalnet::new();
        std::fs::remove_file(localnet.manager.config().repository_manifest()).unwrap();

        let err = localnet
            .manager
            .clone_repositories(&LocalnetCtx::hidden())
            .await
            .unwrap_err();
        assert!(matches!(err, LocalnetError::MissingRepositoryManifest { .. }));
        assert!(localnet.runner().invocations().is_empty());
    }
}
