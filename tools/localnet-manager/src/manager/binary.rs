// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::error::LocalnetError;
use crate::helpers::{init_path, write_atomically, ProgressCtx};
use crate::manager::readiness::ReadinessProbe;
use crate::manager::{LocalnetCtx, LocalnetManager};
use crate::process::{CommandRunner, Invocation};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const BUILD_TOOL: &str = "cargo";

impl<R: CommandRunner, P: ReadinessProbe> LocalnetManager<R, P> {
    async fn probe_toolchain(&self) -> Result<(), LocalnetError> {
        let missing = || LocalnetError::BuildToolchainMissing {
            program: BUILD_TOOL.to_string(),
        };

        let output = self
            .runner
            .run(&Invocation::new(BUILD_TOOL).arg("--version"))
            .await
            .map_err(|_| missing())?;
        if !output.success() {
            return Err(missing());
        }
        debug!("using {}", output.stdout.trim());
        Ok(())
    }

    fn build_invocation(&self, features: &str) -> Invocation {
        let invocation = Invocation::new(BUILD_TOOL)
            .args(["build", "--workspace"])
            .arg(format!("--profile={}", self.config.node.build_profile));
        let invocation = if features.trim().is_empty() {
            invocation
        } else {
            invocation.arg("--features").arg(features.trim())
        };
        invocation
            .arg("--manifest-path")
            .path_arg(self.config.node_manifest_path())
    }

    /// Builds the node binary with the provided features, unless it already exists.
    pub(crate) async fn ensure_binary(
        &self,
        ctx: &LocalnetCtx,
        features: &str,
    ) -> Result<PathBuf, LocalnetError> {
        let binary = self.config.node_binary_path();
        if binary.exists() {
            info!("node binary already exists at {}", binary.display());
            ctx.println(format!("\tusing existing node binary at {}", binary.display()));
            return Ok(binary);
        }

        info!("node binary not found. building it with features '{features}'");
        self.probe_toolchain().await?;

        ctx.set_pb_message(format!(
            "building the node binary (features: '{features}'). this might take a while..."
        ));
        let build = self.build_invocation(features);
        ctx.async_with_progress(self.runner.run_checked(&build))
            .await
            .map_err(|source| LocalnetError::BinaryBuildFailure {
                features: features.to_string(),
                source: Box::new(source),
            })?;

        if !binary.exists() {
            return Err(LocalnetError::MissingNodeBinary { path: binary });
        }
        ctx.println(format!("\tbuilt the node binary at {}", binary.display()));
        Ok(binary)
    }

    /// Generates the raw local chain specification using the node binary, unless it already exists.
    pub(crate) async fn ensure_chainspec(
        &self,
        ctx: &LocalnetCtx,
        binary: &Path,
    ) -> Result<PathBuf, LocalnetError> {
        let chainspec = self.config.chainspec_path();
        if chainspec.exists() {
            info!("chain specification already exists at {}", chainspec.display());
            return Ok(chainspec);
        }

        let generation_failure = |source: LocalnetError| LocalnetError::ChainspecGenerationFailure {
            path: chainspec.clone(),
            source: Box::new(source),
        };

        if let Some(specs_dir) = chainspec.parent() {
            init_path(specs_dir).map_err(generation_failure)?;
        }

        ctx.set_pb_message("generating the chain specification...");
        let invocation = Invocation::new(binary.display().to_string()).args([
            "build-spec",
            "--disable-default-bootnode",
            "--raw",
            "--chain",
            "local",
        ]);
        let output = ctx
            .async_with_progress(self.runner.run_checked(&invocation))
            .await
            .map_err(generation_failure)?;

        write_atomically(&chainspec, output.stdout.as_bytes())
            .map_err(|source| generation_failure(source.into()))?;
        ctx.println(format!(
            "\tgenerated chain specification at {}",
            chainspec.display()
        ));
        Ok(chainspec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::testing::TestLocalnet;
    use crate::process::testing::{failed_output, ok_output, FakeRunner};
    use std::fs;

    #[tokio::test]
    async fn building_missing_binary() {
        let localnet = TestLocalnet::new();
        let ctx = LocalnetCtx::hidden();

        let binary = localnet
            .manager
            .ensure_binary(&ctx, "pow-faucet")
            .await
            .unwrap();
        assert!(binary.exists());

        let builds = localnet.runner().calls("cargo", &["build"]);
        assert_eq!(builds.len(), 1);
        assert_eq!(builds[0].flag_value("--features"), Some("pow-faucet"));
        assert!(builds[0].has_arg("--profile=release"));
        assert_eq!(
            builds[0].flag_value("--manifest-path"),
            Some(
                localnet
                    .manager
                    .config()
                    .node_manifest_path()
                    .display()
                    .to_string()
                    .as_str()
            )
        );

        // second time around nothing gets built
        localnet
            .manager
            .ensure_binary(&ctx, "pow-faucet")
            .await
            .unwrap();
        assert_eq!(localnet.runner().calls("cargo", &[]).len(), 2);
    }

    #[tokio::test]
    async fn missing_toolchain_is_reported() {
        let runner = FakeRunner::with_handler(|inv| {
            if inv.has_arg("--version") {
                failed_output("command not found")
            } else {
                ok_output("")
            }
        });
        let localnet = TestLocalnet::with_runner(runner);

        let err = localnet
            .manager
            .ensure_binary(&LocalnetCtx::hidden(), "")
            .await
            .unwrap_err();
        assert!(matches!(err, LocalnetError::BuildToolchainMissing { .. }));
        assert!(localnet.runner().calls("cargo", &["build"]).is_empty());
    }

    #[tokio::test]
    async fn failed_build_is_fatal() {
        let runner = FakeRunner::with_handler(|inv| {
            if inv.has_arg("build") {
                failed_output("error[E0425]: cannot find value")
            } else {
                ok_output("cargo 1.86.0")
            }
        });
        let localnet = TestLocalnet::with_runner(runner);

        let err = localnet
            .manager
            .ensure_binary(&LocalnetCtx::hidden(), "pow-faucet")
            .await
            .unwrap_err();
        assert!(matches!(err, LocalnetError::BinaryBuildFailure { .. }));
    }

    #[tokio::test]
    async fn build_without_artifact_is_detected() {
        let localnet = TestLocalnet::with_runner(FakeRunner::new());

        let err = localnet
            .manager
            .ensure_binary(&LocalnetCtx::hidden(), "pow-faucet")
            .await
            .unwrap_err();
        assert!(matches!(err, LocalnetError::MissingNodeBinary { .. }));
    }

    #[tokio::test]
    async fn generating_chainspec_once() {
        let localnet = TestLocalnet::new();
        let ctx = LocalnetCtx::hidden();
        let binary = localnet
            .manager
            .ensure_binary(&ctx, "pow-faucet")
            .await
            .unwrap();

        let chainspec = localnet
            .manager
            .ensure_chainspec(&ctx, &binary)
            .await
            .unwrap();
        assert_eq!(chainspec, localnet.manager.config().chainspec_path());
        assert_eq!(
            fs::read_to_string(&chainspec).unwrap(),
            r#"{"name":"Local Testnet"}"#
        );

        localnet
            .manager
            .ensure_chainspec(&ctx, &binary)
            .await
            .unwrap();
        let program = binary.display().to_string();
        assert_eq!(localnet.runner().calls(&program, &["build-spec"]).len(), 1);
    }

    #[tokio::test]
    async fn failed_chainspec_generation_is_fatal() {
        let localnet = TestLocalnet::with_runner(FakeRunner::with_handler(|_| {
            failed_output("unknown chain")
        }));

        let err = localnet
            .manager
            .ensure_chainspec(&LocalnetCtx::hidden(), Path::new("/bin/node"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LocalnetError::ChainspecGenerationFailure { .. }
        ));
        assert!(!localnet.manager.config().chainspec_path().exists());
    }
}
