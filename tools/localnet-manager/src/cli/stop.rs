// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::cli::CommonArgs;
use crate::error::LocalnetError;

#[derive(clap::Args, Debug)]
pub(crate) struct Args {
    #[clap(flatten)]
    common: CommonArgs,

    /// Additionally kill every process named after the node binary, including ones not launched by this tool
    #[clap(long)]
    force: bool,
}

pub(crate) async fn execute(args: Args) -> Result<(), LocalnetError> {
    let manager = args.common.localnet_manager(false)?;
    let report = manager.stop_nodes(args.force).await?;

    println!(
        "stopped {} node(s), {} were no longer running",
        report.stopped.len(),
        report.not_running.len()
    );
    if !report.stale.is_empty() {
        println!(
            "left alone the pids now used by other processes: {:?}",
            report.stale
        );
    }
    if !report.failed.is_empty() {
        println!("failed to stop the processes: {:?}", report.failed);
    }
    Ok(())
}
