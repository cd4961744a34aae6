// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::cli::CommonArgs;
use crate::error::LocalnetError;

#[derive(clap::Args, Debug)]
pub(crate) struct Args {
    #[clap(flatten)]
    common: CommonArgs,

    /// Additionally kill every process named after the node binary before removing the chain data
    #[clap(long)]
    force: bool,
}

pub(crate) async fn execute(args: Args) -> Result<(), LocalnetError> {
    let manager = args.common.localnet_manager(false)?;
    let report = manager.purge_chain_state(args.force).await?;

    println!("stopped {} node(s)", report.stopped.stopped.len());
    for removed in &report.removed {
        println!("removed {}", removed.display());
    }
    for missing in &report.missing {
        println!("{} did not exist", missing.display());
    }
    for failed in &report.failed {
        println!("failed to remove {}", failed.display());
    }
    Ok(())
}
