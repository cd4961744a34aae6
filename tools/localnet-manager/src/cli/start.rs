// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::cli::CommonArgs;
use crate::error::LocalnetError;
use std::path::PathBuf;
use tracing::error;

#[derive(clap::Args, Debug)]
pub(crate) struct Args {
    #[clap(flatten)]
    common: CommonArgs,

    /// Directory in which the wallet cli keeps the wallet keys. Relative paths are resolved against the home directory
    #[clap(long, default_value = "wallets")]
    wallet_path: PathBuf,
}

pub(crate) async fn execute(args: Args, show_progress: bool) -> Result<(), LocalnetError> {
    let manager = args.common.localnet_manager(show_progress)?;
    let wallet_dir = manager.config().resolve(&args.wallet_path);

    if let Err(err) = manager.start(&wallet_dir).await {
        error!("failed to bring the localnet up: {err}");
        return Err(err);
    }
    Ok(())
}
