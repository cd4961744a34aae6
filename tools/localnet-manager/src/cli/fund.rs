// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::cli::CommonArgs;
use crate::config::balance::Balance;
use crate::error::LocalnetError;
use std::path::PathBuf;

const SS58_ADDRESS_LENGTH: usize = 48;

fn parse_amount(raw: &str) -> Result<Balance, String> {
    let amount: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{raw}' is not a valid number"))?;
    if !amount.is_finite() || amount <= 0.0 {
        return Err(format!("the amount must be positive, got '{raw}'"));
    }

    Balance::from_display(amount)
        .filter(|balance| !balance.is_zero())
        .ok_or_else(|| format!("'{raw}' is too small to be represented on chain"))
}

fn parse_ss58(raw: &str) -> Result<String, String> {
    if raw.len() != SS58_ADDRESS_LENGTH || !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!(
            "'{raw}' is not a valid address. expected {SS58_ADDRESS_LENGTH} alphanumeric characters"
        ));
    }
    Ok(raw.to_string())
}

#[derive(clap::Args, Debug)]
pub(crate) struct Args {
    #[clap(flatten)]
    common: CommonArgs,

    /// Amount of tokens to send
    #[clap(long, value_parser = parse_amount, allow_negative_numbers = true)]
    amount: Balance,

    /// Address receiving the funds
    #[clap(long, value_parser = parse_ss58)]
    ss58: String,

    /// Directory in which the wallet cli keeps the wallet keys. Relative paths are resolved against the home directory
    #[clap(long, default_value = "wallets")]
    wallet_path: PathBuf,
}

pub(crate) async fn execute(args: Args, show_progress: bool) -> Result<(), LocalnetError> {
    let manager = args.common.localnet_manager(show_progress)?;
    let wallet_dir = manager.config().resolve(&args.wallet_path);

    manager
        .fund_address(&wallet_dir, args.amount, &args.ss58)
        .await
}
