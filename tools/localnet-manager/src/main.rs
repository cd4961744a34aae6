// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

// Allow dead code for not(unix)
#![cfg_attr(not(unix), allow(dead_code))]

use crate::cli::Cli;
use crate::logging::setup_tracing_logger;
use clap::Parser;

pub(crate) mod cli;
pub(crate) mod config;
pub(crate) mod error;
mod helpers;
mod logging;
mod manager;
mod process;

#[cfg(unix)]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_tracing_logger(cli.log_level());

    cli.execute().await?;

    Ok(())
}

#[cfg(not(unix))]
fn main() {
    println!("This binary is only supported on Unix systems");
}
