// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::cli::CommonArgs;
use crate::config::manifest::RepositoryManifest;
use crate::config::topology::ChainTopologyConfig;
use crate::config::Config;
use crate::error::LocalnetError;
use std::path::Path;
use tracing::info;

#[derive(clap::Args, Debug)]
pub(crate) struct Args {
    #[clap(flatten)]
    common: CommonArgs,

    /// Overwrite any existing files
    #[clap(long)]
    force: bool,
}

fn ensure_writable(path: &Path, force: bool) -> Result<(), LocalnetError> {
    if path.exists() && !force {
        return Err(LocalnetError::ExistingFile {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

pub(crate) fn execute(args: Args) -> Result<(), LocalnetError> {
    let config = Config::new(&args.common.home).with_override(&args.common);
    let config_path = args.common.config_path();
    let manifest_path = config.repository_manifest();
    let topology_path = config.topology();

    // nothing gets written unless all of the files can be
    for path in [&config_path, &manifest_path, &topology_path] {
        ensure_writable(path, args.force)?;
    }

    config.save_to_path(&config_path)?;
    info!("saved the config file to {}", config_path.display());

    RepositoryManifest::default_sources()?.save(&manifest_path)?;
    info!("saved the repository manifest to {}", manifest_path.display());

    ChainTopologyConfig::default_local().save(&topology_path)?;
    info!("saved the chain topology to {}", topology_path.display());

    println!(
        "initialised the localnet in {}. adjust the files to your needs and run `start`",
        args.common.home.display()
    );
    Ok(())
}
