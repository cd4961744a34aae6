// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::cli::CommonArgs;
use crate::config::Config;

pub trait ConfigOverride {
    fn override_config(self, config: &mut Config);
}

impl ConfigOverride for &CommonArgs {
    fn override_config(self, config: &mut Config) {
        if let Some(wallet_cli) = &self.wallet_cli {
            config.wallet_cli.program.clone_from(wallet_cli)
        }
    }
}
