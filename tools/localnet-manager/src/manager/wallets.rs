// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::config::wallets::{WalletEntry, WalletInventory};
use crate::error::LocalnetError;
use crate::helpers::ProgressCtx;
use crate::manager::readiness::ReadinessProbe;
use crate::manager::wallet_cli::WalletCli;
use crate::manager::{LocalnetCtx, LocalnetManager};
use crate::process::CommandRunner;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, error, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Unencrypted key file as written by the wallet cli.
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
struct KeyFile {
    #[serde(default)]
    secret_phrase: Option<String>,

    #[serde(rename = "ss58Address", default)]
    ss58_address: Option<String>,
}

impl KeyFile {
    fn read(path: &Path) -> Result<Self, LocalnetError> {
        let content = Zeroizing::new(fs::read_to_string(path).map_err(|source| {
            LocalnetError::KeyFileReadFailure {
                path: path.to_path_buf(),
                source,
            }
        })?);
        Ok(serde_json::from_str(&content)?)
    }

    fn secret_phrase(&self, path: &Path) -> Result<String, LocalnetError> {
        self.secret_phrase
            .clone()
            .filter(|phrase| !phrase.trim().is_empty())
            .ok_or_else(|| LocalnetError::MissingSecretPhrase {
                path: path.to_path_buf(),
            })
    }
}

/// Populates the wallet's secrets and address out of its on-disk key files.
fn read_back_keys(wallet: &mut WalletEntry, wallet_dir: &Path) -> Result<(), LocalnetError> {
    let coldkey_path = wallet.coldkey_path(wallet_dir);
    let coldkey = KeyFile::read(&coldkey_path)?;
    wallet.coldkey_secret = Some(coldkey.secret_phrase(&coldkey_path)?);
    wallet.chain_address = coldkey.ss58_address.clone();

    let hotkey_path = wallet.hotkey_path(wallet_dir);
    let hotkey = KeyFile::read(&hotkey_path)?;
    wallet.hotkey_secret = Some(hotkey.secret_phrase(&hotkey_path)?);
    Ok(())
}

/// Refreshes the chain address of the wallet, if its coldkey file is available.
fn refresh_address(wallet: &mut WalletEntry, wallet_dir: &Path) {
    let coldkey_path = wallet.coldkey_path(wallet_dir);
    match KeyFile::read(&coldkey_path) {
        Ok(coldkey) => {
            if coldkey.ss58_address.is_some() {
                wallet.chain_address = coldkey.ss58_address.clone();
            }
        }
        Err(err) => warn!(
            "could not determine the address of wallet '{}': {err}",
            wallet.wallet_name
        ),
    }
}

impl<R: CommandRunner, P: ReadinessProbe> LocalnetManager<R, P> {
    async fn generate_wallets(
        &self,
        ctx: &LocalnetCtx,
        cli: &WalletCli,
    ) -> Result<WalletInventory, LocalnetError> {
        let mut inventory = WalletInventory::skeleton();

        for (role, wallet) in inventory.wallets() {
            ctx.set_pb_message(format!("creating coldkey of '{}'...", wallet.wallet_name));
            debug!("creating coldkey of {role} wallet '{}'", wallet.wallet_name);
            self.run_wallet_cli(&cli.new_coldkey(wallet)).await?;
        }
        for (_, wallet) in inventory.wallets() {
            ctx.set_pb_message(format!("creating hotkey of '{}'...", wallet.wallet_name));
            self.run_wallet_cli(&cli.new_hotkey(wallet)).await?;
        }

        for (_, wallet) in inventory.wallets_mut() {
            read_back_keys(wallet, cli.wallet_dir())?;
        }
        ctx.println(format!(
            "\tcreated {} new wallets in {}",
            inventory.wallets().count(),
            cli.wallet_dir().display()
        ));
        Ok(inventory)
    }

    /// Recreates both keys of the wallet out of its persisted secrets.
    /// A missing secret is reported and the corresponding key is skipped.
    async fn regenerate_wallet(
        &self,
        cli: &WalletCli,
        wallet: &WalletEntry,
    ) -> Result<(), LocalnetError> {
        match &wallet.coldkey_secret {
            Some(secret) => {
                self.run_wallet_cli(&cli.regen_coldkey(wallet, secret))
                    .await?;
            }
            None => error!(
                "the coldkey secret phrase of wallet '{}' is missing. its coldkey can't be restored",
                wallet.wallet_name
            ),
        }
        match &wallet.hotkey_secret {
            Some(secret) => {
                self.run_wallet_cli(&cli.regen_hotkey(wallet, secret))
                    .await?;
            }
            None => error!(
                "the hotkey secret phrase of wallet '{}' is missing. its hotkey can't be restored",
                wallet.wallet_name
            ),
        }
        Ok(())
    }

    async fn regenerate_all_wallets(
        &self,
        ctx: &LocalnetCtx,
        cli: &WalletCli,
        inventory: &WalletInventory,
    ) -> Result<(), LocalnetError> {
        let wallet_dir = cli.wallet_dir();
        if wallet_dir.exists() {
            info!("removing the wallet directory at {}", wallet_dir.display());
            if let Err(err) = fs::remove_dir_all(wallet_dir) {
                if err.kind() != io::ErrorKind::NotFound {
                    return Err(err.into());
                }
            }
        }

        for (_, wallet) in inventory.wallets() {
            ctx.set_pb_message(format!("regenerating '{}'...", wallet.wallet_name));
            self.regenerate_wallet(cli, wallet).await?;
        }
        ctx.println("\tregenerated all wallets from their secret phrases");
        Ok(())
    }

    async fn restore_missing_wallets(
        &self,
        ctx: &LocalnetCtx,
        cli: &WalletCli,
        inventory: &WalletInventory,
    ) -> Result<usize, LocalnetError> {
        let mut restored = 0;
        for (_, wallet) in inventory.wallets() {
            if wallet.coldkey_path(cli.wallet_dir()).exists() {
                continue;
            }
            info!(
                "the keys of wallet '{}' are missing on disk. restoring them",
                wallet.wallet_name
            );
            ctx.set_pb_message(format!("restoring '{}'...", wallet.wallet_name));
            self.regenerate_wallet(cli, wallet).await?;
            restored += 1;
        }
        if restored > 0 {
            ctx.println(format!("\trestored {restored} wallets from their secret phrases"));
        }
        Ok(restored)
    }

    /// Makes sure the wallet inventory and the corresponding keys exist, generating,
    /// regenerating or restoring them as needed. The resulting inventory is persisted.
    pub(crate) async fn ensure_wallets(
        &self,
        ctx: &LocalnetCtx,
        cli: &WalletCli,
    ) -> Result<WalletInventory, LocalnetError> {
        let inventory_path = self.config.wallet_inventory();

        let mut inventory = if !inventory_path.exists() {
            info!(
                "no wallet inventory at {}. generating new wallets",
                inventory_path.display()
            );
            self.generate_wallets(ctx, cli).await?
        } else {
            let inventory = WalletInventory::load(&inventory_path)?;
            let missing = inventory.missing_fields();
            if missing.is_empty() {
                self.restore_missing_wallets(ctx, cli, &inventory).await?;
                ctx.println("\tthe existing wallets are valid");
            } else {
                for field in &missing {
                    warn!("{field}");
                }
                warn!("the wallet inventory is invalid. regenerating all wallets");
                self.regenerate_all_wallets(ctx, cli, &inventory).await?;
                if !inventory.is_valid() {
                    warn!("some wallets could not be fully restored. fill in their secret phrases and start again");
                }
            }
            inventory
        };

        for (_, wallet) in inventory.wallets_mut() {
            refresh_address(wallet, cli.wallet_dir());
        }
        inventory.save(&inventory_path)?;
        Ok(inventory)
    }
}
