// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::config::balance::Balance;
use crate::config::wallets::{WalletEntry, WalletInventory};
use crate::error::LocalnetError;
use crate::helpers::ProgressCtx;
use crate::manager::readiness::ReadinessProbe;
use crate::manager::state::{ChainSetup, RunState};
use crate::manager::wallet_cli::WalletCli;
use crate::manager::{LocalnetCtx, LocalnetManager};
use crate::process::CommandRunner;
use std::path::Path;
use tracing::{debug, info};

/// Number of faucet calls required to cover `total`, with `fee_buffer` extra calls
/// for the registration and staking fees.
pub(crate) fn faucet_calls(total: Balance, batch_size: u64, fee_buffer: u64) -> u64 {
    total.batches_of(batch_size).saturating_add(fee_buffer)
}

struct Shortfall<'a> {
    wallet: &'a WalletEntry,
    destination: &'a str,
    amount: Balance,
}

fn destination_of(wallet: &WalletEntry) -> Result<&str, LocalnetError> {
    wallet
        .chain_address
        .as_deref()
        .ok_or_else(|| LocalnetError::MissingChainAddress {
            wallet: wallet.wallet_name.clone(),
        })
}

fn subnet_owners(inventory: &WalletInventory) -> Result<[&WalletEntry; 2], LocalnetError> {
    Ok([inventory.admin()?, inventory.primary_validator()?])
}

/// The validator followed by every miner that requested funding.
fn hotkey_wallets(inventory: &WalletInventory) -> Result<Vec<&WalletEntry>, LocalnetError> {
    let miners = inventory
        .miners()
        .iter()
        .filter(|miner| miner.requested_funding().is_some());
    Ok(std::iter::once(inventory.primary_validator()?)
        .chain(miners)
        .collect())
}

/// Whether any of the fee paying steps (subnets, hotkeys, stake) still has to run.
fn fees_pending(inventory: &WalletInventory, setup: &ChainSetup) -> Result<bool, LocalnetError> {
    let subnets = subnet_owners(inventory)?
        .iter()
        .any(|owner| !setup.registered_subnets.contains(&owner.wallet_name));
    let hotkeys = hotkey_wallets(inventory)?.iter().any(|wallet| {
        !setup
            .registered_hotkeys
            .contains(&ChainSetup::hotkey_id(&wallet.wallet_name, &wallet.hotkey_name))
    });
    Ok(subnets || hotkeys || !setup.validator_staked)
}

impl<R: CommandRunner, P: ReadinessProbe> LocalnetManager<R, P> {
    async fn funding_shortfalls<'a>(
        &self,
        cli: &WalletCli,
        inventory: &'a WalletInventory,
    ) -> Result<Vec<Shortfall<'a>>, LocalnetError> {
        let mut shortfalls = Vec::new();
        for (role, wallet) in inventory.funded_wallets() {
            let Some(requested) = wallet.requested_funding() else {
                continue;
            };
            let destination = destination_of(wallet)?;
            let current = self.query_balance(cli, wallet).await?;
            let amount = requested.saturating_sub(current);
            if amount.is_zero() {
                debug!(
                    "{role} wallet '{}' already holds {current} (requested {requested})",
                    wallet.wallet_name
                );
                continue;
            }
            shortfalls.push(Shortfall {
                wallet,
                destination,
                amount,
            });
        }
        Ok(shortfalls)
    }

    /// Tops up every funded wallet to its requested initial funding out of the admin wallet.
    /// The admin also receives the fee buffer for as long as any registration or the stake is outstanding.
    async fn distribute_initial_funds(
        &self,
        ctx: &LocalnetCtx,
        cli: &WalletCli,
        inventory: &WalletInventory,
        state: &RunState,
    ) -> Result<(), LocalnetError> {
        let admin = inventory.admin()?;
        debug!(
            "wallets request {} of initial funding in total",
            inventory.total_initial_funding()
        );
        let shortfalls = self.funding_shortfalls(cli, inventory).await?;
        let pending = fees_pending(inventory, &state.chain_setup)?;
        if shortfalls.is_empty() && !pending {
            ctx.println("\tall wallets already hold their initial funding");
            return Ok(());
        }

        let total: Balance = shortfalls.iter().map(|shortfall| shortfall.amount).sum();
        let chain = &self.config.chain;
        let calls = faucet_calls(total, chain.faucet_batch_size, chain.faucet_fee_buffer);
        if calls > 0 {
            info!("calling the faucet {calls} times to cover {total} of missing funds and the fees");
            ctx.set_pb_message(format!("calling the faucet {calls} times..."));
            ctx.async_with_progress(self.run_wallet_cli(&cli.faucet(admin, calls)))
                .await?;
        }

        for shortfall in shortfalls {
            info!(
                "transferring {} to '{}' ({})",
                shortfall.amount, shortfall.wallet.wallet_name, shortfall.destination
            );
            let transfer = cli.transfer(admin, shortfall.destination, shortfall.amount);
            self.run_wallet_cli(&transfer).await?;
        }
        if !total.is_zero() {
            ctx.println(format!("\tdistributed {total} of initial funding"));
        }
        Ok(())
    }

    async fn register_subnets(
        &self,
        ctx: &LocalnetCtx,
        cli: &WalletCli,
        inventory: &WalletInventory,
        state: &mut RunState,
    ) -> Result<(), LocalnetError> {
        for owner in subnet_owners(inventory)? {
            if state.chain_setup.registered_subnets.contains(&owner.wallet_name) {
                debug!("subnet owned by '{}' is already registered", owner.wallet_name);
                continue;
            }

            ctx.set_pb_message(format!("registering subnet owned by '{}'...", owner.wallet_name));
            self.run_wallet_cli(&cli.create_subnet(owner)).await?;
            state
                .chain_setup
                .registered_subnets
                .insert(owner.wallet_name.clone());
            state.save()?;
            ctx.println(format!("\tregistered subnet owned by '{}'", owner.wallet_name));
        }
        Ok(())
    }

    async fn register_hotkeys(
        &self,
        ctx: &LocalnetCtx,
        cli: &WalletCli,
        inventory: &WalletInventory,
        state: &mut RunState,
    ) -> Result<(), LocalnetError> {
        let netuid = self.config.chain.target_netuid;
        for wallet in hotkey_wallets(inventory)? {
            let id = ChainSetup::hotkey_id(&wallet.wallet_name, &wallet.hotkey_name);
            if state.chain_setup.registered_hotkeys.contains(&id) {
                debug!("hotkey {id} is already registered");
                continue;
            }

            ctx.set_pb_message(format!("registering {id} to subnet {netuid}..."));
            self.run_wallet_cli(&cli.register_hotkey(wallet, netuid))
                .await?;
            state.chain_setup.registered_hotkeys.insert(id.clone());
            state.save()?;
            ctx.println(format!("\tregistered {id} to subnet {netuid}"));
        }
        Ok(())
    }

    async fn ensure_validator_balance(
        &self,
        ctx: &LocalnetCtx,
        cli: &WalletCli,
        inventory: &WalletInventory,
    ) -> Result<(), LocalnetError> {
        let admin = inventory.admin()?;
        let validator = inventory.primary_validator()?;
        let floor = self.config.chain.validator_min_balance();

        let balance = self.query_balance(cli, validator).await?;
        if balance >= floor {
            ctx.println(format!("\tvalidator holds {balance}"));
            return Ok(());
        }

        let top_up = floor.saturating_sub(balance);
        info!("validator holds only {balance}. topping it up with {top_up}");
        self.run_wallet_cli(&cli.faucet(admin, 1)).await?;
        self.run_wallet_cli(&cli.transfer(admin, destination_of(validator)?, top_up))
            .await?;
        ctx.println(format!("\ttopped up the validator with {top_up}"));
        Ok(())
    }

    async fn stake_validator(
        &self,
        ctx: &LocalnetCtx,
        cli: &WalletCli,
        inventory: &WalletInventory,
        state: &mut RunState,
    ) -> Result<(), LocalnetError> {
        if state.chain_setup.validator_staked {
            debug!("validator has already staked");
            return Ok(());
        }

        let chain = &self.config.chain;
        let validator = inventory.primary_validator()?;
        let stake = chain.validator_stake();
        ctx.set_pb_message(format!("staking {stake} into subnet {}...", chain.target_netuid));
        self.run_wallet_cli(&cli.stake(validator, stake, chain.target_netuid))
            .await?;

        state.chain_setup.validator_staked = true;
        state.save()?;
        ctx.println(format!(
            "\tvalidator staked {stake} into subnet {}",
            chain.target_netuid
        ));
        Ok(())
    }

    /// Funds the wallets, registers the subnets and hotkeys and stakes the validator.
    /// Completed steps are recorded in the run state, so running it again converges
    /// instead of duplicating any effects.
    pub(crate) async fn configure_chain(
        &self,
        ctx: &LocalnetCtx,
        cli: &WalletCli,
        inventory: &WalletInventory,
        state: &mut RunState,
    ) -> Result<(), LocalnetError> {
        self.distribute_initial_funds(ctx, cli, inventory, state)
            .await?;
        self.register_subnets(ctx, cli, inventory, state).await?;
        self.register_hotkeys(ctx, cli, inventory, state).await?;
        self.ensure_validator_balance(ctx, cli, inventory).await?;
        self.stake_validator(ctx, cli, inventory, state).await
    }

    /// Sends `amount` out of the admin wallet to the provided address, after obtaining it from the faucet.
    pub(crate) async fn fund_address<D: AsRef<Path>>(
        &self,
        wallet_dir: D,
        amount: Balance,
        address: &str,
    ) -> Result<(), LocalnetError> {
        let ctx = self.ctx(format!("\n💸 funding {address} with {amount}"));
        let topology = self.load_topology()?;
        let inventory = WalletInventory::load(self.config.wallet_inventory())?;
        let admin = inventory.admin()?;
        let cli = self.wallet_cli(wallet_dir, topology.primary_node()?.rpc_ws_endpoint());

        let calls = amount.batches_of(self.config.chain.faucet_batch_size);
        ctx.set_pb_message(format!("calling the faucet {calls} times..."));
        ctx.async_with_progress(self.run_wallet_cli(&cli.faucet(admin, calls)))
            .await?;
        ctx.println(format!("\t✅ obtained funds from the faucet ({calls} calls)"));

        ctx.set_pb_message(format!("transferring {amount}..."));
        self.run_wallet_cli(&cli.transfer(admin, address, amount))
            .await?;
        ctx.println(format!("\t✅ transferred {amount} to {address}"));
        Ok(())
    }
}
