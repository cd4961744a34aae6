// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::config::balance::Balance;
use crate::error::LocalnetError;
use crate::helpers::write_atomically;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

// the inventory holds plaintext recovery phrases
const INVENTORY_PERMISSIONS: u32 = 0o600;

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|value| !value.trim().is_empty()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletRole {
    Admin,
    Validator,
    Miner,
}

impl Display for WalletRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WalletRole::Admin => write!(f, "Admin"),
            WalletRole::Validator => write!(f, "Validators"),
            WalletRole::Miner => write!(f, "Miners"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct WalletEntry {
    pub wallet_name: String,

    #[serde(default)]
    pub hotkey_name: String,

    #[serde(
        rename = "coldkey_secretPhrase",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub coldkey_secret: Option<String>,

    #[serde(
        rename = "hotkey_secretPhrase",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub hotkey_secret: Option<String>,

    #[serde(
        rename = "init_funding",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    #[zeroize(skip)]
    pub initial_funding: Option<Balance>,

    #[serde(
        rename = "ss58Address",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub chain_address: Option<String>,
}

impl WalletEntry {
    pub(crate) fn new(wallet_name: &str, hotkey_name: &str, initial_funding: Option<Balance>) -> Self {
        WalletEntry {
            wallet_name: wallet_name.to_string(),
            hotkey_name: hotkey_name.to_string(),
            coldkey_secret: None,
            hotkey_secret: None,
            initial_funding,
            chain_address: None,
        }
    }

    pub fn coldkey_path<P: AsRef<Path>>(&self, wallet_dir: P) -> PathBuf {
        wallet_dir.as_ref().join(&self.wallet_name).join("coldkey")
    }

    pub fn hotkey_path<P: AsRef<Path>>(&self, wallet_dir: P) -> PathBuf {
        wallet_dir
            .as_ref()
            .join(&self.wallet_name)
            .join("hotkeys")
            .join(&self.hotkey_name)
    }

    /// Funding requested for this wallet, if any non-zero amount was specified.
    pub fn requested_funding(&self) -> Option<Balance> {
        self.initial_funding.filter(|funding| !funding.is_zero())
    }

    fn missing_fields(&self, role: WalletRole) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.wallet_name.trim().is_empty() {
            missing.push("wallet_name");
        }
        if role != WalletRole::Admin {
            if self.coldkey_secret.is_none() {
                missing.push("coldkey_secretPhrase");
            }
            if self.hotkey_secret.is_none() {
                missing.push("hotkey_secretPhrase");
            }
        }
        missing
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingField {
    pub role: WalletRole,
    pub wallet_name: String,
    pub field: &'static str,
}

impl Display for MissingField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "wallet '{}' under {} is missing '{}'",
            self.wallet_name, self.role, self.field
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletGroup {
    #[serde(default)]
    pub wallet: Vec<WalletEntry>,
}

impl WalletGroup {
    fn of(wallets: Vec<WalletEntry>) -> Self {
        WalletGroup { wallet: wallets }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletInventory {
    #[serde(rename = "Admin")]
    admin: WalletGroup,

    #[serde(rename = "Validators")]
    validators: WalletGroup,

    #[serde(rename = "Miners", default)]
    miners: WalletGroup,
}

impl WalletInventory {
    /// Fresh inventory with no key material: one admin, one validator and two miners.
    pub fn skeleton() -> Self {
        WalletInventory {
            admin: WalletGroup::of(vec![WalletEntry::new("Admin", "AdminHot", None)]),
            validators: WalletGroup::of(vec![WalletEntry::new(
                "Validator",
                "ValidatorHot",
                Some(Balance::from_minimal_units(1_101_000_000_000)),
            )]),
            miners: WalletGroup::of(vec![
                WalletEntry::new(
                    "Miner1",
                    "Miner1Hot",
                    Some(Balance::from_minimal_units(1_000_000_000_000)),
                ),
                WalletEntry::new(
                    "Miner2",
                    "Miner2Hot",
                    Some(Balance::from_minimal_units(1_000_000_000_000)),
                ),
            ]),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LocalnetError> {
        let path = path.as_ref();
        let content = Zeroizing::new(fs::read_to_string(path).map_err(|source| {
            LocalnetError::ConfigLoadFailure {
                path: path.to_path_buf(),
                source,
            }
        })?);
        let inventory: WalletInventory =
            serde_yaml::from_str(&content).map_err(|source| LocalnetError::MalformedYaml {
                path: path.to_path_buf(),
                source,
            })?;
        inventory.ensure_well_formed()?;

        debug!(
            "loaded inventory of {} wallets from {}",
            inventory.wallets().count(),
            path.display()
        );
        Ok(inventory)
    }

    /// Rewrites the whole inventory file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), LocalnetError> {
        let path = path.as_ref();
        let content = Zeroizing::new(serde_yaml::to_string(self)?);
        let save_failure = |source| LocalnetError::ConfigSaveFailure {
            path: path.to_path_buf(),
            source,
        };

        write_atomically(path, content.as_bytes()).map_err(save_failure)?;
        fs::set_permissions(path, fs::Permissions::from_mode(INVENTORY_PERMISSIONS))
            .map_err(save_failure)?;
        debug!("saved wallet inventory to {}", path.display());
        Ok(())
    }

    fn ensure_well_formed(&self) -> Result<(), LocalnetError> {
        if self.admin.wallet.len() != 1 {
            return Err(LocalnetError::MalformedWalletInventory {
                reason: format!(
                    "expected exactly one admin wallet, found {}",
                    self.admin.wallet.len()
                ),
            });
        }
        if self.validators.wallet.is_empty() {
            return Err(LocalnetError::MalformedWalletInventory {
                reason: "at least one validator wallet is required".to_string(),
            });
        }

        let mut names = HashSet::new();
        for (role, wallet) in self.wallets() {
            if wallet.hotkey_name.trim().is_empty() {
                return Err(LocalnetError::MalformedWalletInventory {
                    reason: format!(
                        "wallet '{}' under {role} does not specify its hotkey_name",
                        wallet.wallet_name
                    ),
                });
            }
            if !wallet.wallet_name.is_empty() && !names.insert(wallet.wallet_name.as_str()) {
                return Err(LocalnetError::MalformedWalletInventory {
                    reason: format!("wallet name '{}' is used more than once", wallet.wallet_name),
                });
            }
        }
        Ok(())
    }

    pub fn admin(&self) -> Result<&WalletEntry, LocalnetError> {
        self.admin
            .wallet
            .first()
            .ok_or_else(|| LocalnetError::MalformedWalletInventory {
                reason: "the admin wallet is missing".to_string(),
            })
    }

    /// The validator that owns the second subnet and stakes into the target subnet.
    pub fn primary_validator(&self) -> Result<&WalletEntry, LocalnetError> {
        self.validators
            .wallet
            .first()
            .ok_or_else(|| LocalnetError::MalformedWalletInventory {
                reason: "no validator wallets are defined".to_string(),
            })
    }

    pub fn miners(&self) -> &[WalletEntry] {
        &self.miners.wallet
    }

    /// All wallets, admin first, followed by the validators and then the miners.
    pub fn wallets(&self) -> impl Iterator<Item = (WalletRole, &WalletEntry)> {
        let admin = self.admin.wallet.iter().map(|w| (WalletRole::Admin, w));
        let validators = self
            .validators
            .wallet
            .iter()
            .map(|w| (WalletRole::Validator, w));
        let miners = self.miners.wallet.iter().map(|w| (WalletRole::Miner, w));
        admin.chain(validators).chain(miners)
    }

    pub fn wallets_mut(&mut self) -> impl Iterator<Item = (WalletRole, &mut WalletEntry)> {
        let admin = self.admin.wallet.iter_mut().map(|w| (WalletRole::Admin, w));
        let validators = self
            .validators
            .wallet
            .iter_mut()
            .map(|w| (WalletRole::Validator, w));
        let miners = self
            .miners
            .wallet
            .iter_mut()
            .map(|w| (WalletRole::Miner, w));
        admin.chain(validators).chain(miners)
    }

    /// Validator and miner wallets that requested a non-zero initial funding.
    pub fn funded_wallets(&self) -> impl Iterator<Item = (WalletRole, &WalletEntry)> {
        self.wallets().filter(|(role, wallet)| {
            *role != WalletRole::Admin && wallet.requested_funding().is_some()
        })
    }

    pub fn total_initial_funding(&self) -> Balance {
        self.funded_wallets()
            .filter_map(|(_, wallet)| wallet.requested_funding())
            .sum()
    }

    pub fn missing_fields(&self) -> Vec<MissingField> {
        self.wallets()
            .flat_map(|(role, wallet)| {
                wallet
                    .missing_fields(role)
                    .into_iter()
                    .map(move |field| MissingField {
                        role,
                        wallet_name: wallet.wallet_name.clone(),
                        field,
                    })
            })
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.missing_fields().is_empty()
    }
}
