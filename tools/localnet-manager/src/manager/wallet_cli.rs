// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::config::balance::Balance;
use crate::config::wallets::WalletEntry;
use crate::error::LocalnetError;
use crate::helpers::random_identifier;
use crate::manager::readiness::ReadinessProbe;
use crate::manager::LocalnetManager;
use crate::process::{CommandOutput, CommandRunner, Invocation};
use std::path::{Path, PathBuf};
use tokio::time::sleep;
use tracing::{debug, warn};

const SUBNET_REPOSITORY: &str = "https://github.com/opentensor/bittensor";
const MNEMONIC_WORDS: &str = "12";

const TRANSIENT_MARKERS: &[&str] = &[
    "connection refused",
    "timed out",
    "websocket",
    "connection reset",
    "temporarily unavailable",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureKind {
    /// The chain could not be reached. Worth trying again.
    Transient,
    Permanent,
}

pub(crate) fn classify(output: &CommandOutput) -> FailureKind {
    let stderr = output.stderr.to_lowercase();
    let stdout = output.stdout.to_lowercase();
    if TRANSIENT_MARKERS
        .iter()
        .any(|marker| stderr.contains(marker) || stdout.contains(marker))
    {
        FailureKind::Transient
    } else {
        FailureKind::Permanent
    }
}

fn numeric_token(token: &str) -> Option<f64> {
    let token = token
        .trim_start_matches('τ')
        .trim_end_matches(|c: char| c == ',' || c == ';');
    if token.is_empty()
        || !token.starts_with(|c: char| c.is_ascii_digit())
        || !token.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',')
    {
        return None;
    }
    token.replace(',', "").parse().ok()
}

/// Extracts the (free) balance out of the output of the wallet cli balance query.
/// The first numeric token is assumed to be the balance expressed in whole tokens.
pub(crate) fn parse_balance_output(stdout: &str) -> Result<Balance, LocalnetError> {
    stdout
        .split_whitespace()
        .find_map(numeric_token)
        .and_then(Balance::from_display)
        .ok_or_else(|| LocalnetError::BalanceParseFailure {
            output: stdout.trim().to_string(),
        })
}

/// Builds invocations of the wallet cli against a particular key directory and chain endpoint.
pub(crate) struct WalletCli {
    program: String,
    wallet_dir: PathBuf,
    endpoint: String,
}

impl WalletCli {
    pub(crate) fn new<P: AsRef<Path>>(program: &str, wallet_dir: P, endpoint: String) -> Self {
        WalletCli {
            program: program.to_string(),
            wallet_dir: wallet_dir.as_ref().to_path_buf(),
            endpoint,
        }
    }

    pub(crate) fn wallet_dir(&self) -> &Path {
        &self.wallet_dir
    }

    fn base(&self) -> Invocation {
        Invocation::new(&self.program)
    }

    fn wallet_path_arg(&self, invocation: Invocation) -> Invocation {
        invocation.arg("-p").path_arg(&self.wallet_dir)
    }

    fn endpoint_arg(&self, invocation: Invocation) -> Invocation {
        invocation
            .arg("--subtensor.chain_endpoint")
            .arg(&self.endpoint)
    }

    pub(crate) fn new_coldkey(&self, wallet: &WalletEntry) -> Invocation {
        let invocation = self
            .base()
            .args(["wallet", "new-coldkey", "--no-use-password", "--n-words"])
            .arg(MNEMONIC_WORDS)
            .args(["--quiet", "--wallet-name"])
            .arg(&wallet.wallet_name);
        self.wallet_path_arg(invocation)
    }

    pub(crate) fn new_hotkey(&self, wallet: &WalletEntry) -> Invocation {
        let invocation = self
            .base()
            .args(["wallet", "new-hotkey", "--no-use-password", "--n-words"])
            .arg(MNEMONIC_WORDS)
            .args(["--quiet", "--wallet-name"])
            .arg(&wallet.wallet_name)
            .arg("--wallet-hotkey")
            .arg(&wallet.hotkey_name);
        self.wallet_path_arg(invocation)
    }

    pub(crate) fn regen_coldkey(&self, wallet: &WalletEntry, secret: &str) -> Invocation {
        let invocation = self
            .base()
            .args(["wallet", "regen-coldkey", "--wallet-name"])
            .arg(&wallet.wallet_name);
        self.wallet_path_arg(invocation)
            .arg("--mnemonic")
            .secret_arg(secret)
            .args(["--no-use-password", "--quiet"])
    }

    pub(crate) fn regen_hotkey(&self, wallet: &WalletEntry, secret: &str) -> Invocation {
        let invocation = self
            .base()
            .args(["wallet", "regen-hotkey", "--wallet-name"])
            .arg(&wallet.wallet_name)
            .arg("--wallet-hotkey")
            .arg(&wallet.hotkey_name);
        self.wallet_path_arg(invocation)
            .arg("--mnemonic")
            .secret_arg(secret)
            .args(["--no-use-password", "--quiet"])
    }

    pub(crate) fn faucet(&self, wallet: &WalletEntry, max_successes: u64) -> Invocation {
        let invocation = self
            .base()
            .args(["wallet", "faucet", "--wallet.name"])
            .arg(&wallet.wallet_name)
            .arg("-v");
        let invocation = self
            .wallet_path_arg(invocation)
            .arg("--max-successes")
            .arg(max_successes.to_string())
            .arg("--no-prompt");
        self.endpoint_arg(invocation)
    }

    pub(crate) fn transfer(&self, from: &WalletEntry, destination: &str, amount: Balance) -> Invocation {
        let invocation = self
            .base()
            .args(["wallet", "transfer", "--wallet.name"])
            .arg(&from.wallet_name)
            .arg("-d")
            .arg(destination)
            .arg("-a")
            .arg(amount.to_string());
        let invocation = self.endpoint_arg(invocation);
        self.wallet_path_arg(invocation)
            .args(["--no-prompt", "--quiet"])
    }

    pub(crate) fn balance(&self, wallet: &WalletEntry) -> Invocation {
        let invocation = self
            .base()
            .args(["wallet", "balance", "--wallet.name"])
            .arg(&wallet.wallet_name);
        let invocation = self.wallet_path_arg(invocation);
        self.endpoint_arg(invocation)
    }

    pub(crate) fn create_subnet(&self, owner: &WalletEntry) -> Invocation {
        let id = random_identifier(5);
        let invocation = self
            .base()
            .args(["subnet", "create", "--wallet-name"])
            .arg(&owner.wallet_name)
            .arg("--wallet-hotkey")
            .arg(&owner.hotkey_name);
        let invocation = self
            .wallet_path_arg(invocation)
            .arg("--subnet-name")
            .arg(&id)
            .arg("--github-repo")
            .arg(SUBNET_REPOSITORY)
            .arg("--subnet-contact")
            .arg(format!("{id}@{id}.{id}"))
            .arg("--subnet-url")
            .arg(format!("{id}.{id}"))
            .args(["--discord-handle", " ", "--description", " "])
            .arg("--additional-info")
            .arg(&id)
            .args(["--quiet", "--no-prompt"]);
        self.endpoint_arg(invocation)
    }

    pub(crate) fn register_hotkey(&self, wallet: &WalletEntry, netuid: u16) -> Invocation {
        let invocation = self
            .base()
            .args(["subnet", "register", "--wallet.name"])
            .arg(&wallet.wallet_name);
        let invocation = self
            .wallet_path_arg(invocation)
            .arg("--wallet.hotkey")
            .arg(&wallet.hotkey_name)
            .arg("--netuid")
            .arg(netuid.to_string())
            .args(["--no-prompt", "--quiet"]);
        self.endpoint_arg(invocation)
    }

    pub(crate) fn stake(&self, wallet: &WalletEntry, amount: Balance, netuid: u16) -> Invocation {
        let invocation = self
            .base()
            .args(["stake", "add", "--wallet.name"])
            .arg(&wallet.wallet_name)
            .arg("--wallet.hotkey")
            .arg(&wallet.hotkey_name);
        self.endpoint_arg(invocation)
            .arg("--amount")
            .arg(amount.to_string())
            .arg("--netuid")
            .arg(netuid.to_string())
            .arg("-p")
            .path_arg(&self.wallet_dir)
            .args(["--unsafe", "--no-prompt", "--quiet"])
    }
}

impl<R: CommandRunner, P: ReadinessProbe> LocalnetManager<R, P> {
    pub(crate) fn wallet_cli<D: AsRef<Path>>(&self, wallet_dir: D, rpc_endpoint: String) -> WalletCli {
        WalletCli::new(&self.config.wallet_cli.program, wallet_dir, rpc_endpoint)
    }

    /// Runs the wallet cli invocation, retrying failures caused by the chain not being reachable.
    pub(crate) async fn run_wallet_cli(
        &self,
        invocation: &Invocation,
    ) -> Result<CommandOutput, LocalnetError> {
        let policy = self.config.wallet_cli.retry;
        let mut attempt = 1;

        loop {
            let output = self.runner.run(invocation).await?;
            if output.success() {
                return Ok(output);
            }

            let kind = classify(&output);
            if kind == FailureKind::Permanent || attempt >= policy.max_attempts {
                debug!("giving up on '{invocation}' after {attempt} attempt(s) ({kind:?} failure)");
                return Err(LocalnetError::command_failure(
                    invocation.to_string(),
                    output.code,
                    &output.stderr,
                ));
            }

            attempt += 1;
            let delay = policy.delay_before(attempt);
            warn!(
                "'{}' failed due to a transient error. retrying in {} (attempt {attempt}/{})",
                invocation.program(),
                humantime::format_duration(delay),
                policy.max_attempts
            );
            sleep(delay).await;
        }
    }

    pub(crate) async fn query_balance(
        &self,
        cli: &WalletCli,
        wallet: &WalletEntry,
    ) -> Result<Balance, LocalnetError> {
        let output = self.run_wallet_cli(&cli.balance(wallet)).await?;
        let balance = parse_balance_output(&output.stdout)?;
        debug!("wallet '{}' holds {balance}", wallet.wallet_name);
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::testing::TestLocalnet;
    use crate::process::testing::{failed_output, ok_output, FakeRunner};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn wallet(name: &str, hotkey: &str) -> WalletEntry {
        WalletEntry::new(name, hotkey, None)
    }

    fn cli() -> WalletCli {
        WalletCli::new("btcli", "/wallets", "ws://127.0.0.1:9944".to_string())
    }

    #[test]
    fn faucet_invocation() {
        let invocation = cli().faucet(&wallet("Admin", "AdminHot"), 6);
        assert_eq!(
            invocation.to_string(),
            "btcli wallet faucet --wallet.name Admin -v -p /wallets --max-successes 6 --no-prompt --subtensor.chain_endpoint ws://127.0.0.1:9944"
        );
    }

    #[test]
    fn transfer_invocation() {
        let invocation = cli().transfer(
            &wallet("Admin", "AdminHot"),
            "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty",
            Balance::from_display(12.5).unwrap(),
        );
        assert!(invocation.starts_with("btcli", &["wallet", "transfer"]));
        assert_eq!(invocation.flag_value("-a"), Some("12.5"));
        assert_eq!(
            invocation.flag_value("-d"),
            Some("5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty")
        );
        assert!(invocation.has_arg("--no-prompt"));
    }

    #[test]
    fn subnet_metadata_is_random_but_consistent() {
        let invocation = cli().create_subnet(&wallet("Validator", "ValidatorHot"));
        let name = invocation.flag_value("--subnet-name").unwrap().to_string();
        assert_eq!(name.len(), 5);
        assert_eq!(
            invocation.flag_value("--subnet-contact"),
            Some(format!("{name}@{name}.{name}").as_str())
        );
        assert_eq!(invocation.flag_value("--wallet-hotkey"), Some("ValidatorHot"));
    }

    #[test]
    fn recovery_phrases_are_hidden() {
        let invocation = cli().regen_hotkey(&wallet("Miner1", "Miner1Hot"), "secret words here");
        assert!(!invocation.to_string().contains("secret words here"));
        assert_eq!(
            invocation.raw_flag_value("--mnemonic"),
            Some("secret words here")
        );
    }

    #[test]
    fn stake_invocation() {
        let invocation = cli().stake(
            &wallet("Validator", "ValidatorHot"),
            Balance::from_whole_units(100),
            2,
        );
        assert!(invocation.starts_with("btcli", &["stake", "add"]));
        assert_eq!(invocation.flag_value("--amount"), Some("100"));
        assert_eq!(invocation.flag_value("--netuid"), Some("2"));
        assert!(invocation.has_arg("--unsafe"));
    }

    #[test]
    fn classifying_failures() {
        assert_eq!(
            classify(&failed_output("Error: Connection refused (os error 111)")),
            FailureKind::Transient
        );
        assert_eq!(
            classify(&failed_output("websocket handshake failed")),
            FailureKind::Transient
        );
        assert_eq!(
            classify(&failed_output("Insufficient balance")),
            FailureKind::Permanent
        );
    }

    #[test]
    fn parsing_balances() {
        assert_eq!(
            parse_balance_output("1101.0 τ\n").unwrap(),
            Balance::from_whole_units(1101)
        );
        assert_eq!(
            parse_balance_output("Wallet balance: τ1,101.5000 (free)").unwrap(),
            Balance::from_display(1101.5).unwrap()
        );
        assert_eq!(
            parse_balance_output("Validator 5FHneW46xGX 0.000000000").unwrap(),
            Balance::ZERO
        );
        assert!(matches!(
            parse_balance_output("no balance here").unwrap_err(),
            LocalnetError::BalanceParseFailure { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let runner = FakeRunner::with_handler(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                failed_output("websocket connection refused")
            } else {
                ok_output("done")
            }
        });
        let localnet = TestLocalnet::with_runner(runner);

        let output = localnet
            .manager
            .run_wallet_cli(&cli().faucet(&wallet("Admin", "AdminHot"), 1))
            .await
            .unwrap();
        assert_eq!(output.stdout, "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let runner = FakeRunner::with_handler(|_| failed_output("request timed out"));
        let localnet = TestLocalnet::with_runner(runner);

        let err = localnet
            .manager
            .run_wallet_cli(&cli().faucet(&wallet("Admin", "AdminHot"), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, LocalnetError::CommandFailure { .. }));
        assert_eq!(localnet.manager.runner.invocations().len(), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let runner = FakeRunner::with_handler(|_| failed_output("Insufficient balance"));
        let localnet = TestLocalnet::with_runner(runner);

        let err = localnet
            .manager
            .run_wallet_cli(&cli().faucet(&wallet("Admin", "AdminHot"), 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LocalnetError::CommandFailure { ref stderr, .. } if stderr == "Insufficient balance"
        ));
        assert_eq!(localnet.manager.runner.invocations().len(), 1);
    }
}
