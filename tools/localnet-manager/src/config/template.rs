// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

/// Escapes every rendered value for use inside a TOML basic string.
pub(crate) fn toml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            c if c.is_control() => escaped.push_str(&format!("\\u{:04X}", c as u32)),
            c => escaped.push(c),
        }
    }
    escaped
}

// Note: any changes to the template must be reflected in the appropriate structs.
pub(crate) const CONFIG_TEMPLATE: &str = r#"
# This is a TOML config file.
# For more information, see https://github.com/toml-lang/toml

##### locations of localnet artifacts #####
# relative paths are resolved against the localnet home directory

[paths]
# Directory into which all dependency repositories are cloned.
repo_store = "{{ paths.repo_store }}"

# YAML list of repositories to clone during the first run.
repository_manifest = "{{ paths.repository_manifest }}"

# YAML description of the authority nodes making up the chain.
topology = "{{ paths.topology }}"

# YAML inventory of wallets and their recovery secrets.
wallet_inventory = "{{ paths.wallet_inventory }}"

# JSON record of the provisioning phase and the launched node processes.
state_file = "{{ paths.state_file }}"

# Cargo project of the node.
node_project = "{{ paths.node_project }}"

# Directory under which the chain specification is generated.
scripts_dir = "{{ paths.scripts_dir }}"

##### node settings #####

[node]
binary_name = "{{ node.binary_name }}"

# Name of the chain directory the node creates under each base path.
chain_id = "{{ node.chain_id }}"

# Cargo profile used when building the node binary.
build_profile = "{{ node.build_profile }}"

##### wallet cli settings #####

[wallet_cli]
program = "{{ wallet_cli.program }}"

[wallet_cli.retry]
# Maximum number of attempts of a wallet cli call failing due to transport problems.
max_attempts = {{ wallet_cli.retry.max_attempts }}

# Delay before the first retry. It grows linearly with every subsequent attempt.
backoff = "{{ wallet_cli.retry.backoff }}"

##### node readiness settings #####

[readiness]
# Maximum time a freshly launched node is given to start answering rpc requests.
timeout = "{{ readiness.timeout }}"

poll_interval = "{{ readiness.poll_interval }}"

request_timeout = "{{ readiness.request_timeout }}"

##### chain configuration settings #####

[chain]
# Subnet to which all validator and miner hotkeys get registered.
target_netuid = {{ chain.target_netuid }}

# Minimum balance (in whole tokens) the validator must hold before staking.
validator_min_balance = {{ chain.validator_min_balance }}

# Amount (in whole tokens) staked from the validator hotkey.
validator_stake = {{ chain.validator_stake }}

# Number of tokens handed out by a single successful faucet call.
faucet_batch_size = {{ chain.faucet_batch_size }}

# Additional faucet calls made on top of the funding requirements to cover transaction fees.
faucet_fee_buffer = {{ chain.faucet_fee_buffer }}
"#;
