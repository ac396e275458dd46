//! shipyard is a CLI tool to deploy smart contracts to EVM networks and verify them.

mod cli;

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::{Cli, Command};
use shipyard_deploy::{
    ArtifactStore, CompiledContract, DeploymentRequest, Orchestrator, Secrets, ShipyardConfig,
    U256, format_gwei, read_args_file,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = ShipyardConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::DeployAndVerifyContract {
            contract,
            no_verify,
            gas_price_policy,
            tx_type,
        } => {
            let secrets = Secrets::load(cli.secrets.as_deref())?;
            let mut orchestrator = Orchestrator::connect(&config, &secrets, &cli.network)?;
            if let Some(policy) = gas_price_policy {
                orchestrator = orchestrator.with_gas_price_policy(policy);
            }
            if let Some(tx_type) = tx_type {
                orchestrator = orchestrator.with_transaction_type(tx_type);
            }

            let result = orchestrator.deploy_and_verify(&contract, !no_verify).await?;

            tracing::info!(
                contract = %contract,
                address = %result.contract_address,
                tx_hash = %result.transaction_hash,
                block = result.block_number,
                "✓ Deployment complete!"
            );
            match result.verification {
                Some(outcome) if outcome.success => {
                    tracing::info!(message = %outcome.message, "✓ Source verified")
                }
                Some(outcome) => tracing::warn!(
                    message = %outcome.message,
                    "Source not verified; retry later with verify-contract"
                ),
                None => {}
            }
        }
        Command::DeployBytecode {
            abi,
            bytecode,
            name,
            args_file,
            gas_price_policy,
            tx_type,
        } => {
            let name = match name {
                Some(name) => name,
                None => abi
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.split('.').next())
                    .unwrap_or("contract")
                    .to_string(),
            };
            let contract = CompiledContract::from_abi_and_bytecode(&name, &abi, &bytecode)?;
            let args = args_file
                .as_deref()
                .map(read_args_file)
                .transpose()?
                .unwrap_or_default();

            let secrets = Secrets::load(cli.secrets.as_deref())?;
            let mut orchestrator = Orchestrator::connect(&config, &secrets, &cli.network)?;
            if let Some(policy) = gas_price_policy {
                orchestrator = orchestrator.with_gas_price_policy(policy);
            }
            if let Some(tx_type) = tx_type {
                orchestrator = orchestrator.with_transaction_type(tx_type);
            }

            let request = DeploymentRequest::new(contract, args)?;
            let result = orchestrator.deploy(&request).await?;

            tracing::info!(
                contract = %name,
                address = %result.contract_address,
                tx_hash = %result.transaction_hash,
                block = result.block_number,
                "✓ Deployment complete!"
            );
        }
        Command::VerifyContract {
            contract,
            address,
            args_file,
        } => {
            let secrets = Secrets::load(cli.secrets.as_deref())?;
            let orchestrator =
                Orchestrator::connect_for_verification(&config, &secrets, &cli.network)?;
            let args = args_file.as_deref().map(read_args_file).transpose()?;

            let outcome = orchestrator.verify(&contract, address, args).await?;
            if outcome.success {
                tracing::info!(%address, message = %outcome.message, "✓ Source verified");
            } else {
                tracing::warn!(%address, message = %outcome.message, "Source not verified");
            }
        }
        Command::Abi { contract } => {
            let contract = ArtifactStore::new(&config.artifacts_dir).load(&contract)?;
            println!("{}", contract.human_readable_abi());
        }
        Command::Networks => print_networks(&config),
        Command::Init { path, force } => init(&config, &path, force)?,
    }

    Ok(())
}

fn print_networks(config: &ShipyardConfig) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Network",
        "Chain ID",
        "RPC",
        "Gas price (gwei)",
        "Gas limit",
        "Signer secret",
        "Explorer",
    ]);

    for (name, network) in &config.networks {
        let rpc = match (&network.rpc_url, &network.rpc_url_secret) {
            (Some(url), _) => url.clone(),
            (None, Some(secret)) => format!("<secret {}>", secret),
            (None, None) => "-".to_string(),
        };
        table.add_row(vec![
            name.clone(),
            network.chain_id.to_string(),
            rpc,
            network
                .gas_price_wei
                .map(|wei| format_gwei(U256::from(wei)))
                .unwrap_or_else(|| "-".to_string()),
            network
                .gas_limit
                .map(|limit| limit.to_string())
                .unwrap_or_else(|| "estimated".to_string()),
            network.signer.clone(),
            network
                .explorer_url
                .as_ref()
                .map(|url| url.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }

    println!("{table}");
}

fn init(config: &ShipyardConfig, path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        );
    }
    config.save_to_file(path)
}
