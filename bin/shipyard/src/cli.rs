use std::path::PathBuf;

use clap::{Parser, Subcommand};
use shipyard_deploy::{Address, CONFIG_FILENAME, DEFAULT_NETWORK, GasPricePolicy, TransactionType};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "shipyard")]
#[command(
    author,
    version,
    about = "Deploy smart contracts to EVM networks and verify their source"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "SHIPYARD_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// The network to deploy to, as named in the network registry.
    #[arg(short, long, global = true, env = "SHIPYARD_NETWORK", default_value = DEFAULT_NETWORK)]
    pub network: String,

    /// Path to the project configuration file.
    ///
    /// Defaults to ./Shipyard.toml when it exists, built-in settings otherwise.
    #[arg(long, alias = "conf", global = true, env = "SHIPYARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the secrets file (TOML or JSON).
    ///
    /// Defaults to ./secrets.toml when it exists. Secrets can also be provided as
    /// SHIPYARD_SECRET_<NAME> environment variables.
    #[arg(long, global = true, env = "SHIPYARD_SECRETS")]
    pub secrets: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy a contract, wait until it is available, then verify its source.
    #[command(alias = "deploy_and_verify_contract")]
    DeployAndVerifyContract {
        /// Contract name (`Token`) or fully qualified name (`contracts/Token.sol:Token`).
        contract: String,

        /// Skip source verification after deployment.
        #[arg(long, env = "SHIPYARD_NO_VERIFY")]
        no_verify: bool,

        /// How the gas price is chosen. Overrides the configuration.
        #[arg(long, env = "SHIPYARD_GAS_PRICE_POLICY")]
        gas_price_policy: Option<GasPricePolicy>,

        /// Envelope of the deployment transaction. Overrides the configuration.
        #[arg(long, env = "SHIPYARD_TX_TYPE")]
        tx_type: Option<TransactionType>,
    },

    /// Deploy creation bytecode with its ABI, without a compiled artifact.
    ///
    /// The contract cannot be verified since its sources are unknown.
    DeployBytecode {
        /// ABI file: the bare ABI array or a JSON object with an `abi` field.
        #[arg(long)]
        abi: PathBuf,

        /// File holding the creation bytecode as hex (not the deployed bytecode).
        #[arg(long)]
        bytecode: PathBuf,

        /// Name used in logs. Defaults to the ABI file name.
        #[arg(long)]
        name: Option<String>,

        /// JSON file with the constructor arguments.
        #[arg(long)]
        args_file: Option<PathBuf>,

        /// How the gas price is chosen. Overrides the configuration.
        #[arg(long, env = "SHIPYARD_GAS_PRICE_POLICY")]
        gas_price_policy: Option<GasPricePolicy>,

        /// Envelope of the deployment transaction. Overrides the configuration.
        #[arg(long, env = "SHIPYARD_TX_TYPE")]
        tx_type: Option<TransactionType>,
    },

    /// Verify the source of an already deployed contract.
    #[command(alias = "verify_contract")]
    VerifyContract {
        /// Contract name (`Token`) or fully qualified name (`contracts/Token.sol:Token`).
        contract: String,

        /// Address the contract is deployed at.
        address: Address,

        /// JSON file with the constructor arguments, instead of the configured
        /// argument provider.
        #[arg(long)]
        args_file: Option<PathBuf>,
    },

    /// Print the ABI of a compiled contract as a Solidity interface.
    Abi {
        /// Contract name (`Token`) or fully qualified name (`contracts/Token.sol:Token`).
        contract: String,
    },

    /// List the known networks.
    Networks,

    /// Write the effective configuration to a TOML file.
    Init {
        /// Destination file.
        #[arg(default_value = CONFIG_FILENAME)]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}
