//! shipyard-deploy - Deploy-and-verify library for EVM smart contracts.
//!
//! This crate deploys compiled (Hardhat layout) contracts to a configured
//! network, waits until their code is available, and verifies their source on
//! an Etherscan-compatible explorer.

mod args;
pub use args::{ArgumentProvider, FileArgumentProvider, encode_constructor_args, read_args_file};

mod artifacts;
pub use artifacts::{ArtifactStore, BuildInfo, CompiledContract};

mod config;
pub use config::{
    AvailabilityPolicy, CONFIG_FILENAME, DeploySettings, ENV_PREFIX, NetworkConfig,
    NetworkProfile, SECRET_ENV_PREFIX, SECRETS_FILENAME, Secrets, ShipyardConfig,
    VerifierEndpoint,
};

mod error;
pub use error::{DeployError, ErrorKind};

mod gas;
pub use gas::{GAS_PRICE_BUMP_PERCENT, GasPricePolicy, format_gwei, inflate_gas_price};

mod networks;
pub use networks::{DEFAULT_NETWORK, ETHERSCAN_V2_API, builtin_networks};

mod orchestrator;
pub use orchestrator::{DeploymentRequest, DeploymentResult, Orchestrator};

mod retry;
pub use retry::{BackoffKind, RetryExhausted, RetryPolicy, poll_until};

pub mod rpc;
pub use rpc::{CallRequest, ChainClient, JsonRpcChain, TransactionReceipt};

mod tx;
pub use tx::{CreationTransaction, TransactionType, create_address};

mod verify;
pub use verify::{
    EtherscanVerifier, VerificationOutcome, VerificationRequest, Verifier, verify_contract,
};

pub use alloy_core::primitives::{Address, B256, Bytes, U256};
