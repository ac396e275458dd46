//! Deploy-and-verify flow.

use alloy_core::primitives::{Address, B256, Bytes, U256};
use anyhow::Context;
use serde_json::Value;

use crate::{
    args::{ArgumentProvider, FileArgumentProvider, encode_constructor_args},
    artifacts::{ArtifactStore, CompiledContract},
    config::{AvailabilityPolicy, DeploySettings, NetworkProfile, Secrets, ShipyardConfig},
    error::DeployError,
    gas::{GasPricePolicy, format_gwei, inflate_gas_price},
    retry::{RetryExhausted, RetryPolicy, poll_until},
    rpc::{CallRequest, ChainClient, JsonRpcChain, TransactionReceipt, wait_for},
    tx::{CreationTransaction, TransactionType, create_address},
    verify::{EtherscanVerifier, VerificationOutcome, VerificationRequest, Verifier, verify_contract},
};

/// A contract ready to be deployed or verified.
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub contract: CompiledContract,
    /// Constructor arguments as provided, in declaration order.
    pub constructor_args: Vec<Value>,
    /// ABI encoding of `constructor_args`.
    pub encoded_args: Bytes,
}

impl DeploymentRequest {
    /// Encode `constructor_args` for `contract`, checking them against its ABI.
    pub fn new(
        contract: CompiledContract,
        constructor_args: Vec<Value>,
    ) -> Result<Self, DeployError> {
        let encoded_args = encode_constructor_args(&contract.abi, &constructor_args)
            .with_context(|| format!("Bad constructor arguments for {}", contract.name))
            .map_err(DeployError::config)?;

        Ok(Self {
            contract,
            constructor_args,
            encoded_args,
        })
    }

    /// Creation bytecode followed by the encoded constructor arguments.
    pub fn init_code(&self) -> Bytes {
        let mut code = Vec::with_capacity(self.contract.bytecode.len() + self.encoded_args.len());
        code.extend_from_slice(&self.contract.bytecode);
        code.extend_from_slice(&self.encoded_args);
        code.into()
    }
}

/// Outcome of a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentResult {
    pub contract_address: Address,
    pub transaction_hash: B256,
    pub block_number: u64,
    /// Confirmations observed when the contract was declared available.
    /// `None` when availability was established by polling the code.
    pub confirmations: Option<u64>,
    /// `None` when verification was skipped.
    pub verification: Option<VerificationOutcome>,
}

/// Deploys compiled contracts to one network and verifies their source.
pub struct Orchestrator<C, V> {
    chain: C,
    verifier: V,
    profile: NetworkProfile,
    artifacts: ArtifactStore,
    args: Box<dyn ArgumentProvider + Send + Sync>,
    settings: DeploySettings,
}

impl Orchestrator<JsonRpcChain, EtherscanVerifier> {
    /// Resolve `network` and connect to its RPC and verification endpoints.
    ///
    /// No request is made here; every configuration problem is reported as a
    /// [`DeployError::Config`].
    pub fn connect(
        config: &ShipyardConfig,
        secrets: &Secrets,
        network: &str,
    ) -> Result<Self, DeployError> {
        let profile = config.resolve_network(network, secrets)?;
        Self::from_profile(config, profile)
    }

    /// Like [`Self::connect`], for verification only: no private key is required.
    pub fn connect_for_verification(
        config: &ShipyardConfig,
        secrets: &Secrets,
        network: &str,
    ) -> Result<Self, DeployError> {
        let profile = config.resolve_network_for_verification(network, secrets)?;
        Self::from_profile(config, profile)
    }

    fn from_profile(config: &ShipyardConfig, profile: NetworkProfile) -> Result<Self, DeployError> {
        let chain = JsonRpcChain::new(profile.rpc_url.clone()).map_err(DeployError::config)?;
        let verifier = EtherscanVerifier::new(profile.verifier.clone(), &config.deploy)
            .map_err(DeployError::config)?;

        tracing::debug!(
            network = %profile.name,
            chain_id = profile.chain_id,
            rpc_url = %profile.rpc_url,
            "Network resolved"
        );

        Ok(Self::with_clients(
            chain,
            verifier,
            profile,
            ArtifactStore::new(&config.artifacts_dir),
            FileArgumentProvider::new(&config.args_dir),
            config.deploy.clone(),
        ))
    }
}

impl<C: ChainClient, V: Verifier> Orchestrator<C, V> {
    pub fn with_clients(
        chain: C,
        verifier: V,
        profile: NetworkProfile,
        artifacts: ArtifactStore,
        args: impl ArgumentProvider + Send + Sync + 'static,
        settings: DeploySettings,
    ) -> Self {
        Self {
            chain,
            verifier,
            profile,
            artifacts,
            args: Box::new(args),
            settings,
        }
    }

    /// Override the configured gas price policy.
    pub fn with_gas_price_policy(mut self, policy: GasPricePolicy) -> Self {
        self.settings.gas_price_policy = policy;
        self
    }

    pub fn with_transaction_type(mut self, tx_type: TransactionType) -> Self {
        self.settings.transaction_type = tx_type;
        self
    }

    pub fn profile(&self) -> &NetworkProfile {
        &self.profile
    }

    /// Load the artifact of `contract` and encode its constructor arguments.
    ///
    /// Makes no network call.
    pub fn prepare(&self, contract: &str) -> Result<DeploymentRequest, DeployError> {
        let compiled = self.artifacts.load(contract).map_err(DeployError::config)?;
        let args = self
            .args
            .constructor_args(&compiled.name)
            .map_err(DeployError::config)?;
        DeploymentRequest::new(compiled, args)
    }

    /// Deploy `contract`, wait until it is available, then verify its source
    /// unless `verify` is false.
    ///
    /// A verification failure is reported in the result, never as an error.
    pub async fn deploy_and_verify(
        &self,
        contract: &str,
        verify: bool,
    ) -> Result<DeploymentResult, DeployError> {
        let request = self.prepare(contract)?;
        let mut result = self.deploy(&request).await?;

        if verify {
            let request = VerificationRequest {
                contract: request.contract,
                address: result.contract_address,
                constructor_args: request.encoded_args,
            };
            result.verification = Some(verify_contract(&self.verifier, &request).await);
        } else {
            tracing::info!("Verification skipped");
        }

        if let Some(url) = self.profile.explorer_address_url(&result.contract_address) {
            tracing::info!(%url, "View the contract on the explorer");
        }

        Ok(result)
    }

    /// Submit a prepared deployment and wait until the contract is available.
    ///
    /// The returned result carries no verification outcome.
    pub async fn deploy(&self, request: &DeploymentRequest) -> Result<DeploymentResult, DeployError> {
        let name = request.contract.name.as_str();
        let fail = |e: anyhow::Error| DeployError::deployment(name, e);

        let signer = self.profile.signer.as_ref().ok_or_else(|| {
            DeployError::Config(format!(
                "No private key available to deploy on network '{}'",
                self.profile.name
            ))
        })?;

        tracing::info!(
            contract = %name,
            network = %self.profile.name,
            args = request.constructor_args.len(),
            "Deploying contract"
        );

        let chain_id = self
            .chain
            .chain_id()
            .await
            .context("Failed to query the chain ID")
            .map_err(fail)?;
        if chain_id != self.profile.chain_id {
            return Err(DeployError::Config(format!(
                "Network '{}' expects chain ID {} but the RPC endpoint reports {}",
                self.profile.name, self.profile.chain_id, chain_id
            )));
        }

        let gas_price = match self.settings.gas_price_policy {
            GasPricePolicy::Bumped => self.bumped_gas_price().await.map_err(fail)?,
            GasPricePolicy::Configured => self.profile.gas_price_wei.ok_or_else(|| {
                DeployError::Config(format!(
                    "No gas price configured for network '{}'",
                    self.profile.name
                ))
            })?,
        };

        let deployer = signer.address();
        let nonce = self
            .chain
            .transaction_count(deployer)
            .await
            .context("Failed to query the deployer nonce")
            .map_err(fail)?;

        let init_code = request.init_code();
        let gas_limit = match self.profile.gas_limit {
            Some(limit) => limit,
            None => self
                .chain
                .estimate_gas(&CallRequest {
                    from: deployer,
                    to: None,
                    data: init_code.clone(),
                })
                .await
                .context("Failed to estimate deployment gas")
                .map_err(fail)?,
        };

        let raw = CreationTransaction {
            tx_type: self.settings.transaction_type,
            chain_id,
            nonce,
            gas_price,
            gas_limit,
            init_code,
        }
        .sign(signer)
        .map_err(fail)?;
        let expected_address = create_address(deployer, nonce);

        tracing::info!(
            deployer = %deployer,
            nonce,
            gas_limit,
            gas_price_gwei = %format_gwei(gas_price),
            tx_type = %self.settings.transaction_type,
            expected_address = %expected_address,
            "Submitting deployment transaction"
        );

        let transaction_hash = self
            .chain
            .send_raw_transaction(raw)
            .await
            .context("Failed to submit the deployment transaction")
            .map_err(fail)?;
        tracing::info!(tx_hash = %transaction_hash, "Deployment transaction submitted");

        let receipt = self.wait_for_receipt(transaction_hash).await.map_err(fail)?;
        if !receipt.succeeded() {
            return Err(fail(anyhow::anyhow!(
                "transaction {} reverted in block {}",
                transaction_hash,
                receipt.block()
            )));
        }

        let contract_address = receipt.contract_address.unwrap_or(expected_address);
        tracing::info!(
            contract = %name,
            address = %contract_address,
            block = receipt.block(),
            "Contract deployed"
        );

        let confirmations = self
            .wait_until_available(contract_address, receipt.block())
            .await?;

        Ok(DeploymentResult {
            contract_address,
            transaction_hash,
            block_number: receipt.block(),
            confirmations,
            verification: None,
        })
    }

    /// Verify an already deployed contract.
    ///
    /// `args` replaces the argument provider when given. Only a contract or
    /// argument problem is an error; the verification itself never is.
    pub async fn verify(
        &self,
        contract: &str,
        address: Address,
        args: Option<Vec<Value>>,
    ) -> Result<VerificationOutcome, DeployError> {
        let request = match args {
            Some(args) => {
                let compiled = self.artifacts.load(contract).map_err(DeployError::config)?;
                DeploymentRequest::new(compiled, args)?
            }
            None => self.prepare(contract)?,
        };

        let request = VerificationRequest {
            contract: request.contract,
            address,
            constructor_args: request.encoded_args,
        };
        Ok(verify_contract(&self.verifier, &request).await)
    }

    async fn bumped_gas_price(&self) -> anyhow::Result<U256> {
        let observed = self
            .chain
            .gas_price()
            .await
            .context("Failed to query the gas price")?;
        let bumped = inflate_gas_price(observed);
        tracing::debug!(
            observed_gwei = %format_gwei(observed),
            bumped_gwei = %format_gwei(bumped),
            "Gas price bumped"
        );
        Ok(bumped)
    }

    async fn wait_for_receipt(&self, hash: B256) -> anyhow::Result<TransactionReceipt> {
        let timeout = self.settings.receipt_timeout();
        wait_for(
            "deployment receipt",
            timeout,
            self.settings.poll_interval(),
            || self.chain.transaction_receipt(hash),
        )
        .await
        .with_context(|| {
            format!("Transaction {} was not mined in time; it may still be mined later", hash)
        })
    }

    /// Returns the number of confirmations observed, if the policy counts them.
    async fn wait_until_available(
        &self,
        address: Address,
        mined_block: u64,
    ) -> Result<Option<u64>, DeployError> {
        match self.settings.availability {
            AvailabilityPolicy::Confirmations { confirmations } => {
                self.wait_for_confirmations(address, mined_block, confirmations)
                    .await
                    .map(Some)
            }
            AvailabilityPolicy::CodePolling { retry } => {
                self.poll_code(address, &retry).await.map(|_| None)
            }
        }
    }

    async fn wait_for_confirmations(
        &self,
        address: Address,
        mined_block: u64,
        required: u64,
    ) -> Result<u64, DeployError> {
        tracing::info!(required, "Waiting for confirmations");

        let mut polls = 0u32;
        let result = wait_for(
            "confirmations",
            self.settings.confirmations_timeout(),
            self.settings.poll_interval(),
            || {
                polls += 1;
                async move {
                    let head = self.chain.block_number().await?;
                    let confirmations = confirmations_at(head, mined_block);
                    tracing::trace!(head, confirmations, "Polled head block");
                    Ok::<_, anyhow::Error>((confirmations >= required).then_some(confirmations))
                }
            },
        )
        .await;

        match result {
            Ok(confirmations) => {
                tracing::info!(confirmations, "Deployment confirmed");
                Ok(confirmations)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Confirmations not reached");
                Err(DeployError::AvailabilityTimeout {
                    address: address.to_string(),
                    attempts: polls,
                })
            }
        }
    }

    async fn poll_code(&self, address: Address, retry: &RetryPolicy) -> Result<u32, DeployError> {
        tracing::info!(max_attempts = retry.max_attempts, "Waiting for contract code");

        let result = poll_until(retry, |attempt| async move {
            let code = self.chain.code_at(address).await?;
            tracing::debug!(attempt, code_len = code.len(), "Polled contract code");
            Ok::<_, anyhow::Error>((!code.is_empty()).then_some(()))
        })
        .await;

        match result {
            Ok(((), attempts)) => {
                tracing::info!(attempts, "Contract code available");
                Ok(attempts)
            }
            Err(RetryExhausted {
                attempts,
                last_error,
            }) => {
                if let Some(e) = last_error {
                    tracing::warn!(error = %e, "Last code poll failed");
                }
                Err(DeployError::AvailabilityTimeout {
                    address: address.to_string(),
                    attempts,
                })
            }
        }
    }
}

/// Confirmations of a transaction mined in `mined_block` when the head is `head`.
/// The mining block counts as the first confirmation.
fn confirmations_at(head: u64, mined_block: u64) -> u64 {
    if head < mined_block {
        0
    } else {
        head - mined_block + 1
    }
}
