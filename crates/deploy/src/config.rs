//! Project configuration, secrets, and network profile resolution.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use alloy_core::primitives::U256;
use alloy_signer_local::PrivateKeySigner;
use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized, Toml},
    value::{Dict, Value},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    error::DeployError, gas::GasPricePolicy, networks::builtin_networks, retry::RetryPolicy,
    tx::TransactionType,
};

/// The default name for the project configuration file.
pub const CONFIG_FILENAME: &str = "Shipyard.toml";

/// The default name for the secrets file.
pub const SECRETS_FILENAME: &str = "secrets.toml";

/// Prefix of environment variables overriding the configuration.
pub const ENV_PREFIX: &str = "SHIPYARD_";

/// Prefix of environment variables providing secrets.
pub const SECRET_ENV_PREFIX: &str = "SHIPYARD_SECRET_";

/// Static description of a network, as found in the registry.
///
/// Credentials are never stored here, only the names of the secrets holding them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Literal RPC endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    /// Name of the secret holding the RPC endpoint, for endpoints embedding an API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url_secret: Option<String>,
    pub chain_id: u64,
    /// Gas price used by the `configured` gas price policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price_wei: Option<u64>,
    /// Gas limit of deployment transactions. Estimated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    /// Name of the secret holding the deployer private key.
    pub signer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<Url>,
    /// Etherscan-compatible verification API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_api_url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_api_key_secret: Option<String>,
}

/// When a freshly deployed contract is considered usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum AvailabilityPolicy {
    /// Wait for `confirmations` blocks, the mining block included.
    Confirmations { confirmations: u64 },
    /// Poll `eth_getCode` at the deployed address until it is non-empty.
    CodePolling { retry: RetryPolicy },
}

impl Default for AvailabilityPolicy {
    fn default() -> Self {
        Self::Confirmations { confirmations: 5 }
    }
}

/// Knobs of the deploy-and-verify flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploySettings {
    pub availability: AvailabilityPolicy,
    pub gas_price_policy: GasPricePolicy,
    pub transaction_type: TransactionType,
    /// Interval between two receipt or block number polls.
    pub poll_interval_ms: u64,
    /// Maximum time to wait for the deployment transaction to be mined.
    pub receipt_timeout_secs: u64,
    /// Maximum time to wait for the required confirmations once mined.
    pub confirmations_timeout_secs: u64,
    /// Retries of the verification submission while the explorer has not indexed the code yet.
    pub verification_retry: RetryPolicy,
    /// Polling of the verification status once submitted.
    pub verification_status: RetryPolicy,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            availability: AvailabilityPolicy::default(),
            gas_price_policy: GasPricePolicy::default(),
            transaction_type: TransactionType::default(),
            poll_interval_ms: 2_000,
            receipt_timeout_secs: 600,
            confirmations_timeout_secs: 600,
            verification_retry: RetryPolicy::constant(5, Duration::from_secs(5)),
            verification_status: RetryPolicy::constant(10, Duration::from_secs(3)),
        }
    }
}

impl DeploySettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn confirmations_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmations_timeout_secs)
    }
}

/// Project configuration.
///
/// Layered as: built-in defaults, then `Shipyard.toml`, then `SHIPYARD_*` environment
/// variables (nested keys separated by `__`). Network names in environment keys
/// match known networks ignoring case, so `SHIPYARD_NETWORKS__POLYGONMUMBAI__GAS_LIMIT`
/// overrides `polygonMumbai`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipyardConfig {
    /// Root of the compiled contract artifacts.
    pub artifacts_dir: PathBuf,
    /// Directory holding the `<Contract>-args.json` constructor argument files.
    pub args_dir: PathBuf,
    pub deploy: DeploySettings,
    pub networks: BTreeMap<String, NetworkConfig>,
}

impl Default for ShipyardConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("artifacts"),
            args_dir: PathBuf::from("deploy-args"),
            deploy: DeploySettings::default(),
            networks: builtin_networks(),
        }
    }
}

impl ShipyardConfig {
    /// Load the configuration.
    ///
    /// An explicit `path` must exist; the default `Shipyard.toml` is optional.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Configuration file not found: {}", path.display());
                }
                path.to_path_buf()
            }
            None => PathBuf::from(CONFIG_FILENAME),
        };

        let figment = Figment::from(Serialized::defaults(Self::default())).merge(Toml::file(&file));
        let networks: Vec<String> = figment
            .extract_inner::<Dict>("networks")
            .with_context(|| format!("Failed to load configuration from {}", file.display()))?
            .into_keys()
            .collect();

        let env = Env::prefixed(ENV_PREFIX)
            .split("__")
            .lowercase(false)
            .map(move |key| env_key(key.as_str(), &networks).into());

        let config: Self = figment
            .merge(env)
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", file.display()))?;

        tracing::debug!(path = %file.display(), networks = config.networks.len(), "Configuration loaded");
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Resolve a network name into a usable profile for deployments.
    ///
    /// Fails with a configuration error, before any network call, when the
    /// network is unknown or one of its secrets is missing or malformed.
    pub fn resolve_network(
        &self,
        name: &str,
        secrets: &Secrets,
    ) -> Result<NetworkProfile, DeployError> {
        let profile = self.resolve(name, secrets)?;
        if profile.signer.is_none() {
            let secret = &self.network(name)?.1.signer;
            return Err(DeployError::Config(format!(
                "Private key not provided for network '{}'. Set '{}' in the secrets file or {}{}",
                profile.name,
                secret,
                SECRET_ENV_PREFIX,
                secret.to_uppercase()
            )));
        }
        Ok(profile)
    }

    /// Like [`Self::resolve_network`], but a missing private key is not an
    /// error. Verification needs no signing credential.
    pub fn resolve_network_for_verification(
        &self,
        name: &str,
        secrets: &Secrets,
    ) -> Result<NetworkProfile, DeployError> {
        self.resolve(name, secrets)
    }

    /// Look a network up by name, ignoring case when there is no exact match.
    fn network(&self, name: &str) -> Result<(&str, &NetworkConfig), DeployError> {
        self.networks
            .get_key_value(name)
            .or_else(|| {
                self.networks
                    .iter()
                    .find(|(known, _)| known.eq_ignore_ascii_case(name))
            })
            .map(|(known, network)| (known.as_str(), network))
            .ok_or_else(|| {
                DeployError::Config(format!(
                    "Unknown network '{}'. Known networks: {}",
                    name,
                    self.networks.keys().cloned().collect::<Vec<_>>().join(", ")
                ))
            })
    }

    fn resolve(&self, name: &str, secrets: &Secrets) -> Result<NetworkProfile, DeployError> {
        let (name, network) = self.network(name)?;

        let rpc_url = match (&network.rpc_url, &network.rpc_url_secret) {
            (Some(url), _) => url.clone(),
            (None, Some(secret)) => secrets.require(secret)?.to_string(),
            (None, None) => {
                return Err(DeployError::Config(format!(
                    "Network '{}' has neither rpc_url nor rpc_url_secret",
                    name
                )));
            }
        };
        let rpc_url = Url::parse(&rpc_url).map_err(|e| {
            DeployError::Config(format!("Invalid RPC URL for network '{}': {}", name, e))
        })?;

        let signer = secrets
            .get(&network.signer)
            .map(|key| {
                PrivateKeySigner::from_str(key.trim()).map_err(|e| {
                    DeployError::Config(format!(
                        "Invalid private key in secret '{}': {}",
                        network.signer, e
                    ))
                })
            })
            .transpose()?;

        let verifier = network.verify_api_url.clone().map(|api_url| VerifierEndpoint {
            api_url,
            api_key: network
                .verify_api_key_secret
                .as_deref()
                .and_then(|s| secrets.get(s))
                .map(String::from),
            chain_id: network.chain_id,
        });

        Ok(NetworkProfile {
            name: name.to_string(),
            rpc_url,
            chain_id: network.chain_id,
            gas_price_wei: network.gas_price_wei.map(U256::from),
            gas_limit: network.gas_limit,
            signer,
            explorer_url: network.explorer_url.clone(),
            verifier,
        })
    }
}

/// Flat name → value secrets store.
///
/// Names are matched ignoring case and underscores, so `privateKeyMainnet` and
/// `PRIVATE_KEY_MAINNET` designate the same secret.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Secrets(BTreeMap<String, String>);

impl Secrets {
    /// Load secrets from a file (`.json` or TOML) and `SHIPYARD_SECRET_*` variables.
    ///
    /// An explicit `path` must exist; the default `secrets.toml` is optional.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Secrets file not found: {}", path.display());
                }
                path.to_path_buf()
            }
            None => PathBuf::from(SECRETS_FILENAME),
        };

        let figment = if file.extension().is_some_and(|ext| ext == "json") {
            Figment::from(Json::file(&file))
        } else {
            Figment::from(Toml::file(&file))
        };

        let mut values: BTreeMap<String, String> = figment
            .extract::<Dict>()
            .with_context(|| format!("Failed to load secrets from {}", file.display()))?
            .into_iter()
            .filter_map(|(name, value)| match scalar_text(&value) {
                Some(text) => Some((name, text)),
                None => {
                    tracing::warn!(%name, "Ignoring secret that is not a scalar value");
                    None
                }
            })
            .collect();

        // Environment values are taken verbatim, never parsed as numbers or booleans.
        values.extend(
            Env::prefixed(SECRET_ENV_PREFIX)
                .iter()
                .map(|(name, value)| (name.as_str().to_string(), value)),
        );

        tracing::debug!(count = values.len(), "Secrets loaded");
        Ok(Self::from_iter(values))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(&normalize_secret_name(name))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn require(&self, name: &str) -> Result<&str, DeployError> {
        self.get(name)
            .ok_or_else(|| DeployError::Config(format!("Missing secret '{}'", name)))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Secrets {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (normalize_secret_name(k.as_ref()), v.into()))
                .collect(),
        )
    }
}

/// Text of a scalar secret value. A number keeps its own digits.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(_, s) => Some(s.clone()),
        Value::Char(_, c) => Some(c.to_string()),
        Value::Bool(_, b) => Some(b.to_string()),
        Value::Num(_, n) => n
            .to_u128()
            .map(|v| v.to_string())
            .or_else(|| n.to_i128().map(|v| v.to_string()))
            .or_else(|| n.to_f64().map(|v| v.to_string())),
        Value::Empty(..) | Value::Dict(..) | Value::Array(..) => None,
    }
}

/// Lowercase an environment key path, restoring the spelling of a known
/// network name in `networks.<name>`.
fn env_key(key: &str, networks: &[String]) -> String {
    let key = key.to_ascii_lowercase();
    let mut parts: Vec<&str> = key.split('.').collect();
    if parts.len() > 1 && parts[0] == "networks" {
        if let Some(known) = networks.iter().find(|n| n.eq_ignore_ascii_case(parts[1])) {
            parts[1] = known.as_str();
        }
    }
    parts.join(".")
}

fn normalize_secret_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Etherscan-compatible verification endpoint of a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierEndpoint {
    pub api_url: Url,
    pub api_key: Option<String>,
    /// Sent as `chainid`, which multichain APIs use to route the request.
    pub chain_id: u64,
}

/// A fully resolved network: endpoint, credentials and gas parameters.
///
/// Built once at process start and never mutated.
#[derive(Debug, Clone)]
pub struct NetworkProfile {
    pub name: String,
    pub rpc_url: Url,
    pub chain_id: u64,
    pub gas_price_wei: Option<U256>,
    pub gas_limit: Option<u64>,
    /// Deployer key. Always present in profiles resolved for deployments.
    pub signer: Option<PrivateKeySigner>,
    pub explorer_url: Option<Url>,
    pub verifier: Option<VerifierEndpoint>,
}

impl NetworkProfile {
    /// Explorer page of an address, e.g. `https://sepolia.etherscan.io/address/0x…`.
    pub fn explorer_address_url(&self, address: &impl std::fmt::Display) -> Option<String> {
        self.explorer_url.as_ref().map(|base| {
            format!(
                "{}/address/{}",
                base.as_str().trim_end_matches('/'),
                address
            )
        })
    }
}
