//! Ethereum JSON-RPC plumbing and the [`ChainClient`] seam used by the orchestrator.

use std::{future::Future, time::Duration};

use alloy_core::primitives::{Address, B256, Bytes, U64, U256};
use anyhow::Context;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result, or an error if the request failed or returned an error response.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "RPC error: {}",
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Wait until `check_fn` yields a value, polling at a fixed interval.
///
/// # Arguments
/// * `name` - What is being waited for (for error messages)
/// * `timeout` - Maximum time to wait
/// * `interval` - Delay between two checks
/// * `check_fn` - Returns `Ok(Some(_))` once the condition holds
///
/// # Returns
/// The value produced by `check_fn`, or an error after timeout.
pub async fn wait_for<T, F, Fut>(
    name: &str,
    timeout: Duration,
    interval: Duration,
    mut check_fn: F,
) -> Result<T, anyhow::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, anyhow::Error>>,
{
    let start = std::time::Instant::now();

    loop {
        match check_fn().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {
                tracing::trace!(target = %name, "Condition not met yet, retrying...");
            }
            Err(e) => {
                tracing::debug!(error = %e, target = %name, "Check failed, retrying...");
            }
        }

        if start.elapsed() >= timeout {
            anyhow::bail!("Timeout waiting for {} after {}s", name, timeout.as_secs());
        }

        tokio::time::sleep(interval).await;
    }
}

/// The subset of a transaction receipt the orchestrator cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: U64,
    #[serde(default)]
    pub contract_address: Option<Address>,
    /// `1` for success, `0` for a reverted transaction. Absent before Byzantium.
    #[serde(default)]
    pub status: Option<U64>,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        self.status.is_none_or(|s| s == U64::from(1))
    }

    pub fn block(&self) -> u64 {
        self.block_number.to::<u64>()
    }
}

/// A call used for gas estimation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub from: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    pub data: Bytes,
}

/// Transaction-submission capability of a network.
///
/// Every suspension point of a deployment goes through this trait, so the
/// orchestrator can be driven by an in-memory chain in tests.
pub trait ChainClient: Send + Sync {
    /// `eth_chainId`.
    fn chain_id(&self) -> impl Future<Output = anyhow::Result<u64>> + Send;

    /// `eth_gasPrice`, in wei.
    fn gas_price(&self) -> impl Future<Output = anyhow::Result<U256>> + Send;

    /// `eth_getTransactionCount` at the pending block.
    fn transaction_count(&self, address: Address)
    -> impl Future<Output = anyhow::Result<u64>> + Send;

    /// `eth_estimateGas`.
    fn estimate_gas(&self, call: &CallRequest) -> impl Future<Output = anyhow::Result<u64>> + Send;

    /// `eth_sendRawTransaction`, returning the transaction hash.
    fn send_raw_transaction(&self, raw: Bytes)
    -> impl Future<Output = anyhow::Result<B256>> + Send;

    /// `eth_getTransactionReceipt`; `None` while the transaction is pending.
    fn transaction_receipt(
        &self,
        hash: B256,
    ) -> impl Future<Output = anyhow::Result<Option<TransactionReceipt>>> + Send;

    /// `eth_blockNumber`.
    fn block_number(&self) -> impl Future<Output = anyhow::Result<u64>> + Send;

    /// `eth_getCode` at the latest block.
    fn code_at(&self, address: Address) -> impl Future<Output = anyhow::Result<Bytes>> + Send;
}

/// [`ChainClient`] backed by an HTTP JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct JsonRpcChain {
    client: reqwest::Client,
    url: Url,
}

impl JsonRpcChain {
    pub fn new(url: Url) -> anyhow::Result<Self> {
        Ok(Self {
            client: create_client()?,
            url,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> anyhow::Result<T> {
        json_rpc_call(&self.client, self.url.as_str(), method, params).await
    }
}

impl ChainClient for JsonRpcChain {
    async fn chain_id(&self) -> anyhow::Result<u64> {
        let id: U64 = self.call("eth_chainId", vec![]).await?;
        Ok(id.to::<u64>())
    }

    async fn gas_price(&self) -> anyhow::Result<U256> {
        self.call("eth_gasPrice", vec![]).await
    }

    async fn transaction_count(&self, address: Address) -> anyhow::Result<u64> {
        let count: U64 = self
            .call(
                "eth_getTransactionCount",
                vec![serde_json::json!(address), serde_json::json!("pending")],
            )
            .await?;
        Ok(count.to::<u64>())
    }

    async fn estimate_gas(&self, call: &CallRequest) -> anyhow::Result<u64> {
        let gas: U64 = self
            .call("eth_estimateGas", vec![serde_json::to_value(call)?])
            .await?;
        Ok(gas.to::<u64>())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> anyhow::Result<B256> {
        self.call("eth_sendRawTransaction", vec![serde_json::json!(raw)])
            .await
    }

    async fn transaction_receipt(&self, hash: B256) -> anyhow::Result<Option<TransactionReceipt>> {
        self.call("eth_getTransactionReceipt", vec![serde_json::json!(hash)])
            .await
    }

    async fn block_number(&self) -> anyhow::Result<u64> {
        let number: U64 = self.call("eth_blockNumber", vec![]).await?;
        Ok(number.to::<u64>())
    }

    async fn code_at(&self, address: Address) -> anyhow::Result<Bytes> {
        self.call(
            "eth_getCode",
            vec![serde_json::json!(address), serde_json::json!("latest")],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_deserialize() {
        let receipt: TransactionReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "blockNumber": "0x1b4",
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "status": "0x1",
            "gasUsed": "0x5208"
        }))
        .unwrap();

        assert_eq!(receipt.block(), 436);
        assert!(receipt.succeeded());
        assert_eq!(
            receipt.contract_address,
            Some("0x5FbDB2315678afecb367f032d93F642f64180aa3".parse().unwrap())
        );
    }

    #[test]
    fn test_receipt_reverted() {
        let receipt: TransactionReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "blockNumber": "0x10",
            "contractAddress": null,
            "status": "0x0"
        }))
        .unwrap();

        assert!(!receipt.succeeded());
        assert!(receipt.contract_address.is_none());
    }

    #[test]
    fn test_call_request_serialize() {
        let call = CallRequest {
            from: Address::ZERO,
            to: None,
            data: Bytes::from_static(&[0x60, 0x80]),
        };
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "from": "0x0000000000000000000000000000000000000000",
                "data": "0x6080"
            })
        );
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let err = wait_for("never", Duration::ZERO, Duration::ZERO, || async {
            Ok::<Option<()>, anyhow::Error>(None)
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Timeout waiting for never"));
    }

    #[tokio::test]
    async fn test_wait_for_returns_value() {
        let mut calls = 0;
        let value = wait_for("counter", Duration::from_secs(5), Duration::ZERO, || {
            calls += 1;
            let current = calls;
            async move { Ok::<_, anyhow::Error>((current >= 2).then_some(current)) }
        })
        .await
        .unwrap();
        assert_eq!(value, 2);
    }
}
