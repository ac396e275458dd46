//! Signing of contract-creation transactions.

use alloy_consensus::{SignableTransaction, Signed, TxEip1559, TxEnvelope, TxLegacy};
use alloy_core::primitives::{Address, Bytes, Signature, TxKind, U256};
use alloy_network::{TxSignerSync, eip2718::Encodable2718};
use alloy_signer_local::PrivateKeySigner;
use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Envelope of the deployment transaction.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TransactionType {
    /// Pre-London transaction with EIP-155 replay protection.
    #[default]
    Legacy,
    /// Dynamic-fee transaction. Both fee caps are set to the chosen gas price,
    /// so it is priced exactly like a legacy one.
    Eip1559,
}

/// A contract creation, before signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationTransaction {
    pub tx_type: TransactionType,
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub init_code: Bytes,
}

impl CreationTransaction {
    /// Sign and return the EIP-2718 encoding for `eth_sendRawTransaction`.
    pub fn sign(&self, signer: &PrivateKeySigner) -> anyhow::Result<Bytes> {
        let gas_price = u128::try_from(self.gas_price)
            .map_err(|_| anyhow::anyhow!("Gas price {} does not fit in 128 bits", self.gas_price))?;

        match self.tx_type {
            TransactionType::Legacy => sign_envelope(
                TxLegacy {
                    chain_id: Some(self.chain_id),
                    nonce: self.nonce,
                    gas_price,
                    gas_limit: self.gas_limit,
                    to: TxKind::Create,
                    value: U256::ZERO,
                    input: self.init_code.clone(),
                },
                signer,
            ),
            TransactionType::Eip1559 => sign_envelope(
                TxEip1559 {
                    chain_id: self.chain_id,
                    nonce: self.nonce,
                    gas_limit: self.gas_limit,
                    max_fee_per_gas: gas_price,
                    max_priority_fee_per_gas: gas_price,
                    to: TxKind::Create,
                    input: self.init_code.clone(),
                    ..Default::default()
                },
                signer,
            ),
        }
    }
}

fn sign_envelope<T>(mut tx: T, signer: &PrivateKeySigner) -> anyhow::Result<Bytes>
where
    T: SignableTransaction<Signature>,
    TxEnvelope: From<Signed<T>>,
{
    let signature = signer
        .sign_transaction_sync(&mut tx)
        .context("Failed to sign deployment transaction")?;
    let envelope = TxEnvelope::from(tx.into_signed(signature));
    Ok(envelope.encoded_2718().into())
}

/// The address a contract created by `sender` at `nonce` ends up at.
pub fn create_address(sender: Address, nonce: u64) -> Address {
    sender.create(nonce)
}
