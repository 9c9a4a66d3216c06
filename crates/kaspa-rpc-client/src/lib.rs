//! kaspa-rpc-client: ledger RPC for Kiwi
//!
//! `KaspaRpc` is the seam everything above talks to: fetch UTXOs, submit
//! transactions, a few informational queries. `RestClient` implements it
//! against a Kaspa REST gateway. Address change notifications are pulled
//! (`UtxoSubscription`) rather than pushed, so nothing runs in the
//! background.

pub mod rest;
pub mod submit;
pub mod subscription;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

use async_trait::async_trait;
use kaspa_tx::{Transaction, UtxoEntry};
use kiwi_core::{Address, NodeError, Sompi, TxId};
use serde::{Deserialize, Serialize};

pub use rest::RestClient;
pub use submit::{submit_pending, submit_signed};
pub use subscription::{await_entry, subscribe_utxos_changed, UtxoSubscription, UtxosChangedEvent};

/// Result type for RPC operations
pub type Result<T> = std::result::Result<T, NodeError>;

/// One fee-rate bucket of a fee estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBucket {
    /// Sompi per gram of mass
    pub feerate: f64,
    pub estimated_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeEstimate {
    pub priority_bucket: FeeBucket,
    #[serde(default)]
    pub normal_buckets: Vec<FeeBucket>,
    #[serde(default)]
    pub low_buckets: Vec<FeeBucket>,
}

impl FeeEstimate {
    /// Priority fee rate rounded up to whole sompi per gram
    pub fn priority_fee_rate(&self) -> Sompi {
        self.priority_bucket.feerate.max(0.0).ceil() as Sompi
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub server_version: String,
    #[serde(default)]
    pub is_utxo_indexed: bool,
    #[serde(default)]
    pub is_synced: bool,
    #[serde(default, with = "kaspa_tx::serde_helpers::u64_string")]
    pub mempool_size: u64,
}

/// Ledger RPC consumed by the transaction and protocol layers
#[async_trait]
pub trait KaspaRpc: Send + Sync {
    async fn get_utxos_by_addresses(&self, addresses: &[Address]) -> Result<Vec<UtxoEntry>>;

    /// Broadcast a signed transaction; returns the id the node accepted
    async fn submit_transaction(&self, tx: &Transaction) -> Result<TxId>;

    async fn get_balance_by_address(&self, address: &Address) -> Result<Sompi> {
        let entries = self.get_utxos_by_addresses(std::slice::from_ref(address)).await?;
        Ok(entries.iter().map(|e| e.amount).sum())
    }

    async fn get_fee_estimate(&self) -> Result<FeeEstimate>;

    async fn get_server_info(&self) -> Result<ServerInfo>;
}
