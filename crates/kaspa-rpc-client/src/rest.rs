//! REST gateway client
//!
//! Talks to a Kaspa REST gateway (`api.kaspa.org` and compatible). The
//! gateway's JSON differs from the crate's own transaction JSON, so wire
//! types are kept private here and converted at the edge.

use std::time::Duration;

use async_trait::async_trait;
use kaspa_tx::serde_helpers::u64_string;
use kaspa_tx::{Outpoint, Script, ScriptPublicKey, Transaction, UtxoEntry};
use kiwi_core::{Address, NodeConfig, NodeError, Sompi, TxId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{FeeEstimate, KaspaRpc, Result, ServerInfo};

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUtxo {
    #[serde(default)]
    address: Option<String>,
    outpoint: WireOutpoint,
    utxo_entry: WireUtxoEntry,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOutpoint {
    transaction_id: String,
    index: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUtxoEntry {
    #[serde(with = "u64_string")]
    amount: Sompi,
    script_public_key: WireScriptPublicKey,
    #[serde(with = "u64_string")]
    block_daa_score: u64,
    #[serde(default)]
    is_coinbase: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireScriptPublicKey {
    #[serde(default)]
    version: u16,
    script_public_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireInput {
    previous_outpoint: WireOutpoint,
    signature_script: String,
    sequence: u64,
    sig_op_count: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireOutput {
    amount: Sompi,
    script_public_key: WireScriptPublicKey,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTransaction {
    version: u16,
    inputs: Vec<WireInput>,
    outputs: Vec<WireOutput>,
    lock_time: u64,
    subnetwork_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    transaction: WireTransaction,
    allow_orphan: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    #[serde(with = "u64_string")]
    balance: Sompi,
}

impl WireUtxo {
    fn into_entry(self) -> Result<UtxoEntry> {
        let script = Script::from_hex(&self.utxo_entry.script_public_key.script_public_key)
            .map_err(|e| NodeError::ParseError(e.to_string()))?;
        Ok(UtxoEntry {
            address: self.address.map(Address::new),
            outpoint: Outpoint::new(TxId::new(self.outpoint.transaction_id), self.outpoint.index),
            amount: self.utxo_entry.amount,
            script_public_key: ScriptPublicKey::new(
                self.utxo_entry.script_public_key.version,
                script,
            ),
            block_daa_score: self.utxo_entry.block_daa_score,
            is_coinbase: self.utxo_entry.is_coinbase,
        })
    }
}

fn wire_transaction(tx: &Transaction) -> WireTransaction {
    WireTransaction {
        version: tx.version,
        inputs: tx
            .inputs
            .iter()
            .map(|i| WireInput {
                previous_outpoint: WireOutpoint {
                    transaction_id: i.previous_outpoint.transaction_id.to_string(),
                    index: i.previous_outpoint.index,
                },
                signature_script: hex::encode(&i.signature_script),
                sequence: i.sequence,
                sig_op_count: i.sig_op_count,
            })
            .collect(),
        outputs: tx
            .outputs
            .iter()
            .map(|o| WireOutput {
                amount: o.value,
                script_public_key: WireScriptPublicKey {
                    version: o.script_public_key.version(),
                    script_public_key: o.script_public_key.script().to_hex(),
                },
            })
            .collect(),
        lock_time: tx.lock_time,
        subnetwork_id: hex::encode(&tx.subnetwork_id),
    }
}

// =============================================================================
// Client
// =============================================================================

/// `KaspaRpc` over a REST gateway
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl RestClient {
    pub fn new(config: &NodeConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder()
            .user_agent("kiwi")
            .timeout(timeout)
            .build()
            .map_err(|e| NodeError::Unreachable {
                url: format!("{}: {}", config.url, e),
            })?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn timed<T>(
        &self,
        fut: impl std::future::Future<Output = std::result::Result<T, reqwest::Error>>,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| NodeError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| {
                if e.is_connect() {
                    NodeError::Unreachable {
                        url: self.base_url.clone(),
                    }
                } else {
                    NodeError::ApiError {
                        message: e.to_string(),
                    }
                }
            })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!("GET {}", url);
        let response = self.timed(self.http.get(&url).send()).await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(NodeError::NotFound { what: path.to_string() });
        }
        if !status.is_success() {
            let body = self.timed(response.text()).await.unwrap_or_default();
            return Err(NodeError::ApiError {
                message: format!("{} returned {}: {}", path, status, body),
            });
        }
        let body = self.timed(response.text()).await?;
        serde_json::from_str(&body)
            .map_err(|e| NodeError::ParseError(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl KaspaRpc for RestClient {
    async fn get_utxos_by_addresses(&self, addresses: &[Address]) -> Result<Vec<UtxoEntry>> {
        let mut entries = Vec::new();
        for address in addresses {
            let utxos: Vec<WireUtxo> = self
                .get_json(&format!("/addresses/{}/utxos", address))
                .await?;
            for utxo in utxos {
                let mut entry = utxo.into_entry()?;
                entry.address.get_or_insert_with(|| address.clone());
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    async fn submit_transaction(&self, tx: &Transaction) -> Result<TxId> {
        let request = SubmitRequest {
            transaction: wire_transaction(tx),
            allow_orphan: false,
        };
        let url = self.url("/transactions");
        debug!("POST {}", url);
        let response = self
            .timed(self.http.post(&url).json(&request).send())
            .await?;
        let status = response.status();
        let body = self.timed(response.text()).await?;
        if !status.is_success() {
            return Err(NodeError::SubmissionRejected {
                message: format!("{}: {}", status, body),
            });
        }
        let parsed: SubmitResponse =
            serde_json::from_str(&body).map_err(|e| NodeError::ParseError(e.to_string()))?;
        match (parsed.transaction_id, parsed.error) {
            (_, Some(message)) => Err(NodeError::SubmissionRejected { message }),
            (Some(id), None) => Ok(TxId::new(id)),
            (None, None) => Err(NodeError::ParseError(
                "submission response has neither id nor error".to_string(),
            )),
        }
    }

    async fn get_balance_by_address(&self, address: &Address) -> Result<Sompi> {
        let response: BalanceResponse = self
            .get_json(&format!("/addresses/{}/balance", address))
            .await?;
        Ok(response.balance)
    }

    async fn get_fee_estimate(&self) -> Result<FeeEstimate> {
        self.get_json("/info/fee-estimate").await
    }

    async fn get_server_info(&self) -> Result<ServerInfo> {
        self.get_json("/info/kaspad").await
    }
}
