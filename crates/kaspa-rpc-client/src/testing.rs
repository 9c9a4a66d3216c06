//! In-memory ledger for tests
//!
//! `MockLedger` implements `KaspaRpc` over a UTXO set held in memory.
//! Submitted transactions are checked (inputs exist, every input is
//! unlocked, P2SH unlocks reveal the committed script, outputs do not
//! exceed inputs) and applied immediately. Every RPC method call is
//! counted so tests can assert that nothing reached the network.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use kaspa_tx::address::{address_from_script_public_key, pay_to_address_script};
use kaspa_tx::hashing::blake2b_256;
use kaspa_tx::mass::MAXIMUM_STANDARD_TRANSACTION_MASS;
use kaspa_tx::script::opcodes::OP_BLAKE2B;
use kaspa_tx::script::ScriptChunk;
use kaspa_tx::testing::MockSigner;
use kaspa_tx::{pay_to_script_hash_script, Outpoint, Script, Signer, Transaction, UtxoEntry};
use kiwi_core::{Address, Network, NodeError, Sompi, TxId};

use crate::{FeeBucket, FeeEstimate, KaspaRpc, Result, ServerInfo};

#[derive(Debug, Default)]
struct LedgerState {
    utxos: Vec<UtxoEntry>,
    submitted: Vec<Transaction>,
    calls: HashMap<&'static str, usize>,
    reject: Option<String>,
    accept_before_reject: Option<usize>,
    yield_on_query: bool,
    daa_score: u64,
}

#[derive(Debug)]
pub struct MockLedger {
    network: Network,
    state: Mutex<LedgerState>,
}

fn reject(message: impl Into<String>) -> NodeError {
    NodeError::SubmissionRejected {
        message: message.into(),
    }
}

impl MockLedger {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            state: Mutex::new(LedgerState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Pay-to-pubkey address of `MockSigner::new(seed)` on this network
    pub fn test_address(&self, seed: u8) -> Address {
        MockSigner::new(seed)
            .address(self.network)
            .expect("mock keys are valid")
    }

    /// Create a confirmed entry of `amount` at `address`
    pub fn fund(&self, address: &Address, amount: Sompi) -> UtxoEntry {
        let spk = pay_to_address_script(address).expect("test addresses are valid");
        let mut state = self.state();
        state.daa_score += 1;
        let id = TxId::from_bytes(blake2b_256(&state.daa_score.to_le_bytes()));
        let entry = UtxoEntry {
            address: Some(address.clone()),
            outpoint: Outpoint::new(id, 0),
            amount,
            script_public_key: spk,
            block_daa_score: state.daa_score,
            is_coinbase: false,
        };
        state.utxos.push(entry.clone());
        entry
    }

    pub fn insert(&self, entry: UtxoEntry) {
        self.state().utxos.push(entry);
    }

    pub fn remove(&self, outpoint: &Outpoint) {
        self.state().utxos.retain(|e| &e.outpoint != outpoint);
    }

    pub fn utxos_at(&self, address: &Address) -> Vec<UtxoEntry> {
        self.state()
            .utxos
            .iter()
            .filter(|e| e.address.as_ref() == Some(address))
            .cloned()
            .collect()
    }

    pub fn balance_at(&self, address: &Address) -> Sompi {
        self.utxos_at(address).iter().map(|e| e.amount).sum()
    }

    /// Reject every submission with `message`; `None` accepts again and
    /// clears any `reject_after` budget
    pub fn reject_submissions(&self, message: Option<&str>) {
        let mut state = self.state();
        state.reject = message.map(str::to_string);
        if message.is_none() {
            state.accept_before_reject = None;
        }
    }

    /// Hand control back to the runtime after each UTXO query, so callers
    /// running concurrently observe the same snapshot
    pub fn yield_on_queries(&self, enabled: bool) {
        self.state().yield_on_query = enabled;
    }

    /// Accept `count` more submissions, then reject the rest
    pub fn reject_after(&self, count: usize) {
        self.state().accept_before_reject = Some(count);
    }

    pub fn submitted(&self) -> Vec<Transaction> {
        self.state().submitted.clone()
    }

    pub fn calls(&self, method: &str) -> usize {
        self.state().calls.get(method).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state().calls.values().sum()
    }

    fn record(&self, method: &'static str) {
        *self.state().calls.entry(method).or_insert(0) += 1;
    }

    fn apply(&self, tx: &Transaction) -> Result<TxId> {
        let mut state = self.state();
        if let Some(message) = &state.reject {
            return Err(reject(message.clone()));
        }
        if let Some(remaining) = state.accept_before_reject.as_mut() {
            if *remaining == 0 {
                return Err(reject("rejected by test"));
            }
            *remaining -= 1;
        }

        if tx.mass > MAXIMUM_STANDARD_TRANSACTION_MASS {
            return Err(reject(format!("mass {} is above the standard limit", tx.mass)));
        }

        let mut spent = Vec::with_capacity(tx.inputs.len());
        for (index, input) in tx.inputs.iter().enumerate() {
            let entry = state
                .utxos
                .iter()
                .find(|e| e.outpoint == input.previous_outpoint)
                .ok_or_else(|| reject(format!("input {} spends unknown or spent output", index)))?;
            if spent.iter().any(|s: &UtxoEntry| s.outpoint == entry.outpoint) {
                return Err(reject(format!("input {} double spends", index)));
            }
            if !input.is_signed() {
                return Err(reject(format!("input {} is not signed", index)));
            }
            if entry.script_public_key.script().as_bytes().first() == Some(&OP_BLAKE2B) {
                let chunks = Script::from_bytes(input.signature_script.clone())
                    .chunks()
                    .map_err(|e| reject(e.to_string()))?;
                let revealed = match chunks.last() {
                    Some(ScriptChunk::Push(data)) => Script::from_bytes(data.clone()),
                    _ => return Err(reject(format!("input {} has no redeem script", index))),
                };
                if pay_to_script_hash_script(&revealed) != *entry.script_public_key.script() {
                    return Err(reject(format!("input {} reveals the wrong script", index)));
                }
            }
            spent.push(entry.clone());
        }

        let input_total: Sompi = spent.iter().map(|e| e.amount).sum();
        let output_total = tx.total_output_amount();
        if output_total > input_total {
            return Err(reject(format!(
                "outputs {} exceed inputs {}",
                output_total, input_total
            )));
        }

        let id = tx.id();
        let daa_score = state.daa_score + 1;
        let created = tx
            .outputs
            .iter()
            .enumerate()
            .map(|(index, output)| {
                let address =
                    address_from_script_public_key(&output.script_public_key, self.network)
                        .map_err(|e| reject(e.to_string()))?;
                Ok(UtxoEntry {
                    address: Some(address),
                    outpoint: Outpoint::new(id.clone(), index as u32),
                    amount: output.value,
                    script_public_key: output.script_public_key.clone(),
                    block_daa_score: daa_score,
                    is_coinbase: false,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        state
            .utxos
            .retain(|e| !spent.iter().any(|s| s.outpoint == e.outpoint));
        state.utxos.extend(created);
        state.daa_score = daa_score;
        state.submitted.push(tx.clone());
        Ok(id)
    }
}

#[async_trait]
impl KaspaRpc for MockLedger {
    async fn get_utxos_by_addresses(&self, addresses: &[Address]) -> Result<Vec<UtxoEntry>> {
        self.record("get_utxos_by_addresses");
        let (entries, yield_now) = {
            let state = self.state();
            let entries: Vec<UtxoEntry> = state
                .utxos
                .iter()
                .filter(|e| e.address.as_ref().is_some_and(|a| addresses.contains(a)))
                .cloned()
                .collect();
            (entries, state.yield_on_query)
        };
        if yield_now {
            tokio::task::yield_now().await;
        }
        Ok(entries)
    }

    async fn submit_transaction(&self, tx: &Transaction) -> Result<TxId> {
        self.record("submit_transaction");
        self.apply(tx)
    }

    async fn get_balance_by_address(&self, address: &Address) -> Result<Sompi> {
        self.record("get_balance_by_address");
        Ok(self.balance_at(address))
    }

    async fn get_fee_estimate(&self) -> Result<FeeEstimate> {
        self.record("get_fee_estimate");
        Ok(FeeEstimate {
            priority_bucket: FeeBucket {
                feerate: 1.0,
                estimated_seconds: 1.0,
            },
            normal_buckets: Vec::new(),
            low_buckets: Vec::new(),
        })
    }

    async fn get_server_info(&self) -> Result<ServerInfo> {
        self.record("get_server_info");
        Ok(ServerInfo {
            server_version: "mock".to_string(),
            is_utxo_indexed: true,
            is_synced: true,
            mempool_size: 0,
        })
    }
}
