//! Submission helpers

use kaspa_tx::{PendingTransaction, Transaction};
use kiwi_core::{Error, Result, TxError, TxId};
use tracing::{info, warn};

use crate::KaspaRpc;

/// Submit one fully signed transaction
pub async fn submit_signed(rpc: &dyn KaspaRpc, tx: &Transaction) -> Result<TxId> {
    if let Some(index) = tx.inputs.iter().position(|i| !i.is_signed()) {
        return Err(TxError::MissingSigner { index }.into());
    }
    let expected = tx.id();
    let id = rpc.submit_transaction(tx).await?;
    if id != expected {
        warn!("node reported id {} for transaction {}", id, expected);
    }
    info!(inputs = tx.inputs.len(), outputs = tx.outputs.len(), "submitted {}", id);
    Ok(id)
}

/// Submit a pending chain in order; returns the final transaction's id.
///
/// Transactions accepted by an earlier call are skipped. If the chain stops
/// after some were accepted, the error is `Error::ChainInterrupted`.
pub async fn submit_pending(rpc: &dyn KaspaRpc, pending: &mut PendingTransaction) -> Result<TxId> {
    if pending.is_submitted() {
        return Err(TxError::AlreadySubmitted.into());
    }
    if !pending.accepted().is_empty() {
        info!(accepted = pending.accepted().len(), "resuming transaction chain");
    }
    let mut last = pending.id();
    while let Some(tx) = pending.unsubmitted().first() {
        match submit_signed(rpc, tx).await {
            Ok(id) => {
                last = id.clone();
                pending.record_accepted(id);
            }
            Err(source) if pending.accepted().is_empty() => return Err(source),
            Err(source) => {
                warn!(accepted = pending.accepted().len(), "transaction chain stopped: {}", source);
                return Err(Error::ChainInterrupted {
                    accepted: pending.accepted().to_vec(),
                    source: Box::new(source),
                });
            }
        }
    }
    Ok(last)
}
