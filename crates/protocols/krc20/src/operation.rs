//! Commit/reveal orchestration
//!
//! Every operation runs the same two phases:
//!
//! 1. Commit: pay `commit_amount` from the owner to the P2SH address of the
//!    operation's metadata script.
//! 2. Reveal: spend that output with `<signature> <script>`, paying the
//!    operation's priority fee. Change goes back to the owner. A List
//!    reveal also parks `list_utxo_amount` at the matching Send escrow.
//!
//! Nothing is rolled back once the commit is out. A failed reveal returns
//! `Error::RevealFailed` carrying the commit id, and `execute_reveal` can
//! be retried against it.

use kaspa_rpc_client::submit_pending;
use kaspa_tx::address::{script_hash_address, script_hash_script_public_key};
use kaspa_tx::mass::script_unlock_size;
use kaspa_tx::{
    lock_time_script, metadata_script, Outpoint, PaymentOutput, Script, ScriptPublicKey, Signer,
    TransactionBuilder, UtxoEntry,
};
use kiwi_core::{
    Address, Error, FeeSchedule, Network, NodeError, ProtocolError, Result, Sompi, TxId,
};
use tracing::{debug, info};

use crate::context::Context;
use crate::kas::pay_from_owner;
use crate::payload::{Krc20Payload, Operation, MARKER};

/// Metadata script of one operation and its escrow address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationScript {
    script: Script,
    address: Address,
}

impl OperationScript {
    pub fn new(owner_key: &[u8], payload: &Krc20Payload, network: Network) -> Result<Self> {
        let content = payload.to_json()?;
        let script = metadata_script(owner_key, MARKER, content.as_bytes())?;
        Ok(Self::from_script(script, network))
    }

    /// Escrow that only becomes spendable after `lock_time` (unix seconds)
    pub fn with_lock_time(
        owner_key: &[u8],
        payload: &Krc20Payload,
        network: Network,
        lock_time: u64,
    ) -> Result<Self> {
        let content = payload.to_json()?;
        let script = lock_time_script(owner_key, MARKER, content.as_bytes(), lock_time)?;
        Ok(Self::from_script(script, network))
    }

    fn from_script(script: Script, network: Network) -> Self {
        let address = script_hash_address(&script, network);
        Self { script, address }
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn script_public_key(&self) -> ScriptPublicKey {
        script_hash_script_public_key(&self.script)
    }

    /// Entry for output `index` of a commit that is not indexed yet
    pub fn commit_entry(&self, commit_tx_id: TxId, index: u32, amount: Sompi) -> UtxoEntry {
        UtxoEntry::synthetic(
            self.address.clone(),
            commit_tx_id,
            index,
            self.script_public_key(),
            amount,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub commit_tx_id: TxId,
    pub reveal_tx_id: TxId,
}

/// Priority fee the reveal of `payload` pays
pub fn reveal_fee(payload: &Krc20Payload, fees: &FeeSchedule) -> Sompi {
    match payload.op {
        Operation::Deploy => fees.deploy_fee,
        Operation::Mint => fees.mint_fee,
        Operation::Issue => fees.issue_fee,
        Operation::Transfer
        | Operation::List
        | Operation::Send
        | Operation::Burn
        | Operation::Blacklist
        | Operation::Chown => 0,
    }
}

/// Amount the commit of `payload` sends to its escrow
pub fn commit_amount(payload: &Krc20Payload, fees: &FeeSchedule) -> Sompi {
    fees.commit_amount(reveal_fee(payload, fees))
}

pub(crate) fn expect_op(payload: &Krc20Payload, expected: Operation) -> Result<()> {
    if payload.op != expected {
        return Err(ProtocolError::OperationMismatch {
            expected: expected.to_string(),
            actual: payload.op.to_string(),
        }
        .into());
    }
    Ok(())
}

async fn commit(
    ctx: &Context,
    signer: &dyn Signer,
    payload: &Krc20Payload,
    escrow: &OperationScript,
    priority_fee: Sompi,
) -> Result<TxId> {
    let amount = commit_amount(payload, ctx.fees());
    let outputs = vec![PaymentOutput::new(escrow.address().clone(), amount)];
    let id = pay_from_owner(ctx, signer, outputs, priority_fee).await?;
    info!(op = %payload.op, amount, "commit {} submitted to {}", id, escrow.address());
    Ok(id)
}

async fn reveal(
    ctx: &Context,
    signer: &dyn Signer,
    payload: &Krc20Payload,
    escrow: &OperationScript,
    entry: UtxoEntry,
) -> Result<TxId> {
    let network = ctx.network();
    let owner = signer.address(network)?;
    let outputs = match payload.op {
        Operation::List => {
            let send = OperationScript::new(&signer.public_key(), &payload.send_for(), network)?;
            debug!("list forwards to send escrow {}", send.address());
            vec![PaymentOutput::new(
                send.address().clone(),
                ctx.fees().list_utxo_amount,
            )]
        }
        _ => Vec::new(),
    };

    let mut pending = TransactionBuilder::new(network)
        .priority_entries(vec![entry])
        .outputs(outputs)
        .change_address(owner)
        .priority_fee(reveal_fee(payload, ctx.fees()))
        .fee_rate(ctx.fees().network_fee_per_gram)
        .priority_unlock_size(script_unlock_size(escrow.script(), 1))
        .build()?;
    pending.sign_reveal(signer, escrow.script())?;
    let id = submit_pending(ctx.rpc(), &mut pending).await?;
    info!(op = %payload.op, fee = pending.fee(), "reveal {} submitted", id);
    Ok(id)
}

/// Validate, commit, then reveal against the commit's first output
pub async fn execute_operation(
    ctx: &Context,
    signer: &dyn Signer,
    payload: &Krc20Payload,
    priority_fee: Sompi,
) -> Result<OperationResult> {
    payload.validate(ctx.network())?;
    let escrow = OperationScript::new(&signer.public_key(), payload, ctx.network())?;

    let commit_tx_id = commit(ctx, signer, payload, &escrow, priority_fee).await?;
    let entry = escrow.commit_entry(commit_tx_id.clone(), 0, commit_amount(payload, ctx.fees()));
    match reveal(ctx, signer, payload, &escrow, entry).await {
        Ok(reveal_tx_id) => Ok(OperationResult {
            commit_tx_id,
            reveal_tx_id,
        }),
        Err(source) => Err(Error::RevealFailed {
            commit_tx_id,
            source: Box::new(source),
        }),
    }
}

/// Commit phase only
pub async fn execute_commit(
    ctx: &Context,
    signer: &dyn Signer,
    payload: &Krc20Payload,
    priority_fee: Sompi,
) -> Result<TxId> {
    payload.validate(ctx.network())?;
    let escrow = OperationScript::new(&signer.public_key(), payload, ctx.network())?;
    commit(ctx, signer, payload, &escrow, priority_fee).await
}

/// Reveal against an earlier commit, looking its output up on the ledger
pub async fn execute_reveal(
    ctx: &Context,
    signer: &dyn Signer,
    payload: &Krc20Payload,
    commit_tx_id: &TxId,
) -> Result<TxId> {
    payload.validate(ctx.network())?;
    let escrow = OperationScript::new(&signer.public_key(), payload, ctx.network())?;
    let outpoint = Outpoint::new(commit_tx_id.clone(), 0);
    let _guard = ctx.lock(escrow.address()).await;
    let entry = ctx
        .entries(escrow.address())
        .await?
        .into_iter()
        .find(|e| e.outpoint == outpoint)
        .ok_or_else(|| NodeError::NotFound {
            what: format!("commit output {} at {}", outpoint, escrow.address()),
        })?;
    reveal(ctx, signer, payload, &escrow, entry).await
}

pub async fn mint(
    ctx: &Context,
    signer: &dyn Signer,
    payload: &Krc20Payload,
    priority_fee: Sompi,
) -> Result<OperationResult> {
    expect_op(payload, Operation::Mint)?;
    execute_operation(ctx, signer, payload, priority_fee).await
}

pub async fn deploy(
    ctx: &Context,
    signer: &dyn Signer,
    payload: &Krc20Payload,
    priority_fee: Sompi,
) -> Result<OperationResult> {
    expect_op(payload, Operation::Deploy)?;
    execute_operation(ctx, signer, payload, priority_fee).await
}

pub async fn transfer(
    ctx: &Context,
    signer: &dyn Signer,
    payload: &Krc20Payload,
    priority_fee: Sompi,
) -> Result<OperationResult> {
    expect_op(payload, Operation::Transfer)?;
    execute_operation(ctx, signer, payload, priority_fee).await
}

/// List for sale. The listed outpoint is `(reveal_tx_id, 0)` at the Send
/// escrow of the same token.
pub async fn list(
    ctx: &Context,
    signer: &dyn Signer,
    payload: &Krc20Payload,
    priority_fee: Sompi,
) -> Result<OperationResult> {
    expect_op(payload, Operation::List)?;
    execute_operation(ctx, signer, payload, priority_fee).await
}

pub async fn issue(
    ctx: &Context,
    signer: &dyn Signer,
    payload: &Krc20Payload,
    priority_fee: Sompi,
) -> Result<OperationResult> {
    expect_op(payload, Operation::Issue)?;
    execute_operation(ctx, signer, payload, priority_fee).await
}

pub async fn burn(
    ctx: &Context,
    signer: &dyn Signer,
    payload: &Krc20Payload,
    priority_fee: Sompi,
) -> Result<OperationResult> {
    expect_op(payload, Operation::Burn)?;
    execute_operation(ctx, signer, payload, priority_fee).await
}

pub async fn blacklist(
    ctx: &Context,
    signer: &dyn Signer,
    payload: &Krc20Payload,
    priority_fee: Sompi,
) -> Result<OperationResult> {
    expect_op(payload, Operation::Blacklist)?;
    execute_operation(ctx, signer, payload, priority_fee).await
}

pub async fn chown(
    ctx: &Context,
    signer: &dyn Signer,
    payload: &Krc20Payload,
    priority_fee: Sompi,
) -> Result<OperationResult> {
    expect_op(payload, Operation::Chown)?;
    execute_operation(ctx, signer, payload, priority_fee).await
}
