//! Chained mints from a single commit
//!
//! One commit funds `count` reveals. Each reveal pays exactly `mint_fee`
//! and sends its remainder back to the escrow address, where the next
//! reveal picks it up. The last reveal sends the remainder to the owner.
//!
//! The escrow address stays locked from the first escrow read to the last
//! reveal, so chains for the same owner and payload run one at a time.

use kaspa_rpc_client::{await_entry, submit_pending};
use kaspa_tx::entries::total_amount;
use kaspa_tx::mass::script_unlock_size;
use kaspa_tx::{
    Outpoint, PaymentOutput, PendingTransaction, Signer, TransactionBuilder, UtxoEntry,
};
use kiwi_core::{Address, Error, ProtocolError, Result, Sompi, TxError, TxId, ValidationError};
use tracing::{info, warn};

use crate::context::Context;
use crate::kas::pay_from_owner;
use crate::operation::OperationScript;
use crate::payload::{Krc20Payload, Operation};

/// Commit amount for `count` chained mints
pub fn multi_mint_amount(ctx: &Context, count: usize) -> Sompi {
    let fees = ctx.fees();
    (count as Sompi)
        .saturating_mul(fees.mint_fee)
        .saturating_add(fees.p2sh_buffer)
}

fn check_request(ctx: &Context, payload: &Krc20Payload, count: usize) -> Result<()> {
    if payload.op != Operation::Mint {
        return Err(ProtocolError::OperationMismatch {
            expected: Operation::Mint.to_string(),
            actual: payload.op.to_string(),
        }
        .into());
    }
    if count == 0 {
        return Err(ValidationError::ZeroCount.into());
    }
    payload.validate(ctx.network())?;
    Ok(())
}

/// Commit once, then reveal `count` times. `on_step(i, reveal_tx_id)` runs
/// after reveal `i` (1-based) is accepted.
pub async fn multi_mint<F>(
    ctx: &Context,
    signer: &dyn Signer,
    payload: &Krc20Payload,
    count: usize,
    priority_fee: Sompi,
    on_step: F,
) -> Result<Vec<TxId>>
where
    F: FnMut(usize, &TxId),
{
    check_request(ctx, payload, count)?;
    let escrow = OperationScript::new(&signer.public_key(), payload, ctx.network())?;
    let amount = multi_mint_amount(ctx, count);
    let _guard = ctx.lock(escrow.address()).await;

    let outputs = vec![PaymentOutput::new(escrow.address().clone(), amount)];
    let commit_tx_id = pay_from_owner(ctx, signer, outputs, priority_fee).await?;
    info!(count, amount, "multi-mint commit {} submitted", commit_tx_id);

    let first = vec![escrow.commit_entry(commit_tx_id.clone(), 0, amount)];
    run_chain(ctx, signer, &escrow, first, count, Some(commit_tx_id), on_step).await
}

/// Like [`multi_mint`], but first spends whatever already sits at the
/// escrow address and commits only the shortfall.
pub async fn multi_mint_with_reuse_utxo<F>(
    ctx: &Context,
    signer: &dyn Signer,
    payload: &Krc20Payload,
    count: usize,
    priority_fee: Sompi,
    on_step: F,
) -> Result<Vec<TxId>>
where
    F: FnMut(usize, &TxId),
{
    check_request(ctx, payload, count)?;
    let escrow = OperationScript::new(&signer.public_key(), payload, ctx.network())?;
    let needed = multi_mint_amount(ctx, count);

    let _guard = ctx.lock(escrow.address()).await;
    let mut entries = ctx.entries(escrow.address()).await?;
    let existing = total_amount(&entries);
    let shortfall = needed.saturating_sub(existing);
    info!(existing, shortfall, "reusing {} escrow entries", entries.len());

    let mut commit_tx_id = None;
    if shortfall > 0 {
        let outputs = vec![PaymentOutput::new(escrow.address().clone(), shortfall)];
        let id = pay_from_owner(ctx, signer, outputs, priority_fee).await?;
        info!(shortfall, "top-up commit {} submitted", id);
        entries.push(escrow.commit_entry(id.clone(), 0, shortfall));
        commit_tx_id = Some(id);
    }

    run_chain(ctx, signer, &escrow, entries, count, commit_tx_id, on_step).await
}

fn build_step(
    ctx: &Context,
    escrow: &OperationScript,
    entries: Vec<UtxoEntry>,
    last: bool,
    owner: &Address,
) -> Result<PendingTransaction> {
    let mint_fee = ctx.fees().mint_fee;
    let available = total_amount(&entries);
    // intermediate steps must leave something to chain on
    let required = if last { mint_fee } else { mint_fee + 1 };
    if available < required {
        return Err(TxError::InsufficientFunds {
            required,
            available,
        }
        .into());
    }
    let change = if last {
        owner.clone()
    } else {
        escrow.address().clone()
    };
    Ok(TransactionBuilder::new(ctx.network())
        .priority_entries(entries)
        .change_address(change)
        .priority_fee(mint_fee)
        .priority_unlock_size(script_unlock_size(escrow.script(), 1))
        .build()?)
}

/// One reveal. Steps after the first wait for the previous reveal's
/// leftover to show up at the escrow address.
async fn reveal_step(
    ctx: &Context,
    signer: &dyn Signer,
    escrow: &OperationScript,
    entries: Vec<UtxoEntry>,
    previous: Option<&TxId>,
    last: bool,
    owner: &Address,
) -> Result<TxId> {
    let entries = match previous {
        Some(id) => {
            let outpoint = Outpoint::new(id.clone(), 0);
            vec![await_entry(ctx.rpc(), escrow.address(), &outpoint, ctx.confirmation()).await?]
        }
        None => entries,
    };
    let mut pending = build_step(ctx, escrow, entries, last, owner)?;
    pending.sign_reveal(signer, escrow.script())?;
    submit_pending(ctx.rpc(), &mut pending).await
}

/// Callers hold the escrow address lock
async fn run_chain<F>(
    ctx: &Context,
    signer: &dyn Signer,
    escrow: &OperationScript,
    mut first: Vec<UtxoEntry>,
    count: usize,
    commit_tx_id: Option<TxId>,
    mut on_step: F,
) -> Result<Vec<TxId>>
where
    F: FnMut(usize, &TxId),
{
    let owner = signer.address(ctx.network())?;
    let mut completed: Vec<TxId> = Vec::with_capacity(count);

    for step in 1..=count {
        let previous = completed.last().cloned();
        let entries = std::mem::take(&mut first);
        let last = step == count;
        match reveal_step(ctx, signer, escrow, entries, previous.as_ref(), last, &owner).await {
            Ok(id) => {
                info!(step, count, "mint reveal {} submitted", id);
                on_step(step, &id);
                completed.push(id);
            }
            Err(source) => {
                warn!(step, count, "mint chain stopped: {}", source);
                return Err(match commit_tx_id {
                    Some(commit_tx_id) if completed.is_empty() => Error::RevealFailed {
                        commit_tx_id,
                        source: Box::new(source),
                    },
                    _ => Error::MintChainBroken {
                        completed,
                        source: Box::new(source),
                    },
                });
            }
        }
    }
    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, KAS};
    use kaspa_tx::testing::MockSigner;
    use kiwi_core::ErrorKind;

    #[tokio::test]
    async fn test_three_chained_reveals() {
        let (ctx, ledger) = context();
        let owner = MockSigner::new(1);
        ledger.fund(&ledger.test_address(1), 10 * KAS);
        let payload = Krc20Payload::mint("KIWI");

        let mut steps = Vec::new();
        let ids = multi_mint(&ctx, &owner, &payload, 3, 0, |i, id| steps.push((i, id.clone())))
            .await
            .unwrap();

        assert_eq!(ids.len(), 3);
        assert_eq!(steps.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(steps.iter().map(|(_, id)| id.clone()).collect::<Vec<_>>(), ids);

        let submitted = ledger.submitted();
        assert_eq!(submitted.len(), 4);
        let commit_tx = &submitted[0];
        let amount = 3 * ctx.fees().mint_fee + ctx.fees().p2sh_buffer;
        assert_eq!(commit_tx.outputs[0].value, amount);

        // each reveal spends the previous one's leftover and pays exactly the mint fee
        let mut previous = commit_tx.id();
        let mut remaining = amount;
        for reveal in &submitted[1..] {
            assert_eq!(reveal.inputs.len(), 1);
            assert_eq!(reveal.inputs[0].previous_outpoint, Outpoint::new(previous, 0));
            assert_eq!(reveal.fee().unwrap(), ctx.fees().mint_fee);
            remaining -= ctx.fees().mint_fee;
            assert_eq!(reveal.outputs[0].value, remaining);
            previous = reveal.id();
        }

        // the final remainder is the buffer, forwarded to the owner
        assert_eq!(remaining, ctx.fees().p2sh_buffer);
        let escrow = OperationScript::new(&owner.public_key(), &payload, ctx.network()).unwrap();
        assert!(ledger.utxos_at(escrow.address()).is_empty());
        let forwarded = ledger
            .utxos_at(&ledger.test_address(1))
            .into_iter()
            .find(|e| e.outpoint == Outpoint::new(ids[2].clone(), 0))
            .unwrap();
        assert_eq!(forwarded.amount, ctx.fees().p2sh_buffer);
    }

    #[tokio::test]
    async fn test_zero_count_rejected() {
        let (ctx, ledger) = context();
        let err = multi_mint(&ctx, &MockSigner::new(1), &Krc20Payload::mint("KIWI"), 0, 0, |_, _| {})
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(ledger.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_broken_chain_reports_completed() {
        let (ctx, ledger) = context();
        let owner = MockSigner::new(1);
        ledger.fund(&ledger.test_address(1), 10 * KAS);

        // commit and first reveal go through, second reveal is rejected
        ledger.reject_after(2);
        let mut calls = 0;
        let err = multi_mint(&ctx, &owner, &Krc20Payload::mint("KIWI"), 3, 0, |_, _| calls += 1)
            .await
            .unwrap_err();
        match err {
            Error::MintChainBroken { completed, source } => {
                assert_eq!(completed.len(), 1);
                assert_eq!(source.kind(), ErrorKind::RelaySubmission);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_first_reveal_failure_carries_commit() {
        let (ctx, ledger) = context();
        ledger.fund(&ledger.test_address(1), 10 * KAS);
        ledger.reject_after(1);
        let err = multi_mint(&ctx, &MockSigner::new(1), &Krc20Payload::mint("KIWI"), 2, 0, |_, _| {})
            .await
            .unwrap_err();
        assert_eq!(err.commit_tx_id(), Some(&ledger.submitted()[0].id()));
    }

    #[tokio::test]
    async fn test_reuse_tops_up_only_the_shortfall() {
        let (ctx, ledger) = context();
        let owner = MockSigner::new(1);
        let payload = Krc20Payload::mint("KIWI");
        ledger.fund(&ledger.test_address(1), 10 * KAS);
        let escrow = OperationScript::new(&owner.public_key(), &payload, ctx.network()).unwrap();
        let leftover = ledger.fund(escrow.address(), KAS);

        let ids = multi_mint_with_reuse_utxo(&ctx, &owner, &payload, 2, 0, |_, _| {})
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);

        let submitted = ledger.submitted();
        let top_up = &submitted[0];
        let needed = 2 * ctx.fees().mint_fee + ctx.fees().p2sh_buffer;
        assert_eq!(top_up.outputs[0].value, needed - KAS);

        // first reveal blends the old entry with the fresh commit
        let first = &submitted[1];
        let spent: Vec<&Outpoint> = first.inputs.iter().map(|i| &i.previous_outpoint).collect();
        assert_eq!(spent.len(), 2);
        assert!(spent.contains(&&leftover.outpoint));
        assert!(spent.contains(&&Outpoint::new(top_up.id(), 0)));
        assert!(ledger.utxos_at(escrow.address()).is_empty());
    }

    #[tokio::test]
    async fn test_reuse_without_shortfall_skips_commit() {
        let (ctx, ledger) = context();
        let owner = MockSigner::new(1);
        let payload = Krc20Payload::mint("KIWI");
        let escrow = OperationScript::new(&owner.public_key(), &payload, ctx.network()).unwrap();
        ledger.fund(escrow.address(), 5 * KAS);

        let ids = multi_mint_with_reuse_utxo(&ctx, &owner, &payload, 2, 0, |_, _| {})
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ledger.submitted().len(), 2);
        assert_eq!(ledger.balance_at(&ledger.test_address(1)), 3 * KAS);
    }

    #[tokio::test]
    async fn test_underfunded_escrow_fails_loudly() {
        let (ctx, _ledger) = context();
        let owner = MockSigner::new(1);
        let payload = Krc20Payload::mint("KIWI");
        let escrow = OperationScript::new(&owner.public_key(), &payload, ctx.network()).unwrap();
        let entry = escrow.commit_entry(kaspa_tx::testing::txid(8), 0, KAS);

        // one mint fee covers only the final step of a two-step chain
        let err = run_chain(&ctx, &owner, &escrow, vec![entry], 2, None, |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MintChainBroken { ref completed, .. } if completed.is_empty()));
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    }

    #[tokio::test]
    async fn test_concurrent_reuse_runs_one_chain_at_a_time() {
        let (ctx, ledger) = context();
        let owner = MockSigner::new(1);
        let payload = Krc20Payload::mint("KIWI");
        ledger.fund(&ledger.test_address(1), 10 * KAS);
        let escrow = OperationScript::new(&owner.public_key(), &payload, ctx.network()).unwrap();
        ledger.fund(escrow.address(), 5 * KAS);
        ledger.yield_on_queries(true);

        let (a, b) = tokio::join!(
            multi_mint_with_reuse_utxo(&ctx, &owner, &payload, 2, 0, |_, _| {}),
            multi_mint_with_reuse_utxo(&ctx, &owner, &payload, 2, 0, |_, _| {}),
        );
        assert_eq!(a.unwrap().len(), 2);
        assert_eq!(b.unwrap().len(), 2);

        // the first chain used the parked 5 KAS, the second committed afresh
        let submitted = ledger.submitted();
        assert_eq!(submitted.len(), 5);
        assert!(ledger.utxos_at(escrow.address()).is_empty());
    }

    #[tokio::test]
    async fn test_reuse_waits_for_running_chain() {
        let (ctx, ledger) = context();
        let owner = MockSigner::new(1);
        let payload = Krc20Payload::mint("KIWI");
        ledger.fund(&ledger.test_address(1), 20 * KAS);
        ledger.yield_on_queries(true);

        let (a, b) = tokio::join!(
            multi_mint(&ctx, &owner, &payload, 3, 0, |_, _| {}),
            multi_mint_with_reuse_utxo(&ctx, &owner, &payload, 1, 0, |_, _| {}),
        );
        assert_eq!(a.unwrap().len(), 3);
        assert_eq!(b.unwrap().len(), 1);
    }
}
