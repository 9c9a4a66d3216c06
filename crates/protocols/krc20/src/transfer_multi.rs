//! Token transfer owned by an m-of-n key set
//!
//! The commit is funded from the threshold address of the keys. The escrow
//! script is the same threshold check followed by the operation envelope,
//! so the reveal needs `required` signatures as well.

use kaspa_rpc_client::submit_pending;
use kaspa_tx::address::{script_hash_address, script_hash_script_public_key};
use kaspa_tx::mass::script_unlock_size;
use kaspa_tx::{
    threshold_metadata_script, threshold_script, PaymentOutput, SignatureScheme, Signer,
    ThresholdScript, TransactionBuilder, UtxoEntry,
};
use kiwi_core::{Address, Error, Result, Sompi, TxId};
use tracing::info;

use crate::context::Context;
use crate::kas::pay_from_threshold;
use crate::operation::{commit_amount, expect_op, reveal_fee, OperationResult};
use crate::payload::{Krc20Payload, Operation, MARKER};

async fn reveal(
    ctx: &Context,
    signers: &[&dyn Signer],
    payload: &Krc20Payload,
    escrow: &ThresholdScript,
    entry: UtxoEntry,
    change: Address,
) -> Result<TxId> {
    let mut pending = TransactionBuilder::new(ctx.network())
        .priority_entries(vec![entry])
        .change_address(change)
        .priority_fee(reveal_fee(payload, ctx.fees()))
        .fee_rate(ctx.fees().network_fee_per_gram)
        .sig_op_count(escrow.keys().len() as u8)
        .priority_unlock_size(script_unlock_size(escrow.script(), escrow.required()))
        .build()?;
    pending.sign_threshold(signers, escrow)?;
    submit_pending(ctx.rpc(), &mut pending).await
}

/// Commit from the `required`-of-`keys` address and reveal with the same
/// quorum. A zero `priority_fee` on the commit uses the threshold default.
pub async fn transfer_multi<K: AsRef<[u8]>>(
    ctx: &Context,
    signers: &[&dyn Signer],
    required: usize,
    keys: &[K],
    scheme: SignatureScheme,
    payload: &Krc20Payload,
    priority_fee: Sompi,
) -> Result<OperationResult> {
    expect_op(payload, Operation::Transfer)?;
    payload.validate(ctx.network())?;

    let network = ctx.network();
    let redeem = threshold_script(required, keys, scheme)?;
    let content = payload.to_json()?;
    let escrow = threshold_metadata_script(required, keys, scheme, MARKER, content.as_bytes())?;
    let escrow_address = script_hash_address(escrow.script(), network);
    let source = script_hash_address(redeem.script(), network);

    let fee = if priority_fee == 0 {
        ctx.fees().multisig_default_fee
    } else {
        priority_fee
    };
    let amount = commit_amount(payload, ctx.fees());
    let outputs = vec![PaymentOutput::new(escrow_address.clone(), amount)];
    let commit_tx_id = pay_from_threshold(ctx, signers, &redeem, outputs, fee).await?;
    info!(required, keys = keys.len(), amount, "threshold commit {} submitted", commit_tx_id);

    let entry = UtxoEntry::synthetic(
        escrow_address,
        commit_tx_id.clone(),
        0,
        script_hash_script_public_key(escrow.script()),
        amount,
    );
    match reveal(ctx, signers, payload, &escrow, entry, source).await {
        Ok(reveal_tx_id) => {
            info!("threshold reveal {} submitted", reveal_tx_id);
            Ok(OperationResult {
                commit_tx_id,
                reveal_tx_id,
            })
        }
        Err(source) => Err(Error::RevealFailed {
            commit_tx_id,
            source: Box::new(source),
        }),
    }
}
