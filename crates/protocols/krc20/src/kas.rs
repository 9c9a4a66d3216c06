//! Plain KAS payments
//!
//! Also the funding path of every commit: `pay_from_owner` and
//! `pay_from_threshold` select entries at the source address, build, sign
//! and submit while holding that address's lock.

use kaspa_rpc_client::submit_pending;
use kaspa_tx::address::script_hash_address;
use kaspa_tx::mass::script_unlock_size;
use kaspa_tx::{PaymentOutput, Signer, ThresholdScript, TransactionBuilder};
use kiwi_core::{Address, Result, Sompi, TxId, ValidationError};
use tracing::info;

use crate::context::Context;
use crate::payload::check_address;

fn check_outputs(ctx: &Context, op: &str, outputs: &[PaymentOutput]) -> Result<()> {
    if outputs.is_empty() {
        return Err(ValidationError::MissingField {
            op: op.to_string(),
            field: "outputs",
        }
        .into());
    }
    for output in outputs {
        if output.amount == 0 {
            return Err(ValidationError::NotPositive {
                field: "amount",
                value: "0".to_string(),
            }
            .into());
        }
        check_address(&output.address, ctx.network())?;
    }
    Ok(())
}

/// Pay `outputs` from the signer's own address, change back to it
pub(crate) async fn pay_from_owner(
    ctx: &Context,
    signer: &dyn Signer,
    outputs: Vec<PaymentOutput>,
    priority_fee: Sompi,
) -> Result<TxId> {
    let owner = signer.address(ctx.network())?;
    let _guard = ctx.lock(&owner).await;
    let entries = ctx.entries(&owner).await?;
    let mut pending = TransactionBuilder::new(ctx.network())
        .entries(entries)
        .outputs(outputs)
        .change_address(owner)
        .priority_fee(priority_fee)
        .fee_rate(ctx.fees().network_fee_per_gram)
        .build()?;
    pending.sign(&[signer])?;
    submit_pending(ctx.rpc(), &mut pending).await
}

/// Pay `outputs` from the m-of-n address of `redeem`, change back to it
pub(crate) async fn pay_from_threshold(
    ctx: &Context,
    signers: &[&dyn Signer],
    redeem: &ThresholdScript,
    outputs: Vec<PaymentOutput>,
    priority_fee: Sompi,
) -> Result<TxId> {
    let source = script_hash_address(redeem.script(), ctx.network());
    let _guard = ctx.lock(&source).await;
    let entries = ctx.entries(&source).await?;
    let mut pending = TransactionBuilder::new(ctx.network())
        .entries(entries)
        .outputs(outputs)
        .change_address(source)
        .priority_fee(priority_fee)
        .fee_rate(ctx.fees().network_fee_per_gram)
        .sig_op_count(redeem.keys().len() as u8)
        .unlock_size(script_unlock_size(redeem.script(), redeem.required()))
        .build()?;
    pending.sign_threshold(signers, redeem)?;
    submit_pending(ctx.rpc(), &mut pending).await
}

pub async fn transfer_kas(
    ctx: &Context,
    signer: &dyn Signer,
    to: &Address,
    amount: Sompi,
    priority_fee: Sompi,
) -> Result<TxId> {
    transfer_kas_to_many(ctx, signer, vec![PaymentOutput::new(to.clone(), amount)], priority_fee)
        .await
}

pub async fn transfer_kas_to_many(
    ctx: &Context,
    signer: &dyn Signer,
    outputs: Vec<PaymentOutput>,
    priority_fee: Sompi,
) -> Result<TxId> {
    check_outputs(ctx, "transfer", &outputs)?;
    let recipients = outputs.len();
    let id = pay_from_owner(ctx, signer, outputs, priority_fee).await?;
    info!(recipients, "kas transfer {} submitted", id);
    Ok(id)
}

/// Spend from an m-of-n address; a zero priority fee falls back to the
/// configured threshold default.
pub async fn transfer_kas_from_threshold(
    ctx: &Context,
    signers: &[&dyn Signer],
    redeem: &ThresholdScript,
    outputs: Vec<PaymentOutput>,
    priority_fee: Sompi,
) -> Result<TxId> {
    check_outputs(ctx, "transfer", &outputs)?;
    let fee = if priority_fee == 0 {
        ctx.fees().multisig_default_fee
    } else {
        priority_fee
    };
    let id = pay_from_threshold(ctx, signers, redeem, outputs, fee).await?;
    info!(
        required = redeem.required(),
        keys = redeem.keys().len(),
        "threshold transfer {} submitted",
        id
    );
    Ok(id)
}

pub async fn balance_of(ctx: &Context, address: &Address) -> Result<Sompi> {
    check_address(address, ctx.network())?;
    Ok(ctx.rpc().get_balance_by_address(address).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, KAS};
    use kaspa_tx::testing::MockSigner;
    use kaspa_tx::{threshold_script, SignatureScheme};
    use kiwi_core::{ErrorKind, Network};

    #[tokio::test]
    async fn test_transfer_kas_moves_funds() {
        let (ctx, ledger) = context();
        let owner = MockSigner::new(1);
        ledger.fund(&ledger.test_address(1), 10 * KAS);
        let to = ledger.test_address(2);

        let id = transfer_kas(&ctx, &owner, &to, 3 * KAS, 0).await.unwrap();
        assert_eq!(ledger.balance_at(&to), 3 * KAS);
        let tx = ledger.submitted().pop().unwrap();
        assert_eq!(tx.id(), id);
        // fee is the mass fee at one sompi per gram
        assert_eq!(ledger.balance_at(&ledger.test_address(1)), 7 * KAS - tx.mass);
        assert_eq!(balance_of(&ctx, &to).await.unwrap(), 3 * KAS);
    }

    #[tokio::test]
    async fn test_transfer_kas_to_many_validates_first() {
        let (ctx, ledger) = context();
        let owner = MockSigner::new(1);
        ledger.fund(&ledger.test_address(1), 10 * KAS);

        let err = transfer_kas_to_many(
            &ctx,
            &owner,
            vec![
                PaymentOutput::new(ledger.test_address(2), KAS),
                PaymentOutput::new(ledger.test_address(3), 0),
            ],
            0,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mainnet = MockSigner::new(2).address(Network::Mainnet).unwrap();
        let err = transfer_kas(&ctx, &owner, &mainnet, KAS, 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(ledger.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_insufficient_funds_submits_nothing() {
        let (ctx, ledger) = context();
        ledger.fund(&ledger.test_address(1), KAS);
        let err = transfer_kas(&ctx, &MockSigner::new(1), &ledger.test_address(2), 2 * KAS, 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(ledger.calls("submit_transaction"), 0);
    }

    #[tokio::test]
    async fn test_threshold_transfer_uses_default_fee() {
        let (ctx, ledger) = context();
        let signers: Vec<MockSigner> = (1..=3).map(MockSigner::new).collect();
        let keys: Vec<[u8; 33]> = signers.iter().map(|s| s.public_key()).collect();
        let redeem = threshold_script(2, &keys, SignatureScheme::Schnorr).unwrap();
        let source = script_hash_address(redeem.script(), Network::Testnet);
        ledger.fund(&source, 5 * KAS);

        transfer_kas_from_threshold(
            &ctx,
            &[&signers[0], &signers[2]],
            &redeem,
            vec![PaymentOutput::new(ledger.test_address(9), KAS)],
            0,
        )
        .await
        .unwrap();

        let tx = ledger.submitted().pop().unwrap();
        let fee = tx.fee().unwrap();
        assert_eq!(fee, ctx.fees().multisig_default_fee + tx.mass);
        assert_eq!(ledger.balance_at(&source), 4 * KAS - fee);
        assert_eq!(tx.inputs[0].sig_op_count, 3);
    }
}
