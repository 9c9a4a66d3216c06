//! Two-party sale of a listed entry
//!
//! The seller signs input 0 (the listed entry at the Send escrow) together
//! with output 0 (their payment) under `SingleAnyOneCanPay` and hands the
//! transaction over as JSON. The buyer appends funding inputs and their own
//! output, signs those with `All` and submits.

use kaspa_rpc_client::submit_signed;
use kaspa_tx::address::invalid_address;
use kaspa_tx::entries::total_amount;
use kaspa_tx::mass::{base_mass, input_mass, mass_fee, output_mass, SIGNATURE_UNLOCK_SIZE};
use kaspa_tx::{
    pay_to_address_script, select_entries_with_fee, PaymentOutput, RawTransaction, SighashType,
    Signer, TransactionOutput,
};
use kiwi_core::{NodeError, ProtocolError, Result, Sompi, TxError, TxId, ValidationError};
use tracing::{debug, info};

use crate::context::Context;
use crate::operation::{expect_op, OperationScript};
use crate::payload::{Krc20Payload, Operation};

fn malformed(reason: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedPartial {
        reason: reason.into(),
    }
}

/// Seller half: spend the entry listed by `listed_tx_id` into a payment of
/// `price` to the seller. Returns the half-signed transaction as JSON.
pub async fn sign_partial_half(
    ctx: &Context,
    seller: &dyn Signer,
    payload: &Krc20Payload,
    listed_tx_id: &TxId,
    price: Sompi,
) -> Result<String> {
    expect_op(payload, Operation::Send)?;
    payload.validate(ctx.network())?;
    if price == 0 {
        return Err(ValidationError::NotPositive {
            field: "price",
            value: "0".to_string(),
        }
        .into());
    }

    let network = ctx.network();
    let escrow = OperationScript::new(&seller.public_key(), payload, network)?;
    let listed = ctx
        .entries(escrow.address())
        .await?
        .into_iter()
        .find(|e| &e.outpoint.transaction_id == listed_tx_id)
        .ok_or_else(|| NodeError::NotFound {
            what: format!("listing {} at {}", listed_tx_id, escrow.address()),
        })?;
    debug!(amount = listed.amount, "found listing {}", listed.outpoint);

    let seller_address = seller.address(network)?;
    let mut raw = RawTransaction::create_partial(
        network,
        vec![listed],
        vec![PaymentOutput::new(seller_address, price)],
    )?;
    if raw.sign_reveal(seller, escrow.script(), SighashType::SingleAnyOneCanPay)? == 0 {
        return Err(TxError::MissingSigner { index: 0 }.into());
    }
    info!(price, "signed partial for listing {}", listed_tx_id);
    Ok(raw.to_json()?)
}

/// Buyer half: fund the seller's price, take the listed entry, submit.
/// `priority_fee` is paid on top of the mass fee.
pub async fn reveal_pskt(
    ctx: &Context,
    buyer: &dyn Signer,
    partial_json: &str,
    priority_fee: Sompi,
) -> Result<TxId> {
    let network = ctx.network();
    let mut raw = RawTransaction::from_json(partial_json)?;
    let (listed_amount, price, seller_unlock) = {
        let tx = raw.transaction();
        if tx.inputs.len() != 1 || tx.outputs.len() != 1 {
            return Err(malformed(format!(
                "expected 1 input and 1 output, got {} and {}",
                tx.inputs.len(),
                tx.outputs.len()
            ))
            .into());
        }
        if raw.input_hash_type(0) != Some(SighashType::SingleAnyOneCanPay) {
            return Err(malformed("seller input is not signed with SingleAnyOneCanPay").into());
        }
        let listed = tx.inputs[0]
            .utxo
            .as_ref()
            .ok_or(TxError::MissingUtxo { index: 0 })?;
        (listed.amount, tx.outputs[0].value, tx.inputs[0].signature_script.len())
    };

    let buyer_address = buyer.address(network)?;
    let buyer_spk =
        pay_to_address_script(&buyer_address).map_err(|e| invalid_address(&buyer_address, e))?;
    let fixed_mass = base_mass(0)
        + input_mass(seller_unlock, 1)
        + output_mass(&raw.transaction().outputs[0])
        + output_mass(&TransactionOutput::new(0, buyer_spk));
    let fee_rate = ctx.fees().network_fee_per_gram;
    let fee_for = |n: usize| {
        let mass = fixed_mass + n as u64 * input_mass(SIGNATURE_UNLOCK_SIZE, 1);
        priority_fee.saturating_add(mass_fee(mass, fee_rate))
    };

    let _guard = ctx.lock(&buyer_address).await;
    let entries = ctx.entries(&buyer_address).await?;
    let selected = select_entries_with_fee(&entries, price, listed_amount, fee_for)
        .map_err(TxError::from)?;
    let fee = fee_for(selected.entries.len());
    let inputs = selected.entries.len();
    let change = (listed_amount + total_amount(&selected.entries))
        .saturating_sub(price)
        .saturating_sub(fee);

    for entry in selected.entries {
        raw.append_input(entry, 1);
    }
    if change > 0 {
        raw.append_output(&PaymentOutput::new(buyer_address.clone(), change), network)?;
    }
    raw.update_mass();
    let signed = raw.sign(buyer, SighashType::All)?;
    debug!(inputs, signed, fee, "buyer half signed");

    let id = submit_signed(ctx.rpc(), raw.transaction()).await?;
    info!(price, received = change, "purchase {} submitted", id);
    Ok(id)
}

/// Both halves in one call
#[allow(clippy::too_many_arguments)]
pub async fn send(
    ctx: &Context,
    seller: &dyn Signer,
    payload: &Krc20Payload,
    buyer: &dyn Signer,
    listed_tx_id: &TxId,
    price: Sompi,
    priority_fee: Sompi,
) -> Result<TxId> {
    let partial = sign_partial_half(ctx, seller, payload, listed_tx_id, price).await?;
    reveal_pskt(ctx, buyer, &partial, priority_fee).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::list;
    use crate::testing::{context, KAS};
    use kaspa_tx::script::ScriptChunk;
    use kaspa_tx::testing::{MockSigner, MockVerifier};
    use kaspa_tx::{calc_signature_hash, Script, SignatureScheme, SignatureVerifier};
    use kiwi_core::ErrorKind;

    struct Sale {
        ctx: Context,
        ledger: std::sync::Arc<kaspa_rpc_client::testing::MockLedger>,
        seller: MockSigner,
        buyer: MockSigner,
        send_payload: Krc20Payload,
        listed_tx_id: TxId,
    }

    async fn listed_sale() -> Sale {
        let (ctx, ledger) = context();
        let seller = MockSigner::new(1);
        let buyer = MockSigner::new(2);
        ledger.fund(&ledger.test_address(1), 10 * KAS);
        ledger.fund(&ledger.test_address(2), 50 * KAS);
        let list_payload = Krc20Payload::list("KIWI", "1000");
        let listed = list(&ctx, &seller, &list_payload, 0).await.unwrap();
        Sale {
            ctx,
            ledger,
            seller,
            buyer,
            send_payload: list_payload.send_for(),
            listed_tx_id: listed.reveal_tx_id,
        }
    }

    #[tokio::test]
    async fn test_list_then_send_pays_seller_exact_price() {
        let sale = listed_sale().await;
        let (ctx, ledger) = (&sale.ctx, &sale.ledger);
        let seller_before = ledger.balance_at(&ledger.test_address(1));
        let buyer_before = ledger.balance_at(&ledger.test_address(2));
        let price = 20 * KAS;

        let id = send(
            ctx,
            &sale.seller,
            &sale.send_payload,
            &sale.buyer,
            &sale.listed_tx_id,
            price,
            0,
        )
        .await
        .unwrap();

        let tx = ledger.submitted().pop().unwrap();
        assert_eq!(tx.id(), id);
        assert_eq!(tx.inputs.len(), 2);
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].value, price);
        assert_eq!(ledger.balance_at(&ledger.test_address(1)), seller_before + price);

        // buyer: gains the listed amount, pays price and mass fee
        let listed = ctx.fees().list_utxo_amount;
        assert_eq!(tx.fee().unwrap(), tx.mass);
        assert_eq!(
            ledger.balance_at(&ledger.test_address(2)),
            buyer_before + listed - price - tx.mass
        );
    }

    #[tokio::test]
    async fn test_seller_signature_commits_to_own_pair_only() {
        let sale = listed_sale().await;
        let json = sign_partial_half(
            &sale.ctx,
            &sale.seller,
            &sale.send_payload,
            &sale.listed_tx_id,
            5 * KAS,
        )
        .await
        .unwrap();
        reveal_pskt(&sale.ctx, &sale.buyer, &json, 1_000).await.unwrap();

        let tx = sale.ledger.submitted().pop().unwrap();
        let chunks = Script::from_bytes(tx.inputs[0].signature_script.clone())
            .chunks()
            .unwrap();
        let ScriptChunk::Push(sig) = &chunks[0] else {
            panic!("expected a signature push");
        };
        assert_eq!(sig[64], SighashType::SingleAnyOneCanPay.to_u8());

        // still valid over the completed transaction
        let message = calc_signature_hash(&tx, 0, SighashType::SingleAnyOneCanPay).unwrap();
        let signature: [u8; 64] = sig[..64].try_into().unwrap();
        assert!(MockVerifier.verify(
            &sale.seller.public_key(),
            &message,
            &signature,
            SignatureScheme::Schnorr
        ));
        assert_eq!(tx.fee().unwrap(), 1_000 + tx.mass);
    }

    #[tokio::test]
    async fn test_partial_signed_with_all_is_rejected() {
        let sale = listed_sale().await;
        let escrow = OperationScript::new(
            &sale.seller.public_key(),
            &sale.send_payload,
            sale.ctx.network(),
        )
        .unwrap();
        let listed = sale.ledger.utxos_at(escrow.address()).pop().unwrap();
        let mut raw = RawTransaction::create_partial(
            sale.ctx.network(),
            vec![listed],
            vec![PaymentOutput::new(sale.ledger.test_address(1), KAS)],
        )
        .unwrap();
        raw.sign_reveal(&sale.seller, escrow.script(), SighashType::All)
            .unwrap();

        let before = sale.ledger.total_calls();
        let err = reveal_pskt(&sale.ctx, &sale.buyer, &raw.to_json().unwrap(), 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(sale.ledger.total_calls(), before);
    }

    #[tokio::test]
    async fn test_unknown_listing_is_not_found() {
        let sale = listed_sale().await;
        let err = sign_partial_half(
            &sale.ctx,
            &sale.seller,
            &sale.send_payload,
            &kaspa_tx::testing::txid(77),
            KAS,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_buyer_without_funds_submits_nothing() {
        let sale = listed_sale().await;
        let json = sign_partial_half(
            &sale.ctx,
            &sale.seller,
            &sale.send_payload,
            &sale.listed_tx_id,
            500 * KAS,
        )
        .await
        .unwrap();
        let submitted = sale.ledger.calls("submit_transaction");
        let err = reveal_pskt(&sale.ctx, &sale.buyer, &json, 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(sale.ledger.calls("submit_transaction"), submitted);
    }

    #[tokio::test]
    async fn test_send_rejects_other_ops() {
        let sale = listed_sale().await;
        let err = sign_partial_half(
            &sale.ctx,
            &sale.seller,
            &Krc20Payload::list("KIWI", "1000"),
            &sale.listed_tx_id,
            KAS,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }
}
