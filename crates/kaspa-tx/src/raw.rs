//! Raw transactions over caller-supplied entries
//!
//! No selection: every given entry is spent. Besides the balanced `create`,
//! `create_partial` builds a deliberately incomplete transaction that other
//! parties extend with `append_input`/`append_output`. A signature made
//! with `SighashType::SingleAnyOneCanPay` covers only its own input and the
//! output at the same index, so it survives those appends.

use kiwi_core::{Network, Sompi, TxError, TxId};
use serde::{Deserialize, Serialize};

use crate::address::{
    invalid_address, pay_to_address_script, script_hash_script_public_key, validate_address,
};
use crate::builder::TransactionBuilder;
use crate::entries::{PaymentOutput, UtxoEntry};
use crate::mass::{compute_mass, SIGNATURE_UNLOCK_SIZE};
use crate::script::{
    pay_to_script_hash_signature_script, Script, ScriptBuilder, ScriptChunk, SignatureScheme,
};
use crate::sighash::SighashType;
use crate::signer::{p2pk_scheme, sign_input, Signer};
use crate::transaction::{Transaction, TransactionInput, TransactionOutput};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawTransaction {
    transaction: Transaction,
}

fn payment_output(output: &PaymentOutput, network: Network) -> Result<TransactionOutput, TxError> {
    validate_address(&output.address, Some(network))
        .map_err(|e| invalid_address(&output.address, e))?;
    let spk = pay_to_address_script(&output.address).map_err(|e| invalid_address(&output.address, e))?;
    Ok(TransactionOutput::new(output.amount, spk))
}

impl RawTransaction {
    /// Spend all of `entries`; change = inputs − outputs − fee, or
    /// InsufficientFunds.
    pub fn create(
        network: Network,
        entries: Vec<UtxoEntry>,
        outputs: Vec<PaymentOutput>,
        change_address: kiwi_core::Address,
        fee: Sompi,
    ) -> Result<Self, TxError> {
        let pending = TransactionBuilder::new(network)
            .priority_entries(entries)
            .outputs(outputs)
            .change_address(change_address)
            .priority_fee(fee)
            .build()?;
        let transaction = pending
            .into_transactions()
            .pop()
            .ok_or_else(|| TxError::BuildFailed {
                message: "builder returned no transaction".to_string(),
            })?;
        Ok(Self { transaction })
    }

    /// Unbalanced transaction for other parties to complete
    pub fn create_partial(
        network: Network,
        entries: Vec<UtxoEntry>,
        outputs: Vec<PaymentOutput>,
    ) -> Result<Self, TxError> {
        let outputs = outputs
            .iter()
            .map(|o| payment_output(o, network))
            .collect::<Result<Vec<_>, _>>()?;
        let inputs = entries
            .into_iter()
            .map(|e| TransactionInput::from_entry(e, 1))
            .collect();
        Ok(Self {
            transaction: Transaction::new(inputs, outputs, Vec::new()),
        })
    }

    pub fn from_transaction(transaction: Transaction) -> Self {
        Self { transaction }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn into_transaction(self) -> Transaction {
        self.transaction
    }

    pub fn id(&self) -> TxId {
        self.transaction.id()
    }

    pub fn fee(&self) -> Result<Sompi, TxError> {
        self.transaction.fee()
    }

    pub fn append_input(&mut self, entry: UtxoEntry, sig_op_count: u8) {
        self.transaction
            .inputs
            .push(TransactionInput::from_entry(entry, sig_op_count));
    }

    pub fn append_output(&mut self, output: &PaymentOutput, network: Network) -> Result<(), TxError> {
        self.transaction.outputs.push(payment_output(output, network)?);
        Ok(())
    }

    /// Recompute mass, sizing unsigned inputs as single-signature spends
    pub fn update_mass(&mut self) -> u64 {
        self.transaction.mass = compute_mass(&self.transaction, SIGNATURE_UNLOCK_SIZE);
        self.transaction.mass
    }

    /// Set the unlock of input `index` directly
    pub fn fill_input(&mut self, index: usize, signature_script: Vec<u8>) -> Result<(), TxError> {
        let input = self
            .transaction
            .inputs
            .get_mut(index)
            .ok_or(TxError::InputOutOfRange { index })?;
        input.signature_script = signature_script;
        Ok(())
    }

    /// Sign every unsigned pay-to-pubkey input owned by `signer`; returns
    /// how many were signed.
    pub fn sign(&mut self, signer: &dyn Signer, hash_type: SighashType) -> Result<usize, TxError> {
        let mut signed = 0;
        for index in 0..self.transaction.inputs.len() {
            let input = &self.transaction.inputs[index];
            if input.is_signed() {
                continue;
            }
            let Some(spk) = input.utxo.as_ref().map(|u| u.script_public_key.clone()) else {
                return Err(TxError::MissingUtxo { index });
            };
            if !signer.owns(&spk) {
                continue;
            }
            let sig = sign_input(&self.transaction, index, signer, hash_type, p2pk_scheme(&spk))?;
            self.transaction.inputs[index].signature_script =
                ScriptBuilder::new().add_data(&sig).build().into_bytes();
            signed += 1;
        }
        Ok(signed)
    }

    /// Unlock unsigned inputs locked to P2SH(`script`) with
    /// `<signature> <script>`; returns how many were signed.
    pub fn sign_reveal(
        &mut self,
        signer: &dyn Signer,
        script: &Script,
        hash_type: SighashType,
    ) -> Result<usize, TxError> {
        let p2sh = script_hash_script_public_key(script);
        let targets: Vec<usize> = self
            .transaction
            .inputs
            .iter()
            .enumerate()
            .filter(|(_, input)| {
                !input.is_signed()
                    && input
                        .utxo
                        .as_ref()
                        .is_some_and(|u| u.script_public_key == p2sh)
            })
            .map(|(index, _)| index)
            .collect();
        for &index in &targets {
            let sig = sign_input(&self.transaction, index, signer, hash_type, SignatureScheme::Schnorr)?;
            self.transaction.inputs[index].signature_script =
                pay_to_script_hash_signature_script(&sig, script).into_bytes();
        }
        Ok(targets.len())
    }

    /// Sighash type of the first signature in input `index`'s unlock
    pub fn input_hash_type(&self, index: usize) -> Option<SighashType> {
        let input = self.transaction.inputs.get(index)?;
        let chunks = Script::from_bytes(input.signature_script.clone()).chunks().ok()?;
        match chunks.first()? {
            ScriptChunk::Push(sig) if sig.len() == 65 => SighashType::from_u8(sig[64]),
            _ => None,
        }
    }

    pub fn is_fully_signed(&self) -> bool {
        self.transaction.is_fully_signed()
    }

    pub fn to_json(&self) -> Result<String, TxError> {
        self.transaction.to_json()
    }

    pub fn from_json(json: &str) -> Result<Self, TxError> {
        Transaction::from_json(json).map(Self::from_transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{pub_key_address, script_hash_address};
    use crate::script::metadata_script;
    use crate::sighash::calc_signature_hash;
    use crate::signer::SignatureVerifier;
    use crate::testing::{p2pk_entry, txid, MockSigner, MockVerifier};
    use kiwi_core::Address;

    fn addr(seed: u8) -> Address {
        pub_key_address(&MockSigner::new(seed).public_key(), Network::Testnet).unwrap()
    }

    #[test]
    fn test_create_is_balanced() {
        let seller = MockSigner::new(1);
        let raw = RawTransaction::create(
            Network::Testnet,
            vec![p2pk_entry(&seller, 1, 10_000)],
            vec![PaymentOutput::new(addr(2), 6_000)],
            addr(1),
            500,
        )
        .unwrap();
        assert_eq!(raw.fee().unwrap(), 500);
        assert_eq!(raw.transaction().outputs[1].value, 3_500);

        let err = RawTransaction::create(
            Network::Testnet,
            vec![p2pk_entry(&seller, 1, 10_000)],
            vec![PaymentOutput::new(addr(2), 10_000)],
            addr(1),
            500,
        )
        .unwrap_err();
        assert!(matches!(err, TxError::InsufficientFunds { .. }));
    }

    #[test]
    fn test_partial_signature_survives_completion() {
        let seller = MockSigner::new(1);
        let buyer = MockSigner::new(2);
        let script = metadata_script(&seller.public_key(), b"kasplex", br#"{"op":"send"}"#).unwrap();
        let listed = UtxoEntry::synthetic(
            script_hash_address(&script, Network::Testnet),
            txid(7),
            0,
            script_hash_script_public_key(&script),
            30_000_000,
        );

        let mut partial = RawTransaction::create_partial(
            Network::Testnet,
            vec![listed],
            vec![PaymentOutput::new(addr(1), 500_000_000)],
        )
        .unwrap();
        assert_eq!(
            partial
                .sign_reveal(&seller, &script, SighashType::SingleAnyOneCanPay)
                .unwrap(),
            1
        );
        assert_eq!(partial.input_hash_type(0), Some(SighashType::SingleAnyOneCanPay));

        let mut completed = RawTransaction::from_json(&partial.to_json().unwrap()).unwrap();
        completed.append_input(p2pk_entry(&buyer, 3, 600_000_000), 1);
        completed
            .append_output(&PaymentOutput::new(addr(2), 129_000_000), Network::Testnet)
            .unwrap();
        assert_eq!(completed.sign(&buyer, SighashType::All).unwrap(), 1);
        assert!(completed.is_fully_signed());
        assert_eq!(completed.fee().unwrap(), 1_000_000);

        // seller's signature still checks against the completed transaction
        let unlock = Script::from_bytes(completed.transaction().inputs[0].signature_script.clone())
            .chunks()
            .unwrap();
        let ScriptChunk::Push(sig) = &unlock[0] else {
            panic!("expected signature push");
        };
        let message =
            calc_signature_hash(completed.transaction(), 0, SighashType::SingleAnyOneCanPay).unwrap();
        let raw_sig: [u8; 64] = sig[..64].try_into().unwrap();
        assert!(MockVerifier.verify(&seller.public_key(), &message, &raw_sig, SignatureScheme::Schnorr));
    }

    #[test]
    fn test_fill_input_bounds() {
        let mut raw = RawTransaction::create_partial(Network::Testnet, vec![], vec![]).unwrap();
        assert_eq!(
            raw.fill_input(0, vec![1]).unwrap_err(),
            TxError::InputOutOfRange { index: 0 }
        );
        assert_eq!(raw.input_hash_type(0), None);
        assert!(raw.update_mass() > 0);
    }
}
