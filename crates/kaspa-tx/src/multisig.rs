//! Threshold (m-of-n) signing
//!
//! One algorithm for both coordination styles. Every signer contributes a
//! `PartialSignatures` (one signature per threshold input) over the same
//! unsigned transaction:
//!
//! - sequentially, by loading the serialized `MultiSignTransaction`, calling
//!   `sign`, and passing the JSON on;
//! - in parallel, by calling `sign_messages` on their own copy and handing
//!   the result to whoever combines.
//!
//! `finalize` orders contributions by the redeem script's key order, takes
//! the first `m` per input and writes `<sig_1> .. <sig_m> <redeem>` into the
//! unlock field.

use kiwi_core::{Result, ScriptError, TxError};
use serde::{Deserialize, Serialize};

use crate::address::script_hash_script_public_key;
use crate::script::{ScriptBuilder, ScriptChunk, Script, ThresholdScript};
use crate::serde_helpers::hex_bytes;
use crate::sighash::{calc_signature_hash, SighashType};
use crate::signer::{sign_input, SignatureVerifier, Signer};
use crate::transaction::Transaction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSignature {
    pub input: usize,
    /// 64-byte signature followed by the sighash type byte
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

/// One signer's contribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialSignatures {
    /// Key as encoded in the redeem script, hex
    pub public_key: String,
    pub signatures: Vec<InputSignature>,
}

impl PartialSignatures {
    pub fn signature_for(&self, input: usize) -> Option<&[u8]> {
        self.signatures
            .iter()
            .find(|s| s.input == input)
            .map(|s| s.signature.as_slice())
    }
}

/// Signatures for `input` in key order, truncated to the threshold
pub fn combine_signatures(
    threshold: &ThresholdScript,
    partials: &[PartialSignatures],
    input: usize,
) -> std::result::Result<Vec<Vec<u8>>, ScriptError> {
    let mut ordered = Vec::with_capacity(partials.len());
    for partial in partials {
        let key = hex::decode(&partial.public_key).map_err(|_| ScriptError::UnknownSigner {
            key: partial.public_key.clone(),
        })?;
        let position = threshold
            .key_position(&key)
            .ok_or_else(|| ScriptError::UnknownSigner {
                key: partial.public_key.clone(),
            })?;
        if let Some(sig) = partial.signature_for(input) {
            ordered.push((position, sig.to_vec()));
        }
    }
    ordered.sort_by_key(|(position, _)| *position);
    ordered.dedup_by_key(|(position, _)| *position);

    if ordered.len() < threshold.required() {
        return Err(ScriptError::NotEnoughSignatures {
            required: threshold.required(),
            provided: ordered.len(),
        });
    }
    Ok(ordered
        .into_iter()
        .take(threshold.required())
        .map(|(_, sig)| sig)
        .collect())
}

/// Unsigned transaction plus the contributions collected so far
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiSignTransaction {
    transaction: Transaction,
    #[serde(with = "hex_bytes")]
    redeem_script: Vec<u8>,
    #[serde(default)]
    partials: Vec<PartialSignatures>,
}

impl MultiSignTransaction {
    pub fn new(transaction: Transaction, redeem: &ThresholdScript) -> Self {
        Self {
            transaction,
            redeem_script: redeem.script().as_bytes().to_vec(),
            partials: Vec::new(),
        }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn partials(&self) -> &[PartialSignatures] {
        &self.partials
    }

    pub fn threshold(&self) -> std::result::Result<ThresholdScript, ScriptError> {
        ThresholdScript::parse(&Script::from_bytes(self.redeem_script.clone()))
    }

    /// Inputs locked to the redeem script's P2SH address
    pub fn threshold_inputs(&self) -> Vec<usize> {
        let spk = script_hash_script_public_key(&Script::from_bytes(self.redeem_script.clone()));
        self.transaction
            .inputs
            .iter()
            .enumerate()
            .filter(|(_, input)| {
                input
                    .utxo
                    .as_ref()
                    .is_some_and(|u| u.script_public_key == spk)
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Produce `signer`'s contribution without recording it
    pub fn sign_messages(&self, signer: &dyn Signer) -> Result<PartialSignatures> {
        let threshold = self.threshold()?;
        let key = signer.script_key(threshold.scheme());
        if threshold.key_position(&key).is_none() {
            return Err(ScriptError::UnknownSigner {
                key: hex::encode(&key),
            }
            .into());
        }

        let signatures = self
            .threshold_inputs()
            .into_iter()
            .map(|input| {
                sign_input(
                    &self.transaction,
                    input,
                    signer,
                    SighashType::All,
                    threshold.scheme(),
                )
                .map(|signature| InputSignature { input, signature })
            })
            .collect::<std::result::Result<Vec<_>, TxError>>()?;

        Ok(PartialSignatures {
            public_key: hex::encode(key),
            signatures,
        })
    }

    /// Sign and record; re-signing replaces the signer's earlier contribution
    pub fn sign(&mut self, signer: &dyn Signer) -> Result<()> {
        let partial = self.sign_messages(signer)?;
        self.combine([partial])
    }

    /// Record contributions produced elsewhere
    pub fn combine(&mut self, partials: impl IntoIterator<Item = PartialSignatures>) -> Result<()> {
        let threshold = self.threshold()?;
        for partial in partials {
            let known = hex::decode(&partial.public_key)
                .ok()
                .and_then(|key| threshold.key_position(&key))
                .is_some();
            if !known {
                return Err(ScriptError::UnknownSigner {
                    key: partial.public_key,
                }
                .into());
            }
            if let Some(bad) = partial
                .signatures
                .iter()
                .find(|s| s.input >= self.transaction.inputs.len())
            {
                return Err(TxError::InputOutOfRange { index: bad.input }.into());
            }
            self.partials.retain(|p| p.public_key != partial.public_key);
            self.partials.push(partial);
        }
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.threshold()
            .map(|t| self.partials.len() >= t.required())
            .unwrap_or(false)
    }

    /// Write the threshold unlocks and return the signed transaction
    pub fn finalize(self) -> Result<Transaction> {
        let threshold = self.threshold()?;
        let inputs = self.threshold_inputs();
        let mut tx = self.transaction;
        for index in inputs {
            let signatures = combine_signatures(&threshold, &self.partials, index)?;
            let mut builder = ScriptBuilder::new();
            for sig in &signatures {
                builder.add_data(sig);
            }
            builder.add_data(&self.redeem_script);
            tx.inputs[index].signature_script = builder.build().into_bytes();
        }
        Ok(tx)
    }

    pub fn to_json(&self) -> std::result::Result<String, TxError> {
        serde_json::to_string(self).map_err(|e| TxError::SerializationFailed {
            message: e.to_string(),
        })
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, TxError> {
        serde_json::from_str(json).map_err(|e| TxError::SerializationFailed {
            message: e.to_string(),
        })
    }
}

/// Check a threshold unlock the way `OP_CHECKMULTISIG` does: signatures are
/// matched against keys walking forward only, so they must follow key order.
pub fn verify_threshold_unlock(
    tx: &Transaction,
    index: usize,
    verifier: &dyn SignatureVerifier,
) -> Result<()> {
    let input = tx
        .inputs
        .get(index)
        .ok_or(TxError::InputOutOfRange { index })?;
    let utxo = input.utxo.as_ref().ok_or(TxError::MissingUtxo { index })?;

    let mut pushes = Script::from_bytes(input.signature_script.clone())
        .chunks()?
        .into_iter()
        .map(|chunk| match chunk {
            ScriptChunk::Push(data) => Ok(data),
            ScriptChunk::Op(_) => Err(ScriptError::Malformed {
                message: "unlock contains a non-push opcode".to_string(),
            }),
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let redeem = Script::from_bytes(pushes.pop().ok_or_else(|| ScriptError::Malformed {
        message: "empty unlock".to_string(),
    })?);
    if script_hash_script_public_key(&redeem) != utxo.script_public_key {
        return Err(ScriptError::Malformed {
            message: "redeem script does not match the spent output".to_string(),
        }
        .into());
    }
    let threshold = ThresholdScript::parse(&redeem)?;
    if pushes.len() < threshold.required() {
        return Err(ScriptError::NotEnoughSignatures {
            required: threshold.required(),
            provided: pushes.len(),
        }
        .into());
    }

    let checks = |sig: &[u8], key: &[u8]| -> Result<bool> {
        let (raw, hash_type) = match sig {
            [raw @ .., hash_type] if raw.len() == 64 => (raw, *hash_type),
            _ => return Ok(false),
        };
        let Some(hash_type) = SighashType::from_u8(hash_type) else {
            return Ok(false);
        };
        let message = calc_signature_hash(tx, index, hash_type)?;
        let mut signature = [0u8; 64];
        signature.copy_from_slice(raw);
        Ok(verifier.verify(key, &message, &signature, threshold.scheme()))
    };

    let keys = threshold.keys();
    let mut next_key = 0;
    for sig in &pushes {
        let mut matched = false;
        while next_key < keys.len() {
            let key = &keys[next_key];
            next_key += 1;
            if checks(sig, key)? {
                matched = true;
                break;
            }
        }
        if !matched {
            for key in keys {
                if checks(sig, key)? {
                    return Err(ScriptError::KeyOrderMismatch.into());
                }
            }
            return Err(ScriptError::VerificationFailed { input: index }.into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::script_hash_address;
    use crate::entries::{ScriptPublicKey, UtxoEntry};
    use crate::script::{pay_to_pub_key_script, threshold_script, SignatureScheme};
    use crate::testing::{txid, MockSigner, MockVerifier};
    use crate::transaction::{TransactionInput, TransactionOutput};
    use kiwi_core::{Error, Network};

    fn signers() -> Vec<MockSigner> {
        (1..=3).map(MockSigner::new).collect()
    }

    fn two_of_three() -> ThresholdScript {
        let keys: Vec<[u8; 33]> = signers().iter().map(|s| s.public_key()).collect();
        threshold_script(2, &keys, SignatureScheme::Schnorr).unwrap()
    }

    fn spending_tx(redeem: &ThresholdScript) -> Transaction {
        let entry = UtxoEntry::synthetic(
            script_hash_address(redeem.script(), Network::Testnet),
            txid(9),
            0,
            script_hash_script_public_key(redeem.script()),
            50_000,
        );
        let dest = pay_to_pub_key_script(&MockSigner::new(7).public_key(), SignatureScheme::Schnorr)
            .unwrap();
        Transaction::new(
            vec![TransactionInput::from_entry(entry, 3)],
            vec![TransactionOutput::new(40_000, ScriptPublicKey::new(0, dest))],
            vec![],
        )
    }

    #[test]
    fn test_any_two_of_three_verify() {
        let redeem = two_of_three();
        let s = signers();
        for (a, b) in [(0, 1), (0, 2), (1, 2), (2, 0)] {
            let mut mst = MultiSignTransaction::new(spending_tx(&redeem), &redeem);
            mst.sign(&s[a]).unwrap();
            mst.sign(&s[b]).unwrap();
            assert!(mst.is_complete());
            let tx = mst.finalize().unwrap();
            verify_threshold_unlock(&tx, 0, &MockVerifier).unwrap();
        }
    }

    #[test]
    fn test_one_signature_is_not_enough() {
        let redeem = two_of_three();
        let mut mst = MultiSignTransaction::new(spending_tx(&redeem), &redeem);
        mst.sign(&signers()[1]).unwrap();
        assert!(!mst.is_complete());
        let err = mst.finalize().unwrap_err();
        assert!(matches!(
            err,
            Error::Script(ScriptError::NotEnoughSignatures {
                required: 2,
                provided: 1
            })
        ));
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let redeem = two_of_three();
        let s = signers();

        // sequential: JSON passed from signer to signer
        let mut first = MultiSignTransaction::new(spending_tx(&redeem), &redeem);
        first.sign(&s[2]).unwrap();
        let mut second = MultiSignTransaction::from_json(&first.to_json().unwrap()).unwrap();
        second.sign(&s[0]).unwrap();
        let sequential = second.finalize().unwrap();

        // parallel: independent contributions merged by a combiner
        let base = MultiSignTransaction::new(spending_tx(&redeem), &redeem);
        let p0 = base.sign_messages(&s[0]).unwrap();
        let p2 = base.sign_messages(&s[2]).unwrap();
        let mut combiner = base.clone();
        combiner.combine([p2, p0]).unwrap();
        let parallel = combiner.finalize().unwrap();

        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_unknown_signer_rejected() {
        let redeem = two_of_three();
        let mut mst = MultiSignTransaction::new(spending_tx(&redeem), &redeem);
        let err = mst.sign(&MockSigner::new(42)).unwrap_err();
        assert!(matches!(err, Error::Script(ScriptError::UnknownSigner { .. })));
    }

    #[test]
    fn test_out_of_order_unlock_fails() {
        let redeem = two_of_three();
        let s = signers();
        let base = MultiSignTransaction::new(spending_tx(&redeem), &redeem);
        let sig0 = base.sign_messages(&s[0]).unwrap().signatures[0].signature.clone();
        let sig1 = base.sign_messages(&s[1]).unwrap().signatures[0].signature.clone();

        let mut tx = base.transaction().clone();
        tx.inputs[0].signature_script = ScriptBuilder::new()
            .add_data(&sig1)
            .add_data(&sig0)
            .add_data(redeem.script().as_bytes())
            .build()
            .into_bytes();
        let err = verify_threshold_unlock(&tx, 0, &MockVerifier).unwrap_err();
        assert!(matches!(err, Error::Script(ScriptError::KeyOrderMismatch)));
    }

    #[test]
    fn test_combine_signatures_orders_by_key() {
        let redeem = two_of_three();
        let s = signers();
        let base = MultiSignTransaction::new(spending_tx(&redeem), &redeem);
        let partials = vec![
            base.sign_messages(&s[2]).unwrap(),
            base.sign_messages(&s[1]).unwrap(),
            base.sign_messages(&s[0]).unwrap(),
        ];
        let combined = combine_signatures(&redeem, &partials, 0).unwrap();
        assert_eq!(combined.len(), 2);
        assert_eq!(combined[0], partials[2].signatures[0].signature);
        assert_eq!(combined[1], partials[1].signatures[0].signature);
    }
}
