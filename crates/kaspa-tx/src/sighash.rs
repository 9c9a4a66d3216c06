//! Signature hashing
//!
//! The sighash type selects which parts of the transaction a signature
//! commits to:
//!
//! - `All`: every input and output.
//! - `None`: every input, no outputs.
//! - `Single`: every input, and only the output at the signer's index.
//! - `*AnyOneCanPay`: only the signer's own input; others may be added later.
//!
//! `SingleAnyOneCanPay` is what makes partial signing for an atomic exchange
//! work: the seller commits to input 0 and output 0 only, so the buyer can
//! append inputs and outputs without invalidating that signature.

use kiwi_core::TxError;

use crate::hashing::{Hasher, ZERO_HASH};
use crate::transaction::{outpoint_bytes, write_output, Transaction};

const SIGHASH_ALL: u8 = 0b0000_0001;
const SIGHASH_NONE: u8 = 0b0000_0010;
const SIGHASH_SINGLE: u8 = 0b0000_0100;
const SIGHASH_ANYONECANPAY: u8 = 0b1000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SighashType {
    #[default]
    All,
    None,
    Single,
    AllAnyOneCanPay,
    NoneAnyOneCanPay,
    SingleAnyOneCanPay,
}

impl SighashType {
    pub fn to_u8(self) -> u8 {
        match self {
            Self::All => SIGHASH_ALL,
            Self::None => SIGHASH_NONE,
            Self::Single => SIGHASH_SINGLE,
            Self::AllAnyOneCanPay => SIGHASH_ALL | SIGHASH_ANYONECANPAY,
            Self::NoneAnyOneCanPay => SIGHASH_NONE | SIGHASH_ANYONECANPAY,
            Self::SingleAnyOneCanPay => SIGHASH_SINGLE | SIGHASH_ANYONECANPAY,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            SIGHASH_ALL => Some(Self::All),
            SIGHASH_NONE => Some(Self::None),
            SIGHASH_SINGLE => Some(Self::Single),
            0x81 => Some(Self::AllAnyOneCanPay),
            0x82 => Some(Self::NoneAnyOneCanPay),
            0x84 => Some(Self::SingleAnyOneCanPay),
            _ => None,
        }
    }

    pub fn is_anyone_can_pay(self) -> bool {
        self.to_u8() & SIGHASH_ANYONECANPAY != 0
    }

    pub fn is_none(self) -> bool {
        self.to_u8() & 0b0111_1111 == SIGHASH_NONE
    }

    pub fn is_single(self) -> bool {
        self.to_u8() & 0b0111_1111 == SIGHASH_SINGLE
    }
}

fn signing_hasher() -> Hasher {
    Hasher::keyed(b"TransactionSigningHash")
}

fn previous_outputs_hash(tx: &Transaction, hash_type: SighashType) -> [u8; 32] {
    if hash_type.is_anyone_can_pay() {
        return ZERO_HASH;
    }
    let mut h = signing_hasher();
    for input in &tx.inputs {
        h.update(&outpoint_bytes(&input.previous_outpoint))
            .write_u32(input.previous_outpoint.index);
    }
    h.finalize()
}

fn sequences_hash(tx: &Transaction, hash_type: SighashType) -> [u8; 32] {
    if hash_type.is_single() || hash_type.is_anyone_can_pay() || hash_type.is_none() {
        return ZERO_HASH;
    }
    let mut h = signing_hasher();
    for input in &tx.inputs {
        h.write_u64(input.sequence);
    }
    h.finalize()
}

fn sig_op_counts_hash(tx: &Transaction, hash_type: SighashType) -> [u8; 32] {
    if hash_type.is_anyone_can_pay() {
        return ZERO_HASH;
    }
    let mut h = signing_hasher();
    for input in &tx.inputs {
        h.write_u8(input.sig_op_count);
    }
    h.finalize()
}

fn outputs_hash(tx: &Transaction, hash_type: SighashType, input_index: usize) -> [u8; 32] {
    if hash_type.is_none() {
        return ZERO_HASH;
    }
    if hash_type.is_single() {
        return match tx.outputs.get(input_index) {
            Some(output) => {
                let mut h = signing_hasher();
                write_output(&mut h, output);
                h.finalize()
            }
            None => ZERO_HASH,
        };
    }
    let mut h = signing_hasher();
    for output in &tx.outputs {
        write_output(&mut h, output);
    }
    h.finalize()
}

fn payload_hash(tx: &Transaction) -> [u8; 32] {
    if tx.payload.is_empty() && tx.subnetwork_id.iter().all(|b| *b == 0) {
        return ZERO_HASH;
    }
    let mut h = signing_hasher();
    h.write_var_bytes(&tx.payload);
    h.finalize()
}

/// Message a signer signs for `input_index` under `hash_type`
pub fn calc_signature_hash(
    tx: &Transaction,
    input_index: usize,
    hash_type: SighashType,
) -> Result<[u8; 32], TxError> {
    let input = tx
        .inputs
        .get(input_index)
        .ok_or(TxError::InputOutOfRange { index: input_index })?;
    let utxo = input
        .utxo
        .as_ref()
        .ok_or(TxError::MissingUtxo { index: input_index })?;

    let mut h = signing_hasher();
    h.write_u16(tx.version)
        .update(&previous_outputs_hash(tx, hash_type))
        .update(&sequences_hash(tx, hash_type))
        .update(&sig_op_counts_hash(tx, hash_type))
        .update(&outpoint_bytes(&input.previous_outpoint))
        .write_u32(input.previous_outpoint.index)
        .write_u16(utxo.script_public_key.version())
        .write_var_bytes(utxo.script_public_key.script().as_bytes())
        .write_u64(utxo.amount)
        .write_u64(input.sequence)
        .write_u8(input.sig_op_count)
        .update(&outputs_hash(tx, hash_type, input_index))
        .write_u64(tx.lock_time)
        .update(&tx.subnetwork_id)
        .write_u64(tx.gas)
        .update(&payload_hash(tx))
        .write_u8(hash_type.to_u8());
    Ok(h.finalize())
}
