//! Mass estimation
//!
//! mass = serialized bytes × 1 + script-public-key bytes × 10 + sig ops × 1000.
//! Unsigned inputs are sized with an estimated unlock so the mass (and the
//! fee derived from it) does not change once signatures are filled in.

use kiwi_core::Sompi;

use crate::script::Script;
use crate::transaction::{Transaction, TransactionInput, TransactionOutput};

pub const MASS_PER_TX_BYTE: u64 = 1;
pub const MASS_PER_SCRIPT_PUB_KEY_BYTE: u64 = 10;
pub const MASS_PER_SIG_OP: u64 = 1000;

/// Largest mass a node relays
pub const MAXIMUM_STANDARD_TRANSACTION_MASS: u64 = 100_000;

/// `OP_DATA_65 <64-byte signature || sighash byte>`
pub const SIGNATURE_UNLOCK_SIZE: usize = 66;

// version, input and output counts, lock time, subnetwork, gas,
// payload hash and payload length
const TX_OVERHEAD_SIZE: u64 = 2 + 8 + 8 + 8 + 20 + 8 + 32 + 8;

// outpoint, script length, sequence, sig op count
const INPUT_BASE_SIZE: u64 = 32 + 4 + 8 + 8 + 1;

// value, script version, script length
const OUTPUT_BASE_SIZE: u64 = 8 + 2 + 8;

/// Bytes taken by a canonical push of `len` bytes
pub fn push_size(len: usize) -> usize {
    match len {
        0..=75 => 1 + len,
        76..=0xff => 2 + len,
        0x100..=0xffff => 3 + len,
        _ => 5 + len,
    }
}

/// Unlock size for a P2SH spend with `signatures` signatures and `redeem`
pub fn script_unlock_size(redeem: &Script, signatures: usize) -> usize {
    signatures * SIGNATURE_UNLOCK_SIZE + push_size(redeem.len())
}

pub fn input_size(unlock_size: usize) -> u64 {
    INPUT_BASE_SIZE + unlock_size as u64
}

pub fn output_size(output: &TransactionOutput) -> u64 {
    OUTPUT_BASE_SIZE + output.script_public_key.script().len() as u64
}

/// Mass of one input with the given unlock size and sig op count
pub fn input_mass(unlock_size: usize, sig_op_count: u8) -> u64 {
    input_size(unlock_size) * MASS_PER_TX_BYTE + sig_op_count as u64 * MASS_PER_SIG_OP
}

pub fn output_mass(output: &TransactionOutput) -> u64 {
    output_size(output) * MASS_PER_TX_BYTE
        + (2 + output.script_public_key.script().len() as u64) * MASS_PER_SCRIPT_PUB_KEY_BYTE
}

/// Mass of a transaction with no inputs or outputs
pub fn base_mass(payload_len: usize) -> u64 {
    (TX_OVERHEAD_SIZE + payload_len as u64) * MASS_PER_TX_BYTE
}

fn effective_unlock(input: &TransactionInput, unlock_size: usize) -> usize {
    if input.is_signed() {
        input.signature_script.len()
    } else {
        unlock_size
    }
}

/// Serialized size, with `unlock_size` standing in for unsigned inputs
pub fn serialized_size(tx: &Transaction, unlock_size: usize) -> u64 {
    TX_OVERHEAD_SIZE
        + tx.payload.len() as u64
        + tx
            .inputs
            .iter()
            .map(|i| input_size(effective_unlock(i, unlock_size)))
            .sum::<u64>()
        + tx.outputs.iter().map(output_size).sum::<u64>()
}

pub fn compute_mass(tx: &Transaction, unlock_size: usize) -> u64 {
    let spk_bytes: u64 = tx
        .outputs
        .iter()
        .map(|o| 2 + o.script_public_key.script().len() as u64)
        .sum();
    let sig_ops: u64 = tx.inputs.iter().map(|i| i.sig_op_count as u64).sum();
    serialized_size(tx, unlock_size) * MASS_PER_TX_BYTE
        + spk_bytes * MASS_PER_SCRIPT_PUB_KEY_BYTE
        + sig_ops * MASS_PER_SIG_OP
}

pub fn mass_fee(mass: u64, fee_per_gram: Sompi) -> Sompi {
    mass.saturating_mul(fee_per_gram)
}
