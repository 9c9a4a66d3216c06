//! kaspa-tx: Transaction building utilities for Kaspa
//!
//! Script construction (single-key, threshold and metadata-carrying),
//! address encoding, the UTXO entry/output model, signature hashing,
//! mass estimation and the pending/raw/multi-sign transaction builders.
//! Nothing in this crate performs I/O.

pub mod address;
pub mod builder;
pub mod entries;
pub mod entry_selector;
pub mod hashing;
pub mod mass;
pub mod multisig;
pub mod raw;
pub mod script;
pub mod serde_helpers;
pub mod sighash;
pub mod signer;
pub mod transaction;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use address::{
    address_from_script_public_key, decode_address, encode_address, pay_to_address_script,
    validate_address, AddressError, AddressVersion,
};
pub use builder::{GeneratorSummary, PendingTransaction, TransactionBuilder};
pub use entries::{Outpoint, PaymentOutput, ScriptPublicKey, UtxoEntry};
pub use entry_selector::{
    select_entries, select_entries_with_fee, EntrySelectorError, SelectedEntries,
};
pub use multisig::{
    combine_signatures, verify_threshold_unlock, InputSignature, MultiSignTransaction,
    PartialSignatures,
};
pub use raw::RawTransaction;
pub use script::{
    lock_time_script, metadata_script, pay_to_script_hash_script,
    pay_to_script_hash_signature_script, threshold_metadata_script, threshold_script, Script,
    ScriptBuilder, SignatureScheme, ThresholdScript,
};
pub use sighash::{calc_signature_hash, SighashType};
pub use signer::{sign_input, SignatureVerifier, Signer};
pub use transaction::{Transaction, TransactionInput, TransactionOutput};
