//! Deterministic signing doubles for tests
//!
//! `MockSigner` derives a key from a seed byte and "signs" with a keyed
//! 64-byte blake2b over the x-only key and message. `MockVerifier` checks
//! by recomputing. Not a signature scheme; only useful to prove that the
//! right key signed the right message.

use kiwi_core::{Network, Sompi, TxError, TxId};

use crate::address::pub_key_address;
use crate::entries::{ScriptPublicKey, UtxoEntry};
use crate::hashing::blake2b_256;
use crate::script::{pay_to_pub_key_script, SignatureScheme};
use crate::signer::{SignatureVerifier, Signer};

fn mock_signature(xonly: &[u8], message: &[u8; 32], scheme: SignatureScheme) -> [u8; 64] {
    let hash = blake2b_simd::Params::new()
        .hash_length(64)
        .key(scheme.as_str().as_bytes())
        .to_state()
        .update(xonly)
        .update(message)
        .finalize();
    let mut out = [0u8; 64];
    out.copy_from_slice(hash.as_bytes());
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockSigner {
    seed: u8,
}

impl MockSigner {
    pub fn new(seed: u8) -> Self {
        Self { seed }
    }

    pub fn xonly(&self) -> [u8; 32] {
        blake2b_256(&[self.seed; 8])
    }
}

impl Signer for MockSigner {
    fn public_key(&self) -> [u8; 33] {
        let mut key = [0u8; 33];
        key[0] = 0x02;
        key[1..].copy_from_slice(&self.xonly());
        key
    }

    fn sign(&self, message: &[u8; 32], scheme: SignatureScheme) -> Result<[u8; 64], TxError> {
        Ok(mock_signature(&self.xonly(), message, scheme))
    }
}

/// Signer whose `sign` always fails
#[derive(Debug, Clone, Copy)]
pub struct FailingSigner(pub MockSigner);

impl Signer for FailingSigner {
    fn public_key(&self) -> [u8; 33] {
        self.0.public_key()
    }

    fn sign(&self, _message: &[u8; 32], _scheme: SignatureScheme) -> Result<[u8; 64], TxError> {
        Err(TxError::Signing {
            message: "signer unavailable".to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MockVerifier;

impl SignatureVerifier for MockVerifier {
    fn verify(
        &self,
        public_key: &[u8],
        message: &[u8; 32],
        signature: &[u8; 64],
        scheme: SignatureScheme,
    ) -> bool {
        let xonly = match public_key.len() {
            32 => public_key,
            33 => &public_key[1..],
            _ => return false,
        };
        mock_signature(xonly, message, scheme) == *signature
    }
}

/// Well-formed transaction id derived from `seed`
pub fn txid(seed: u8) -> TxId {
    TxId::from_bytes([seed; 32])
}

/// Pay-to-pubkey entry owned by `signer`, at outpoint `(txid(seed), 0)`
pub fn p2pk_entry(signer: &MockSigner, seed: u8, amount: Sompi) -> UtxoEntry {
    p2pk_entry_on(signer, Network::Testnet, seed, amount)
}

pub fn p2pk_entry_on(signer: &MockSigner, network: Network, seed: u8, amount: Sompi) -> UtxoEntry {
    let script = pay_to_pub_key_script(&signer.public_key(), SignatureScheme::Schnorr)
        .expect("mock keys are valid");
    let address = pub_key_address(&signer.public_key(), network).expect("mock keys are valid");
    let mut entry = UtxoEntry::synthetic(address, txid(seed), 0, ScriptPublicKey::new(0, script), amount);
    entry.block_daa_score = 1_000 + seed as u64;
    entry
}
