//! Signing collaborators
//!
//! Key handling and the signature primitive live outside this crate. A
//! `Signer` holds one private key and produces 64-byte signatures over a
//! 32-byte message; a `SignatureVerifier` checks them. Everything above the
//! primitive (which message, which sighash type, how the signature lands
//! in the unlock script) is done here.

use kiwi_core::{Network, TxError};

use crate::address::pub_key_address;
use crate::entries::ScriptPublicKey;
use crate::script::opcodes::OP_CHECKSIGECDSA;
use crate::script::{pay_to_pub_key_script, SignatureScheme};
use crate::sighash::{calc_signature_hash, SighashType};
use crate::transaction::Transaction;

pub trait Signer: Send + Sync {
    /// 33-byte compressed public key
    fn public_key(&self) -> [u8; 33];

    /// Sign a transaction signing hash. ECDSA signers apply their own
    /// message domain on top of `message`.
    fn sign(&self, message: &[u8; 32], scheme: SignatureScheme) -> Result<[u8; 64], TxError>;

    /// Key as encoded in scripts for `scheme`
    fn script_key(&self, scheme: SignatureScheme) -> Vec<u8> {
        let key = self.public_key();
        match scheme {
            SignatureScheme::Schnorr => key[1..].to_vec(),
            SignatureScheme::Ecdsa => key.to_vec(),
        }
    }

    /// Whether `spk` is a plain pay-to-pubkey lock for this key
    fn owns(&self, spk: &ScriptPublicKey) -> bool {
        [SignatureScheme::Schnorr, SignatureScheme::Ecdsa]
            .into_iter()
            .filter_map(|scheme| pay_to_pub_key_script(&self.public_key(), scheme).ok())
            .any(|script| spk.script() == &script)
    }

    /// Schnorr pay-to-pubkey address of this key
    fn address(&self, network: Network) -> Result<kiwi_core::Address, TxError> {
        pub_key_address(&self.public_key(), network)
    }
}

pub trait SignatureVerifier {
    fn verify(
        &self,
        public_key: &[u8],
        message: &[u8; 32],
        signature: &[u8; 64],
        scheme: SignatureScheme,
    ) -> bool;
}

/// Signature for input `index` with the sighash type byte appended (65 bytes)
pub fn sign_input(
    tx: &Transaction,
    index: usize,
    signer: &dyn Signer,
    hash_type: SighashType,
    scheme: SignatureScheme,
) -> Result<Vec<u8>, TxError> {
    let message = calc_signature_hash(tx, index, hash_type)?;
    let signature = signer.sign(&message, scheme)?;
    let mut out = Vec::with_capacity(65);
    out.extend_from_slice(&signature);
    out.push(hash_type.to_u8());
    Ok(out)
}

/// Scheme implied by a pay-to-pubkey lock
pub(crate) fn p2pk_scheme(spk: &ScriptPublicKey) -> SignatureScheme {
    match spk.script().as_bytes().last() {
        Some(&OP_CHECKSIGECDSA) => SignatureScheme::Ecdsa,
        _ => SignatureScheme::Schnorr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::pay_to_address_script;
    use crate::testing::{p2pk_entry, MockSigner, MockVerifier};
    use crate::transaction::TransactionInput;

    #[test]
    fn test_sign_input_appends_hash_type() {
        let signer = MockSigner::new(1);
        let entry = p2pk_entry(&signer, 1, 1_000);
        let tx = Transaction::new(vec![TransactionInput::from_entry(entry, 1)], vec![], vec![]);

        let sig = sign_input(&tx, 0, &signer, SighashType::SingleAnyOneCanPay, SignatureScheme::Schnorr)
            .unwrap();
        assert_eq!(sig.len(), 65);
        assert_eq!(sig[64], 0x84);

        let message = calc_signature_hash(&tx, 0, SighashType::SingleAnyOneCanPay).unwrap();
        let raw: [u8; 64] = sig[..64].try_into().unwrap();
        assert!(MockVerifier.verify(
            &signer.script_key(SignatureScheme::Schnorr),
            &message,
            &raw,
            SignatureScheme::Schnorr
        ));
    }

    #[test]
    fn test_owns_own_address_script() {
        let signer = MockSigner::new(4);
        let other = MockSigner::new(5);
        let spk = pay_to_address_script(&signer.address(Network::Mainnet).unwrap()).unwrap();
        assert!(signer.owns(&spk));
        assert!(!other.owns(&spk));
        assert_eq!(p2pk_scheme(&spk), SignatureScheme::Schnorr);
    }
}
