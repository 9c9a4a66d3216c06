//! Script construction
//!
//! A script is an ordered sequence of opcodes and length-prefixed data
//! pushes. This module builds the locking scripts used by the commit/reveal
//! flow:
//!
//! - single-key (`metadata_script`, `lock_time_script`), where the owner's
//!   checksig is followed by an `OP_FALSE OP_IF ... OP_ENDIF` envelope that
//!   never executes but is committed into the script hash;
//! - m-of-n threshold (`threshold_script`), optionally carrying the same
//!   envelope (`threshold_metadata_script`);
//! - the pay-to-script-hash lock and unlock wrappers.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use kiwi_core::ScriptError;

use crate::hashing::blake2b_256;

pub mod opcodes {
    pub const OP_FALSE: u8 = 0x00;
    pub const OP_0: u8 = 0x00;
    pub const OP_DATA_1: u8 = 0x01;
    pub const OP_DATA_32: u8 = 0x20;
    pub const OP_DATA_33: u8 = 0x21;
    pub const OP_DATA_75: u8 = 0x4b;
    pub const OP_PUSHDATA1: u8 = 0x4c;
    pub const OP_PUSHDATA2: u8 = 0x4d;
    pub const OP_PUSHDATA4: u8 = 0x4e;
    pub const OP_1NEGATE: u8 = 0x4f;
    pub const OP_RESERVED: u8 = 0x50;
    pub const OP_1: u8 = 0x51;
    pub const OP_16: u8 = 0x60;
    pub const OP_IF: u8 = 0x63;
    pub const OP_ENDIF: u8 = 0x68;
    pub const OP_EQUAL: u8 = 0x87;
    pub const OP_CHECKMULTISIGECDSA: u8 = 0xa9;
    pub const OP_BLAKE2B: u8 = 0xaa;
    pub const OP_CHECKSIGECDSA: u8 = 0xab;
    pub const OP_CHECKSIG: u8 = 0xac;
    pub const OP_CHECKMULTISIG: u8 = 0xae;
    pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb0;
}

use opcodes::*;

/// Upper bound on keys in a threshold script
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

// =============================================================================
// Script
// =============================================================================

#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Script(Vec<u8>);

/// One parsed element of a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptChunk {
    Op(u8),
    Push(Vec<u8>),
}

impl ScriptChunk {
    /// Integer value of a small-int opcode or a minimally encoded number push
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Op(OP_0) => Some(0),
            Self::Op(OP_1NEGATE) => Some(-1),
            Self::Op(op) if (OP_1..=OP_16).contains(op) => Some((op - OP_RESERVED) as i64),
            Self::Push(data) => decode_script_num(data),
            _ => None,
        }
    }
}

impl Script {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, ScriptError> {
        hex::decode(hex_str)
            .map(Self)
            .map_err(|e| ScriptError::Malformed {
                message: format!("invalid hex: {}", e),
            })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// blake2b-256 of the script bytes, committed to by its P2SH address
    pub fn script_hash(&self) -> [u8; 32] {
        blake2b_256(&self.0)
    }

    /// Split into opcodes and data pushes
    pub fn chunks(&self) -> Result<Vec<ScriptChunk>, ScriptError> {
        let bytes = &self.0;
        let mut chunks = Vec::new();
        let mut pos = 0;

        while pos < bytes.len() {
            let op = bytes[pos];
            pos += 1;

            let len = match op {
                OP_DATA_1..=OP_DATA_75 => op as usize,
                OP_PUSHDATA1 => read_len(bytes, &mut pos, 1)?,
                OP_PUSHDATA2 => read_len(bytes, &mut pos, 2)?,
                OP_PUSHDATA4 => read_len(bytes, &mut pos, 4)?,
                _ => {
                    chunks.push(ScriptChunk::Op(op));
                    continue;
                }
            };

            let end = pos
                .checked_add(len)
                .filter(|end| *end <= bytes.len())
                .ok_or_else(|| ScriptError::Malformed {
                    message: format!("push of {} bytes at offset {} runs past end", len, pos),
                })?;
            chunks.push(ScriptChunk::Push(bytes[pos..end].to_vec()));
            pos = end;
        }

        Ok(chunks)
    }
}

fn read_len(bytes: &[u8], pos: &mut usize, width: usize) -> Result<usize, ScriptError> {
    let raw = bytes
        .get(*pos..*pos + width)
        .ok_or_else(|| ScriptError::Malformed {
            message: "truncated push length".to_string(),
        })?;
    *pos += width;
    Ok(raw
        .iter()
        .rev()
        .fold(0usize, |acc, b| (acc << 8) | *b as usize))
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({})", self.to_hex())
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Appends opcodes and canonical (minimal) data pushes
#[derive(Debug, Default)]
pub struct ScriptBuilder {
    script: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_op(&mut self, op: u8) -> &mut Self {
        self.script.push(op);
        self
    }

    pub fn add_ops(&mut self, ops: &[u8]) -> &mut Self {
        self.script.extend_from_slice(ops);
        self
    }

    /// Push data using the smallest encoding
    pub fn add_data(&mut self, data: &[u8]) -> &mut Self {
        match data {
            [] | [0] => self.add_op(OP_0),
            [n] if *n <= 16 => self.add_op(OP_RESERVED + n),
            [0x81] => self.add_op(OP_1NEGATE),
            _ => {
                self.script.extend_from_slice(&push_prefix(data.len()));
                self.script.extend_from_slice(data);
                self
            }
        }
    }

    /// Push an integer as a small-int opcode or a script number
    pub fn add_i64(&mut self, value: i64) -> &mut Self {
        match value {
            0 => self.add_op(OP_0),
            -1 => self.add_op(OP_1NEGATE),
            1..=16 => self.add_op(OP_RESERVED + value as u8),
            _ => {
                let encoded = encode_script_num(value);
                self.script.extend_from_slice(&push_prefix(encoded.len()));
                self.script.extend_from_slice(&encoded);
                self
            }
        }
    }

    pub fn add_lock_time(&mut self, lock_time: u64) -> Result<&mut Self, ScriptError> {
        let value = i64::try_from(lock_time).map_err(|_| ScriptError::Malformed {
            message: format!("lock time {} does not fit a script number", lock_time),
        })?;
        Ok(self.add_i64(value))
    }

    pub fn build(&self) -> Script {
        Script(self.script.clone())
    }
}

fn push_prefix(len: usize) -> Vec<u8> {
    if len <= OP_DATA_75 as usize {
        vec![len as u8]
    } else if len <= u8::MAX as usize {
        vec![OP_PUSHDATA1, len as u8]
    } else if len <= u16::MAX as usize {
        let mut prefix = vec![OP_PUSHDATA2];
        prefix.extend_from_slice(&(len as u16).to_le_bytes());
        prefix
    } else {
        let mut prefix = vec![OP_PUSHDATA4];
        prefix.extend_from_slice(&(len as u32).to_le_bytes());
        prefix
    }
}

/// Minimal little-endian sign-magnitude encoding
fn encode_script_num(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }
    let negative = value < 0;
    let mut abs = value.unsigned_abs();
    let mut out = Vec::new();
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    if out.last().is_some_and(|b| b & 0x80 != 0) {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        if let Some(last) = out.last_mut() {
            *last |= 0x80;
        }
    }
    out
}

fn decode_script_num(data: &[u8]) -> Option<i64> {
    if data.len() > 8 {
        return None;
    }
    let Some((&last, _)) = data.split_last() else {
        return Some(0);
    };
    let mut value: i64 = 0;
    for (i, b) in data.iter().enumerate() {
        let b = if i == data.len() - 1 { b & 0x7f } else { *b };
        value |= (b as i64) << (8 * i);
    }
    Some(if last & 0x80 != 0 { -value } else { value })
}

// =============================================================================
// Keys and schemes
// =============================================================================

/// Signature scheme, selecting key encoding and checksig opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SignatureScheme {
    #[default]
    Schnorr,
    Ecdsa,
}

impl SignatureScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schnorr => "schnorr",
            Self::Ecdsa => "ecdsa",
        }
    }

    /// Schnorr takes x-only keys (a compressed key loses its parity byte);
    /// ECDSA takes 33-byte compressed keys.
    pub fn encode_key(&self, key: &[u8]) -> Result<Vec<u8>, ScriptError> {
        let invalid = || ScriptError::InvalidKey {
            scheme: self.as_str(),
            len: key.len(),
        };
        match (self, key.len()) {
            (Self::Schnorr, 32) => Ok(key.to_vec()),
            (Self::Schnorr, 33) if matches!(key[0], 0x02 | 0x03) => Ok(key[1..].to_vec()),
            (Self::Ecdsa, 33) if matches!(key[0], 0x02 | 0x03) => Ok(key.to_vec()),
            _ => Err(invalid()),
        }
    }

    pub fn checksig_op(&self) -> u8 {
        match self {
            Self::Schnorr => OP_CHECKSIG,
            Self::Ecdsa => OP_CHECKSIGECDSA,
        }
    }

    pub fn checkmultisig_op(&self) -> u8 {
        match self {
            Self::Schnorr => OP_CHECKMULTISIG,
            Self::Ecdsa => OP_CHECKMULTISIGECDSA,
        }
    }

    pub fn key_len(&self) -> usize {
        match self {
            Self::Schnorr => 32,
            Self::Ecdsa => 33,
        }
    }
}

// =============================================================================
// Standard locking / unlocking scripts
// =============================================================================

/// `<key> OP_CHECKSIG` (or `OP_CHECKSIGECDSA`)
pub fn pay_to_pub_key_script(key: &[u8], scheme: SignatureScheme) -> Result<Script, ScriptError> {
    let key = scheme.encode_key(key)?;
    Ok(ScriptBuilder::new()
        .add_data(&key)
        .add_op(scheme.checksig_op())
        .build())
}

/// `OP_BLAKE2B <hash(script)> OP_EQUAL`
pub fn pay_to_script_hash_script(redeem: &Script) -> Script {
    ScriptBuilder::new()
        .add_op(OP_BLAKE2B)
        .add_data(&redeem.script_hash())
        .add_op(OP_EQUAL)
        .build()
}

/// `<signature> <redeem script>`, the P2SH unlock for a single-key script
pub fn pay_to_script_hash_signature_script(signature: &[u8], redeem: &Script) -> Script {
    ScriptBuilder::new()
        .add_data(signature)
        .add_data(redeem.as_bytes())
        .build()
}

fn add_envelope(builder: &mut ScriptBuilder, marker: &[u8], content: &[u8]) {
    builder
        .add_op(OP_FALSE)
        .add_op(OP_IF)
        .add_data(marker)
        .add_i64(0)
        .add_data(content)
        .add_op(OP_ENDIF);
}

/// `<owner> OP_CHECKSIG OP_FALSE OP_IF <marker> OP_0 <content> OP_ENDIF`
///
/// The owner key is Schnorr; a 33-byte compressed key is reduced to x-only.
pub fn metadata_script(owner_key: &[u8], marker: &[u8], content: &[u8]) -> Result<Script, ScriptError> {
    let key = SignatureScheme::Schnorr.encode_key(owner_key)?;
    let mut builder = ScriptBuilder::new();
    builder.add_data(&key).add_op(OP_CHECKSIG);
    add_envelope(&mut builder, marker, content);
    Ok(builder.build())
}

/// Like [`metadata_script`] with `<lock_time> OP_CHECKLOCKTIMEVERIFY` ahead
/// of the checksig. `lock_time` is in unix seconds and must be in the future.
pub fn lock_time_script(
    owner_key: &[u8],
    marker: &[u8],
    content: &[u8],
    lock_time: u64,
) -> Result<Script, ScriptError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    lock_time_script_at(owner_key, marker, content, lock_time, now)
}

pub fn lock_time_script_at(
    owner_key: &[u8],
    marker: &[u8],
    content: &[u8],
    lock_time: u64,
    now: u64,
) -> Result<Script, ScriptError> {
    if lock_time <= now {
        return Err(ScriptError::LockTimeNotInFuture { lock_time, now });
    }
    let key = SignatureScheme::Schnorr.encode_key(owner_key)?;
    let mut builder = ScriptBuilder::new();
    builder
        .add_lock_time(lock_time)?
        .add_op(OP_CHECKLOCKTIMEVERIFY)
        .add_data(&key)
        .add_op(OP_CHECKSIG);
    add_envelope(&mut builder, marker, content);
    Ok(builder.build())
}

// =============================================================================
// Threshold scripts
// =============================================================================

/// An m-of-n script together with its parsed parameters.
///
/// Key order is significant: signatures in an unlock must follow it, and a
/// different order yields a different script and address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdScript {
    required: usize,
    keys: Vec<Vec<u8>>,
    scheme: SignatureScheme,
    script: Script,
}

impl ThresholdScript {
    pub fn required(&self) -> usize {
        self.required
    }

    /// Encoded keys in script order
    pub fn keys(&self) -> &[Vec<u8>] {
        &self.keys
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    /// Position of `key` (raw or encoded) in the script's key list
    pub fn key_position(&self, key: &[u8]) -> Option<usize> {
        let encoded = self.scheme.encode_key(key).ok()?;
        self.keys.iter().position(|k| *k == encoded)
    }

    /// Parse `OP_m <keys..> OP_n OP_CHECKMULTISIG[ECDSA]`, optionally
    /// followed by an envelope.
    pub fn parse(script: &Script) -> Result<Self, ScriptError> {
        let malformed = |message: &str| ScriptError::Malformed {
            message: message.to_string(),
        };
        let chunks = script.chunks()?;

        let required = chunks
            .first()
            .and_then(ScriptChunk::as_int)
            .filter(|m| *m > 0)
            .ok_or_else(|| malformed("missing threshold"))? as usize;

        let keys: Vec<Vec<u8>> = chunks[1..]
            .iter()
            .map_while(|c| match c {
                ScriptChunk::Push(data) if data.len() == 32 || data.len() == 33 => Some(data.clone()),
                _ => None,
            })
            .collect();

        let n_index = 1 + keys.len();
        let n = chunks
            .get(n_index)
            .and_then(ScriptChunk::as_int)
            .ok_or_else(|| malformed("missing key count"))?;
        if n as usize != keys.len() {
            return Err(malformed("key count does not match pushed keys"));
        }

        let scheme = match chunks.get(n_index + 1) {
            Some(ScriptChunk::Op(OP_CHECKMULTISIG)) => SignatureScheme::Schnorr,
            Some(ScriptChunk::Op(OP_CHECKMULTISIGECDSA)) => SignatureScheme::Ecdsa,
            _ => return Err(malformed("missing checkmultisig")),
        };
        if keys.iter().any(|k| k.len() != scheme.key_len()) {
            return Err(malformed("key length does not match scheme"));
        }
        if required > keys.len() {
            return Err(ScriptError::ThresholdExceedsKeys {
                required,
                keys: keys.len(),
            });
        }

        Ok(Self {
            required,
            keys,
            scheme,
            script: script.clone(),
        })
    }
}

fn threshold_builder<K: AsRef<[u8]>>(
    required: usize,
    keys: &[K],
    scheme: SignatureScheme,
) -> Result<(ScriptBuilder, Vec<Vec<u8>>), ScriptError> {
    if keys.is_empty() {
        return Err(ScriptError::EmptyKeySet);
    }
    if required == 0 {
        return Err(ScriptError::ZeroThreshold);
    }
    if required > keys.len() {
        return Err(ScriptError::ThresholdExceedsKeys {
            required,
            keys: keys.len(),
        });
    }
    if keys.len() > MAX_PUBKEYS_PER_MULTISIG {
        return Err(ScriptError::TooManyKeys {
            count: keys.len(),
            max: MAX_PUBKEYS_PER_MULTISIG,
        });
    }

    let encoded = keys
        .iter()
        .map(|k| scheme.encode_key(k.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut builder = ScriptBuilder::new();
    builder.add_i64(required as i64);
    for key in &encoded {
        builder.add_data(key);
    }
    builder
        .add_i64(encoded.len() as i64)
        .add_op(scheme.checkmultisig_op());
    Ok((builder, encoded))
}

/// `OP_m <key_1> .. <key_n> OP_n OP_CHECKMULTISIG[ECDSA]`
pub fn threshold_script<K: AsRef<[u8]>>(
    required: usize,
    keys: &[K],
    scheme: SignatureScheme,
) -> Result<ThresholdScript, ScriptError> {
    let (builder, encoded) = threshold_builder(required, keys, scheme)?;
    Ok(ThresholdScript {
        required,
        keys: encoded,
        scheme,
        script: builder.build(),
    })
}

/// Threshold script followed by an envelope carrying `content`
pub fn threshold_metadata_script<K: AsRef<[u8]>>(
    required: usize,
    keys: &[K],
    scheme: SignatureScheme,
    marker: &[u8],
    content: &[u8],
) -> Result<ThresholdScript, ScriptError> {
    let (mut builder, encoded) = threshold_builder(required, keys, scheme)?;
    add_envelope(&mut builder, marker, content);
    Ok(ThresholdScript {
        required,
        keys: encoded,
        scheme,
        script: builder.build(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xonly(seed: u8) -> Vec<u8> {
        vec![seed; 32]
    }

    fn compressed(seed: u8) -> Vec<u8> {
        let mut key = vec![0x02];
        key.extend_from_slice(&[seed; 32]);
        key
    }

    #[test]
    fn test_add_data_canonical_pushes() {
        let script = ScriptBuilder::new()
            .add_data(&[])
            .add_data(&[5])
            .add_data(&[0x81])
            .add_data(&[0xaa, 0xbb])
            .build();
        assert_eq!(script.as_bytes(), &[OP_0, 0x55, OP_1NEGATE, 0x02, 0xaa, 0xbb]);

        let long = vec![7u8; 88];
        let script = ScriptBuilder::new().add_data(&long).build();
        assert_eq!(&script.as_bytes()[..2], &[OP_PUSHDATA1, 88]);

        let longer = vec![7u8; 300];
        let script = ScriptBuilder::new().add_data(&longer).build();
        assert_eq!(&script.as_bytes()[..3], &[OP_PUSHDATA2, 0x2c, 0x01]);
    }

    #[test]
    fn test_script_numbers() {
        assert_eq!(encode_script_num(127), vec![0x7f]);
        assert_eq!(encode_script_num(128), vec![0x80, 0x00]);
        assert_eq!(encode_script_num(-128), vec![0x80, 0x80]);
        assert_eq!(encode_script_num(1_700_000_000), vec![0x00, 0xf1, 0x53, 0x65]);
        for v in [17, 255, 256, -300, 1_700_000_000, i64::MAX] {
            assert_eq!(decode_script_num(&encode_script_num(v)), Some(v));
        }
    }

    #[test]
    fn test_metadata_script_layout() {
        let script = metadata_script(&xonly(1), b"kasplex", br#"{"p":"krc-20"}"#).unwrap();
        let chunks = script.chunks().unwrap();
        assert_eq!(chunks[0], ScriptChunk::Push(xonly(1)));
        assert_eq!(chunks[1], ScriptChunk::Op(OP_CHECKSIG));
        assert_eq!(chunks[2], ScriptChunk::Op(OP_FALSE));
        assert_eq!(chunks[3], ScriptChunk::Op(OP_IF));
        assert_eq!(chunks[4], ScriptChunk::Push(b"kasplex".to_vec()));
        assert_eq!(chunks[5], ScriptChunk::Op(OP_0));
        assert_eq!(chunks[6], ScriptChunk::Push(br#"{"p":"krc-20"}"#.to_vec()));
        assert_eq!(chunks[7], ScriptChunk::Op(OP_ENDIF));
        assert_eq!(chunks.len(), 8);
    }

    #[test]
    fn test_metadata_script_accepts_compressed_key() {
        let a = metadata_script(&xonly(9), b"m", b"c").unwrap();
        let b = metadata_script(&compressed(9), b"m", b"c").unwrap();
        assert_eq!(a, b);
        assert!(metadata_script(&[1, 2, 3], b"m", b"c").is_err());
    }

    #[test]
    fn test_lock_time_must_be_future() {
        let err = lock_time_script_at(&xonly(1), b"m", b"c", 1_000, 1_000).unwrap_err();
        assert_eq!(
            err,
            ScriptError::LockTimeNotInFuture {
                lock_time: 1_000,
                now: 1_000
            }
        );

        let script = lock_time_script_at(&xonly(1), b"m", b"c", 1_001, 1_000).unwrap();
        let chunks = script.chunks().unwrap();
        assert_eq!(chunks[0].as_int(), Some(1_001));
        assert_eq!(chunks[1], ScriptChunk::Op(OP_CHECKLOCKTIMEVERIFY));
        assert_eq!(chunks[3], ScriptChunk::Op(OP_CHECKSIG));

        assert!(lock_time_script(&xonly(1), b"m", b"c", 1).is_err());
    }

    #[test]
    fn test_threshold_script_layout() {
        let keys = vec![compressed(1), compressed(2), compressed(3)];
        let threshold = threshold_script(2, &keys, SignatureScheme::Schnorr).unwrap();
        let bytes = threshold.script().as_bytes();
        assert_eq!(bytes[0], 0x52);
        assert_eq!(bytes[1], OP_DATA_32);
        assert_eq!(bytes[bytes.len() - 2], 0x53);
        assert_eq!(bytes[bytes.len() - 1], OP_CHECKMULTISIG);
        assert_eq!(threshold.keys()[1], xonly(2));

        let ecdsa = threshold_script(1, &keys, SignatureScheme::Ecdsa).unwrap();
        let bytes = ecdsa.script().as_bytes();
        assert_eq!(bytes[1], OP_DATA_33);
        assert_eq!(bytes[bytes.len() - 1], OP_CHECKMULTISIGECDSA);
    }

    #[test]
    fn test_threshold_script_errors() {
        let none: Vec<Vec<u8>> = vec![];
        assert_eq!(
            threshold_script(1, &none, SignatureScheme::Schnorr).unwrap_err(),
            ScriptError::EmptyKeySet
        );
        assert_eq!(
            threshold_script(3, &[xonly(1), xonly(2)], SignatureScheme::Schnorr).unwrap_err(),
            ScriptError::ThresholdExceedsKeys {
                required: 3,
                keys: 2
            }
        );
        assert_eq!(
            threshold_script(0, &[xonly(1)], SignatureScheme::Schnorr).unwrap_err(),
            ScriptError::ZeroThreshold
        );
        assert!(threshold_script(1, &[xonly(1)], SignatureScheme::Ecdsa).is_err());
    }

    #[test]
    fn test_key_order_changes_script() {
        let ab = threshold_script(1, &[xonly(1), xonly(2)], SignatureScheme::Schnorr).unwrap();
        let ba = threshold_script(1, &[xonly(2), xonly(1)], SignatureScheme::Schnorr).unwrap();
        assert_ne!(ab.script().script_hash(), ba.script().script_hash());
    }

    #[test]
    fn test_threshold_parse() {
        let keys = vec![compressed(1), compressed(2), compressed(3)];
        let built =
            threshold_metadata_script(2, &keys, SignatureScheme::Schnorr, b"kasplex", b"{}").unwrap();
        let parsed = ThresholdScript::parse(built.script()).unwrap();
        assert_eq!(parsed, built);
        assert_eq!(parsed.key_position(&compressed(3)), Some(2));
        assert_eq!(parsed.key_position(&xonly(3)), Some(2));
        assert_eq!(parsed.key_position(&xonly(4)), None);

        let single = metadata_script(&xonly(1), b"m", b"c").unwrap();
        assert!(ThresholdScript::parse(&single).is_err());
    }

    #[test]
    fn test_p2sh_wrappers() {
        let redeem = metadata_script(&xonly(1), b"kasplex", b"{}").unwrap();
        let lock = pay_to_script_hash_script(&redeem);
        assert_eq!(lock.as_bytes()[0], OP_BLAKE2B);
        assert_eq!(lock.as_bytes()[1], OP_DATA_32);
        assert_eq!(&lock.as_bytes()[2..34], &redeem.script_hash());
        assert_eq!(lock.as_bytes()[34], OP_EQUAL);

        let unlock = pay_to_script_hash_signature_script(&[0x11; 65], &redeem);
        let chunks = unlock.chunks().unwrap();
        assert_eq!(chunks[0], ScriptChunk::Push(vec![0x11; 65]));
        assert_eq!(chunks[1], ScriptChunk::Push(redeem.as_bytes().to_vec()));
    }

    #[test]
    fn test_chunks_rejects_truncated_push() {
        assert!(Script::from_bytes(vec![0x05, 0x01]).chunks().is_err());
        assert!(Script::from_bytes(vec![OP_PUSHDATA1]).chunks().is_err());
    }

    #[test]
    fn test_hex_round_trip() {
        let script = Script::from_hex("20aaac").unwrap();
        assert_eq!(script.to_hex(), "20aaac");
        assert!(Script::from_hex("zz").is_err());
    }
}
