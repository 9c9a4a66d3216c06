//! Address encoding
//!
//! `prefix:payload`, where the payload is `version || data` packed into
//! 5-bit groups and followed by an 8-character (40-bit) polymod checksum
//! over the prefix and payload.

use kiwi_core::{Address, Network, TxError};

use crate::entries::ScriptPublicKey;
use crate::script::{opcodes::*, pay_to_script_hash_script, Script, SignatureScheme};

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("missing prefix separator")]
    MissingPrefix,

    #[error("unknown prefix '{0}'")]
    UnknownPrefix(String),

    #[error("invalid character '{0}'")]
    InvalidChar(char),

    #[error("checksum mismatch")]
    BadChecksum,

    #[error("unknown address version {0}")]
    UnknownVersion(u8),

    #[error("payload of {len} bytes does not fit version {version:?}")]
    BadPayloadLength { version: AddressVersion, len: usize },

    #[error("script is not a standard address script")]
    NonStandardScript,

    #[error("address is for {actual}, expected {expected}")]
    WrongNetwork { expected: Network, actual: Network },
}

/// Lift an address failure into the transaction error taxonomy
pub fn invalid_address(address: &Address, err: AddressError) -> TxError {
    TxError::InvalidAddress {
        address: address.to_string(),
        reason: err.to_string(),
    }
}

/// Address version byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressVersion {
    PubKey,
    PubKeyEcdsa,
    ScriptHash,
}

impl AddressVersion {
    pub fn to_u8(self) -> u8 {
        match self {
            Self::PubKey => 0,
            Self::PubKeyEcdsa => 1,
            Self::ScriptHash => 8,
        }
    }

    pub fn from_u8(v: u8) -> Result<Self, AddressError> {
        match v {
            0 => Ok(Self::PubKey),
            1 => Ok(Self::PubKeyEcdsa),
            8 => Ok(Self::ScriptHash),
            other => Err(AddressError::UnknownVersion(other)),
        }
    }

    pub fn payload_len(self) -> usize {
        match self {
            Self::PubKey | Self::ScriptHash => 32,
            Self::PubKeyEcdsa => 33,
        }
    }
}

// =============================================================================
// Checksum and bit packing
// =============================================================================

fn polymod(values: impl Iterator<Item = u8>) -> u64 {
    let mut c = 1u64;
    for d in values {
        let c0 = c >> 35;
        c = ((c & 0x07_ffff_ffff) << 5) ^ d as u64;
        if c0 & 0x01 != 0 {
            c ^= 0x98_f2bc_8e61;
        }
        if c0 & 0x02 != 0 {
            c ^= 0x79_b76d_99e2;
        }
        if c0 & 0x04 != 0 {
            c ^= 0xf3_3e5f_b3c4;
        }
        if c0 & 0x08 != 0 {
            c ^= 0xae_2eab_e2a8;
        }
        if c0 & 0x10 != 0 {
            c ^= 0x1e_4f43_e470;
        }
    }
    c ^ 1
}

fn checksum(payload5: &[u8], prefix: &str) -> u64 {
    polymod(
        prefix
            .bytes()
            .map(|c| c & 0x1f)
            .chain([0])
            .chain(payload5.iter().copied())
            .chain([0; 8]),
    )
}

fn conv8to5(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 8 / 5 + 1);
    let mut acc: u32 = 0;
    let mut bits = 0;
    for b in data {
        acc = (acc << 8) | *b as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(((acc >> bits) & 0x1f) as u8);
        }
    }
    if bits > 0 {
        out.push(((acc << (5 - bits)) & 0x1f) as u8);
    }
    out
}

fn conv5to8(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 5 / 8);
    let mut acc: u32 = 0;
    let mut bits = 0;
    for b in data {
        acc = (acc << 5) | *b as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((acc >> bits) & 0xff) as u8);
        }
    }
    out
}

// =============================================================================
// Encode / decode
// =============================================================================

pub fn encode_address(network: Network, version: AddressVersion, payload: &[u8]) -> Result<Address, AddressError> {
    if payload.len() != version.payload_len() {
        return Err(AddressError::BadPayloadLength {
            version,
            len: payload.len(),
        });
    }
    Ok(encode_unchecked(network, version, payload))
}

fn encode_unchecked(network: Network, version: AddressVersion, payload: &[u8]) -> Address {
    let prefix = network.prefix();

    let mut data = Vec::with_capacity(payload.len() + 1);
    data.push(version.to_u8());
    data.extend_from_slice(payload);
    let payload5 = conv8to5(&data);

    let checksum_bytes = checksum(&payload5, prefix).to_be_bytes();
    let checksum5 = conv8to5(&checksum_bytes[3..]);

    let encoded: String = payload5
        .iter()
        .chain(checksum5.iter())
        .map(|c| CHARSET[*c as usize] as char)
        .collect();
    Address::new(format!("{}:{}", prefix, encoded))
}

/// Decode into (network, version, payload), verifying the checksum
pub fn decode_address(address: &Address) -> Result<(Network, AddressVersion, Vec<u8>), AddressError> {
    let (prefix, rest) = address
        .as_str()
        .split_once(':')
        .ok_or(AddressError::MissingPrefix)?;
    let network =
        Network::from_prefix(prefix).ok_or_else(|| AddressError::UnknownPrefix(prefix.to_string()))?;

    let values = rest
        .chars()
        .map(|c| {
            CHARSET
                .iter()
                .position(|x| *x as char == c)
                .map(|p| p as u8)
                .ok_or(AddressError::InvalidChar(c))
        })
        .collect::<Result<Vec<u8>, _>>()?;
    if values.len() < 9 {
        return Err(AddressError::BadChecksum);
    }

    let (payload5, checksum5) = values.split_at(values.len() - 8);
    let mut checksum_bytes = [0u8; 8];
    checksum_bytes[3..].copy_from_slice(&conv5to8(checksum5));
    if checksum(payload5, prefix) != u64::from_be_bytes(checksum_bytes) {
        return Err(AddressError::BadChecksum);
    }

    let data = conv5to8(payload5);
    let (version, payload) = data.split_first().ok_or(AddressError::BadChecksum)?;
    let version = AddressVersion::from_u8(*version)?;
    if payload.len() != version.payload_len() {
        return Err(AddressError::BadPayloadLength {
            version,
            len: payload.len(),
        });
    }
    Ok((network, version, payload.to_vec()))
}

/// Check that `address` decodes and, if given, belongs to `network`
pub fn validate_address(address: &Address, network: Option<Network>) -> Result<(), AddressError> {
    let (decoded, _, _) = decode_address(address)?;
    match network {
        Some(expected) if expected != decoded => Err(AddressError::WrongNetwork {
            expected,
            actual: decoded,
        }),
        _ => Ok(()),
    }
}

/// Locking script an output to `address` must carry
pub fn pay_to_address_script(address: &Address) -> Result<ScriptPublicKey, AddressError> {
    let (_, version, payload) = decode_address(address)?;
    let script = match version {
        AddressVersion::PubKey => {
            let mut s = vec![OP_DATA_32];
            s.extend_from_slice(&payload);
            s.push(OP_CHECKSIG);
            s
        }
        AddressVersion::PubKeyEcdsa => {
            let mut s = vec![OP_DATA_33];
            s.extend_from_slice(&payload);
            s.push(OP_CHECKSIGECDSA);
            s
        }
        AddressVersion::ScriptHash => {
            let mut s = vec![OP_BLAKE2B, OP_DATA_32];
            s.extend_from_slice(&payload);
            s.push(OP_EQUAL);
            s
        }
    };
    Ok(ScriptPublicKey::new(0, Script::from_bytes(script)))
}

/// Address whose locking script is `spk`
pub fn address_from_script_public_key(
    spk: &ScriptPublicKey,
    network: Network,
) -> Result<Address, AddressError> {
    let s = spk.script().as_bytes();
    match s {
        [OP_DATA_32, key @ .., OP_CHECKSIG] if key.len() == 32 => {
            encode_address(network, AddressVersion::PubKey, key)
        }
        [OP_DATA_33, key @ .., OP_CHECKSIGECDSA] if key.len() == 33 => {
            encode_address(network, AddressVersion::PubKeyEcdsa, key)
        }
        [OP_BLAKE2B, OP_DATA_32, hash @ .., OP_EQUAL] if hash.len() == 32 => {
            encode_address(network, AddressVersion::ScriptHash, hash)
        }
        _ => Err(AddressError::NonStandardScript),
    }
}

/// P2SH address committing to `script`
pub fn script_hash_address(script: &Script, network: Network) -> Address {
    encode_unchecked(network, AddressVersion::ScriptHash, &script.script_hash())
}

/// Locking script of the P2SH address committing to `script`
pub fn script_hash_script_public_key(script: &Script) -> ScriptPublicKey {
    ScriptPublicKey::new(0, pay_to_script_hash_script(script))
}

/// P2PK address for a Schnorr key (x-only or compressed)
pub fn pub_key_address(key: &[u8], network: Network) -> Result<Address, TxError> {
    let key = SignatureScheme::Schnorr
        .encode_key(key)
        .map_err(|e| TxError::InvalidAddress {
            address: hex::encode(key),
            reason: e.to_string(),
        })?;
    Ok(encode_unchecked(network, AddressVersion::PubKey, &key))
}
