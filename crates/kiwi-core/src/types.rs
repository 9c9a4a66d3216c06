//! Core type definitions for Kiwi

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction ID (32 bytes, hex-encoded)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(pub String);

impl TxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode into raw bytes; `None` unless the id is 64 hex characters
    pub fn to_bytes(&self) -> Option<[u8; 32]> {
        let raw = hex::decode(&self.0).ok()?;
        raw.try_into().ok()
    }

    /// Check the id is a well-formed 32-byte hex string
    pub fn is_valid(&self) -> bool {
        self.to_bytes().is_some()
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kaspa address (`prefix:payload`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-readable prefix before the colon, if any
    pub fn prefix(&self) -> Option<&str> {
        self.0.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Network implied by the prefix
    pub fn network(&self) -> Option<Network> {
        self.prefix().and_then(Network::from_prefix)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Network type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Devnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Devnet => "devnet",
        }
    }

    /// Address prefix used on this network
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Mainnet => "kaspa",
            Self::Testnet => "kaspatest",
            Self::Devnet => "kaspadev",
        }
    }

    /// Network id as reported by the node
    pub fn network_id(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet-10",
            Self::Devnet => "devnet",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "kaspa" => Some(Self::Mainnet),
            "kaspatest" => Some(Self::Testnet),
            "kaspadev" => Some(Self::Devnet),
            _ => None,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// DAA score of the block that accepted an entry
pub type DaaScore = u64;

/// Sompi amount (1 KAS = 100_000_000 sompi)
pub type Sompi = u64;

/// Constants
pub mod constants {
    use super::{DaaScore, Sompi};

    /// 1 KAS in sompi
    pub const SOMPI_PER_KAS: Sompi = 100_000_000;

    /// Sentinel DAA score for entries built client-side before the node indexed them
    pub const UNKNOWN_DAA_SCORE: DaaScore = u64::MAX;

    /// Default fee baseline (1 KAS)
    pub const DEFAULT_FEE: Sompi = 100_000_000;

    /// Buffer added to every commit so the reveal can cover its own mass fee (0.3 KAS)
    pub const P2SH_BUFFER: Sompi = 30_000_000;

    /// Deploy priority fee (1000 KAS)
    pub const DEPLOY_FEE: Sompi = 100_000_000_000;

    /// Mint priority fee (1 KAS)
    pub const MINT_FEE: Sompi = 100_000_000;

    /// Amount forwarded to the send escrow by a list reveal (0.3 KAS)
    pub const LIST_UTXO_AMOUNT: Sompi = 30_000_000;

    /// Priority fee for threshold transfers when the caller passes zero
    pub const MULTISIG_DEFAULT_FEE: Sompi = 10_000;

    /// Minimum relay fee rate (sompi per gram of mass)
    pub const NETWORK_FEE_PER_GRAM: Sompi = 1;
}

/// Convert a decimal KAS string ("1.5") to sompi without floating point
pub fn kas_to_sompi(kas: &str) -> Option<Sompi> {
    let kas = kas.trim();
    let (whole, frac) = kas.split_once('.').unwrap_or((kas, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.len() > 8 || !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: Sompi = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac_sompi: Sompi = if frac.is_empty() {
        0
    } else {
        format!("{:0<8}", frac).parse().ok()?
    };
    whole
        .checked_mul(constants::SOMPI_PER_KAS)?
        .checked_add(frac_sompi)
}
