//! UTXO entry and payment output model
//!
//! Plain values: construction only, no behavior. Entries come from the
//! node, or are built client-side (`UtxoEntry::synthetic`) to reference an
//! output the node has not indexed yet.

use std::fmt;

use kiwi_core::constants::UNKNOWN_DAA_SCORE;
use kiwi_core::{Address, DaaScore, Sompi, TxId};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::script::Script;
use crate::serde_helpers::u64_string;

/// Reference to an output of a prior transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outpoint {
    pub transaction_id: TxId,
    pub index: u32,
}

impl Outpoint {
    pub fn new(transaction_id: TxId, index: u32) -> Self {
        Self {
            transaction_id,
            index,
        }
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transaction_id, self.index)
    }
}

/// Versioned locking script. JSON form is the 2-byte big-endian version
/// followed by the script, all hex (`"0000" + script`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptPublicKey {
    version: u16,
    script: Script,
}

impl ScriptPublicKey {
    pub fn new(version: u16, script: Script) -> Self {
        Self { version, script }
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn to_hex(&self) -> String {
        format!("{:04x}{}", self.version, self.script.to_hex())
    }

    pub fn from_hex(s: &str) -> Result<Self, String> {
        if s.len() < 4 || !s.is_char_boundary(4) {
            return Err(format!("script public key '{}' is too short", s));
        }
        let version = u16::from_str_radix(&s[..4], 16).map_err(|e| e.to_string())?;
        let script = Script::from_hex(&s[4..]).map_err(|e| e.to_string())?;
        Ok(Self { version, script })
    }
}

impl Serialize for ScriptPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ScriptPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

/// Spendable output as reported by the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtxoEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    pub outpoint: Outpoint,
    #[serde(with = "u64_string")]
    pub amount: Sompi,
    pub script_public_key: ScriptPublicKey,
    #[serde(with = "u64_string")]
    pub block_daa_score: DaaScore,
    #[serde(default)]
    pub is_coinbase: bool,
}

impl UtxoEntry {
    /// Entry for an output that was just submitted and is not yet indexed
    pub fn synthetic(
        address: Address,
        transaction_id: TxId,
        index: u32,
        script_public_key: ScriptPublicKey,
        amount: Sompi,
    ) -> Self {
        Self {
            address: Some(address),
            outpoint: Outpoint::new(transaction_id, index),
            amount,
            script_public_key,
            block_daa_score: UNKNOWN_DAA_SCORE,
            is_coinbase: false,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.block_daa_score == UNKNOWN_DAA_SCORE
    }
}

/// Destination address and amount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOutput {
    pub address: Address,
    #[serde(with = "u64_string")]
    pub amount: Sompi,
}

impl PaymentOutput {
    pub fn new(address: Address, amount: Sompi) -> Self {
        Self { address, amount }
    }
}

/// Total amount held by `entries`
pub fn total_amount(entries: &[UtxoEntry]) -> Sompi {
    entries.iter().map(|e| e.amount).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p2sh_spk() -> ScriptPublicKey {
        ScriptPublicKey::from_hex(
            "0000aa20e7a7a68ea8c05f5b8e1fa5e35bb6f8dc8b9e1a1a5a5b5c5d5e5f60616263646587",
        )
        .unwrap()
    }

    #[test]
    fn test_script_public_key_hex() {
        let spk = p2sh_spk();
        assert_eq!(spk.version(), 0);
        assert_eq!(spk.script().as_bytes()[0], 0xaa);
        assert_eq!(
            spk.to_hex(),
            "0000aa20e7a7a68ea8c05f5b8e1fa5e35bb6f8dc8b9e1a1a5a5b5c5d5e5f60616263646587"
        );
        assert!(ScriptPublicKey::from_hex("00").is_err());
    }

    #[test]
    fn test_synthetic_entry() {
        let entry = UtxoEntry::synthetic(
            Address::new("kaspatest:ptest"),
            TxId::from_bytes([1; 32]),
            0,
            p2sh_spk(),
            130_000_000,
        );
        assert!(entry.is_synthetic());
        assert_eq!(entry.block_daa_score, u64::MAX);
        assert_eq!(entry.outpoint.to_string(), format!("{}:0", "01".repeat(32)));
    }

    #[test]
    fn test_entry_json_shape() {
        let entry = UtxoEntry {
            address: None,
            outpoint: Outpoint::new(TxId::from_bytes([2; 32]), 3),
            amount: 500,
            script_public_key: p2sh_spk(),
            block_daa_score: 77,
            is_coinbase: false,
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["amount"], json!("500"));
        assert_eq!(value["blockDaaScore"], json!("77"));
        assert_eq!(value["outpoint"]["index"], json!(3));
        assert!(value.get("address").is_none());

        let parsed: UtxoEntry = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_total_amount() {
        let mk = |amount| UtxoEntry::synthetic(
            Address::new("kaspa:x"),
            TxId::from_bytes([0; 32]),
            0,
            p2sh_spk(),
            amount,
        );
        assert_eq!(total_amount(&[mk(1), mk(2), mk(3)]), 6);
        assert_eq!(total_amount(&[]), 0);
    }
}
