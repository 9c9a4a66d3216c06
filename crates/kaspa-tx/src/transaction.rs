//! Transaction structure and id hashing
//!
//! JSON form is camelCase with amounts as decimal strings and bytes as hex,
//! so a partially signed transaction can be passed between parties and read
//! back without loss.

use kiwi_core::{Sompi, TxError, TxId};
use serde::{Deserialize, Serialize};

use crate::entries::{Outpoint, ScriptPublicKey, UtxoEntry};
use crate::hashing::Hasher;
use crate::serde_helpers::{hex_bytes, u64_string};

pub const TX_VERSION: u16 = 0;

/// Native subnetwork (all zero)
pub const SUBNETWORK_ID_NATIVE: [u8; 20] = [0u8; 20];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInput {
    #[serde(flatten)]
    pub previous_outpoint: Outpoint,
    #[serde(with = "hex_bytes")]
    pub signature_script: Vec<u8>,
    #[serde(with = "u64_string")]
    pub sequence: u64,
    pub sig_op_count: u8,
    /// The entry being spent; needed for signing and mass, not sent to the node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utxo: Option<UtxoEntry>,
}

impl TransactionInput {
    pub fn from_entry(entry: UtxoEntry, sig_op_count: u8) -> Self {
        Self {
            previous_outpoint: entry.outpoint.clone(),
            signature_script: Vec::new(),
            sequence: 0,
            sig_op_count,
            utxo: Some(entry),
        }
    }

    pub fn is_signed(&self) -> bool {
        !self.signature_script.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOutput {
    #[serde(with = "u64_string")]
    pub value: Sompi,
    pub script_public_key: ScriptPublicKey,
}

impl TransactionOutput {
    pub fn new(value: Sompi, script_public_key: ScriptPublicKey) -> Self {
        Self {
            value,
            script_public_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub version: u16,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    #[serde(with = "u64_string")]
    pub lock_time: u64,
    #[serde(with = "hex_bytes")]
    pub subnetwork_id: Vec<u8>,
    #[serde(with = "u64_string")]
    pub gas: u64,
    #[serde(with = "hex_bytes", default)]
    pub payload: Vec<u8>,
    #[serde(with = "u64_string", default)]
    pub mass: u64,
}

impl Transaction {
    pub fn new(inputs: Vec<TransactionInput>, outputs: Vec<TransactionOutput>, payload: Vec<u8>) -> Self {
        Self {
            version: TX_VERSION,
            inputs,
            outputs,
            lock_time: 0,
            subnetwork_id: SUBNETWORK_ID_NATIVE.to_vec(),
            gas: 0,
            payload,
            mass: 0,
        }
    }

    /// Id over everything except signature scripts, so it is fixed before
    /// signing and outputs can be referenced before submission.
    pub fn id(&self) -> TxId {
        let mut hasher = Hasher::keyed(b"TransactionID");
        hasher
            .write_u16(self.version)
            .write_u64(self.inputs.len() as u64);
        for input in &self.inputs {
            hasher
                .update(&outpoint_bytes(&input.previous_outpoint))
                .write_u32(input.previous_outpoint.index)
                .write_var_bytes(&[])
                .write_u64(input.sequence);
        }
        hasher.write_u64(self.outputs.len() as u64);
        for output in &self.outputs {
            write_output(&mut hasher, output);
        }
        hasher
            .write_u64(self.lock_time)
            .update(&self.subnetwork_id)
            .write_u64(self.gas)
            .write_var_bytes(&self.payload);
        TxId::from_bytes(hasher.finalize())
    }

    /// Sum of attached UTXO amounts; errors if any input lacks its entry
    pub fn total_input_amount(&self) -> Result<Sompi, TxError> {
        self.inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                input
                    .utxo
                    .as_ref()
                    .map(|u| u.amount)
                    .ok_or(TxError::MissingUtxo { index })
            })
            .sum()
    }

    pub fn total_output_amount(&self) -> Sompi {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Inputs minus outputs; errors if outputs exceed inputs
    pub fn fee(&self) -> Result<Sompi, TxError> {
        let input = self.total_input_amount()?;
        let output = self.total_output_amount();
        input
            .checked_sub(output)
            .ok_or(TxError::InsufficientFunds {
                required: output,
                available: input,
            })
    }

    pub fn is_fully_signed(&self) -> bool {
        self.inputs.iter().all(TransactionInput::is_signed)
    }

    pub fn to_json(&self) -> Result<String, TxError> {
        serde_json::to_string(self).map_err(|e| TxError::SerializationFailed {
            message: e.to_string(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, TxError> {
        serde_json::from_str(json).map_err(|e| TxError::SerializationFailed {
            message: e.to_string(),
        })
    }
}

/// Raw id bytes; a malformed id hashes as all-zero and is rejected by the node
pub(crate) fn outpoint_bytes(outpoint: &Outpoint) -> [u8; 32] {
    outpoint.transaction_id.to_bytes().unwrap_or([0u8; 32])
}

pub(crate) fn write_output(hasher: &mut Hasher, output: &TransactionOutput) {
    hasher
        .write_u64(output.value)
        .write_u16(output.script_public_key.version())
        .write_var_bytes(output.script_public_key.script().as_bytes());
}
