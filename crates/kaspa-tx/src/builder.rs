//! Transaction builder
//!
//! Turns entries, payment outputs and a fee policy into one or more
//! transactions. Priority entries are always spent (a reveal's P2SH entry);
//! other entries are selected largest-first until outputs and fee are
//! covered. When the selection would push the final transaction over the
//! mass limit, the smallest selected entries are first merged into the
//! change address by consolidation transactions, and the final transaction
//! spends their outputs.
//!
//! Fee for a transaction = priority fee + mass × fee rate. Consolidation
//! transactions pay only the mass part.

use kiwi_core::{Address, Network, Result, Sompi, TxError, TxId};
use tracing::debug;

use crate::address::{
    invalid_address, pay_to_address_script, script_hash_script_public_key, validate_address,
};
use crate::entries::{total_amount, PaymentOutput, ScriptPublicKey, UtxoEntry};
use crate::entry_selector::select_entries_with_fee;
use crate::mass::{
    base_mass, input_mass, mass_fee, output_mass, MAXIMUM_STANDARD_TRANSACTION_MASS,
    SIGNATURE_UNLOCK_SIZE,
};
use crate::multisig::MultiSignTransaction;
use crate::script::{
    pay_to_script_hash_signature_script, Script, ScriptBuilder, SignatureScheme, ThresholdScript,
};
use crate::sighash::SighashType;
use crate::signer::{p2pk_scheme, sign_input, Signer};
use crate::transaction::{Transaction, TransactionInput, TransactionOutput};

// =============================================================================
// Summary
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorSummary {
    pub network: Network,
    pub aggregate_fees: Sompi,
    pub aggregate_mass: u64,
    pub number_of_transactions: usize,
    pub final_transaction_id: TxId,
    /// Total paid to the requested outputs (change excluded)
    pub final_amount: Sompi,
}

// =============================================================================
// Builder
// =============================================================================

#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    network: Network,
    entries: Vec<UtxoEntry>,
    priority_entries: Vec<UtxoEntry>,
    outputs: Vec<PaymentOutput>,
    change_address: Option<Address>,
    priority_fee: Sompi,
    fee_rate: Sompi,
    payload: Vec<u8>,
    sig_op_count: u8,
    unlock_size: usize,
    priority_unlock_size: usize,
    max_mass: u64,
}

impl TransactionBuilder {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            entries: Vec::new(),
            priority_entries: Vec::new(),
            outputs: Vec::new(),
            change_address: None,
            priority_fee: 0,
            fee_rate: 0,
            payload: Vec::new(),
            sig_op_count: 1,
            unlock_size: SIGNATURE_UNLOCK_SIZE,
            priority_unlock_size: SIGNATURE_UNLOCK_SIZE,
            max_mass: MAXIMUM_STANDARD_TRANSACTION_MASS,
        }
    }

    /// Entries available for selection
    pub fn entries(mut self, entries: Vec<UtxoEntry>) -> Self {
        self.entries = entries;
        self
    }

    /// Entries spent unconditionally, ahead of any selected ones
    pub fn priority_entries(mut self, entries: Vec<UtxoEntry>) -> Self {
        self.priority_entries = entries;
        self
    }

    pub fn output(mut self, output: PaymentOutput) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn outputs(mut self, outputs: Vec<PaymentOutput>) -> Self {
        self.outputs.extend(outputs);
        self
    }

    pub fn change_address(mut self, address: Address) -> Self {
        self.change_address = Some(address);
        self
    }

    pub fn priority_fee(mut self, fee: Sompi) -> Self {
        self.priority_fee = fee;
        self
    }

    /// Sompi per gram of mass
    pub fn fee_rate(mut self, rate: Sompi) -> Self {
        self.fee_rate = rate;
        self
    }

    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn sig_op_count(mut self, count: u8) -> Self {
        self.sig_op_count = count;
        self
    }

    /// Expected unlock size of selected inputs
    pub fn unlock_size(mut self, size: usize) -> Self {
        self.unlock_size = size;
        self
    }

    /// Expected unlock size of priority inputs
    pub fn priority_unlock_size(mut self, size: usize) -> Self {
        self.priority_unlock_size = size;
        self
    }

    pub fn max_mass(mut self, mass: u64) -> Self {
        self.max_mass = mass;
        self
    }

    fn script_for(&self, address: &Address) -> std::result::Result<ScriptPublicKey, TxError> {
        validate_address(address, Some(self.network)).map_err(|e| invalid_address(address, e))?;
        pay_to_address_script(address).map_err(|e| invalid_address(address, e))
    }

    pub fn build(self) -> std::result::Result<PendingTransaction, TxError> {
        let change_address = self.change_address.clone().ok_or_else(|| TxError::BuildFailed {
            message: "change address is required".to_string(),
        })?;
        let change_spk = self.script_for(&change_address)?;

        let outputs = self
            .outputs
            .iter()
            .map(|o| Ok(TransactionOutput::new(o.amount, self.script_for(&o.address)?)))
            .collect::<std::result::Result<Vec<_>, TxError>>()?;
        let output_total: Sompi = outputs.iter().map(|o| o.value).sum();

        let change_mass = output_mass(&TransactionOutput::new(0, change_spk.clone()));
        let fixed_mass = base_mass(self.payload.len())
            + outputs.iter().map(output_mass).sum::<u64>()
            + change_mass
            + self.priority_entries.len() as u64
                * input_mass(self.priority_unlock_size, self.sig_op_count);
        if fixed_mass > self.max_mass {
            return Err(TxError::MassExceeded {
                mass: fixed_mass,
                max: self.max_mass,
            });
        }
        let per_input = input_mass(self.unlock_size, self.sig_op_count);
        let max_inputs = ((self.max_mass - fixed_mass) / per_input) as usize;
        let final_mass = |n: usize| fixed_mass + n as u64 * per_input;
        let fee_for = |n: usize| self.priority_fee + mass_fee(final_mass(n), self.fee_rate);

        let priority_total = total_amount(&self.priority_entries);
        let mut pool: Vec<UtxoEntry> = self
            .entries
            .iter()
            .filter(|e| !self.priority_entries.iter().any(|p| p.outpoint == e.outpoint))
            .cloned()
            .collect();

        let mut chain = Vec::new();
        let mut aggregate_fees: Sompi = 0;
        let mut aggregate_mass: u64 = 0;

        let selected = loop {
            let selected = select_entries_with_fee(&pool, output_total, priority_total, fee_for)?;
            if selected.entries.len() <= max_inputs {
                break selected;
            }

            let consolidation_cap =
                (self.max_mass.saturating_sub(base_mass(0) + change_mass) / per_input) as usize;
            // largest-first order: the tail holds the smallest entries
            let take = consolidation_cap.min(selected.entries.len());
            let batch = selected.entries[selected.entries.len() - take..].to_vec();
            if batch.len() < 2 {
                return Err(TxError::MassExceeded {
                    mass: final_mass(selected.entries.len()),
                    max: self.max_mass,
                });
            }

            let mass = base_mass(0) + change_mass + batch.len() as u64 * per_input;
            let fee = mass_fee(mass, self.fee_rate);
            let batch_total = total_amount(&batch);
            let value = batch_total
                .checked_sub(fee)
                .filter(|v| *v > 0)
                .ok_or(TxError::InsufficientFunds {
                    required: fee + 1,
                    available: batch_total,
                })?;

            let mut tx = Transaction::new(
                batch
                    .iter()
                    .cloned()
                    .map(|e| TransactionInput::from_entry(e, self.sig_op_count))
                    .collect(),
                vec![TransactionOutput::new(value, change_spk.clone())],
                Vec::new(),
            );
            tx.mass = mass;
            let id = tx.id();
            debug!(inputs = batch.len(), fee, "consolidating entries into {}", id);

            pool.retain(|e| !batch.iter().any(|b| b.outpoint == e.outpoint));
            pool.push(UtxoEntry::synthetic(
                change_address.clone(),
                id,
                0,
                change_spk.clone(),
                value,
            ));
            aggregate_fees += fee;
            aggregate_mass += mass;
            chain.push(tx);
        };

        let selected_count = selected.entries.len();
        let fee = fee_for(selected_count);
        let input_total = priority_total + selected.total;
        let change = input_total
            .checked_sub(output_total + fee)
            .ok_or(TxError::InsufficientFunds {
                required: output_total + fee,
                available: input_total,
            })?;

        let inputs: Vec<TransactionInput> = self
            .priority_entries
            .iter()
            .chain(selected.entries.iter())
            .cloned()
            .map(|e| TransactionInput::from_entry(e, self.sig_op_count))
            .collect();
        let mut final_outputs = outputs;
        if change > 0 {
            final_outputs.push(TransactionOutput::new(change, change_spk));
        }

        let mut tx = Transaction::new(inputs, final_outputs, self.payload);
        tx.mass = final_mass(selected_count);
        aggregate_fees += fee;
        aggregate_mass += tx.mass;
        debug!(
            inputs = tx.inputs.len(),
            outputs = tx.outputs.len(),
            fee,
            mass = tx.mass,
            change,
            "built transaction"
        );

        let summary = GeneratorSummary {
            network: self.network,
            aggregate_fees,
            aggregate_mass,
            number_of_transactions: chain.len() + 1,
            final_transaction_id: tx.id(),
            final_amount: output_total,
        };
        chain.push(tx);
        Ok(PendingTransaction {
            transactions: chain,
            summary,
            accepted: Vec::new(),
        })
    }
}

// =============================================================================
// Pending transaction
// =============================================================================

/// Built, not yet submitted. Holds the consolidation chain (if any)
/// followed by the final transaction, in submission order.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    transactions: Vec<Transaction>,
    summary: GeneratorSummary,
    // ids the node accepted, a prefix of `transactions`
    accepted: Vec<TxId>,
}

fn standard_unlock(signature: &[u8]) -> Vec<u8> {
    ScriptBuilder::new().add_data(signature).build().into_bytes()
}

fn sign_owned(
    tx: &mut Transaction,
    index: usize,
    signers: &[&dyn Signer],
) -> std::result::Result<(), TxError> {
    let spk = tx.inputs[index]
        .utxo
        .as_ref()
        .map(|u| u.script_public_key.clone())
        .ok_or(TxError::MissingUtxo { index })?;
    let signer = signers
        .iter()
        .find(|s| s.owns(&spk))
        .ok_or(TxError::MissingSigner { index })?;
    let sig = sign_input(tx, index, *signer, SighashType::All, p2pk_scheme(&spk))?;
    tx.inputs[index].signature_script = standard_unlock(&sig);
    Ok(())
}

impl PendingTransaction {
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn into_transactions(self) -> Vec<Transaction> {
        self.transactions
    }

    /// Id of the final transaction
    pub fn id(&self) -> TxId {
        self.summary.final_transaction_id.clone()
    }

    pub fn summary(&self) -> &GeneratorSummary {
        &self.summary
    }

    pub fn fee(&self) -> Sompi {
        self.summary.aggregate_fees
    }

    /// Every transaction of the chain was accepted
    pub fn is_submitted(&self) -> bool {
        self.accepted.len() == self.transactions.len()
    }

    /// Ids accepted so far, in submission order
    pub fn accepted(&self) -> &[TxId] {
        &self.accepted
    }

    /// Transactions still to submit
    pub fn unsubmitted(&self) -> &[Transaction] {
        &self.transactions[self.accepted.len()..]
    }

    /// Record the next transaction of the chain as accepted under `id`
    pub fn record_accepted(&mut self, id: TxId) {
        if self.accepted.len() < self.transactions.len() {
            self.accepted.push(id);
        }
    }

    pub fn mark_submitted(&mut self) {
        self.accepted = self.transactions.iter().map(Transaction::id).collect();
    }

    pub fn is_fully_signed(&self) -> bool {
        self.transactions.iter().all(Transaction::is_fully_signed)
    }

    fn ensure_unsubmitted(&self) -> std::result::Result<(), TxError> {
        if !self.accepted.is_empty() {
            return Err(TxError::AlreadySubmitted);
        }
        Ok(())
    }

    /// Sign every unsigned pay-to-pubkey input with whichever signer owns it
    pub fn sign(&mut self, signers: &[&dyn Signer]) -> std::result::Result<(), TxError> {
        self.ensure_unsubmitted()?;
        for tx in &mut self.transactions {
            for index in 0..tx.inputs.len() {
                if !tx.inputs[index].is_signed() {
                    sign_owned(tx, index, signers)?;
                }
            }
        }
        Ok(())
    }

    /// Unlock inputs locked to P2SH(`script`) with `<signature> <script>`;
    /// remaining unsigned inputs get a standard signature from `signer`.
    pub fn sign_reveal(
        &mut self,
        signer: &dyn Signer,
        script: &Script,
    ) -> std::result::Result<(), TxError> {
        self.ensure_unsubmitted()?;
        let p2sh = script_hash_script_public_key(script);
        for tx in &mut self.transactions {
            for index in 0..tx.inputs.len() {
                if tx.inputs[index].is_signed() {
                    continue;
                }
                let is_reveal = tx.inputs[index]
                    .utxo
                    .as_ref()
                    .is_some_and(|u| u.script_public_key == p2sh);
                if is_reveal {
                    let sig = sign_input(tx, index, signer, SighashType::All, SignatureScheme::Schnorr)?;
                    tx.inputs[index].signature_script =
                        pay_to_script_hash_signature_script(&sig, script).into_bytes();
                } else {
                    sign_owned(tx, index, &[signer])?;
                }
            }
        }
        Ok(())
    }

    /// Unlock inputs locked to P2SH(`redeem`) with signatures from the
    /// signers that hold redeem keys; other unsigned inputs are signed as
    /// pay-to-pubkey.
    pub fn sign_threshold(&mut self, signers: &[&dyn Signer], redeem: &ThresholdScript) -> Result<()> {
        self.ensure_unsubmitted()?;
        for tx in &mut self.transactions {
            let mut mst = MultiSignTransaction::new(tx.clone(), redeem);
            if !mst.threshold_inputs().is_empty() {
                for signer in signers {
                    if redeem
                        .key_position(&signer.script_key(redeem.scheme()))
                        .is_some()
                    {
                        mst.sign(*signer)?;
                    }
                }
                *tx = mst.finalize()?;
            }
            for index in 0..tx.inputs.len() {
                if !tx.inputs[index].is_signed() {
                    sign_owned(tx, index, signers)?;
                }
            }
        }
        Ok(())
    }
}
