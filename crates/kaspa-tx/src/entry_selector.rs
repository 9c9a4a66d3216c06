//! UTXO entry selection
//!
//! Largest-first: fewest inputs, which keeps mass (and fee) down.

use std::fmt;

use kiwi_core::{Sompi, TxError};

use crate::entries::UtxoEntry;

// =============================================================================
// Error type
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySelectorError {
    NoEntries,
    Insufficient { required: Sompi, available: Sompi },
}

impl fmt::Display for EntrySelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntrySelectorError::NoEntries => write!(f, "No entries to select from"),
            EntrySelectorError::Insufficient {
                required,
                available,
            } => write!(
                f,
                "Insufficient funds: need {} sompi, have {}",
                required, available
            ),
        }
    }
}

impl std::error::Error for EntrySelectorError {}

impl From<EntrySelectorError> for TxError {
    fn from(e: EntrySelectorError) -> Self {
        match e {
            EntrySelectorError::NoEntries => TxError::NoEntries,
            EntrySelectorError::Insufficient {
                required,
                available,
            } => TxError::InsufficientFunds {
                required,
                available,
            },
        }
    }
}

// =============================================================================
// Selection
// =============================================================================

#[derive(Debug, Clone)]
pub struct SelectedEntries {
    pub entries: Vec<UtxoEntry>,
    pub total: Sompi,
}

fn largest_first(entries: &[UtxoEntry]) -> Vec<&UtxoEntry> {
    let mut sorted: Vec<&UtxoEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| b.amount.cmp(&a.amount));
    sorted
}

/// Select entries covering `required`
pub fn select_entries(
    entries: &[UtxoEntry],
    required: Sompi,
) -> Result<SelectedEntries, EntrySelectorError> {
    select_entries_with_fee(entries, required, 0, |_| 0)
}

/// Select entries covering `required` plus a fee that depends on how many
/// entries end up selected. `already` is the amount held by inputs placed
/// before selection starts (it counts toward `required`); `fee_for(n)` is
/// the fee with `n` selected entries.
pub fn select_entries_with_fee<F>(
    entries: &[UtxoEntry],
    required: Sompi,
    already: Sompi,
    fee_for: F,
) -> Result<SelectedEntries, EntrySelectorError>
where
    F: Fn(usize) -> Sompi,
{
    let target = |n: usize| required.saturating_add(fee_for(n));

    if already >= target(0) {
        return Ok(SelectedEntries {
            entries: Vec::new(),
            total: 0,
        });
    }
    if entries.is_empty() {
        return Err(if already == 0 {
            EntrySelectorError::NoEntries
        } else {
            EntrySelectorError::Insufficient {
                required: target(0),
                available: already,
            }
        });
    }

    let mut selected = Vec::new();
    let mut total: Sompi = 0;
    for entry in largest_first(entries) {
        selected.push(entry.clone());
        total += entry.amount;
        if already + total >= target(selected.len()) {
            return Ok(SelectedEntries {
                entries: selected,
                total,
            });
        }
    }

    Err(EntrySelectorError::Insufficient {
        required: target(selected.len()),
        available: already + total,
    })
}
