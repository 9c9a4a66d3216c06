//! Pull-based UTXO change tracking
//!
//! `UtxoSubscription` keeps the last UTXO snapshot of a set of addresses and
//! reports the difference on every poll. `await_entry` is the bounded-retry
//! wait for one specific output.

use std::collections::HashMap;
use std::sync::Arc;

use kaspa_tx::{Outpoint, UtxoEntry};
use kiwi_core::{Address, ConfirmationPolicy, NodeError};
use tracing::{debug, warn};

use crate::{KaspaRpc, Result};

/// Entries added and removed since the previous poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxosChangedEvent {
    pub added: Vec<UtxoEntry>,
    pub removed: Vec<UtxoEntry>,
}

impl UtxosChangedEvent {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Added entries belonging to `address`
    pub fn added_for<'a>(&'a self, address: &'a Address) -> impl Iterator<Item = &'a UtxoEntry> {
        self.added
            .iter()
            .filter(move |e| e.address.as_ref() == Some(address))
    }
}

pub struct UtxoSubscription {
    rpc: Arc<dyn KaspaRpc>,
    addresses: Vec<Address>,
    snapshot: HashMap<Outpoint, UtxoEntry>,
}

/// Start tracking `addresses`; the current UTXO set becomes the baseline
pub async fn subscribe_utxos_changed(
    rpc: Arc<dyn KaspaRpc>,
    addresses: Vec<Address>,
) -> Result<UtxoSubscription> {
    let entries = rpc.get_utxos_by_addresses(&addresses).await?;
    let snapshot = entries
        .into_iter()
        .map(|e| (e.outpoint.clone(), e))
        .collect();
    Ok(UtxoSubscription {
        rpc,
        addresses,
        snapshot,
    })
}

impl UtxoSubscription {
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    /// Entries as of the last poll
    pub fn entries(&self) -> impl Iterator<Item = &UtxoEntry> {
        self.snapshot.values()
    }

    /// Poll once; `None` when nothing changed
    pub async fn next_event(&mut self) -> Result<Option<UtxosChangedEvent>> {
        let current: HashMap<Outpoint, UtxoEntry> = self
            .rpc
            .get_utxos_by_addresses(&self.addresses)
            .await?
            .into_iter()
            .map(|e| (e.outpoint.clone(), e))
            .collect();

        let mut event = UtxosChangedEvent {
            added: current
                .iter()
                .filter(|(outpoint, _)| !self.snapshot.contains_key(*outpoint))
                .map(|(_, e)| e.clone())
                .collect(),
            removed: self
                .snapshot
                .iter()
                .filter(|(outpoint, _)| !current.contains_key(*outpoint))
                .map(|(_, e)| e.clone())
                .collect(),
        };
        event.added.sort_by(|a, b| a.outpoint.cmp(&b.outpoint));
        event.removed.sort_by(|a, b| a.outpoint.cmp(&b.outpoint));
        self.snapshot = current;

        if event.is_empty() {
            return Ok(None);
        }
        debug!(
            added = event.added.len(),
            removed = event.removed.len(),
            "utxos changed"
        );
        Ok(Some(event))
    }

    /// Poll until something changes, at most `policy.attempts` times
    pub async fn wait_event(&mut self, policy: &ConfirmationPolicy) -> Result<UtxosChangedEvent> {
        for attempt in 1..=policy.attempts {
            if let Some(event) = self.next_event().await? {
                return Ok(event);
            }
            if attempt < policy.attempts {
                tokio::time::sleep(policy.poll_interval()).await;
            }
        }
        Err(NodeError::Timeout {
            secs: policy.poll_interval_ms.saturating_mul(policy.attempts as u64) / 1_000,
        })
    }
}

/// Wait until `outpoint` shows up at `address`
pub async fn await_entry(
    rpc: &dyn KaspaRpc,
    address: &Address,
    outpoint: &Outpoint,
    policy: &ConfirmationPolicy,
) -> Result<UtxoEntry> {
    for attempt in 1..=policy.attempts {
        let entries = rpc
            .get_utxos_by_addresses(std::slice::from_ref(address))
            .await?;
        if let Some(entry) = entries.into_iter().find(|e| &e.outpoint == outpoint) {
            return Ok(entry);
        }
        if attempt < policy.attempts {
            warn!(attempt, "{} not yet visible at {}, retrying", outpoint, address);
            tokio::time::sleep(policy.poll_interval()).await;
        }
    }
    Err(NodeError::NotFound {
        what: format!("{} at {}", outpoint, address),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLedger;
    use kiwi_core::Network;

    fn quick() -> ConfirmationPolicy {
        ConfirmationPolicy {
            attempts: 3,
            poll_interval_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_subscription_reports_diff() {
        let ledger = Arc::new(MockLedger::new(Network::Testnet));
        let address = ledger.test_address(1);
        let first = ledger.fund(&address, 1_000);

        let mut sub = subscribe_utxos_changed(ledger.clone(), vec![address.clone()])
            .await
            .unwrap();
        assert_eq!(sub.entries().count(), 1);
        assert!(sub.next_event().await.unwrap().is_none());

        let second = ledger.fund(&address, 2_000);
        ledger.remove(&first.outpoint);
        let event = sub.next_event().await.unwrap().unwrap();
        assert_eq!(event.added, vec![second.clone()]);
        assert_eq!(event.removed, vec![first]);
        assert_eq!(event.added_for(&address).count(), 1);
    }

    #[tokio::test]
    async fn test_wait_event_times_out() {
        let ledger = Arc::new(MockLedger::new(Network::Testnet));
        let address = ledger.test_address(1);
        let mut sub = subscribe_utxos_changed(ledger.clone(), vec![address])
            .await
            .unwrap();
        let err = sub.wait_event(&quick()).await.unwrap_err();
        assert!(matches!(err, NodeError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_await_entry_found_and_missing() {
        let ledger = MockLedger::new(Network::Testnet);
        let address = ledger.test_address(1);
        let entry = ledger.fund(&address, 5_000);

        let found = await_entry(&ledger, &address, &entry.outpoint, &quick())
            .await
            .unwrap();
        assert_eq!(found, entry);

        let missing = Outpoint::new(kaspa_tx::testing::txid(99), 0);
        let err = await_entry(&ledger, &address, &missing, &quick())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::NotFound { .. }));
        assert_eq!(ledger.calls("get_utxos_by_addresses"), 4);
    }
}
