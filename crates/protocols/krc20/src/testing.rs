use std::sync::Arc;

use kaspa_rpc_client::testing::MockLedger;
use kiwi_core::{ConfirmationPolicy, KiwiConfig, Network, Sompi};

use crate::context::Context;

pub const KAS: Sompi = 100_000_000;

/// Testnet context over a fresh in-memory ledger with fast polling
pub fn context() -> (Context, Arc<MockLedger>) {
    let ledger = Arc::new(MockLedger::new(Network::Testnet));
    let mut config = KiwiConfig::for_network(Network::Testnet);
    config.confirmation = ConfirmationPolicy {
        attempts: 3,
        poll_interval_ms: 1,
    };
    (Context::new(ledger.clone(), config), ledger)
}
