//! Explicit call context
//!
//! Everything an operation needs from its surroundings: the network, the
//! ledger RPC handle, the fee schedule and the per-address locks that keep
//! two concurrent builds from selecting the same entries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use kaspa_rpc_client::{KaspaRpc, RestClient};
use kaspa_tx::UtxoEntry;
use kiwi_core::{Address, ConfirmationPolicy, FeeSchedule, KiwiConfig, Network, Result};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per address, created on first use
#[derive(Debug, Clone, Default)]
pub struct AddressLocks {
    locks: Arc<Mutex<HashMap<Address, Arc<AsyncMutex<()>>>>>,
}

impl AddressLocks {
    /// Wait for exclusive use of `address`; released when the guard drops
    pub async fn acquire(&self, address: &Address) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(address.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[derive(Clone)]
pub struct Context {
    rpc: Arc<dyn KaspaRpc>,
    config: KiwiConfig,
    locks: AddressLocks,
}

impl Context {
    pub fn new(rpc: Arc<dyn KaspaRpc>, config: KiwiConfig) -> Self {
        Self {
            rpc,
            config,
            locks: AddressLocks::default(),
        }
    }

    /// Context over the REST gateway named in `config.node`
    pub fn connect(config: KiwiConfig) -> Result<Self> {
        let client = RestClient::new(&config.node)?;
        Ok(Self::new(Arc::new(client), config))
    }

    pub fn network(&self) -> Network {
        self.config.network
    }

    pub fn rpc(&self) -> &dyn KaspaRpc {
        self.rpc.as_ref()
    }

    pub fn rpc_handle(&self) -> Arc<dyn KaspaRpc> {
        self.rpc.clone()
    }

    pub fn config(&self) -> &KiwiConfig {
        &self.config
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.config.fees
    }

    pub fn confirmation(&self) -> &ConfirmationPolicy {
        &self.config.confirmation
    }

    pub async fn lock(&self, address: &Address) -> OwnedMutexGuard<()> {
        self.locks.acquire(address).await
    }

    /// Spendable entries at `address`
    pub async fn entries(&self, address: &Address) -> Result<Vec<UtxoEntry>> {
        Ok(self
            .rpc
            .get_utxos_by_addresses(std::slice::from_ref(address))
            .await?)
    }
}
