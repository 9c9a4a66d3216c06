//! Configuration types for Kiwi

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::{Error, Network, Sompi};

/// Node connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// REST gateway URL (e.g., "https://api.kaspa.org")
    pub url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            url: "https://api.kaspa.org".to_string(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Protocol fee schedule. These are economic parameters of the live
/// protocol, so they are configurable rather than fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    /// Reveal priority fee for deploy
    pub deploy_fee: Sompi,
    /// Reveal priority fee for mint (also the per-step fee of multi-mint)
    pub mint_fee: Sompi,
    /// Reveal priority fee for issue
    pub issue_fee: Sompi,
    /// Lower bound of the fee part of a commit amount
    pub default_fee: Sompi,
    /// Added on top of every commit amount
    pub p2sh_buffer: Sompi,
    /// Amount a list reveal parks at the send escrow
    pub list_utxo_amount: Sompi,
    /// Priority fee used by threshold transfers when zero is given
    pub multisig_default_fee: Sompi,
    /// Network fee rate in sompi per gram of mass
    pub network_fee_per_gram: Sompi,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            deploy_fee: constants::DEPLOY_FEE,
            mint_fee: constants::MINT_FEE,
            issue_fee: constants::DEFAULT_FEE,
            default_fee: constants::DEFAULT_FEE,
            p2sh_buffer: constants::P2SH_BUFFER,
            list_utxo_amount: constants::LIST_UTXO_AMOUNT,
            multisig_default_fee: constants::MULTISIG_DEFAULT_FEE,
            network_fee_per_gram: constants::NETWORK_FEE_PER_GRAM,
        }
    }
}

impl FeeSchedule {
    /// Amount sent to an escrow address for an operation whose reveal pays `op_fee`
    pub fn commit_amount(&self, op_fee: Sompi) -> Sompi {
        op_fee.max(self.default_fee).saturating_add(self.p2sh_buffer)
    }
}

/// Bounds for loops that wait on the ledger to show an output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationPolicy {
    /// Number of polls before giving up
    pub attempts: u32,
    /// Delay between polls in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            attempts: 30,
            poll_interval_ms: 1_000,
        }
    }
}

impl ConfirmationPolicy {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

/// Library configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KiwiConfig {
    /// Network (mainnet, testnet or devnet)
    pub network: Network,

    /// Node connection settings
    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub fees: FeeSchedule,

    #[serde(default)]
    pub confirmation: ConfirmationPolicy,
}

impl Default for KiwiConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            node: NodeConfig::default(),
            fees: FeeSchedule::default(),
            confirmation: ConfirmationPolicy::default(),
        }
    }
}

impl KiwiConfig {
    /// Config with defaults for the given network
    pub fn for_network(network: Network) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KiwiConfig::default();
        assert_eq!(config.node.url, "https://api.kaspa.org");
        assert_eq!(config.node.timeout_secs, 30);
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.fees.mint_fee, 100_000_000);
    }

    #[test]
    fn test_config_serialization() {
        let config = KiwiConfig::for_network(Network::Testnet);
        let json = serde_json::to_string(&config).unwrap();
        let parsed = KiwiConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed.node.url, config.node.url);
        assert_eq!(parsed.network, Network::Testnet);
        assert_eq!(parsed.fees, config.fees);
    }

    #[test]
    fn test_partial_fee_override() {
        let config =
            KiwiConfig::from_json_str(r#"{"network":"devnet","fees":{"mint_fee":5000}}"#).unwrap();
        assert_eq!(config.fees.mint_fee, 5000);
        assert_eq!(config.fees.deploy_fee, constants::DEPLOY_FEE);
        assert_eq!(config.confirmation.attempts, 30);
    }

    #[test]
    fn test_commit_amount() {
        let fees = FeeSchedule::default();
        // mint: max(1 KAS, 1 KAS) + 0.3 KAS
        assert_eq!(fees.commit_amount(fees.mint_fee), 130_000_000);
        // transfer pays no priority fee, still committed at the default baseline
        assert_eq!(fees.commit_amount(0), 130_000_000);
        assert_eq!(fees.commit_amount(fees.deploy_fee), 100_030_000_000);
    }

    #[test]
    fn test_bad_config_is_config_error() {
        let err = KiwiConfig::from_json_str("{").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
