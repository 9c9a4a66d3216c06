//! KRC-20 operation payloads
//!
//! A payload is the JSON document embedded in an operation's escrow script.
//! Field order is fixed by the struct so the same payload always produces
//! the same script bytes and escrow address.

use kaspa_tx::{validate_address, AddressError};
use kiwi_core::{Address, Error, Network, Result, TxId, ValidationError};
use serde::{Deserialize, Serialize};

/// Protocol id carried in every payload
pub const PROTOCOL: &str = "krc-20";

/// Envelope marker pushed ahead of the payload
pub const MARKER: &[u8] = b"kasplex";

const TICKER_LEN: std::ops::RangeInclusive<usize> = 4..=6;
const MAX_DECIMALS: u8 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Mint,
    Deploy,
    Transfer,
    List,
    Send,
    Issue,
    Burn,
    Blacklist,
    Chown,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mint => "mint",
            Self::Deploy => "deploy",
            Self::Transfer => "transfer",
            Self::List => "list",
            Self::Send => "send",
            Self::Issue => "issue",
            Self::Burn => "burn",
            Self::Blacklist => "blacklist",
            Self::Chown => "chown",
        }
    }

    /// Operations addressing a token by contract id rather than ticker
    pub fn uses_contract_id(&self) -> bool {
        matches!(self, Self::Issue | Self::Burn | Self::Blacklist | Self::Chown)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Krc20Payload {
    pub p: String,
    pub op: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,
    #[serde(default, rename = "mod", skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lim: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre: Option<String>,
}

impl Krc20Payload {
    pub fn new(op: Operation) -> Self {
        Self {
            p: PROTOCOL.to_string(),
            op,
            tick: None,
            ca: None,
            mode: None,
            name: None,
            max: None,
            lim: None,
            amt: None,
            to: None,
            dec: None,
            pre: None,
        }
    }

    pub fn mint(tick: &str) -> Self {
        Self::new(Operation::Mint).with_tick(tick)
    }

    pub fn deploy(tick: &str, max: &str, lim: &str) -> Self {
        Self::new(Operation::Deploy)
            .with_tick(tick)
            .with_max(max)
            .with_lim(lim)
    }

    /// Deploy in issue mode: owner-issued supply, identified by name
    pub fn deploy_issued(name: &str, max: &str) -> Self {
        Self::new(Operation::Deploy)
            .with_mode("issue")
            .with_name(name)
            .with_max(max)
    }

    pub fn transfer(tick: &str, amt: &str, to: &Address) -> Self {
        Self::new(Operation::Transfer)
            .with_tick(tick)
            .with_amt(amt)
            .with_to(to)
    }

    pub fn list(tick: &str, amt: &str) -> Self {
        Self::new(Operation::List).with_tick(tick).with_amt(amt)
    }

    pub fn send(tick: &str) -> Self {
        Self::new(Operation::Send).with_tick(tick)
    }

    pub fn issue(ca: &str, amt: &str) -> Self {
        Self::new(Operation::Issue).with_ca(ca).with_amt(amt)
    }

    pub fn burn(ca: &str, amt: &str) -> Self {
        Self::new(Operation::Burn).with_ca(ca).with_amt(amt)
    }

    /// `mode` is "add" or "remove"
    pub fn blacklist(ca: &str, mode: &str, to: &Address) -> Self {
        Self::new(Operation::Blacklist)
            .with_ca(ca)
            .with_mode(mode)
            .with_to(to)
    }

    pub fn chown(ca: &str, to: &Address) -> Self {
        Self::new(Operation::Chown).with_ca(ca).with_to(to)
    }

    pub fn with_tick(mut self, tick: &str) -> Self {
        self.tick = Some(tick.to_string());
        self
    }

    pub fn with_ca(mut self, ca: &str) -> Self {
        self.ca = Some(ca.to_string());
        self
    }

    pub fn with_mode(mut self, mode: &str) -> Self {
        self.mode = Some(mode.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_max(mut self, max: &str) -> Self {
        self.max = Some(max.to_string());
        self
    }

    pub fn with_lim(mut self, lim: &str) -> Self {
        self.lim = Some(lim.to_string());
        self
    }

    pub fn with_amt(mut self, amt: &str) -> Self {
        self.amt = Some(amt.to_string());
        self
    }

    pub fn with_to(mut self, to: &Address) -> Self {
        self.to = Some(to.to_string());
        self
    }

    pub fn with_dec(mut self, dec: &str) -> Self {
        self.dec = Some(dec.to_string());
        self
    }

    pub fn with_pre(mut self, pre: &str) -> Self {
        self.pre = Some(pre.to_string());
        self
    }

    /// Send payload that redeems what this List payload parks
    pub fn send_for(&self) -> Self {
        Self {
            tick: self.tick.clone(),
            ca: self.ca.clone(),
            ..Self::new(Operation::Send)
        }
    }

    /// Compact JSON as embedded in the script
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn is_issue_mode(&self) -> bool {
        self.mode.as_deref() == Some("issue")
    }

    fn missing(&self, field: &'static str) -> ValidationError {
        ValidationError::MissingField {
            op: self.op.to_string(),
            field,
        }
    }

    /// Check the fields `op` requires. Runs before anything touches the network.
    pub fn validate(&self, network: Network) -> std::result::Result<(), ValidationError> {
        if self.p != PROTOCOL {
            return Err(ValidationError::OutOfRange {
                field: "p",
                value: self.p.clone(),
            });
        }

        match self.op {
            Operation::Deploy if self.is_issue_mode() => {
                let name = self.name.as_deref().ok_or_else(|| self.missing("name"))?;
                check_ticker(name)?;
                self.require(&self.max, "max")?;
            }
            Operation::Deploy => {
                if let Some(mode) = self.mode.as_deref().filter(|m| *m != "mint") {
                    return Err(ValidationError::InvalidMode {
                        op: self.op.to_string(),
                        mode: mode.to_string(),
                    });
                }
                let tick = self.tick.as_deref().ok_or_else(|| self.missing("tick"))?;
                check_ticker(tick)?;
                self.require(&self.max, "max")?;
                self.require(&self.lim, "lim")?;
            }
            Operation::Mint | Operation::Transfer | Operation::List | Operation::Send => {
                match (&self.tick, &self.ca) {
                    (Some(tick), _) => check_ticker(tick)?,
                    (None, Some(_)) => {}
                    (None, None) => return Err(self.missing("tick")),
                }
                if self.op == Operation::Transfer {
                    self.require(&self.amt, "amt")?;
                    self.require(&self.to, "to")?;
                }
                if self.op == Operation::List {
                    self.require(&self.amt, "amt")?;
                }
            }
            Operation::Issue | Operation::Burn => {
                self.require(&self.ca, "ca")?;
                self.require(&self.amt, "amt")?;
            }
            Operation::Blacklist => {
                self.require(&self.ca, "ca")?;
                self.require(&self.to, "to")?;
                let mode = self.mode.as_deref().ok_or_else(|| self.missing("mod"))?;
                if mode != "add" && mode != "remove" {
                    return Err(ValidationError::InvalidMode {
                        op: self.op.to_string(),
                        mode: mode.to_string(),
                    });
                }
            }
            Operation::Chown => {
                self.require(&self.ca, "ca")?;
                self.require(&self.to, "to")?;
            }
        }

        if let Some(ca) = &self.ca {
            if !TxId::new(ca.as_str()).is_valid() {
                return Err(ValidationError::InvalidContractId { ca: ca.clone() });
            }
        }
        for (field, value) in [
            ("max", &self.max),
            ("lim", &self.lim),
            ("amt", &self.amt),
            ("pre", &self.pre),
        ] {
            if let Some(value) = value {
                check_positive(field, value)?;
            }
        }
        if let Some(dec) = &self.dec {
            match dec.parse::<u8>() {
                Ok(d) if d <= MAX_DECIMALS => {}
                _ => {
                    return Err(ValidationError::OutOfRange {
                        field: "dec",
                        value: dec.clone(),
                    })
                }
            }
        }
        if let Some(to) = &self.to {
            check_address(&Address::new(to.as_str()), network)?;
        }
        Ok(())
    }

    fn require(
        &self,
        value: &Option<String>,
        field: &'static str,
    ) -> std::result::Result<(), ValidationError> {
        match value {
            Some(v) if !v.is_empty() => Ok(()),
            _ => Err(self.missing(field)),
        }
    }
}

fn check_ticker(tick: &str) -> std::result::Result<(), ValidationError> {
    let len = tick.chars().count();
    if !TICKER_LEN.contains(&len) {
        return Err(ValidationError::TickerLength { len });
    }
    Ok(())
}

fn check_positive(field: &'static str, value: &str) -> std::result::Result<(), ValidationError> {
    match value.parse::<u128>() {
        Ok(v) if v > 0 => Ok(()),
        _ => Err(ValidationError::NotPositive {
            field,
            value: value.to_string(),
        }),
    }
}

/// Address must decode and belong to `network`
pub fn check_address(address: &Address, network: Network) -> std::result::Result<(), ValidationError> {
    validate_address(address, Some(network)).map_err(|e| match e {
        AddressError::WrongNetwork { expected, .. } => ValidationError::NetworkMismatch {
            address: address.to_string(),
            expected: expected.to_string(),
        },
        other => ValidationError::InvalidAddress {
            address: address.to_string(),
            reason: other.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaspa_tx::testing::MockSigner;
    use kaspa_tx::Signer;

    fn testnet_address(seed: u8) -> Address {
        MockSigner::new(seed).address(Network::Testnet).unwrap()
    }

    fn contract_id() -> String {
        "ab".repeat(32)
    }

    #[test]
    fn test_json_field_order_and_skips() {
        let payload = Krc20Payload::deploy("TESTX", "1000000000000", "10000")
            .with_dec("8")
            .with_pre("1000000000000");
        assert_eq!(
            payload.to_json().unwrap(),
            r#"{"p":"krc-20","op":"deploy","tick":"TESTX","max":"1000000000000","lim":"10000","dec":"8","pre":"1000000000000"}"#
        );

        let json = Krc20Payload::blacklist(&contract_id(), "add", &testnet_address(1))
            .to_json()
            .unwrap();
        assert!(json.contains(r#""mod":"add""#));
        let parsed = Krc20Payload::from_json(&json).unwrap();
        assert_eq!(parsed.mode.as_deref(), Some("add"));
        assert_eq!(parsed.op, Operation::Blacklist);
    }

    #[test]
    fn test_ticker_length_bounds() {
        for (tick, ok) in [("ABC", false), ("ABCD", true), ("ABCDEF", true), ("ABCDEFG", false)] {
            let result = Krc20Payload::mint(tick).validate(Network::Testnet);
            assert_eq!(result.is_ok(), ok, "{}", tick);
        }
        assert_eq!(
            Krc20Payload::mint("AB").validate(Network::Testnet),
            Err(ValidationError::TickerLength { len: 2 })
        );
    }

    #[test]
    fn test_required_fields_per_op() {
        let net = Network::Testnet;
        let to = testnet_address(2);

        let mut transfer = Krc20Payload::transfer("KIWI", "100", &to);
        assert!(transfer.validate(net).is_ok());
        transfer.to = None;
        assert_eq!(
            transfer.validate(net),
            Err(ValidationError::MissingField {
                op: "transfer".into(),
                field: "to"
            })
        );

        let mut deploy = Krc20Payload::deploy("KIWI", "21000000", "1000");
        deploy.lim = None;
        assert!(matches!(
            deploy.validate(net),
            Err(ValidationError::MissingField { field: "lim", .. })
        ));

        assert!(Krc20Payload::deploy_issued("KIWI", "21000000").validate(net).is_ok());
        assert!(matches!(
            Krc20Payload::new(Operation::Deploy)
                .with_mode("issue")
                .with_max("1")
                .validate(net),
            Err(ValidationError::MissingField { field: "name", .. })
        ));

        assert!(matches!(
            Krc20Payload::new(Operation::List).with_tick("KIWI").validate(net),
            Err(ValidationError::MissingField { field: "amt", .. })
        ));
        assert!(Krc20Payload::send("KIWI").validate(net).is_ok());
        assert!(matches!(
            Krc20Payload::new(Operation::Mint).validate(net),
            Err(ValidationError::MissingField { field: "tick", .. })
        ));
    }

    #[test]
    fn test_numeric_and_decimal_ranges() {
        let net = Network::Testnet;
        assert_eq!(
            Krc20Payload::deploy("KIWI", "0", "1").validate(net),
            Err(ValidationError::NotPositive {
                field: "max",
                value: "0".into()
            })
        );
        assert!(matches!(
            Krc20Payload::list("KIWI", "-5").validate(net),
            Err(ValidationError::NotPositive { field: "amt", .. })
        ));
        assert!(Krc20Payload::deploy("KIWI", "1", "1")
            .with_dec("18")
            .validate(net)
            .is_ok());
        assert!(Krc20Payload::deploy("KIWI", "1", "1")
            .with_dec("0")
            .validate(net)
            .is_ok());
        assert!(matches!(
            Krc20Payload::deploy("KIWI", "1", "1").with_dec("19").validate(net),
            Err(ValidationError::OutOfRange { field: "dec", .. })
        ));
    }

    #[test]
    fn test_contract_id_ops() {
        let net = Network::Testnet;
        let ca = contract_id();
        assert!(Krc20Payload::issue(&ca, "500").validate(net).is_ok());
        assert!(Krc20Payload::burn(&ca, "5").validate(net).is_ok());
        assert!(Krc20Payload::chown(&ca, &testnet_address(3)).validate(net).is_ok());
        assert!(matches!(
            Krc20Payload::issue("nothex", "500").validate(net),
            Err(ValidationError::InvalidContractId { .. })
        ));
        assert!(matches!(
            Krc20Payload::blacklist(&ca, "ban", &testnet_address(3)).validate(net),
            Err(ValidationError::InvalidMode { .. })
        ));
        // transfers may address the token by contract id instead of ticker
        assert!(Krc20Payload::new(Operation::Transfer)
            .with_ca(&ca)
            .with_amt("1")
            .with_to(&testnet_address(4))
            .validate(net)
            .is_ok());
    }

    #[test]
    fn test_destination_network_checked() {
        let mainnet = MockSigner::new(2).address(Network::Mainnet).unwrap();
        assert!(matches!(
            Krc20Payload::transfer("KIWI", "1", &mainnet).validate(Network::Testnet),
            Err(ValidationError::NetworkMismatch { .. })
        ));
        assert!(matches!(
            Krc20Payload::transfer("KIWI", "1", &Address::new("kaspatest:garbage"))
                .validate(Network::Testnet),
            Err(ValidationError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_send_for_list() {
        let send = Krc20Payload::list("KIWI", "100").send_for();
        assert_eq!(send, Krc20Payload::send("KIWI"));
    }
}
