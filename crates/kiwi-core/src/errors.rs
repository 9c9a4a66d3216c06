//! Error types for Kiwi

use thiserror::Error;

use crate::TxId;

/// Core errors that can occur in Kiwi
#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TxError),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Commit is on the ledger but the reveal did not go through. Funds stay
    /// at the escrow address until a reveal against `commit_tx_id` succeeds.
    #[error("Reveal failed after commit {commit_tx_id}: {source}")]
    RevealFailed {
        commit_tx_id: TxId,
        source: Box<Error>,
    },

    #[error("Mint chain stopped after {} reveal(s): {source}", completed.len())]
    MintChainBroken {
        completed: Vec<TxId>,
        source: Box<Error>,
    },

    /// Part of a consolidation chain is on the ledger. Resubmitting the
    /// same pending transaction continues after `accepted`.
    #[error("Transaction chain stopped after {} accepted: {source}", accepted.len())]
    ChainInterrupted {
        accepted: Vec<TxId>,
        source: Box<Error>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Payload validation errors, raised before any network call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("'{field}' is required for {op}")]
    MissingField { op: String, field: &'static str },

    #[error("Ticker must be between 4 and 6 characters, got {len}")]
    TickerLength { len: usize },

    #[error("'{field}' must be a positive integer, got '{value}'")]
    NotPositive { field: &'static str, value: String },

    #[error("'{field}' is out of range: {value}")]
    OutOfRange { field: &'static str, value: String },

    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Invalid contract id '{ca}'")]
    InvalidContractId { ca: String },

    #[error("Unsupported mode '{mode}' for {op}")]
    InvalidMode { op: String, mode: String },

    #[error("Address {address} does not belong to {expected}")]
    NetworkMismatch { address: String, expected: String },

    #[error("Iteration count must be at least 1")]
    ZeroCount,
}

/// Script construction and parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("Public key set is empty")]
    EmptyKeySet,

    #[error("Threshold must be at least 1")]
    ZeroThreshold,

    #[error("Threshold {required} exceeds key count {keys}")]
    ThresholdExceedsKeys { required: usize, keys: usize },

    #[error("At most {max} keys are supported, got {count}")]
    TooManyKeys { count: usize, max: usize },

    #[error("Invalid {scheme} public key of {len} bytes")]
    InvalidKey { scheme: &'static str, len: usize },

    #[error("Lock time {lock_time} is not in the future (now {now})")]
    LockTimeNotInFuture { lock_time: u64, now: u64 },

    #[error("Malformed script: {message}")]
    Malformed { message: String },

    #[error("Signer key {key} is not part of the threshold script")]
    UnknownSigner { key: String },

    #[error("Need {required} signatures, have {provided}")]
    NotEnoughSignatures { required: usize, provided: usize },

    #[error("Signatures are not in the threshold script's key order")]
    KeyOrderMismatch,

    #[error("Signature check failed for input {input}")]
    VerificationFailed { input: usize },
}

/// Transaction building errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    #[error("Insufficient funds: need {required} sompi, have {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("No UTXO entries provided")]
    NoEntries,

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Input {index} has no UTXO entry attached")]
    MissingUtxo { index: usize },

    #[error("No signer for input {index}")]
    MissingSigner { index: usize },

    #[error("Input index {index} out of range")]
    InputOutOfRange { index: usize },

    #[error("Transaction mass {mass} exceeds maximum {max}")]
    MassExceeded { mass: u64, max: u64 },

    #[error("Transaction already submitted")]
    AlreadySubmitted,

    #[error("Signing failed: {message}")]
    Signing { message: String },

    #[error("Failed to build transaction: {message}")]
    BuildFailed { message: String },

    #[error("Failed to serialize transaction: {message}")]
    SerializationFailed { message: String },
}

/// Node connection and query errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("Node unreachable at {url}")]
    Unreachable { url: String },

    #[error("Node returned error: {message}")]
    ApiError { message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Node rejected transaction: {message}")]
    SubmissionRejected { message: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Node request timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Protocol-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Unsupported operation '{op}'")]
    UnsupportedOperation { op: String },

    #[error("Expected a '{expected}' payload, got '{actual}'")]
    OperationMismatch { expected: String, actual: String },

    #[error("Partially signed transaction is malformed: {reason}")]
    MalformedPartial { reason: String },
}

/// Coarse error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    InsufficientFunds,
    Script,
    RelaySubmission,
    NotFound,
    Protocol,
    Transaction,
    Node,
    Config,
    Serialization,
}

/// Result type alias for Kiwi operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify this error; wrapped phase failures report their cause
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Script(_) => ErrorKind::Script,
            Self::Transaction(TxError::InsufficientFunds { .. }) => ErrorKind::InsufficientFunds,
            Self::Transaction(_) => ErrorKind::Transaction,
            Self::Node(NodeError::SubmissionRejected { .. }) => ErrorKind::RelaySubmission,
            Self::Node(NodeError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Node(_) => ErrorKind::Node,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::RevealFailed { source, .. }
            | Self::MintChainBroken { source, .. }
            | Self::ChainInterrupted { source, .. } => source.kind(),
            Self::Config(_) => ErrorKind::Config,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Commit id to retry the reveal against, if the commit already went out
    pub fn commit_tx_id(&self) -> Option<&TxId> {
        match self {
            Self::RevealFailed { commit_tx_id, .. } => Some(commit_tx_id),
            _ => None,
        }
    }

    /// Get a stable machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "validation_failed",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::Script => "script_error",
            ErrorKind::RelaySubmission => "relay_rejected",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Protocol => "protocol_error",
            ErrorKind::Transaction => "transaction_error",
            ErrorKind::Node => "node_error",
            ErrorKind::Config => "config_error",
            ErrorKind::Serialization => "serialization_error",
        }
    }
}
