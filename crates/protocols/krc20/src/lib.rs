//! KRC-20 token operations over Kaspa commit/reveal
//!
//! Each operation embeds a JSON payload in a P2SH metadata script. A
//! commit transaction funds the script's address and a reveal spends it,
//! publishing the payload on chain. Beyond the single-op path this crate
//! runs chained multi-mints, the two-party sale of a listing, and
//! threshold-owned transfers.

pub mod context;
pub mod exchange;
pub mod kas;
pub mod multi_mint;
pub mod operation;
pub mod payload;
pub mod transfer_multi;

#[cfg(test)]
mod testing;

pub use context::{AddressLocks, Context};
pub use exchange::{reveal_pskt, send, sign_partial_half};
pub use kas::{balance_of, transfer_kas, transfer_kas_from_threshold, transfer_kas_to_many};
pub use multi_mint::{multi_mint, multi_mint_amount, multi_mint_with_reuse_utxo};
pub use operation::{
    blacklist, burn, chown, commit_amount, deploy, execute_commit, execute_operation,
    execute_reveal, issue, list, mint, reveal_fee, transfer, OperationResult, OperationScript,
};
pub use payload::{Krc20Payload, Operation, MARKER, PROTOCOL};
pub use transfer_multi::transfer_multi;
