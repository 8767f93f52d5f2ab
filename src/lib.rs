//! AURUM (AU) Ledger Core Library
//!
//! An account-based cryptocurrency core with PoW consensus, per-block
//! balance/nonce bookkeeping, and Merkle transaction commitments.
//!
//! AU is the short form used in addresses and protocol identifiers.
//! The crate covers a single block's consensus logic; networking, the
//! mining search loop, and fork choice are left to collaborators.

pub mod consensus;
pub mod crypto;
pub mod ledger;

/// Protocol constants - defaults for `ChainParams`
pub mod constants {
    /// Bits shifted off the base target to form the default PoW target
    pub const POW_LEADING_ZEROES: u32 = 15;

    /// Gold a miner earns for finding a block proof
    pub const COINBASE_AMT_ALLOWED: u64 = 25;

    /// Fee charged per transaction unless the sender overrides it
    pub const DEFAULT_TX_FEE: u64 = 1;

    /// A block this many blocks below the tip is considered confirmed.
    /// The genesis block is always confirmed.
    pub const CONFIRMED_DEPTH: u64 = 6;

    /// Maximum serialized size of all transactions in a block
    pub const MAX_BLOCK_SIZE_BYTES: usize = 1024;

    /// Number of recent block timestamps the retargeting window retains
    pub const RETARGET_INTERVAL: usize = 10;

    /// Desired spacing between blocks, in seconds
    pub const TARGET_BLOCK_SPACING_SECS: u64 = 300;

    /// Chain name (short form for addresses)
    pub const CHAIN_NAME: &str = "AU";

    /// Full chain name
    pub const CHAIN_FULL_NAME: &str = "AURUM";
}
