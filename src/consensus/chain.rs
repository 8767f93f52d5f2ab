//! Chain configuration and block/transaction factories
//!
//! `ChainParams` is read-only configuration; `Blockchain` couples it with
//! the difficulty controller (the only piece of the configuration that
//! moves after startup) and acts as the factory for genesis blocks and
//! transactions. A process-wide instance can be installed once; everything
//! is also usable without it, so independent parties can validate
//! competing blocks with no shared state.

use num_bigint::BigUint;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use thiserror::Error;

use super::{pow_base_target, Block, DifficultyController};
use crate::constants::{
    COINBASE_AMT_ALLOWED, CONFIRMED_DEPTH, DEFAULT_TX_FEE, POW_LEADING_ZEROES, RETARGET_INTERVAL,
    TARGET_BLOCK_SPACING_SECS,
};
use crate::ledger::{Address, Output, Transaction};

/// Consensus-level errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("invalid proof of work")]
    InvalidProof,
    #[error("the blockchain has not been initialized")]
    NotInitialized,
    #[error("the blockchain has already been initialized")]
    AlreadyInitialized,
}

/// Chain-wide configuration, fixed after initialization
#[derive(Debug, Clone)]
pub struct ChainParams {
    /// Gold awarded for finding a block proof
    pub coinbase_reward: u64,
    /// Fee applied when a transaction does not specify one
    pub default_tx_fee: u64,
    /// Depth below the tip at which a block counts as confirmed
    pub confirmed_depth: u64,
    /// Number of block timestamps in the retargeting window
    pub retarget_interval: usize,
    /// Desired block spacing, in seconds
    pub target_spacing_secs: u64,
    /// Leading zero bits of the initial proof-of-work target
    pub pow_leading_zeroes: u32,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            coinbase_reward: COINBASE_AMT_ALLOWED,
            default_tx_fee: DEFAULT_TX_FEE,
            confirmed_depth: CONFIRMED_DEPTH,
            retarget_interval: RETARGET_INTERVAL,
            target_spacing_secs: TARGET_BLOCK_SPACING_SECS,
            pow_leading_zeroes: POW_LEADING_ZEROES,
        }
    }
}

/// Configuration plus retargeting state. Only the difficulty controller
/// mutates after construction, so it sits behind its own lock and every
/// other accessor is a plain read.
#[derive(Debug)]
pub struct Blockchain {
    params: ChainParams,
    difficulty: Mutex<DifficultyController>,
}

static INSTANCE: OnceLock<Arc<Blockchain>> = OnceLock::new();

impl Blockchain {
    pub fn new(params: ChainParams) -> Self {
        let initial_target = pow_base_target() >> params.pow_leading_zeroes;
        let difficulty = Mutex::new(DifficultyController::new(
            initial_target,
            params.retarget_interval,
            params.target_spacing_secs,
        ));
        Self { params, difficulty }
    }

    /// Install the process-wide instance. May be called at most once.
    pub fn create_instance(params: ChainParams) -> Result<Arc<Blockchain>, ConsensusError> {
        let chain = Arc::new(Blockchain::new(params));
        INSTANCE
            .set(Arc::clone(&chain))
            .map_err(|_| ConsensusError::AlreadyInitialized)?;
        Ok(chain)
    }

    /// The process-wide instance, if one has been installed
    pub fn instance() -> Result<Arc<Blockchain>, ConsensusError> {
        INSTANCE
            .get()
            .cloned()
            .ok_or(ConsensusError::NotInitialized)
    }

    pub fn has_instance() -> bool {
        INSTANCE.get().is_some()
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Current proof-of-work target, as maintained by the difficulty
    /// controller
    pub fn pow_target(&self) -> BigUint {
        self.lock_difficulty().target().clone()
    }

    pub fn coinbase_reward(&self) -> u64 {
        self.params.coinbase_reward
    }

    pub fn default_tx_fee(&self) -> u64 {
        self.params.default_tx_fee
    }

    pub fn confirmed_depth(&self) -> u64 {
        self.params.confirmed_depth
    }

    /// Feed an accepted block's timestamp to the difficulty controller and
    /// let it retarget if the observed spacing warrants it.
    pub fn note_block_accepted(&self, timestamp: u64) {
        let mut difficulty = self.lock_difficulty();
        difficulty.on_block_accepted(timestamp);
        difficulty.maybe_retarget();
    }

    /// Produce the genesis block, fixing the specified starting balances
    pub fn make_genesis(
        &self,
        initial_balances: impl IntoIterator<Item = (Address, u64)>,
    ) -> Block {
        Block::genesis(initial_balances, self.pow_target(), self.params.coinbase_reward)
    }

    /// Produce a candidate block at the current target
    pub fn make_block(&self, reward_addr: Option<Address>, prev_block: Option<&Block>) -> Block {
        Block::new(
            reward_addr,
            prev_block,
            self.pow_target(),
            self.params.coinbase_reward,
        )
    }

    /// Produce an unsigned transaction, applying the default fee unless the
    /// sender overrides it
    pub fn make_transaction(
        &self,
        from: Address,
        outputs: Vec<Output>,
        nonce: u64,
        fee: Option<u64>,
    ) -> Transaction {
        Transaction::new(from, outputs, fee.unwrap_or(self.params.default_tx_fee), nonce)
    }

    fn lock_difficulty(&self) -> std::sync::MutexGuard<'_, DifficultyController> {
        self.difficulty
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
