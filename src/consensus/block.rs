//! Block structure and transaction admission
//!
//! A block couples a Merkle commitment over its transactions with a ledger
//! derived from its parent. Transactions enter one at a time through a fixed
//! sequence of checks; a failing check leaves the block untouched. Once a
//! proof is assigned the block is sealed and accepts nothing further.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use super::ConsensusError;
use crate::constants::MAX_BLOCK_SIZE_BYTES;
use crate::crypto::{hash_bytes, Hash, MerkleCommitment};
use crate::ledger::{Address, Ledger, SignatureVerifier, Transaction};

/// Reasons a transaction is refused admission. All are returned to the
/// caller, never thrown across the commitment/ledger boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("transaction would exceed the maximum block size")]
    SizeExceeded,
    #[error("duplicate transaction")]
    DuplicateTransaction,
    #[error("transaction is missing a signature")]
    MissingSignature,
    #[error("invalid transaction signature")]
    InvalidSignature,
    #[error("transaction amounts overflow")]
    AmountOverflow,
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("replayed transaction: nonce {got} below expected {expected}")]
    ReplayedTransaction { got: u64, expected: u64 },
    #[error("out of order transaction: nonce {got} above expected {expected}")]
    OutOfOrderTransaction { got: u64, expected: u64 },
    #[error("block already has a proof assigned")]
    BlockSealed,
}

/// A block in the AU chain.
///
/// The ledger and current size are derived state: they are rebuilt by
/// `rerun` when a block arrives from an untrusted source, and are excluded
/// from the consensus header serialization.
#[derive(Debug, Clone)]
pub struct Block {
    prev_block_hash: Option<Hash>,
    target: BigUint,
    chain_length: u64,
    timestamp: u64,
    reward_addr: Option<Address>,
    coinbase_reward: u64,
    proof: Option<u64>,
    commitment: MerkleCommitment,
    ledger: Ledger,
    current_size: usize,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Block {
    /// Create a new block on top of an optional parent.
    ///
    /// The parent's ledger is copied and the parent's total reward (coinbase
    /// plus fees) is credited to its reward address here, one block late:
    /// a miner cannot spend a reward in the block that earned it.
    pub fn new(
        reward_addr: Option<Address>,
        prev_block: Option<&Block>,
        target: BigUint,
        coinbase_reward: u64,
    ) -> Self {
        let mut ledger = prev_block
            .map(|prev| prev.ledger.clone())
            .unwrap_or_default();

        if let Some(prev) = prev_block {
            if let Some(winner) = &prev.reward_addr {
                ledger.credit(winner, prev.total_rewards());
            }
        }

        Self {
            prev_block_hash: prev_block.map(Block::hash_val),
            target,
            chain_length: prev_block.map(|prev| prev.chain_length + 1).unwrap_or(0),
            timestamp: now_secs(),
            reward_addr,
            coinbase_reward,
            proof: None,
            commitment: MerkleCommitment::default(),
            ledger,
            current_size: 0,
        }
    }

    /// Create the genesis block. This is the only block permitted to set
    /// balances directly rather than through transaction admission.
    pub fn genesis(
        initial_balances: impl IntoIterator<Item = (Address, u64)>,
        target: BigUint,
        coinbase_reward: u64,
    ) -> Self {
        let mut block = Block::new(None, None, target, coinbase_reward);
        block.ledger = Ledger::with_balances(initial_balances);
        block
    }

    /// True iff this block begins the chain
    pub fn is_genesis(&self) -> bool {
        self.chain_length == 0
    }

    /// Accept a new transaction if it passes every admission check, in
    /// order: size, duplicate, signature, solvency, nonce. The first
    /// failure short-circuits with no mutation; on success the commitment
    /// append, ledger update, and size accounting land as one unit.
    pub fn add_transaction(
        &mut self,
        tx: Transaction,
        verifier: &dyn SignatureVerifier,
    ) -> Result<(), AdmissionError> {
        if self.proof.is_some() {
            return Err(AdmissionError::BlockSealed);
        }
        self.admit(tx, verifier)
    }

    fn admit(
        &mut self,
        tx: Transaction,
        verifier: &dyn SignatureVerifier,
    ) -> Result<(), AdmissionError> {
        let tx_size = tx.size_bytes();
        if self.current_size + tx_size > MAX_BLOCK_SIZE_BYTES {
            return Err(AdmissionError::SizeExceeded);
        }

        if self.commitment.contains(&tx.id()) {
            return Err(AdmissionError::DuplicateTransaction);
        }

        if tx.sig.is_none() {
            return Err(AdmissionError::MissingSignature);
        }
        if !verifier.verify(&tx) {
            return Err(AdmissionError::InvalidSignature);
        }

        let have = self.ledger.balance_of(&tx.from);
        let need = tx.total_output().ok_or(AdmissionError::AmountOverflow)?;
        if have < need {
            return Err(AdmissionError::InsufficientFunds { have, need });
        }

        let expected = self.ledger.next_nonce_of(&tx.from);
        if tx.nonce < expected {
            return Err(AdmissionError::ReplayedTransaction {
                got: tx.nonce,
                expected,
            });
        }
        if tx.nonce > expected {
            return Err(AdmissionError::OutOfOrderTransaction {
                got: tx.nonce,
                expected,
            });
        }

        self.ledger.apply(&tx);
        self.commitment.append(tx);
        self.current_size += tx_size;
        Ok(())
    }

    /// Rebuild this block's derived state from its parent by replaying the
    /// existing transaction list in original order.
    ///
    /// Only the received header fields and transactions are trusted; the
    /// ledger and size are recomputed here. Any replay failure means the
    /// whole block is invalid and must be discarded by the caller.
    pub fn rerun(
        &mut self,
        prev_block: &Block,
        verifier: &dyn SignatureVerifier,
    ) -> Result<(), AdmissionError> {
        self.ledger = prev_block.ledger.clone();
        if let Some(winner) = &prev_block.reward_addr {
            self.ledger.credit(winner, prev_block.total_rewards());
        }

        let transactions: Vec<Transaction> = self.commitment.transactions().to_vec();
        self.commitment = MerkleCommitment::default();
        self.current_size = 0;

        for tx in transactions {
            self.admit(tx, verifier)?;
        }
        Ok(())
    }

    /// Total gold owed to this block's reward address: the coinbase reward
    /// plus every admitted transaction's fee. Credited to the ledger of the
    /// next block built on this one, not to this block's own ledger.
    pub fn total_rewards(&self) -> u64 {
        self.commitment
            .transactions()
            .iter()
            .fold(self.coinbase_reward, |acc, tx| acc.saturating_add(tx.fee))
    }

    /// Canonical serialization of the consensus header fields, in fixed
    /// order: prev hash, commitment root (or, for genesis, the sorted
    /// initial balance table), target, chain length, timestamp, reward
    /// address, coinbase reward, proof. Balances and nonce tables of
    /// non-genesis blocks are deliberately excluded; the commitment root
    /// alone represents the transaction set.
    pub fn header_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        match &self.prev_block_hash {
            Some(hash) => {
                bytes.push(1);
                bytes.extend_from_slice(&hash.0);
            }
            None => bytes.push(0),
        }

        if self.is_genesis() {
            let mut balances: Vec<(&Address, u64)> = self.ledger.balances().collect();
            balances.sort_by(|a, b| a.0.cmp(b.0));
            bytes.extend_from_slice(&(balances.len() as u32).to_le_bytes());
            for (addr, amount) in balances {
                let addr = addr.as_str().as_bytes();
                bytes.extend_from_slice(&(addr.len() as u32).to_le_bytes());
                bytes.extend_from_slice(addr);
                bytes.extend_from_slice(&amount.to_le_bytes());
            }
        } else {
            bytes.extend_from_slice(&self.commitment.root().0);
        }

        let target = self.target.to_bytes_be();
        bytes.extend_from_slice(&(target.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&target);

        bytes.extend_from_slice(&self.chain_length.to_le_bytes());
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());

        match &self.reward_addr {
            Some(addr) => {
                let addr = addr.as_str().as_bytes();
                bytes.push(1);
                bytes.extend_from_slice(&(addr.len() as u32).to_le_bytes());
                bytes.extend_from_slice(addr);
            }
            None => bytes.push(0),
        }

        bytes.extend_from_slice(&self.coinbase_reward.to_le_bytes());

        match self.proof {
            Some(proof) => {
                bytes.push(1);
                bytes.extend_from_slice(&proof.to_le_bytes());
            }
            None => bytes.push(0),
        }

        bytes
    }

    /// Cryptographic hash of the consensus header
    pub fn hash_val(&self) -> Hash {
        hash_bytes(&self.header_bytes())
    }

    /// The block hash, used as its id
    pub fn id(&self) -> Hash {
        self.hash_val()
    }

    /// Assign a candidate proof. Miners may call this repeatedly during the
    /// search; once any proof is present the block no longer admits
    /// transactions.
    pub fn set_proof(&mut self, proof: u64) {
        self.proof = Some(proof);
    }

    /// True iff a proof is assigned and the header hash, read as a
    /// big-endian unsigned integer, is strictly below the target.
    pub fn has_valid_proof(&self) -> bool {
        if self.proof.is_none() {
            return false;
        }
        let hash = self.hash_val();
        BigUint::from_bytes_be(&hash.0) < self.target
    }

    /// `has_valid_proof` as a `Result`, for callers validating received
    /// blocks.
    pub fn validate_proof(&self) -> Result<(), ConsensusError> {
        if self.has_valid_proof() {
            Ok(())
        } else {
            Err(ConsensusError::InvalidProof)
        }
    }

    /// Available gold for an address as of this block
    pub fn balance_of(&self, addr: &Address) -> u64 {
        self.ledger.balance_of(addr)
    }

    /// The nonce this block expects next from a sender
    pub fn next_nonce_of(&self, addr: &Address) -> u64 {
        self.ledger.next_nonce_of(addr)
    }

    /// True if this block (not any ancestor) contains the transaction
    pub fn contains(&self, tx: &Transaction) -> bool {
        self.commitment.contains(&tx.id())
    }

    pub fn prev_block_hash(&self) -> Option<&Hash> {
        self.prev_block_hash.as_ref()
    }

    pub fn chain_length(&self) -> u64 {
        self.chain_length
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn target(&self) -> &BigUint {
        &self.target
    }

    pub fn reward_addr(&self) -> Option<&Address> {
        self.reward_addr.as_ref()
    }

    pub fn coinbase_reward(&self) -> u64 {
        self.coinbase_reward
    }

    pub fn proof(&self) -> Option<u64> {
        self.proof
    }

    pub fn commitment(&self) -> &MerkleCommitment {
        &self.commitment
    }

    pub fn current_size(&self) -> usize {
        self.current_size
    }

    /// Network form of this block: exactly the trusted fields, plus the
    /// balance table when this is the genesis block.
    pub fn to_wire(&self) -> WireBlock {
        let initial_balances = if self.is_genesis() {
            let mut balances: Vec<(Address, u64)> = self
                .ledger
                .balances()
                .map(|(addr, amount)| (addr.clone(), amount))
                .collect();
            balances.sort_by(|a, b| a.0.cmp(&b.0));
            Some(balances)
        } else {
            None
        };

        WireBlock {
            prev_block_hash: self.prev_block_hash,
            proof: self.proof,
            reward_addr: self.reward_addr.clone(),
            transactions: self.commitment.transactions().to_vec(),
            target: self.target.clone(),
            chain_length: self.chain_length,
            timestamp: self.timestamp,
            initial_balances,
        }
    }

    /// Reconstruct a block from its network form. The ledger and size of a
    /// non-genesis block are left empty; callers must `rerun` against the
    /// parent before trusting any derived state.
    pub fn from_wire(wire: WireBlock, coinbase_reward: u64) -> Self {
        let genesis = wire.chain_length == 0;
        Self {
            prev_block_hash: wire.prev_block_hash,
            target: wire.target,
            chain_length: wire.chain_length,
            timestamp: wire.timestamp,
            reward_addr: wire.reward_addr,
            coinbase_reward,
            proof: wire.proof,
            commitment: if genesis {
                MerkleCommitment::default()
            } else {
                MerkleCommitment::new(wire.transactions)
            },
            ledger: if genesis {
                Ledger::with_balances(wire.initial_balances.unwrap_or_default())
            } else {
                Ledger::new()
            },
            current_size: 0,
        }
    }
}

mod target_serde {
    use num_bigint::BigUint;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(target: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&target.to_str_radix(16))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex: String = Deserialize::deserialize(deserializer)?;
        BigUint::parse_bytes(hex.as_bytes(), 16)
            .ok_or_else(|| serde::de::Error::custom("invalid target"))
    }
}

/// The fields of a block that cross the network. Everything else (ledger,
/// size) is derived and recomputed by the receiver via `Block::rerun`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireBlock {
    pub prev_block_hash: Option<Hash>,
    pub proof: Option<u64>,
    pub reward_addr: Option<Address>,
    pub transactions: Vec<Transaction>,
    #[serde(with = "target_serde")]
    pub target: BigUint,
    pub chain_length: u64,
    pub timestamp: u64,
    /// Present only for the genesis block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_balances: Option<Vec<(Address, u64)>>,
}
