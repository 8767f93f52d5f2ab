//! Merkle commitment over a block's transactions
//!
//! An ordered, append-only hash tree. Level 0 holds one leaf per admitted
//! transaction (in admission order); each higher level pairs adjacent nodes
//! left to right. An odd trailing node is promoted with a unary hash rather
//! than being duplicated, so the tree shape is deterministic for any leaf
//! count. The empty commitment's root is the zero-hash sentinel, and a
//! single-leaf tree's root is that leaf's own hash.

use std::collections::HashMap;
use thiserror::Error;

use super::{hash_lone, hash_pair, Hash};
use crate::ledger::Transaction;

/// Commitment errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitmentError {
    #[error("no leaf at index {0}")]
    IndexNotFound(usize),
}

/// One step of an inclusion proof, ordered from the leaf upward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofStep {
    /// Combine with a sibling hash; `sibling_is_left` tells which side the
    /// sibling sits on.
    Pair { sibling: Hash, sibling_is_left: bool },
    /// The node had no sibling on its level and was promoted alone.
    Promote,
}

/// Inclusion proof for one transaction leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionProof {
    /// Index of the leaf in the commitment
    pub index: usize,
    /// Steps from the leaf up to (but excluding) the root
    pub steps: Vec<ProofStep>,
}

/// Hash tree committing to an ordered transaction sequence.
///
/// `levels[0]` are the leaf hashes; the last level holds the single root.
/// `lookup` maps transaction id to leaf index and must stay consistent with
/// the leaves on every append; it is a cache, never the source of truth.
#[derive(Debug, Clone, Default)]
pub struct MerkleCommitment {
    transactions: Vec<Transaction>,
    levels: Vec<Vec<Hash>>,
    lookup: HashMap<Hash, usize>,
}

impl MerkleCommitment {
    /// Build a commitment over an ordered transaction sequence
    pub fn new(transactions: Vec<Transaction>) -> Self {
        let mut commitment = Self::default();
        for tx in transactions {
            commitment.append(tx);
        }
        commitment
    }

    /// Add a transaction leaf, recomputing only the leaf-to-root path
    pub fn append(&mut self, tx: Transaction) {
        let leaf = tx.id();
        let index = self.transactions.len();
        self.lookup.insert(leaf, index);
        self.transactions.push(tx);

        if self.levels.is_empty() {
            self.levels.push(vec![leaf]);
        } else {
            self.levels[0].push(leaf);
        }
        self.recompute_path(index);
    }

    /// Root commitment hash; the zero sentinel when no leaves exist
    pub fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or_else(Hash::zero)
    }

    /// Number of transaction leaves
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// The committed transactions, in admission order
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// True if a transaction with this id has been committed
    pub fn contains(&self, tx_id: &Hash) -> bool {
        self.lookup.contains_key(tx_id)
    }

    /// Leaf index of a committed transaction id
    pub fn position(&self, tx_id: &Hash) -> Option<usize> {
        self.lookup.get(tx_id).copied()
    }

    /// Leaf hash at the given index
    pub fn leaf(&self, index: usize) -> Option<Hash> {
        self.levels.first().and_then(|leaves| leaves.get(index)).copied()
    }

    /// Build an inclusion proof for the leaf at `index`
    pub fn prove_inclusion(&self, index: usize) -> Result<InclusionProof, CommitmentError> {
        if index >= self.transactions.len() {
            return Err(CommitmentError::IndexNotFound(index));
        }

        let mut steps = Vec::new();
        let mut idx = index;
        let mut level = 0;
        while self.levels[level].len() > 1 {
            let sibling_idx = idx ^ 1;
            match self.levels[level].get(sibling_idx) {
                Some(sibling) => steps.push(ProofStep::Pair {
                    sibling: *sibling,
                    sibling_is_left: sibling_idx < idx,
                }),
                None => steps.push(ProofStep::Promote),
            }
            idx /= 2;
            level += 1;
        }

        Ok(InclusionProof { index, steps })
    }

    /// Recompute a proof upward from a leaf hash and compare against a
    /// claimed root. Pure: usable by any party holding only the leaf, the
    /// proof, and the root.
    pub fn verify_inclusion(leaf_hash: &Hash, proof: &InclusionProof, expected_root: &Hash) -> bool {
        let mut current = *leaf_hash;
        for step in &proof.steps {
            current = match step {
                ProofStep::Pair {
                    sibling,
                    sibling_is_left: true,
                } => hash_pair(sibling, &current),
                ProofStep::Pair {
                    sibling,
                    sibling_is_left: false,
                } => hash_pair(&current, sibling),
                ProofStep::Promote => hash_lone(&current),
            };
        }
        current == *expected_root
    }

    /// Recompute parent hashes along the path from leaf `idx` to the root,
    /// growing the level vector as the tree gains height.
    fn recompute_path(&mut self, mut idx: usize) {
        let mut level = 0;
        while self.levels[level].len() > 1 {
            let parent_idx = idx / 2;
            let left = self.levels[level][parent_idx * 2];
            let right = self.levels[level].get(parent_idx * 2 + 1).copied();
            let parent = match right {
                Some(right) => hash_pair(&left, &right),
                None => hash_lone(&left),
            };

            if self.levels.len() == level + 1 {
                self.levels.push(Vec::new());
            }
            let next = &mut self.levels[level + 1];
            if parent_idx < next.len() {
                next[parent_idx] = parent;
            } else {
                next.push(parent);
            }

            idx = parent_idx;
            level += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Address, Output, Transaction};

    fn make_tx(tag: u64) -> Transaction {
        Transaction::new(
            Address::new(format!("AUtest{}", tag)),
            vec![Output {
                address: Address::new("AUrecipient"),
                amount: tag,
            }],
            1,
            0,
        )
    }

    fn make_txs(n: u64) -> Vec<Transaction> {
        (0..n).map(make_tx).collect()
    }

    /// Straightforward bulk rebuild of the pairing rule, for comparison
    /// against the incremental path recompute.
    fn reference_root(leaves: &[Hash]) -> Hash {
        if leaves.is_empty() {
            return Hash::zero();
        }
        let mut level = leaves.to_vec();
        while level.len() > 1 {
            let mut next = Vec::with_capacity((level.len() + 1) / 2);
            for pair in level.chunks(2) {
                if pair.len() == 2 {
                    next.push(hash_pair(&pair[0], &pair[1]));
                } else {
                    next.push(hash_lone(&pair[0]));
                }
            }
            level = next;
        }
        level[0]
    }

    #[test]
    fn test_empty_root_is_sentinel() {
        let commitment = MerkleCommitment::new(vec![]);
        assert_eq!(commitment.root(), Hash::zero());
        assert!(commitment.is_empty());
    }

    #[test]
    fn test_single_leaf_root_is_leaf_hash() {
        let tx = make_tx(7);
        let id = tx.id();
        let commitment = MerkleCommitment::new(vec![tx]);
        assert_eq!(commitment.root(), id);
    }

    #[test]
    fn test_two_leaves() {
        let txs = make_txs(2);
        let expected = hash_pair(&txs[0].id(), &txs[1].id());
        let commitment = MerkleCommitment::new(txs);
        assert_eq!(commitment.root(), expected);
    }

    #[test]
    fn test_root_deterministic() {
        let root1 = MerkleCommitment::new(make_txs(10)).root();
        let root2 = MerkleCommitment::new(make_txs(10)).root();
        assert_eq!(root1, root2);
    }

    #[test]
    fn test_permuting_order_changes_root() {
        let txs = make_txs(4);
        let mut reversed = txs.clone();
        reversed.reverse();

        let root = MerkleCommitment::new(txs).root();
        let reversed_root = MerkleCommitment::new(reversed).root();
        assert_ne!(root, reversed_root);
    }

    #[test]
    fn test_incremental_append_matches_bulk_rebuild() {
        let mut commitment = MerkleCommitment::default();
        for tag in 0..13 {
            commitment.append(make_tx(tag));
            let leaves: Vec<Hash> = (0..=tag).map(|t| make_tx(t).id()).collect();
            assert_eq!(commitment.root(), reference_root(&leaves));
        }
    }

    #[test]
    fn test_proofs_verify_for_all_indices() {
        for n in 1..=9u64 {
            let commitment = MerkleCommitment::new(make_txs(n));
            let root = commitment.root();
            for i in 0..n as usize {
                let proof = commitment.prove_inclusion(i).unwrap();
                let leaf = commitment.leaf(i).unwrap();
                assert!(
                    MerkleCommitment::verify_inclusion(&leaf, &proof, &root),
                    "proof failed for leaf {} of {}",
                    i,
                    n
                );
            }
        }
    }

    #[test]
    fn test_tampered_sibling_fails_verification() {
        let commitment = MerkleCommitment::new(make_txs(5));
        let root = commitment.root();

        for i in 0..5 {
            let mut proof = commitment.prove_inclusion(i).unwrap();
            let leaf = commitment.leaf(i).unwrap();
            for step in 0..proof.steps.len() {
                if let ProofStep::Pair { sibling, .. } = &mut proof.steps[step] {
                    let original = *sibling;
                    *sibling = crate::crypto::hash_bytes(b"tampered");
                    assert!(!MerkleCommitment::verify_inclusion(&leaf, &proof, &root));
                    if let ProofStep::Pair { sibling, .. } = &mut proof.steps[step] {
                        *sibling = original;
                    }
                }
            }
        }
    }

    #[test]
    fn test_wrong_leaf_fails_verification() {
        let commitment = MerkleCommitment::new(make_txs(8));
        let root = commitment.root();
        let proof = commitment.prove_inclusion(3).unwrap();
        let wrong_leaf = make_tx(99).id();
        assert!(!MerkleCommitment::verify_inclusion(&wrong_leaf, &proof, &root));
    }

    #[test]
    fn test_proof_out_of_range() {
        let commitment = MerkleCommitment::new(make_txs(3));
        assert_eq!(
            commitment.prove_inclusion(3),
            Err(CommitmentError::IndexNotFound(3))
        );
    }

    #[test]
    fn test_lookup_tracks_appends() {
        let mut commitment = MerkleCommitment::default();
        let tx = make_tx(1);
        let id = tx.id();
        assert!(!commitment.contains(&id));

        commitment.append(tx);
        assert!(commitment.contains(&id));
        assert_eq!(commitment.position(&id), Some(0));

        let other = make_tx(2);
        commitment.append(other.clone());
        assert_eq!(commitment.position(&other.id()), Some(1));
    }
}
