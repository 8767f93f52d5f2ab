//! Per-block account state
//!
//! Every block owns its own `Ledger`, copied from its parent at
//! construction, so competing blocks can be built and validated in parallel
//! with no shared mutable state. Balances only move through transaction
//! admission; the genesis block is the sole exception.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::Transaction;
use crate::ledger::Address;

/// Address-keyed balances and expected next nonces.
///
/// Missing entries read as zero. For every admitted transaction the
/// sender's next nonce advances by exactly one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    balances: HashMap<Address, u64>,
    next_nonce: HashMap<Address, u64>,
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger seeded with initial balances (genesis only)
    pub fn with_balances(balances: impl IntoIterator<Item = (Address, u64)>) -> Self {
        Self {
            balances: balances.into_iter().collect(),
            next_nonce: HashMap::new(),
        }
    }

    /// Available gold for an address
    pub fn balance_of(&self, addr: &Address) -> u64 {
        self.balances.get(addr).copied().unwrap_or(0)
    }

    /// Smallest nonce not yet consumed for an address
    pub fn next_nonce_of(&self, addr: &Address) -> u64 {
        self.next_nonce.get(addr).copied().unwrap_or(0)
    }

    /// Add gold to an address (used for deferred mining rewards).
    /// Balances saturate at `u64::MAX`.
    pub fn credit(&mut self, addr: &Address, amount: u64) {
        let balance = self.balance_of(addr);
        self.balances.insert(addr.clone(), balance.saturating_add(amount));
    }

    /// Apply an admitted transaction: debit the sender's total output,
    /// credit every output, and advance the sender's nonce.
    ///
    /// Callers must have checked solvency and nonce equality first; the
    /// three mutations are then applied as one unit.
    pub fn apply(&mut self, tx: &Transaction) {
        let total = tx.total_output().unwrap_or(u64::MAX);
        let sender_balance = self.balance_of(&tx.from);
        debug_assert!(sender_balance >= total);
        self.balances
            .insert(tx.from.clone(), sender_balance.saturating_sub(total));

        for output in &tx.outputs {
            let balance = self.balance_of(&output.address);
            self.balances
                .insert(output.address.clone(), balance.saturating_add(output.amount));
        }

        let nonce = self.next_nonce_of(&tx.from);
        debug_assert_eq!(nonce, tx.nonce);
        self.next_nonce.insert(tx.from.clone(), nonce + 1);
    }

    /// Iterate over all known balances
    pub fn balances(&self) -> impl Iterator<Item = (&Address, u64)> {
        self.balances.iter().map(|(addr, amount)| (addr, *amount))
    }

    /// Sum of all balances
    pub fn total_gold(&self) -> u64 {
        self.balances.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Output;

    fn addr(name: &str) -> Address {
        Address::new(name)
    }

    #[test]
    fn test_missing_entries_read_zero() {
        let ledger = Ledger::new();
        assert_eq!(ledger.balance_of(&addr("AUnobody")), 0);
        assert_eq!(ledger.next_nonce_of(&addr("AUnobody")), 0);
    }

    #[test]
    fn test_with_balances() {
        let ledger = Ledger::with_balances([(addr("AUalice"), 100), (addr("AUbob"), 0)]);
        assert_eq!(ledger.balance_of(&addr("AUalice")), 100);
        assert_eq!(ledger.balance_of(&addr("AUbob")), 0);
        assert_eq!(ledger.total_gold(), 100);
    }

    #[test]
    fn test_apply_moves_gold_and_advances_nonce() {
        let mut ledger = Ledger::with_balances([(addr("AUalice"), 100)]);
        let tx = Transaction::new(
            addr("AUalice"),
            vec![Output {
                address: addr("AUbob"),
                amount: 30,
            }],
            1,
            0,
        );

        ledger.apply(&tx);

        assert_eq!(ledger.balance_of(&addr("AUalice")), 69);
        assert_eq!(ledger.balance_of(&addr("AUbob")), 30);
        assert_eq!(ledger.next_nonce_of(&addr("AUalice")), 1);
        // The fee is held back until the miner's deferred reward
        assert_eq!(ledger.total_gold(), 99);
    }

    #[test]
    fn test_self_payment() {
        let mut ledger = Ledger::with_balances([(addr("AUalice"), 50)]);
        let tx = Transaction::new(
            addr("AUalice"),
            vec![Output {
                address: addr("AUalice"),
                amount: 20,
            }],
            1,
            0,
        );

        ledger.apply(&tx);
        assert_eq!(ledger.balance_of(&addr("AUalice")), 49);
    }

    #[test]
    fn test_credit_saturates() {
        let mut ledger = Ledger::with_balances([(addr("AUwhale"), u64::MAX - 1)]);
        ledger.credit(&addr("AUwhale"), 10);
        assert_eq!(ledger.balance_of(&addr("AUwhale")), u64::MAX);
    }

    #[test]
    fn test_credit_accumulates() {
        let mut ledger = Ledger::new();
        ledger.credit(&addr("AUminer"), 25);
        ledger.credit(&addr("AUminer"), 26);
        assert_eq!(ledger.balance_of(&addr("AUminer")), 51);
    }
}
