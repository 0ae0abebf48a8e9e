//! Pending pool: transactions waiting to be included in a block
//!
//! Insertion does no validation; candidates are checked when a block is
//! proposed or connected.

use crate::crypto::calculate_tx_id;
use crate::types::*;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct PendingPool {
    transactions: HashMap<Hash, Transaction>,
}

impl PendingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert by id; re-adding the same transaction is a no-op.
    pub fn add(&mut self, tx: Transaction) -> Hash {
        let id = calculate_tx_id(&tx);
        self.transactions.entry(id).or_insert(tx);
        id
    }

    pub fn remove(&mut self, id: &Hash) -> Option<Transaction> {
        self.transactions.remove(id)
    }

    pub fn get(&self, id: &Hash) -> Option<&Transaction> {
        self.transactions.get(id)
    }

    pub fn contains(&self, id: &Hash) -> bool {
        self.transactions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Snapshot of every pending transaction, ordered by id so that block
    /// proposals are reproducible.
    pub fn transactions(&self) -> Vec<Transaction> {
        let mut entries: Vec<_> = self.transactions.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, tx)| tx.clone()).collect()
    }

    /// Drop every transaction included in `block`. Returns how many were removed.
    pub fn remove_included(&mut self, block: &Block) -> usize {
        block
            .transactions
            .iter()
            .filter(|tx| self.transactions.remove(&calculate_tx_id(tx)).is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(nonce: u64) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TransactionInput {
                prevout: OutPoint { hash: [1; 32], index: 0 },
                signature: vec![],
            }],
            outputs: vec![TransactionOutput { value: 1, recipient: vec![] }],
            lock_time: nonce,
        }
    }

    #[test]
    fn test_add_without_validation() {
        let mut pending = PendingPool::new();
        // Double spends of the same output are both held
        let a = pending.add(tx(1));
        let b = pending.add(tx(2));
        assert_ne!(a, b);
        assert_eq!(pending.len(), 2);
        assert!(pending.contains(&a));
        assert_eq!(pending.get(&b).unwrap().lock_time, 2);
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut pending = PendingPool::new();
        let a = pending.add(tx(1));
        assert_eq!(pending.add(tx(1)), a);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_transactions_sorted_by_id() {
        let mut pending = PendingPool::new();
        let mut ids: Vec<_> = (0..5).map(|n| pending.add(tx(n))).collect();
        ids.sort();

        let listed: Vec<_> = pending.transactions().iter().map(calculate_tx_id).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn test_remove_included() {
        let mut pending = PendingPool::new();
        pending.add(tx(1));
        let kept = pending.add(tx(2));

        let block = Block {
            prev_block_hash: Some([0; 32]),
            transactions: vec![tx(1), tx(3)],
            coinbase: Transaction::coinbase(1, vec![], 2),
        };

        assert_eq!(pending.remove_included(&block), 1);
        assert_eq!(pending.len(), 1);
        assert!(pending.contains(&kept));
        assert!(pending.remove(&kept).is_some());
        assert!(pending.is_empty());
    }
}
