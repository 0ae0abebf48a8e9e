//! # UTXO Ledger
//!
//! Transaction validation against an unspent-output pool, fee-maximizing
//! transaction selection, and a depth-bounded fork tree of blocks.
//!
//! ## Architecture
//!
//! - [`utxo::UtxoPool`]: map from output identifier to output, copied wherever
//!   independent mutation paths diverge
//! - [`transaction`]: five-condition validity check with a per-search
//!   signature cache
//! - [`selection`]: greedy fixed point and exact max-fee branch-and-bound
//! - [`fork_tree::ForkTree`]: arena of block nodes, each holding the pool that
//!   results from its block, with a cutoff on how far behind the deepest tip a
//!   new block may land
//! - [`mempool::PendingPool`] and [`mining`]: pending transactions and block
//!   proposal on top of the head
//!
//! Everything is single-threaded and deterministic for identical inputs.
//! Signatures are checked through the [`crypto::SignatureVerifier`] oracle;
//! [`crypto::Secp256k1Verifier`] is the default.
//!
//! ## Usage
//!
//! ```rust
//! use utxo_ledger::*;
//!
//! let genesis = Block {
//!     prev_block_hash: None,
//!     transactions: vec![],
//!     coinbase: Transaction::coinbase(10, vec![0x02; 33], 1),
//! };
//! let tree = ForkTree::new(genesis).unwrap();
//! assert_eq!(tree.head_pool().len(), 1);
//! assert_eq!(tree.head_pool().total_value(), 10);
//! ```

pub mod types;
pub mod constants;
pub mod error;
pub mod crypto;
pub mod utxo;
pub mod transaction;
pub mod selection;
pub mod mempool;
pub mod config;
pub mod fork_tree;
pub mod mining;

// Re-export commonly used types
pub use types::*;
pub use constants::*;
pub use error::{LedgerError, Result};
pub use crypto::{Secp256k1Verifier, SignatureVerifier};
pub use utxo::UtxoPool;
pub use selection::{Selection, SelectionStrategy};
pub use mempool::PendingPool;
pub use config::ChainConfig;
pub use fork_tree::{BlockNode, ForkTree};
pub use secp256k1;

/// Stateful transaction handler over one UTXO pool
///
/// Each call to [`TxHandler::select_transaction_set`] picks a mutually valid
/// subset of the offered batch and applies it to the handler's pool, so
/// consecutive batches build on each other.
///
/// # Examples
///
/// ```
/// use utxo_ledger::*;
/// use utxo_ledger::crypto::sign_input;
/// use utxo_ledger::secp256k1::{PublicKey, Secp256k1, SecretKey};
///
/// let secp = Secp256k1::new();
/// let owner = SecretKey::from_slice(&[7; 32]).unwrap();
/// let owner_pk = PublicKey::from_secret_key(&secp, &owner).serialize().to_vec();
///
/// // One unspent output worth 10, owned by `owner`
/// let mut pool = UtxoPool::new();
/// let funding = OutPoint { hash: [1; 32], index: 0 };
/// pool.add(funding, TransactionOutput { value: 10, recipient: owner_pk.clone() }).unwrap();
///
/// // Spend it, paying 9 and leaving a fee of 1
/// let mut tx = Transaction {
///     version: 1,
///     inputs: vec![TransactionInput { prevout: funding, signature: vec![] }],
///     outputs: vec![TransactionOutput { value: 9, recipient: owner_pk }],
///     lock_time: 0,
/// };
/// let signature = sign_input(&secp, &owner, &tx, 0);
/// tx.inputs[0].signature = signature;
///
/// let mut handler = TxHandler::new(pool);
/// assert!(handler.is_valid_transaction(&tx));
///
/// let accepted = handler.select_transaction_set(&[tx.clone()]).unwrap();
/// assert_eq!(accepted, vec![tx.clone()]);
/// assert!(!handler.pool().contains(&funding));
/// assert!(handler.pool().contains(&tx.outpoint(0)));
/// ```
pub struct TxHandler<V = Secp256k1Verifier> {
    pool: UtxoPool,
    verifier: V,
    strategy: SelectionStrategy,
    search_budget: Option<usize>,
}

impl TxHandler<Secp256k1Verifier> {
    /// Handler over its own copy of `pool`, checking secp256k1 signatures and
    /// selecting by exact maximum fee.
    pub fn new(pool: UtxoPool) -> Self {
        Self::with_verifier(pool, Secp256k1Verifier::new())
    }
}

impl<V: SignatureVerifier> TxHandler<V> {
    pub fn with_verifier(pool: UtxoPool, verifier: V) -> Self {
        Self {
            pool,
            verifier,
            strategy: SelectionStrategy::MaxFee,
            search_budget: None,
        }
    }

    pub fn with_strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Cap the max-fee search at `budget` nodes (`None` is exhaustive)
    pub fn with_search_budget(mut self, budget: Option<usize>) -> Self {
        self.search_budget = budget;
        self
    }

    /// Replace the current pool
    pub fn init_pool(&mut self, pool: UtxoPool) {
        self.pool = pool;
    }

    /// Is `tx` valid against the current pool?
    pub fn is_valid_transaction(&self, tx: &Transaction) -> bool {
        transaction::is_valid_transaction(tx, &self.pool, &self.verifier)
    }

    /// As [`TxHandler::is_valid_transaction`], with the failure reason
    pub fn check_transaction(&self, tx: &Transaction) -> ValidationResult {
        transaction::check_transaction(tx, &self.pool, &self.verifier, &mut transaction::SignatureCache::new())
    }

    /// Select from `offered`, apply the selection to the pool and return the
    /// accepted transactions in application order.
    pub fn select_transaction_set(&mut self, offered: &[Transaction]) -> Result<Vec<Transaction>> {
        Ok(self.select(offered)?.accepted)
    }

    /// As [`TxHandler::select_transaction_set`], returning fee and search
    /// statistics too. On error the pool is unchanged.
    pub fn select(&mut self, offered: &[Transaction]) -> Result<Selection> {
        let mut pool = self.pool.clone();
        let selection =
            selection::select_transactions(self.strategy, offered, &mut pool, &self.verifier, self.search_budget)?;
        self.pool = pool;
        Ok(selection)
    }

    pub fn pool(&self) -> &UtxoPool {
        &self.pool
    }

    pub fn into_pool(self) -> UtxoPool {
        self.pool
    }
}
