//! Block fork tree
//!
//! Every accepted block becomes a node holding the UTXO pool that results from
//! applying it on top of its parent's pool. Nodes live in an arena; parent and
//! child links are arena indices and a hash index maps block hashes to nodes.
//! The tree only grows. With pruning enabled, nodes that can no longer be
//! extended give up their pool and leave the hash index, but stay in the arena.

use crate::config::ChainConfig;
use crate::crypto::{to_hex, Secp256k1Verifier, SignatureVerifier};
use crate::error::Result;
use crate::mempool::PendingPool;
use crate::selection::select_transactions;
use crate::types::*;
use crate::utxo::{is_coinbase, UtxoPool};
use std::collections::HashMap;

/// A block together with the pool it produced
#[derive(Debug, Clone)]
pub struct BlockNode {
    block: Block,
    hash: Hash,
    pool: UtxoPool,
    depth: Natural,
    parent: Option<usize>,
    children: Vec<usize>,
    pruned: bool,
}

impl BlockNode {
    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// Pool after this block, or `None` once pruned
    pub fn pool(&self) -> Option<&UtxoPool> {
        (!self.pruned).then_some(&self.pool)
    }

    /// Genesis is at depth 1
    pub fn depth(&self) -> Natural {
        self.depth
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }

    pub fn is_pruned(&self) -> bool {
        self.pruned
    }
}

pub struct ForkTree<V = Secp256k1Verifier> {
    nodes: Vec<BlockNode>,
    index: HashMap<Hash, usize>,
    head: usize,
    config: ChainConfig,
    verifier: V,
    pending: PendingPool,
}

impl ForkTree<Secp256k1Verifier> {
    /// Tree rooted at `genesis` with the default configuration and the
    /// secp256k1 signature oracle.
    pub fn new(genesis: Block) -> Result<Self> {
        Self::with_config(genesis, ChainConfig::default(), Secp256k1Verifier::new())
    }
}

impl<V: SignatureVerifier> ForkTree<V> {
    /// Root a tree at `genesis`.
    ///
    /// The genesis block is trusted: its transactions are run through the
    /// configured selector over an empty pool and whatever applies is kept,
    /// then its coinbase is minted. A malformed genesis coinbase is an error.
    pub fn with_config(genesis: Block, config: ChainConfig, verifier: V) -> Result<Self> {
        config.validate()?;

        let mut pool = UtxoPool::new();
        select_transactions(
            config.block_selection,
            &genesis.transactions,
            &mut pool,
            &verifier,
            config.search_budget,
        )?;
        pool.apply_coinbase(&genesis.coinbase)?;

        let hash = genesis.hash();
        tracing::info!(hash = %to_hex(&hash), utxos = pool.len(), "genesis connected");

        let root = BlockNode {
            block: genesis,
            hash,
            pool,
            depth: 1,
            parent: None,
            children: Vec::new(),
            pruned: false,
        };

        let mut index = HashMap::new();
        index.insert(hash, 0);

        Ok(Self {
            nodes: vec![root],
            index,
            head: 0,
            config,
            verifier,
            pending: PendingPool::new(),
        })
    }

    /// AddBlock: connect `block` under its parent.
    ///
    /// Rejected, with no change to the tree, when the block:
    /// - has no parent (only the genesis may omit one)
    /// - is already in the tree
    /// - names a parent that is unknown or pruned
    /// - would sit at depth `d` with `d + cutoff_age <= max_depth`
    /// - contains any transaction that cannot be applied together with the rest
    ///   against the parent's pool
    /// - carries a malformed coinbase, or one whose output already exists
    ///
    /// `Err` means an invariant violation while applying transactions; the tree
    /// is left untouched in that case too.
    pub fn add_block(&mut self, block: Block) -> Result<ValidationResult> {
        let Some(prev_hash) = block.prev_block_hash else {
            return Ok(reject("block has no parent".to_string()));
        };

        let hash = block.hash();
        if self.index.contains_key(&hash) {
            return Ok(reject(format!("block {} already connected", to_hex(&hash))));
        }

        let Some(&parent) = self.index.get(&prev_hash) else {
            return Ok(reject(format!("unknown parent {}", to_hex(&prev_hash))));
        };

        let depth = self.nodes[parent].depth + 1;
        let max_depth = self.max_depth();
        if is_stale(depth, max_depth, self.config.cutoff_age) {
            return Ok(reject(format!(
                "depth {} too far behind max depth {}",
                depth, max_depth
            )));
        }

        let mut pool = self.nodes[parent].pool.clone();
        let selection = select_transactions(
            self.config.block_selection,
            &block.transactions,
            &mut pool,
            &self.verifier,
            self.config.search_budget,
        )?;
        if selection.len() != block.transactions.len() {
            return Ok(reject(format!(
                "only {} of {} transactions valid",
                selection.len(),
                block.transactions.len()
            )));
        }

        if !is_coinbase(&block.coinbase) {
            return Ok(reject("malformed coinbase".to_string()));
        }
        if pool.contains(&block.coinbase.outpoint(0)) {
            return Ok(reject("coinbase output already exists".to_string()));
        }
        pool.apply_coinbase(&block.coinbase)?;

        let removed = self.pending.remove_included(&block);
        let id = self.nodes.len();
        self.nodes.push(BlockNode {
            block,
            hash,
            pool,
            depth,
            parent: Some(parent),
            children: Vec::new(),
            pruned: false,
        });
        self.nodes[parent].children.push(id);
        self.index.insert(hash, id);

        // First block to reach a new depth becomes head; ties keep the older tip
        if depth > max_depth {
            self.head = id;
            tracing::info!(hash = %to_hex(&hash), depth, "new head");
            if self.config.prune_stale_nodes {
                self.prune_stale();
            }
        } else {
            tracing::info!(hash = %to_hex(&hash), depth, "block connected on side branch");
        }
        tracing::debug!(
            fees = %selection.total_fee,
            txs = selection.len(),
            pending_removed = removed,
            "block applied"
        );

        Ok(ValidationResult::Valid)
    }

    /// Block at the deepest node
    pub fn head_block(&self) -> &Block {
        &self.nodes[self.head].block
    }

    /// Pool at the deepest node, the base for proposing the next block
    pub fn head_pool(&self) -> &UtxoPool {
        &self.nodes[self.head].pool
    }

    pub fn head_hash(&self) -> &Hash {
        &self.nodes[self.head].hash
    }

    pub fn head_node(&self) -> &BlockNode {
        &self.nodes[self.head]
    }

    /// Depth of the deepest node
    pub fn max_depth(&self) -> Natural {
        self.nodes[self.head].depth
    }

    /// Number of nodes ever connected, genesis and pruned ones included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains_block(&self, hash: &Hash) -> bool {
        self.index.contains_key(hash)
    }

    pub fn node(&self, hash: &Hash) -> Option<&BlockNode> {
        self.index.get(hash).map(|&i| &self.nodes[i])
    }

    pub fn block_depth(&self, hash: &Hash) -> Option<Natural> {
        self.node(hash).map(BlockNode::depth)
    }

    pub fn pool_at(&self, hash: &Hash) -> Option<&UtxoPool> {
        self.node(hash).and_then(BlockNode::pool)
    }

    /// Hashes from the head back to the oldest retained ancestor
    pub fn head_chain(&self) -> Vec<Hash> {
        let mut chain = Vec::new();
        let mut cursor = Some(self.head);
        while let Some(i) = cursor {
            chain.push(self.nodes[i].hash);
            cursor = self.nodes[i].parent;
        }
        chain
    }

    /// Queue a transaction for a future block
    pub fn add_pending_transaction(&mut self, tx: Transaction) -> Hash {
        self.pending.add(tx)
    }

    pub fn pending_pool(&self) -> &PendingPool {
        &self.pending
    }

    pub fn pending_pool_mut(&mut self) -> &mut PendingPool {
        &mut self.pending
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    /// Release nodes that can no longer receive children: a child would land
    /// at `depth + 1`, which is rejected once `depth + 1 + cutoff_age <= max_depth`.
    fn prune_stale(&mut self) {
        let max_depth = self.max_depth();
        let cutoff_age = self.config.cutoff_age;
        let mut released = 0usize;

        for node in self.nodes.iter_mut() {
            if node.pruned || !is_stale(node.depth + 1, max_depth, cutoff_age) {
                continue;
            }
            node.pool = UtxoPool::new();
            node.pruned = true;
            self.index.remove(&node.hash);
            released += 1;
        }

        if released > 0 {
            tracing::debug!(released, max_depth, "pruned stale nodes");
        }
    }
}

/// `depth + cutoff_age <= max_depth`, without overflow for any `cutoff_age`
fn is_stale(depth: Natural, max_depth: Natural, cutoff_age: u64) -> bool {
    max_depth.saturating_sub(depth) >= cutoff_age
}

fn reject(reason: String) -> ValidationResult {
    tracing::warn!(%reason, "block rejected");
    ValidationResult::Invalid(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::SelectionStrategy;

    /// Accepts a signature iff it equals the claimed recipient key
    struct EchoVerifier;

    impl SignatureVerifier for EchoVerifier {
        fn verify(&self, public_key: &[u8], _message: &[u8], signature: &[u8]) -> bool {
            public_key == signature
        }
    }

    const MINER: [u8; 2] = [0x0a, 0x0b];

    fn genesis() -> Block {
        Block {
            prev_block_hash: None,
            transactions: vec![],
            coinbase: Transaction::coinbase(10, MINER.to_vec(), 1),
        }
    }

    fn tree() -> ForkTree<EchoVerifier> {
        ForkTree::with_config(genesis(), ChainConfig::default(), EchoVerifier).unwrap()
    }

    fn child_of(parent: &Hash, height: u64, transactions: Vec<Transaction>) -> Block {
        Block {
            prev_block_hash: Some(*parent),
            transactions,
            coinbase: Transaction::coinbase(10, MINER.to_vec(), height),
        }
    }

    fn spend(prevout: OutPoint, outputs: &[Integer], nonce: u64) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TransactionInput { prevout, signature: MINER.to_vec() }],
            outputs: outputs
                .iter()
                .map(|v| TransactionOutput { value: *v, recipient: MINER.to_vec() })
                .collect(),
            lock_time: nonce,
        }
    }

    /// Extend `from` with `count` empty blocks, returning the last hash
    fn extend(tree: &mut ForkTree<EchoVerifier>, from: Hash, count: u64) -> Hash {
        let mut tip = from;
        let mut depth = tree.block_depth(&from).unwrap();
        for _ in 0..count {
            depth += 1;
            let block = child_of(&tip, depth, vec![]);
            tip = block.hash();
            assert!(tree.add_block(block).unwrap().is_valid());
        }
        tip
    }

    #[test]
    fn test_genesis_pool() {
        let tree = tree();
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.max_depth(), 1);
        assert_eq!(tree.head_pool().len(), 1);
        assert_eq!(tree.head_pool().total_value(), 10);
        assert_eq!(tree.head_block(), &genesis());
    }

    #[test]
    fn test_malformed_genesis_coinbase() {
        let mut block = genesis();
        block.coinbase.outputs.clear();
        assert!(ForkTree::with_config(block, ChainConfig::default(), EchoVerifier).is_err());
    }

    #[test]
    fn test_reject_second_genesis() {
        let mut tree = tree();
        let mut other = genesis();
        other.coinbase.lock_time = 2;
        assert!(!tree.add_block(other).unwrap().is_valid());
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn test_reject_unknown_parent() {
        let mut tree = tree();
        let orphan = child_of(&[0x77; 32], 2, vec![]);
        assert!(!tree.add_block(orphan).unwrap().is_valid());
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.max_depth(), 1);
    }

    #[test]
    fn test_reject_duplicate_block() {
        let mut tree = tree();
        let g = *tree.head_hash();
        let block = child_of(&g, 2, vec![]);
        assert!(tree.add_block(block.clone()).unwrap().is_valid());
        assert!(!tree.add_block(block).unwrap().is_valid());
        assert_eq!(tree.node_count(), 2);
    }

    #[test]
    fn test_spend_genesis_coinbase() {
        let mut tree = tree();
        let g = *tree.head_hash();
        let coinbase_out = genesis().coinbase.outpoint(0);
        let tx = spend(coinbase_out, &[4, 4], 0);

        let block = child_of(&g, 2, vec![tx.clone()]);
        let hash = block.hash();
        assert!(tree.add_block(block).unwrap().is_valid());

        let pool = tree.head_pool();
        assert_eq!(tree.head_hash(), &hash);
        assert!(!pool.contains(&coinbase_out));
        assert!(pool.contains(&tx.outpoint(0)));
        assert!(pool.contains(&tx.outpoint(1)));
        // 8 from the spend plus the new coinbase
        assert_eq!(pool.total_value(), 18);
        // The parent's pool is untouched
        assert!(tree.pool_at(&g).unwrap().contains(&coinbase_out));
    }

    #[test]
    fn test_reject_block_with_one_invalid_transaction() {
        let mut tree = tree();
        let g = *tree.head_hash();
        let coinbase_out = genesis().coinbase.outpoint(0);
        let good = spend(coinbase_out, &[5], 0);
        let double = spend(coinbase_out, &[4], 1);

        let block = child_of(&g, 2, vec![good, double]);
        assert!(!tree.add_block(block).unwrap().is_valid());
        assert_eq!(tree.node_count(), 1);
        assert!(tree.head_pool().contains(&coinbase_out));
    }

    #[test]
    fn test_reject_duplicate_transaction_in_block() {
        let mut tree = tree();
        let g = *tree.head_hash();
        let tx = spend(genesis().coinbase.outpoint(0), &[5], 0);
        let block = child_of(&g, 2, vec![tx.clone(), tx]);
        assert!(!tree.add_block(block).unwrap().is_valid());
    }

    #[test]
    fn test_reject_malformed_coinbase() {
        let mut tree = tree();
        let g = *tree.head_hash();
        let mut block = child_of(&g, 2, vec![]);
        block.coinbase.outputs.push(TransactionOutput { value: 1, recipient: MINER.to_vec() });
        assert!(!tree.add_block(block).unwrap().is_valid());
    }

    #[test]
    fn test_reject_replayed_coinbase() {
        let mut tree = tree();
        let g = *tree.head_hash();
        let mut block = child_of(&g, 2, vec![]);
        // Same coinbase as genesis, whose output is still unspent
        block.coinbase = genesis().coinbase;
        assert!(!tree.add_block(block).unwrap().is_valid());
    }

    #[test]
    fn test_transactions_in_block_may_chain() {
        let mut tree = tree();
        let g = *tree.head_hash();
        let parent = spend(genesis().coinbase.outpoint(0), &[9], 0);
        let child = spend(parent.outpoint(0), &[8], 1);
        let block = child_of(&g, 2, vec![child.clone(), parent]);
        assert!(tree.add_block(block).unwrap().is_valid());
        assert!(tree.head_pool().contains(&child.outpoint(0)));
    }

    #[test]
    fn test_head_tie_keeps_first_seen() {
        let mut tree = tree();
        let g = *tree.head_hash();
        let first = child_of(&g, 2, vec![]);
        let mut second = child_of(&g, 2, vec![]);
        second.coinbase.outputs[0].value = 11;

        let first_hash = first.hash();
        assert!(tree.add_block(first).unwrap().is_valid());
        assert!(tree.add_block(second.clone()).unwrap().is_valid());
        assert_eq!(tree.head_hash(), &first_hash);

        // Extending the side branch moves the head there
        let tip = extend(&mut tree, second.hash(), 1);
        assert_eq!(tree.head_hash(), &tip);
        assert_eq!(tree.max_depth(), 3);
        assert_eq!(tree.node(&g).unwrap().children().len(), 2);
    }

    #[test]
    fn test_cutoff_boundary() {
        let mut tree = tree();
        let g = *tree.head_hash();
        // Main chain to depth 11
        extend(&mut tree, g, 10);
        assert_eq!(tree.max_depth(), 11);

        // Child of genesis lands at depth 2: 2 + 10 > 11, accepted
        let fork = child_of(&g, 2, vec![Transaction::coinbase(0, vec![], 99)]);
        let fork_hash = fork.hash();
        assert!(tree.add_block(fork).unwrap().is_valid());

        // Main chain to depth 12: now 2 + 10 == 12, rejected
        let tip = *tree.head_hash();
        extend(&mut tree, tip, 1);
        let late = child_of(&g, 2, vec![Transaction::coinbase(0, vec![], 98)]);
        assert!(!tree.add_block(late).unwrap().is_valid());

        // The fork at depth 2 can still take a child at depth 3: 3 + 10 > 12
        assert!(tree.add_block(child_of(&fork_hash, 3, vec![])).unwrap().is_valid());
    }

    #[test]
    fn test_unbounded_cutoff_age() {
        let config = ChainConfig::from_json(r#"{"cutoff_age": 18446744073709551615}"#).unwrap();
        let mut tree = ForkTree::with_config(genesis(), config, EchoVerifier).unwrap();
        let g = *tree.head_hash();
        extend(&mut tree, g, 3);

        // No depth is ever too far behind
        let fork = child_of(&g, 2, vec![Transaction::coinbase(0, vec![], 99)]);
        assert!(tree.add_block(fork).unwrap().is_valid());
        assert_eq!(tree.node_count(), 5);
    }

    #[test]
    fn test_fees_beyond_output_range() {
        for block_selection in [SelectionStrategy::Greedy, SelectionStrategy::MaxFee] {
            let config = ChainConfig { block_selection, ..ChainConfig::default() };
            let mut big_genesis = genesis();
            big_genesis.coinbase.outputs[0].value = Integer::MAX;
            let first_out = big_genesis.coinbase.outpoint(0);
            let mut tree = ForkTree::with_config(big_genesis, config, EchoVerifier).unwrap();
            let g = *tree.head_hash();

            let mut second = child_of(&g, 2, vec![]);
            second.coinbase.outputs[0].value = Integer::MAX;
            let second_out = second.coinbase.outpoint(0);
            let second_hash = second.hash();
            assert!(tree.add_block(second).unwrap().is_valid());

            // Both maximal outputs burned in one block
            let burn_first = spend(first_out, &[], 0);
            let burn_second = spend(second_out, &[], 1);
            let third = child_of(&second_hash, 3, vec![burn_first, burn_second]);
            assert!(tree.add_block(third).unwrap().is_valid());
            assert_eq!(tree.max_depth(), 3);
            assert_eq!(tree.head_pool().total_value(), 10);
        }
    }

    #[test]
    fn test_reject_replayed_mint() {
        let mut tree = tree();
        let g = *tree.head_hash();
        let mint = Transaction::coinbase(0, vec![], 99);
        let second = child_of(&g, 2, vec![mint.clone()]);
        let second_hash = second.hash();
        assert!(tree.add_block(second).unwrap().is_valid());

        // Its output already exists below the new block
        let replay = child_of(&second_hash, 3, vec![mint]);
        assert!(!tree.add_block(replay).unwrap().is_valid());
        assert_eq!(tree.node_count(), 2);
    }

    #[test]
    fn test_head_chain() {
        let mut tree = tree();
        let g = *tree.head_hash();
        let tip = extend(&mut tree, g, 3);
        let chain = tree.head_chain();
        assert_eq!(chain.len(), 4);
        assert_eq!(chain[0], tip);
        assert_eq!(chain[3], g);
    }

    #[test]
    fn test_pending_pool_drained_by_block() {
        let mut tree = tree();
        let g = *tree.head_hash();
        let tx = spend(genesis().coinbase.outpoint(0), &[9], 0);
        let id = tree.add_pending_transaction(tx.clone());
        assert!(tree.pending_pool().contains(&id));

        assert!(tree.add_block(child_of(&g, 2, vec![tx])).unwrap().is_valid());
        assert!(tree.pending_pool().is_empty());
    }

    #[test]
    fn test_pruning_releases_stale_nodes() {
        let config = ChainConfig {
            cutoff_age: 2,
            prune_stale_nodes: true,
            ..ChainConfig::default()
        };
        let mut tree = ForkTree::with_config(genesis(), config, EchoVerifier).unwrap();
        let g = *tree.head_hash();
        let tip = extend(&mut tree, g, 3);

        // Depth 4: nodes with depth + 3 <= 4 can no longer be extended
        assert_eq!(tree.max_depth(), 4);
        assert!(!tree.contains_block(&g));
        assert!(tree.pool_at(&g).is_none());
        assert!(tree.contains_block(&tip));
        assert_eq!(tree.node_count(), 4);
        assert_eq!(tree.head_pool().len(), 4);

        // Building on the pruned genesis is rejected
        assert!(!tree.add_block(child_of(&g, 2, vec![])).unwrap().is_valid());
    }
}
