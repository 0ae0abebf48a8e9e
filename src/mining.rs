//! Block proposal on top of the current head

use crate::constants::COINBASE_REWARD;
use crate::crypto::SignatureVerifier;
use crate::error::Result;
use crate::fork_tree::ForkTree;
use crate::selection::{select_max_fee, Selection};
use crate::types::*;

/// CreateNewBlock: ForkTree × recipient → Block
///
/// 1. Take the head block and its pool
/// 2. Run the max-fee selector over every pending transaction
/// 3. Mint `COINBASE_REWARD` to `recipient` at the new depth
/// 4. Return the block extending the head, with the selection that filled it
///
/// The tree is not modified; hand the block to [`ForkTree::add_block`].
pub fn create_new_block<V: SignatureVerifier>(
    tree: &ForkTree<V>,
    recipient: ByteString,
) -> Result<(Block, Selection)> {
    let mut pool = tree.head_pool().clone();
    let candidates = tree.pending_pool().transactions();
    let selection = select_max_fee(&candidates, &mut pool, tree.verifier(), tree.config().search_budget)?;

    let height = tree.max_depth() + 1;
    let block = Block {
        prev_block_hash: Some(*tree.head_hash()),
        transactions: selection.accepted.clone(),
        coinbase: Transaction::coinbase(COINBASE_REWARD, recipient, height),
    };

    tracing::debug!(
        height,
        candidates = candidates.len(),
        included = selection.len(),
        fees = %selection.total_fee,
        "block template created"
    );

    Ok((block, selection))
}
