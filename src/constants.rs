//! Ledger constants

/// Maximum depth lag a new block may have behind the deepest tip and still be accepted
pub const CUTOFF_AGE: u64 = 10;

/// Value minted by the coinbase of a proposed block
pub const COINBASE_REWARD: i64 = 25;

/// Default cap on search nodes explored by the max-fee selector
pub const DEFAULT_SEARCH_BUDGET: usize = 100_000;

/// Transaction format version produced by this crate
pub const TX_VERSION: u64 = 1;
