//! Core ledger types: outputs, transactions, blocks

use serde::{Deserialize, Serialize};

/// Hash type: 256-bit digest
pub type Hash = [u8; 32];

/// Byte string type
pub type ByteString = Vec<u8>;

/// Natural number type
pub type Natural = u64;

/// Integer type (output values, fees)
pub type Integer = i64;

/// Sum over many `Integer` values; cannot overflow for any realistic count
pub type Amount = i128;

/// Unspent output identifier: (source transaction hash, output index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: Natural,
}

/// Transaction input: the output it claims plus the owner's signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub prevout: OutPoint,
    pub signature: ByteString,
}

/// Transaction output: value locked to a serialized secp256k1 public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: Integer,
    pub recipient: ByteString,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: Natural,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: Natural,
}

impl Transaction {
    /// Value-minting transaction paying `value` to `recipient`.
    ///
    /// `height` goes into `lock_time` so that coinbases paying the same
    /// recipient at different depths hash to different ids.
    pub fn coinbase(value: Integer, recipient: ByteString, height: Natural) -> Self {
        Self {
            version: 1,
            inputs: vec![],
            outputs: vec![TransactionOutput { value, recipient }],
            lock_time: height,
        }
    }

    /// Output identifier of output `index` of this transaction.
    pub fn outpoint(&self, index: usize) -> OutPoint {
        OutPoint {
            hash: crate::crypto::calculate_tx_id(self),
            index: index as Natural,
        }
    }
}

/// Block: parent link, ordered transactions and exactly one coinbase.
///
/// `prev_block_hash` is `None` only for the genesis block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub prev_block_hash: Option<Hash>,
    pub transactions: Vec<Transaction>,
    pub coinbase: Transaction,
}

impl Block {
    pub fn hash(&self) -> Hash {
        crate::crypto::calculate_block_hash(self)
    }
}

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(String),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}
