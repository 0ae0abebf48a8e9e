//! UTXO pool: the ledger state unit
//!
//! A pool maps output identifiers to output records. Cloning a pool yields an
//! independent copy; every search branch and every block node owns its own.

use crate::crypto::calculate_tx_id;
use crate::error::{LedgerError, Result};
use crate::types::*;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoPool {
    utxos: HashMap<OutPoint, TransactionOutput>,
}

impl UtxoPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new output. Adding an identifier that is already present is
    /// an invariant violation.
    pub fn add(&mut self, outpoint: OutPoint, output: TransactionOutput) -> Result<()> {
        if self.utxos.contains_key(&outpoint) {
            return Err(LedgerError::InvariantViolation(format!(
                "output {}:{} already present in pool",
                crate::crypto::to_hex(&outpoint.hash),
                outpoint.index
            )));
        }
        self.utxos.insert(outpoint, output);
        Ok(())
    }

    /// Remove and return an output. Removing an absent identifier is an
    /// invariant violation.
    pub fn remove(&mut self, outpoint: &OutPoint) -> Result<TransactionOutput> {
        self.utxos.remove(outpoint).ok_or_else(|| {
            LedgerError::InvariantViolation(format!(
                "output {}:{} not present in pool",
                crate::crypto::to_hex(&outpoint.hash),
                outpoint.index
            ))
        })
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.utxos.contains_key(outpoint)
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&TransactionOutput> {
        self.utxos.get(outpoint)
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OutPoint, &TransactionOutput)> {
        self.utxos.iter()
    }

    /// Sum of all output values held by the pool
    pub fn total_value(&self) -> Amount {
        self.utxos.values().map(|o| Amount::from(o.value)).sum()
    }

    /// ApplyTransaction: consume every input, then create every output.
    ///
    /// Returns the realized fee (inputs consumed minus outputs created). The
    /// caller must have validated `tx` against this pool; a missing input or a
    /// colliding output is reported as [`LedgerError::InvariantViolation`] and
    /// may leave the pool partially updated.
    pub fn apply_transaction(&mut self, tx: &Transaction) -> Result<Integer> {
        let mut consumed: Amount = 0;
        for input in &tx.inputs {
            consumed += Amount::from(self.remove(&input.prevout)?.value);
        }

        let created = self.add_outputs(tx)?;
        Integer::try_from(consumed - created).map_err(|_| {
            LedgerError::InvariantViolation(format!(
                "fee of {} out of range",
                crate::crypto::to_hex(&calculate_tx_id(tx))
            ))
        })
    }

    /// Apply a coinbase: no input checks, its single output is minted.
    pub fn apply_coinbase(&mut self, coinbase: &Transaction) -> Result<()> {
        if !is_coinbase(coinbase) {
            return Err(LedgerError::MalformedCoinbase(format!(
                "{} inputs, {} outputs",
                coinbase.inputs.len(),
                coinbase.outputs.len()
            )));
        }
        self.add_outputs(coinbase)?;
        Ok(())
    }

    fn add_outputs(&mut self, tx: &Transaction) -> Result<Amount> {
        let tx_id = calculate_tx_id(tx);
        let mut created: Amount = 0;
        for (i, output) in tx.outputs.iter().enumerate() {
            let outpoint = OutPoint {
                hash: tx_id,
                index: i as Natural,
            };
            created += Amount::from(output.value);
            self.add(outpoint, output.clone())?;
        }
        Ok(created)
    }
}

/// A coinbase has no inputs and exactly one non-negative output
pub fn is_coinbase(tx: &Transaction) -> bool {
    tx.inputs.is_empty() && tx.outputs.len() == 1 && tx.outputs[0].value >= 0
}
