//! Transaction validation against a UTXO pool
//!
//! A non-coinbase transaction `tx` is valid against pool `us` if and only if:
//! 1. every input's prevout is in `us`
//! 2. every input's signature verifies under the key of the output it claims
//! 3. no prevout is claimed twice by `tx`
//! 4. every output value is non-negative
//! 5. Σ inputs ≥ Σ outputs
//!
//! Checks run in that order and stop at the first failure: pool lookups are
//! cheap, signature checks are not.

use crate::crypto::{calculate_tx_id, signable_payload, SignatureVerifier};
use crate::types::*;
use crate::utxo::UtxoPool;
use std::collections::{HashMap, HashSet};

/// Signature results per (transaction id, input index).
///
/// An absent entry means "not checked yet". Once recorded, an entry never
/// changes. A cache lives for one selection search and is then dropped.
#[derive(Debug, Default)]
pub struct SignatureCache {
    results: HashMap<(Hash, usize), bool>,
}

impl SignatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tx_id: &Hash, index: usize) -> Option<bool> {
        self.results.get(&(*tx_id, index)).copied()
    }

    /// Record a result and return the stored one; an existing entry wins.
    pub fn record(&mut self, tx_id: &Hash, index: usize, valid: bool) -> bool {
        *self.results.entry((*tx_id, index)).or_insert(valid)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// CheckTransaction with a caller-scoped signature cache.
pub fn check_transaction<V: SignatureVerifier + ?Sized>(
    tx: &Transaction,
    pool: &UtxoPool,
    verifier: &V,
    cache: &mut SignatureCache,
) -> ValidationResult {
    check_transaction_with_id(tx, &calculate_tx_id(tx), pool, verifier, cache)
}

/// As [`check_transaction`], for callers that already hold the transaction id.
pub fn check_transaction_with_id<V: SignatureVerifier + ?Sized>(
    tx: &Transaction,
    tx_id: &Hash,
    pool: &UtxoPool,
    verifier: &V,
    cache: &mut SignatureCache,
) -> ValidationResult {
    // 1. Every claimed output exists
    for (i, input) in tx.inputs.iter().enumerate() {
        if !pool.contains(&input.prevout) {
            return invalid(format!("Input {} not found in UTXO pool", i));
        }
    }

    // 2. Every signature verifies under the claimed output's key
    for (i, input) in tx.inputs.iter().enumerate() {
        let Some(claimed) = pool.get(&input.prevout) else {
            return invalid(format!("Input {} not found in UTXO pool", i));
        };

        let valid = match cache.get(tx_id, i) {
            Some(valid) => valid,
            None => {
                let message = signable_payload(tx, i);
                let valid = verifier.verify(&claimed.recipient, &message, &input.signature);
                cache.record(tx_id, i, valid)
            }
        };

        if !valid {
            return invalid(format!("Invalid signature at input {}", i));
        }
    }

    // 3. No output claimed twice
    let mut claimed = HashSet::with_capacity(tx.inputs.len());
    for (i, input) in tx.inputs.iter().enumerate() {
        if !claimed.insert(input.prevout) {
            return invalid(format!("Input {} double spends within transaction", i));
        }
    }

    // 4. Output values are non-negative
    for (i, output) in tx.outputs.iter().enumerate() {
        if output.value < 0 {
            return invalid(format!("Negative output value {} at index {}", output.value, i));
        }
    }

    // 5. Inputs cover outputs
    match transaction_fee(tx, pool) {
        Some(fee) if fee >= 0 => ValidationResult::Valid,
        Some(fee) => invalid(format!("Outputs exceed inputs by {}", -fee)),
        None => invalid("Value overflow".to_string()),
    }
}

/// Validate with a fresh, throw-away signature cache.
pub fn is_valid_transaction<V: SignatureVerifier + ?Sized>(
    tx: &Transaction,
    pool: &UtxoPool,
    verifier: &V,
) -> bool {
    check_transaction(tx, pool, verifier, &mut SignatureCache::new()).is_valid()
}

/// Σ inputs − Σ outputs, looking inputs up in `pool`.
///
/// Returns `None` if an input is missing or a sum overflows.
pub fn transaction_fee(tx: &Transaction, pool: &UtxoPool) -> Option<Integer> {
    let mut total_in = 0i64;
    for input in &tx.inputs {
        total_in = total_in.checked_add(pool.get(&input.prevout)?.value)?;
    }

    let mut total_out = 0i64;
    for output in &tx.outputs {
        total_out = total_out.checked_add(output.value)?;
    }

    total_in.checked_sub(total_out)
}

/// Would applying `tx` create an output already present in `pool`?
///
/// Only a replayed transaction without inputs can do this. It passes the
/// validity checks but cannot be applied.
pub fn creates_existing_output(tx: &Transaction, tx_id: &Hash, pool: &UtxoPool) -> bool {
    (0..tx.outputs.len()).any(|i| {
        pool.contains(&OutPoint {
            hash: *tx_id,
            index: i as Natural,
        })
    })
}

/// Prevouts claimed by `tx`
pub fn claimed_outpoints(tx: &Transaction) -> HashSet<OutPoint> {
    tx.inputs.iter().map(|input| input.prevout).collect()
}

fn invalid(reason: String) -> ValidationResult {
    tracing::trace!(%reason, "transaction rejected");
    ValidationResult::Invalid(reason)
}
