//! Transaction set selection
//!
//! Both selectors take an offered batch and a pool, and return a mutually
//! valid subset in an order that applies cleanly, applying it to the pool.
//!
//! * [`select_greedy`] applies whatever is valid until nothing more is. It is
//!   polynomial and accepts every member of a batch that is mutually valid as a
//!   whole, which makes it the right tool for all-or-nothing block checks. It
//!   does not maximize fees when transactions compete for an output.
//! * [`select_max_fee`] is an exact branch-and-bound search for the subset
//!   with the highest total fee. Its running time is exponential in the number
//!   of transactions competing for the same outputs: it is meant for the small
//!   batches of a single block, and takes an optional node budget for anything
//!   else.

use crate::crypto::{calculate_tx_id, SignatureVerifier};
use crate::error::Result;
use crate::transaction::{check_transaction_with_id, claimed_outpoints, creates_existing_output, SignatureCache};
use crate::types::*;
use crate::utxo::UtxoPool;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which selector to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    #[default]
    Greedy,
    MaxFee,
}

/// Outcome of a selection run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Accepted transactions, in application order
    pub accepted: Vec<Transaction>,
    /// Σ fee over `accepted`
    pub total_fee: Amount,
    /// Complete solutions examined (1 for greedy)
    pub leaves_explored: usize,
    /// The search stopped early; `accepted` is valid but maybe not optimal
    pub budget_exhausted: bool,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }
}

/// Run the selector named by `strategy`. `budget` only applies to
/// [`SelectionStrategy::MaxFee`].
pub fn select_transactions<V: SignatureVerifier + ?Sized>(
    strategy: SelectionStrategy,
    offered: &[Transaction],
    pool: &mut UtxoPool,
    verifier: &V,
    budget: Option<usize>,
) -> Result<Selection> {
    match strategy {
        SelectionStrategy::Greedy => select_greedy(offered, pool, verifier),
        SelectionStrategy::MaxFee => select_max_fee(offered, pool, verifier, budget),
    }
}

/// Offered transaction with its id and claimed outputs precomputed
struct Offer<'a> {
    tx: &'a Transaction,
    id: Hash,
    claims: HashSet<OutPoint>,
}

/// Index the batch, dropping repeated offers of the same transaction id.
fn index_offers(offered: &[Transaction]) -> Vec<Offer<'_>> {
    let mut seen = HashSet::new();
    let mut offers = Vec::with_capacity(offered.len());
    for tx in offered {
        let id = calculate_tx_id(tx);
        if !seen.insert(id) {
            tracing::debug!(tx = %crate::crypto::to_hex(&id), "ignoring duplicate offer");
            continue;
        }
        offers.push(Offer {
            tx,
            id,
            claims: claimed_outpoints(tx),
        });
    }
    offers
}

/// Valid against `pool`, and its outputs do not collide with existing ones
fn is_applicable<V: SignatureVerifier + ?Sized>(
    offer: &Offer<'_>,
    pool: &UtxoPool,
    verifier: &V,
    cache: &mut SignatureCache,
) -> bool {
    check_transaction_with_id(offer.tx, &offer.id, pool, verifier, cache).is_valid()
        && !creates_existing_output(offer.tx, &offer.id, pool)
}

/// Greedy fixed point.
///
/// Each pass walks the not-yet-accepted transactions in offered order and
/// applies every one that is valid against the pool as it stands. Passes
/// repeat until one accepts nothing. `pool` receives every accepted
/// transaction; on error it may be partially updated.
pub fn select_greedy<V: SignatureVerifier + ?Sized>(
    offered: &[Transaction],
    pool: &mut UtxoPool,
    verifier: &V,
) -> Result<Selection> {
    let offers = index_offers(offered);
    let mut cache = SignatureCache::new();
    let mut remaining: Vec<usize> = (0..offers.len()).collect();
    let mut accepted = Vec::new();
    let mut total_fee: Amount = 0;

    loop {
        let mut deferred = Vec::with_capacity(remaining.len());
        let before = accepted.len();

        for i in remaining {
            let offer = &offers[i];
            if is_applicable(offer, pool, verifier, &mut cache) {
                total_fee += Amount::from(pool.apply_transaction(offer.tx)?);
                accepted.push(offer.tx.clone());
            } else {
                deferred.push(i);
            }
        }

        remaining = deferred;
        if accepted.len() == before {
            break;
        }
    }

    tracing::debug!(
        offered = offers.len(),
        accepted = accepted.len(),
        total_fee = %total_fee,
        "greedy selection done"
    );

    Ok(Selection {
        accepted,
        total_fee,
        leaves_explored: 1,
        budget_exhausted: false,
    })
}

/// Exact maximum-fee selection.
///
/// Returns a mutually valid subset of `offered` whose total fee is maximal
/// over all mutually valid subsets, and applies it to `pool`. Among equal-fee
/// solutions the first one reached wins; branches are tried in offered order.
///
/// `budget` caps the number of search nodes. When it runs out, the node being
/// expanded is scored as a leaf and the best solution seen so far is returned
/// with [`Selection::budget_exhausted`] set.
pub fn select_max_fee<V: SignatureVerifier + ?Sized>(
    offered: &[Transaction],
    pool: &mut UtxoPool,
    verifier: &V,
    budget: Option<usize>,
) -> Result<Selection> {
    let offers = index_offers(offered);
    let mut search = MaxFeeSearch {
        offers: &offers,
        verifier,
        cache: SignatureCache::new(),
        visited: HashSet::new(),
        budget,
        nodes: 0,
        leaves: 0,
        exhausted: false,
    };

    let root = Branch {
        remaining: (0..offers.len()).collect(),
        accepted: Vec::new(),
        pool: pool.clone(),
        fee: 0,
    };
    let best = search.explore(root)?.unwrap_or(Solution {
        accepted: Vec::new(),
        fee: 0,
    });

    // Commit the winner to the caller's pool, in the order it was found
    let mut accepted = Vec::with_capacity(best.accepted.len());
    let mut total_fee: Amount = 0;
    for i in best.accepted {
        total_fee += Amount::from(pool.apply_transaction(offers[i].tx)?);
        accepted.push(offers[i].tx.clone());
    }

    if search.exhausted {
        tracing::warn!(
            nodes = search.nodes,
            leaves = search.leaves,
            total_fee = %total_fee,
            "max-fee search budget exhausted, result may not be optimal"
        );
    } else {
        tracing::debug!(
            offered = offers.len(),
            accepted = accepted.len(),
            nodes = search.nodes,
            leaves = search.leaves,
            total_fee = %total_fee,
            "max-fee selection done"
        );
    }

    Ok(Selection {
        accepted,
        total_fee,
        leaves_explored: search.leaves,
        budget_exhausted: search.exhausted,
    })
}

/// One node of the search: what is decided so far and the pool it produced.
/// Every branch owns its pool.
struct Branch {
    remaining: Vec<usize>,
    accepted: Vec<usize>,
    pool: UtxoPool,
    fee: Amount,
}

struct Solution {
    accepted: Vec<usize>,
    fee: Amount,
}

struct MaxFeeSearch<'a, V: ?Sized> {
    offers: &'a [Offer<'a>],
    verifier: &'a V,
    cache: SignatureCache,
    // Sorted accepted sets already expanded. The pool and the remaining set
    // are functions of the accepted set, so a set reached twice is skipped.
    visited: HashSet<Vec<usize>>,
    budget: Option<usize>,
    nodes: usize,
    leaves: usize,
    exhausted: bool,
}

impl<'a, V: SignatureVerifier + ?Sized> MaxFeeSearch<'a, V> {
    /// Best solution in the subtree rooted at `branch`, or `None` when every
    /// child was already explored through another path.
    fn explore(&mut self, mut branch: Branch) -> Result<Option<Solution>> {
        self.nodes += 1;

        let contested = self.apply_independent(&mut branch)?;

        if contested.is_empty() {
            return Ok(Some(self.leaf(branch)));
        }

        if let Some(budget) = self.budget {
            if self.nodes >= budget {
                self.exhausted = true;
                return Ok(Some(self.leaf(branch)));
            }
        }

        let mut best: Option<Solution> = None;
        for candidate in contested {
            let mut accepted = branch.accepted.clone();
            accepted.push(candidate);

            let mut key = accepted.clone();
            key.sort_unstable();
            if !self.visited.insert(key) {
                continue;
            }

            let mut pool = branch.pool.clone();
            let fee = branch.fee + Amount::from(pool.apply_transaction(self.offers[candidate].tx)?);
            let remaining = branch
                .remaining
                .iter()
                .copied()
                .filter(|&i| i != candidate)
                .collect();

            let child = Branch {
                remaining,
                accepted,
                pool,
                fee,
            };

            if let Some(solution) = self.explore(child)? {
                match &best {
                    Some(current) if current.fee >= solution.fee => {}
                    _ => best = Some(solution),
                }
            }
        }

        Ok(best)
    }

    /// Apply independent valid transactions until none is left, and return
    /// the valid transactions that still compete for an output.
    ///
    /// A transaction is independent when none of its claimed outputs is
    /// claimed by any other undecided transaction. Taking it cannot exclude
    /// anything else, and its fee is non-negative, so some optimal solution
    /// contains it.
    fn apply_independent(&mut self, branch: &mut Branch) -> Result<Vec<usize>> {
        loop {
            let mut independent = Vec::new();
            let mut contested = Vec::new();

            for &i in &branch.remaining {
                if !self.is_valid(i, &branch.pool) {
                    continue;
                }
                if self.is_independent(i, &branch.remaining) {
                    independent.push(i);
                } else {
                    contested.push(i);
                }
            }

            if independent.is_empty() {
                return Ok(contested);
            }

            for i in independent {
                branch.fee += Amount::from(branch.pool.apply_transaction(self.offers[i].tx)?);
                branch.remaining.retain(|&r| r != i);
                branch.accepted.push(i);
            }
        }
    }

    fn is_valid(&mut self, i: usize, pool: &UtxoPool) -> bool {
        is_applicable(&self.offers[i], pool, self.verifier, &mut self.cache)
    }

    fn is_independent(&self, i: usize, remaining: &[usize]) -> bool {
        let claims = &self.offers[i].claims;
        remaining
            .iter()
            .filter(|&&r| r != i)
            .all(|&r| claims.is_disjoint(&self.offers[r].claims))
    }

    fn leaf(&mut self, branch: Branch) -> Solution {
        self.leaves += 1;
        Solution {
            accepted: branch.accepted,
            fee: branch.fee,
        }
    }
}
