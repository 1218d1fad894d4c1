//! Bounded-depth cycle search over a graph snapshot
//!
//! The search runs entirely against one snapshot, so every hop of a found
//! cycle is priced against the same graph version. Ranking and pruning use
//! coarse float rates; the amounts attached to each hop come from the exact
//! integer quote engine and are the only numbers a profit decision sees.

use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::graph::{GraphEdge, GraphSnapshot};
use crate::quote;
use crate::shared::types::{Direction, GraphVersion, Venue};

/// One hop of a planned cycle with its exact quoted amounts.
#[derive(Debug, Clone)]
pub struct PlannedHop {
    pub pool: Pubkey,
    pub venue: Venue,
    pub dir: Direction,
    pub token_in: Pubkey,
    pub token_out: Pubkey,
    pub fee_bps: u16,
    pub amount_in: u64,
    pub amount_out: u64,
}

/// A profitable cycle found in one snapshot.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub id: Uuid,
    pub start_token: Pubkey,
    pub hops: Vec<PlannedHop>,
    pub amount_in: u64,
    pub expected_out: u64,
    pub expected_profit: u64,
    /// Version of the snapshot every hop was priced against.
    pub graph_version: GraphVersion,
}

pub struct PathFinder {
    max_hops: usize,
    min_profit: u64,
    staleness: Duration,
}

struct Search<'a> {
    snapshot: &'a GraphSnapshot,
    start_token: Pubkey,
    amount_in: u64,
    max_hops: usize,
    staleness: Duration,
    /// Best single-edge spot rate in the snapshot, for pruning.
    best_rate: f64,
    path: Vec<PlannedHop>,
    found: Vec<Opportunity>,
}

impl PathFinder {
    pub fn new(max_hops: usize, min_profit: u64, staleness: Duration) -> Self {
        Self {
            max_hops,
            min_profit,
            staleness,
        }
    }

    /// Enumerate cycles from `start_token` back to itself, exactly quoted
    /// hop by hop, ranked by profit descending with fewer hops breaking
    /// ties. Every returned opportunity clears `min_profit`.
    pub fn find(
        &self,
        snapshot: &GraphSnapshot,
        start_token: Pubkey,
        amount_in: u64,
    ) -> Vec<Opportunity> {
        let best_rate = self.best_edge_rate(snapshot);
        if best_rate <= 0.0 {
            return Vec::new();
        }
        let mut search = Search {
            snapshot,
            start_token,
            amount_in,
            max_hops: self.max_hops,
            staleness: self.staleness,
            best_rate,
            path: Vec::with_capacity(self.max_hops),
            found: Vec::new(),
        };
        search.explore(start_token, amount_in, 1.0);

        let mut found = search.found;
        found.retain(|o| o.expected_profit >= self.min_profit);
        found.sort_by(|a, b| {
            b.expected_profit
                .cmp(&a.expected_profit)
                .then(a.hops.len().cmp(&b.hops.len()))
        });
        debug!(
            start = %start_token,
            candidates = found.len(),
            version = snapshot.version(),
            "cycle search complete"
        );
        found
    }

    fn best_edge_rate(&self, snapshot: &GraphSnapshot) -> f64 {
        let tokens: Vec<Pubkey> = snapshot.tokens().copied().collect();
        let mut best: f64 = 0.0;
        for token in &tokens {
            for edge in snapshot.edges_from(token, self.staleness) {
                if let Some(pool) = snapshot.pool(&edge.pool) {
                    let rate = quote::spot_rate(&pool.curve, edge.dir, pool.fee_bps);
                    if rate > best {
                        best = rate;
                    }
                }
            }
        }
        best
    }
}

impl Search<'_> {
    fn explore(&mut self, token: Pubkey, amount: u64, cum_rate: f64) {
        let depth = self.path.len();
        if depth >= self.max_hops {
            return;
        }
        let remaining = self.max_hops - depth - 1;

        let edges: Vec<GraphEdge> = self
            .snapshot
            .edges_from(&token, self.staleness)
            .filter(|e| !self.path.iter().any(|h| h.pool == e.pool))
            .copied()
            .collect();

        for edge in edges {
            // Revisiting an intermediate token reenters a subcycle that a
            // shorter path already covers.
            if edge.token_out != self.start_token
                && self.path.iter().any(|h| h.token_in == edge.token_out)
            {
                continue;
            }

            let Some(pool) = self.snapshot.pool(&edge.pool) else {
                continue;
            };
            let rate = quote::spot_rate(&pool.curve, edge.dir, pool.fee_bps);
            if rate <= 0.0 {
                continue;
            }
            // Even the best possible continuation cannot bring this branch
            // back above par.
            let optimistic = cum_rate * rate * self.best_rate.powi(remaining as i32);
            if optimistic <= 1.0 {
                trace!(pool = %edge.pool, depth, "pruned branch");
                continue;
            }

            let quoted = match quote::quote(&pool.curve, edge.dir, pool.fee_bps, amount) {
                Ok(q) => q,
                Err(err) => {
                    trace!(pool = %edge.pool, error = %err, "hop unquotable");
                    continue;
                }
            };
            if quoted.amount_out == 0 {
                continue;
            }

            self.path.push(PlannedHop {
                pool: edge.pool,
                venue: edge.venue,
                dir: edge.dir,
                token_in: edge.token_in,
                token_out: edge.token_out,
                fee_bps: pool.fee_bps,
                amount_in: amount,
                amount_out: quoted.amount_out,
            });

            if edge.token_out == self.start_token {
                if self.path.len() >= 2 && quoted.amount_out > self.amount_in {
                    self.found.push(Opportunity {
                        id: Uuid::new_v4(),
                        start_token: self.start_token,
                        hops: self.path.clone(),
                        amount_in: self.amount_in,
                        expected_out: quoted.amount_out,
                        expected_profit: quoted.amount_out - self.amount_in,
                        graph_version: self.snapshot.version(),
                    });
                }
            } else {
                self.explore(edge.token_out, quoted.amount_out, cum_rate * rate);
            }
            self.path.pop();
        }
    }
}

/// Re-quote a cycle's hops against a snapshot, exact integer math only.
/// Returns the hops with their amounts re-priced for `amount_in` fed into
/// the first hop; downstream guards must come from these, never from the
/// detection-time amounts.
pub fn requote_cycle(
    snapshot: &GraphSnapshot,
    hops: &[PlannedHop],
    amount_in: u64,
) -> Result<Vec<PlannedHop>, crate::shared::errors::EngineError> {
    use crate::shared::errors::EngineError;

    let mut amount = amount_in;
    let mut requoted = Vec::with_capacity(hops.len());
    for hop in hops {
        let pool = snapshot
            .pool(&hop.pool)
            .ok_or(EngineError::StalePoolData(hop.pool))?;
        let quoted = quote::quote(&pool.curve, hop.dir, pool.fee_bps, amount)?;
        requoted.push(PlannedHop {
            fee_bps: pool.fee_bps,
            amount_in: amount,
            amount_out: quoted.amount_out,
            ..hop.clone()
        });
        amount = quoted.amount_out;
    }
    Ok(requoted)
}
