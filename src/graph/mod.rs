//! Liquidity graph with versioned, snapshot-isolated reads
//!
//! The graph is the only shared mutable state in the engine. Updates apply
//! copy-on-write: each `apply_update` publishes a new immutable inner under
//! a bumped version, so a snapshot taken by a detection worker never changes
//! underfoot. Pool entries are `Arc`-shared between versions, which keeps an
//! update to one pool from copying the state of every other pool.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::quote::Curve;
use crate::shared::types::{Direction, GraphVersion, Venue};

/// Live record of one liquidity pool. Always written from a single
/// consistent on-chain read, never field-by-field.
#[derive(Debug, Clone)]
pub struct Pool {
    pub address: Pubkey,
    pub venue: Venue,
    pub token_a: Pubkey,
    pub token_b: Pubkey,
    pub fee_bps: u16,
    pub curve: Curve,
    /// Slot of the read this state came from.
    pub slot: u64,
    pub updated_at: Instant,
}

impl Pool {
    pub fn age(&self) -> Duration {
        self.updated_at.elapsed()
    }

    /// Tokens in swap order for a direction.
    pub fn tokens(&self, dir: Direction) -> (Pubkey, Pubkey) {
        match dir {
            Direction::AtoB => (self.token_a, self.token_b),
            Direction::BtoA => (self.token_b, self.token_a),
        }
    }
}

/// Directed projection of a pool from one token to the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphEdge {
    pub pool: Pubkey,
    pub venue: Venue,
    pub dir: Direction,
    pub token_in: Pubkey,
    pub token_out: Pubkey,
}

#[derive(Debug, Default)]
struct GraphInner {
    pools: HashMap<Pubkey, Arc<Pool>>,
    out_edges: HashMap<Pubkey, Vec<GraphEdge>>,
    version: GraphVersion,
}

/// Immutable view of the graph at one version.
#[derive(Clone)]
pub struct GraphSnapshot {
    inner: Arc<GraphInner>,
}

impl GraphSnapshot {
    pub fn version(&self) -> GraphVersion {
        self.inner.version
    }

    pub fn pool(&self, address: &Pubkey) -> Option<&Arc<Pool>> {
        self.inner.pools.get(address)
    }

    pub fn pool_count(&self) -> usize {
        self.inner.pools.len()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Pubkey> {
        self.inner.out_edges.keys()
    }

    /// Outgoing edges from a token, excluding pools older than
    /// `staleness`. Stale pools stay out of new searches until refreshed.
    pub fn edges_from<'a>(
        &'a self,
        token: &Pubkey,
        staleness: Duration,
    ) -> impl Iterator<Item = &'a GraphEdge> {
        self.inner
            .out_edges
            .get(token)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter(move |e| {
                self.inner
                    .pools
                    .get(&e.pool)
                    .map(|p| p.age() <= staleness)
                    .unwrap_or(false)
            })
    }

    pub fn is_stale(&self, address: &Pubkey, staleness: Duration) -> bool {
        self.inner
            .pools
            .get(address)
            .map(|p| p.age() > staleness)
            .unwrap_or(true)
    }
}

/// Shared graph handle. Cheap to clone across workers.
#[derive(Clone, Default)]
pub struct LiquidityGraph {
    inner: Arc<RwLock<Arc<GraphInner>>>,
}

impl LiquidityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a pool from one consistent on-chain read and publish a new
    /// graph version. Returns the version the update landed in.
    pub fn apply_update(&self, pool: Pool) -> GraphVersion {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let prev = guard.clone();

        let mut pools = prev.pools.clone();
        let mut out_edges = prev.out_edges.clone();
        let address = pool.address;

        // Drop edges of the previous incarnation of this pool, then index
        // the new one. Only the two touched token entries are rewritten.
        if let Some(old) = pools.get(&address) {
            for token in [old.token_a, old.token_b] {
                if let Some(edges) = out_edges.get_mut(&token) {
                    edges.retain(|e| e.pool != address);
                }
            }
        }
        let pool = Arc::new(pool);
        for (dir, from, to) in [
            (Direction::AtoB, pool.token_a, pool.token_b),
            (Direction::BtoA, pool.token_b, pool.token_a),
        ] {
            out_edges.entry(from).or_default().push(GraphEdge {
                pool: address,
                venue: pool.venue,
                dir,
                token_in: from,
                token_out: to,
            });
        }
        pools.insert(address, pool);

        let version = prev.version + 1;
        *guard = Arc::new(GraphInner {
            pools,
            out_edges,
            version,
        });
        debug!(version, pool = %address, "applied pool update");
        version
    }

    /// Take a consistent read view. Concurrent updates publish new versions
    /// and never mutate a snapshot already handed out.
    pub fn snapshot(&self) -> GraphSnapshot {
        let guard = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        GraphSnapshot {
            inner: guard.clone(),
        }
    }
}
