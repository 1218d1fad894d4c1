//! Pre-submission revalidation of a found opportunity
//!
//! Between detection and signing the graph keeps moving. The validator
//! re-quotes the whole cycle against a fresh snapshot under a wall-clock
//! budget and rejects anything the market has already closed.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::graph::GraphSnapshot;
use crate::pathfinder::{self, Opportunity};
use crate::shared::errors::EngineError;
use crate::shared::types::GraphVersion;

pub const DEFAULT_BUDGET: Duration = Duration::from_millis(25);

/// Revalidated amounts, priced against `graph_version`. The hops carry the
/// re-quoted per-hop amounts; transaction guards must be built from these.
#[derive(Debug, Clone)]
pub struct Revalidation {
    pub hops: Vec<crate::pathfinder::PlannedHop>,
    pub expected_out: u64,
    pub expected_profit: u64,
    pub graph_version: GraphVersion,
}

pub struct Validator {
    min_profit: u64,
    budget: Duration,
    staleness: Duration,
}

impl Validator {
    pub fn new(min_profit: u64, budget: Duration, staleness: Duration) -> Self {
        Self {
            min_profit,
            budget,
            staleness,
        }
    }

    /// Re-quote `opp` against `snapshot`. The snapshot must be at least as
    /// new as the one the opportunity was found in; every pool of the cycle
    /// must still be present and fresh; the re-quoted profit must still
    /// clear the configured minimum.
    pub fn revalidate(
        &self,
        opp: &Opportunity,
        snapshot: &GraphSnapshot,
    ) -> Result<Revalidation, EngineError> {
        let started = Instant::now();

        if snapshot.version() < opp.graph_version {
            return Err(EngineError::StaleOpportunity(format!(
                "snapshot version {} predates opportunity version {}",
                snapshot.version(),
                opp.graph_version
            )));
        }

        for hop in &opp.hops {
            if snapshot.is_stale(&hop.pool, self.staleness) {
                return Err(EngineError::StalePoolData(hop.pool));
            }
        }

        let hops = pathfinder::requote_cycle(snapshot, &opp.hops, opp.amount_in)?;
        let expected_out = hops
            .last()
            .map(|h| h.amount_out)
            .unwrap_or(opp.amount_in);
        let expected_profit = expected_out.saturating_sub(opp.amount_in);
        if expected_profit < self.min_profit {
            debug!(
                opportunity = %opp.id,
                expected_out,
                amount_in = opp.amount_in,
                "cycle no longer profitable"
            );
            return Err(EngineError::StaleOpportunity(format!(
                "re-quoted profit {} below minimum {}",
                expected_profit, self.min_profit
            )));
        }

        let elapsed = started.elapsed();
        if elapsed > self.budget {
            warn!(
                opportunity = %opp.id,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = self.budget.as_millis() as u64,
                "revalidation blew its budget"
            );
            return Err(EngineError::StaleOpportunity(format!(
                "revalidation took {:?}, budget {:?}",
                elapsed, self.budget
            )));
        }

        Ok(Revalidation {
            hops,
            expected_out,
            expected_profit,
            graph_version: snapshot.version(),
        })
    }
}
