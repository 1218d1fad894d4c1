//! Detection workers and the pool reservation book
//!
//! Workers run the full pipeline per opportunity: reserve, revalidate,
//! cross-check, precheck, compose, sign, race, record. Per-opportunity
//! failures are logged and the loop moves on; systemic failures stop the
//! worker and reach the operator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use spl_associated_token_account::get_associated_token_address;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::aggregator::AggregatorClient;
use crate::composer::Composer;
use crate::graph::LiquidityGraph;
use crate::pathfinder::{Opportunity, PathFinder};
use crate::report::{ReportLedger, SubmissionRecord};
use crate::shared::errors::EngineError;
use crate::submitter::{SubmissionState, Submitter};
use crate::validator::Validator;

struct Reservation {
    opportunity: Uuid,
    expected_profit: u64,
    cancel: Arc<watch::Sender<bool>>,
    /// Set once the holder commits to signing; the reservation can no
    /// longer be preempted, only released by its holder.
    submitting: bool,
}

/// Guards each pool so two in-flight plans never trade against the same
/// liquidity. A richer opportunity may preempt a poorer one that holds an
/// overlapping pool; the preempted worker sees its cancel flag flip and
/// stands down before signing.
#[derive(Default)]
pub struct ReservationBook {
    by_pool: Mutex<HashMap<Pubkey, Reservation>>,
}

impl ReservationBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve every pool of the cycle. Returns the cancel receiver to
    /// watch while working the opportunity, or `None` when an overlapping
    /// reservation with at least as much profit already holds a pool.
    pub fn try_reserve(&self, opp: &Opportunity) -> Option<watch::Receiver<bool>> {
        let mut book = self
            .by_pool
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut preempted: Vec<Uuid> = Vec::new();
        for hop in &opp.hops {
            if let Some(existing) = book.get(&hop.pool) {
                // A holder that committed to submission keeps its pools no
                // matter what the newcomer is worth.
                if existing.submitting || existing.expected_profit >= opp.expected_profit {
                    return None;
                }
                preempted.push(existing.opportunity);
            }
        }

        for id in &preempted {
            for r in book.values() {
                if r.opportunity == *id {
                    let _ = r.cancel.send(true);
                }
            }
            book.retain(|_, r| r.opportunity != *id);
            debug!(preempted = %id, winner = %opp.id, "reservation preempted");
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel = Arc::new(cancel_tx);
        for hop in &opp.hops {
            book.insert(
                hop.pool,
                Reservation {
                    opportunity: opp.id,
                    expected_profit: opp.expected_profit,
                    cancel: Arc::clone(&cancel),
                    submitting: false,
                },
            );
        }
        Some(cancel_rx)
    }

    /// Commit to submission. Checks the cancel flag and marks every held
    /// pool non-preemptible in one step under the book lock, so preemption
    /// and the decision to sign cannot interleave. Returns `false` when the
    /// reservation was already preempted.
    pub fn begin_submission(&self, opportunity: Uuid) -> bool {
        let mut book = self
            .by_pool
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut held = false;
        for r in book.values() {
            if r.opportunity == opportunity {
                if *r.cancel.borrow() {
                    return false;
                }
                held = true;
            }
        }
        if !held {
            return false;
        }
        for r in book.values_mut() {
            if r.opportunity == opportunity {
                r.submitting = true;
            }
        }
        true
    }

    pub fn release(&self, opportunity: Uuid) {
        let mut book = self
            .by_pool
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        book.retain(|_, r| r.opportunity != opportunity);
    }
}

/// Everything a detection worker needs, shared across workers.
pub struct EngineContext {
    pub graph: LiquidityGraph,
    pub finder: PathFinder,
    pub validator: Validator,
    pub composer: Composer,
    pub submitter: Submitter,
    pub aggregator: Option<AggregatorClient>,
    pub reservations: Arc<ReservationBook>,
    pub ledger: Arc<ReportLedger>,
    pub rpc: Arc<RpcClient>,
    pub keypair: Arc<Keypair>,
    pub start_token: Pubkey,
    pub amount_in: u64,
    pub detect_pacing: Duration,
    pub simulate_only: bool,
}

pub async fn run_detection_worker(
    ctx: Arc<EngineContext>,
    worker_id: usize,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    info!(worker_id, "detection worker started");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(ctx.detect_pacing) => {}
            _ = shutdown.changed() => {
                info!(worker_id, "detection worker stopping");
                return Ok(());
            }
        }

        let snapshot = ctx.graph.snapshot();
        if snapshot.pool_count() == 0 {
            continue;
        }
        let candidates = ctx.finder.find(&snapshot, ctx.start_token, ctx.amount_in);

        for opp in candidates {
            let id = opp.id;
            match execute_opportunity(&ctx, opp).await {
                Ok(true) => {}
                Ok(false) => debug!(worker_id, opportunity = %id, "opportunity skipped"),
                Err(err) if err.is_systemic() => {
                    error!(worker_id, opportunity = %id, error = %err, "systemic failure");
                    return Err(err.into());
                }
                Err(err) => {
                    warn!(worker_id, opportunity = %id, error = %err, "opportunity abandoned");
                }
            }
        }
    }
}

/// Run one opportunity through the pipeline. `Ok(false)` means it was
/// skipped without work (pools already reserved or preempted mid-flight).
async fn execute_opportunity(
    ctx: &EngineContext,
    opp: Opportunity,
) -> Result<bool, EngineError> {
    let Some(cancel) = ctx.reservations.try_reserve(&opp) else {
        return Ok(false);
    };
    let result = execute_reserved(ctx, &opp, cancel).await;
    ctx.reservations.release(opp.id);

    // Local rejections are terminal for the plan and belong in the audit
    // trail alongside raced submissions.
    if let Err(EngineError::RejectedLocally(reason)) = &result {
        let venues: Vec<String> = opp.hops.iter().map(|h| h.venue.as_str().to_string()).collect();
        let record = SubmissionRecord::rejected_locally(
            opp.id,
            opp.amount_in,
            opp.expected_profit,
            reason,
            venues,
            opp.hops.len(),
        );
        if let Err(err) = ctx.ledger.append(&record) {
            warn!(opportunity = %opp.id, error = %err, "ledger append failed");
        }
    }
    result
}

async fn execute_reserved(
    ctx: &EngineContext,
    opp: &Opportunity,
    cancel: watch::Receiver<bool>,
) -> Result<bool, EngineError> {
    // Fresh snapshot: the market has moved since detection by construction.
    let rev = ctx.validator.revalidate(opp, &ctx.graph.snapshot())?;

    if let Some(aggregator) = &ctx.aggregator {
        let first = &opp.hops[0];
        let reference = aggregator
            .fetch_quote(&first.token_in, &first.token_out, first.amount_in)
            .await?;
        aggregator.cross_check(first.amount_out, reference.out_amount()?)?;
    }

    // Cheap early exit before the RPC round trips below.
    if *cancel.borrow() {
        return Err(EngineError::StaleOpportunity(
            "preempted by a richer overlapping opportunity".to_string(),
        ));
    }

    let authority = ctx.keypair.pubkey();
    let start_ata = get_associated_token_address(&authority, &ctx.start_token);
    let balance_before = token_balance(&ctx.rpc, &start_ata).await?;
    if balance_before < opp.amount_in {
        return Err(EngineError::RejectedLocally(format!(
            "start token balance {} below trade size {}",
            balance_before, opp.amount_in
        )));
    }

    let (blockhash, last_valid_block_height) = ctx
        .rpc
        .get_latest_blockhash_with_commitment(CommitmentConfig::confirmed())
        .await
        .map_err(|e| EngineError::RejectedLocally(format!("blockhash fetch: {e}")))?;

    let plan = ctx
        .composer
        .compose(opp, &rev, &authority, blockhash, last_valid_block_height)?;

    // Commit point. The book re-checks the cancel flag and marks our pools
    // non-preemptible in one locked step; past here nothing can evict this
    // plan, so two overlapping plans can never both reach a channel.
    if !ctx.reservations.begin_submission(opp.id) {
        return Err(EngineError::StaleOpportunity(
            "preempted by a richer overlapping opportunity".to_string(),
        ));
    }

    let amount_in = plan.amount_in;
    let expected_profit = plan.expected_profit;
    let hop_count = plan.hop_count;
    let venues: Vec<String> = opp.hops.iter().map(|h| h.venue.as_str().to_string()).collect();
    let tx = plan.into_signed_transaction(&ctx.keypair);

    if ctx.simulate_only {
        let sim = ctx
            .rpc
            .simulate_transaction(&tx)
            .await
            .map_err(|e| EngineError::RejectedLocally(format!("simulation: {e}")))?;
        match sim.value.err {
            Some(err) => warn!(opportunity = %opp.id, ?err, "simulation failed"),
            None => info!(
                opportunity = %opp.id,
                expected_profit,
                "simulation passed, submission disabled"
            ),
        }
        return Ok(true);
    }

    let outcome = ctx
        .submitter
        .race(opp.id, &tx, last_valid_block_height)
        .await?;

    let realized_profit = if matches!(outcome.state, SubmissionState::Confirmed { .. }) {
        let balance_after = token_balance(&ctx.rpc, &start_ata).await?;
        Some(balance_after as i64 - balance_before as i64)
    } else {
        None
    };

    let record = SubmissionRecord::from_outcome(
        &outcome,
        amount_in,
        expected_profit,
        realized_profit,
        venues,
        hop_count,
    );
    if let Err(err) = ctx.ledger.append(&record) {
        warn!(opportunity = %opp.id, error = %err, "ledger append failed");
    }

    match &outcome.state {
        SubmissionState::Confirmed { slot } => {
            info!(
                opportunity = %opp.id,
                slot,
                expected_profit,
                realized_profit = ?realized_profit,
                channel = ?outcome.winning_channel,
                "cycle confirmed"
            );
            Ok(true)
        }
        SubmissionState::Reverted { reason } => {
            Err(EngineError::TransactionReverted(reason.clone()))
        }
        SubmissionState::Expired => Err(EngineError::TransactionExpired(last_valid_block_height)),
        other => {
            warn!(opportunity = %opp.id, state = other.label(), "unexpected terminal state");
            Ok(true)
        }
    }
}

async fn token_balance(rpc: &RpcClient, ata: &Pubkey) -> Result<u64, EngineError> {
    let balance = rpc
        .get_token_account_balance(ata)
        .await
        .map_err(|e| EngineError::RejectedLocally(format!("balance read: {e}")))?;
    balance
        .amount
        .parse()
        .map_err(|_| EngineError::RejectedLocally(format!(
            "unparseable token balance: {}",
            balance.amount
        )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathfinder::PlannedHop;
    use crate::shared::types::{Direction, Venue};

    fn opp_over(pools: &[Pubkey], expected_profit: u64) -> Opportunity {
        let token = Pubkey::new_unique();
        let hops = pools
            .iter()
            .map(|p| PlannedHop {
                pool: *p,
                venue: Venue::Raydium,
                dir: Direction::AtoB,
                token_in: token,
                token_out: token,
                fee_bps: 25,
                amount_in: 1_000,
                amount_out: 1_000,
            })
            .collect();
        Opportunity {
            id: Uuid::new_v4(),
            start_token: token,
            hops,
            amount_in: 1_000,
            expected_out: 1_000 + expected_profit,
            expected_profit,
            graph_version: 1,
        }
    }

    #[test]
    fn richer_reservation_blocks_poorer() {
        let book = ReservationBook::new();
        let pool = Pubkey::new_unique();
        let rich = opp_over(&[pool], 500);
        let poor = opp_over(&[pool], 100);

        let _held = book.try_reserve(&rich).unwrap();
        assert!(book.try_reserve(&poor).is_none());
    }

    #[test]
    fn richer_preempts_poorer_and_flips_cancel() {
        let book = ReservationBook::new();
        let pool = Pubkey::new_unique();
        let poor = opp_over(&[pool], 100);
        let rich = opp_over(&[pool], 500);

        let poor_cancel = book.try_reserve(&poor).unwrap();
        assert!(!*poor_cancel.borrow());

        let _rich_cancel = book.try_reserve(&rich).unwrap();
        assert!(*poor_cancel.borrow());
    }

    #[test]
    fn preemption_frees_every_pool_of_the_loser() {
        let book = ReservationBook::new();
        let (p1, p2) = (Pubkey::new_unique(), Pubkey::new_unique());
        let poor = opp_over(&[p1, p2], 100);
        // Overlaps only p1 but evicts the whole reservation.
        let rich = opp_over(&[p1], 500);

        book.try_reserve(&poor).unwrap();
        book.try_reserve(&rich).unwrap();

        // p2 is free again for an unrelated opportunity.
        let other = opp_over(&[p2], 50);
        assert!(book.try_reserve(&other).is_some());
    }

    #[test]
    fn committed_reservation_survives_richer_newcomer() {
        let book = ReservationBook::new();
        let pool = Pubkey::new_unique();
        let poor = opp_over(&[pool], 100);
        let rich = opp_over(&[pool], 500);

        let poor_cancel = book.try_reserve(&poor).unwrap();
        assert!(book.begin_submission(poor.id));

        // The poorer plan already committed to signing: the richer cycle
        // cannot take its pools, and no cancel is ever delivered. Exactly
        // one of the two overlapping plans can reach a channel.
        assert!(book.try_reserve(&rich).is_none());
        assert!(!*poor_cancel.borrow());
    }

    #[test]
    fn preempted_reservation_cannot_commit() {
        let book = ReservationBook::new();
        let pool = Pubkey::new_unique();
        let poor = opp_over(&[pool], 100);
        let rich = opp_over(&[pool], 500);

        book.try_reserve(&poor).unwrap();
        book.try_reserve(&rich).unwrap();

        // The eviction happened before the poorer plan committed, so its
        // commit fails and only the richer plan proceeds.
        assert!(!book.begin_submission(poor.id));
        assert!(book.begin_submission(rich.id));
    }

    #[test]
    fn commit_after_release_fails() {
        let book = ReservationBook::new();
        let pool = Pubkey::new_unique();
        let opp = opp_over(&[pool], 100);
        book.try_reserve(&opp).unwrap();
        book.release(opp.id);
        assert!(!book.begin_submission(opp.id));
    }

    #[test]
    fn release_frees_pools() {
        let book = ReservationBook::new();
        let pool = Pubkey::new_unique();
        let first = opp_over(&[pool], 500);
        book.try_reserve(&first).unwrap();
        book.release(first.id);

        let second = opp_over(&[pool], 100);
        assert!(book.try_reserve(&second).is_some());
    }

    #[test]
    fn disjoint_reservations_coexist() {
        let book = ReservationBook::new();
        let a = opp_over(&[Pubkey::new_unique()], 100);
        let b = opp_over(&[Pubkey::new_unique()], 100);
        assert!(book.try_reserve(&a).is_some());
        assert!(book.try_reserve(&b).is_some());
    }

    #[test]
    fn equal_profit_does_not_preempt() {
        let book = ReservationBook::new();
        let pool = Pubkey::new_unique();
        let first = opp_over(&[pool], 100);
        let second = opp_over(&[pool], 100);
        book.try_reserve(&first).unwrap();
        assert!(book.try_reserve(&second).is_none());
    }
}
