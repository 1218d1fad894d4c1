//! Wiring: config to running tasks

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::read_keypair_file;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::aggregator::AggregatorClient;
use crate::composer::Composer;
use crate::config::Config;
use crate::engine::{self, EngineContext, ReservationBook};
use crate::feed::poller::FeedPoller;
use crate::feed::AdapterRegistry;
use crate::graph::LiquidityGraph;
use crate::pathfinder::PathFinder;
use crate::report::ReportLedger;
use crate::shared::types::Venue;
use crate::submitter::{BundleRelayChannel, RpcChannel, SubmissionChannel, Submitter};
use crate::validator::Validator;

pub async fn run(cfg: Config) -> Result<()> {
    let keypair = Arc::new(
        read_keypair_file(&cfg.wallet.keypair)
            .map_err(|e| anyhow::anyhow!("read keypair {}: {e}", cfg.wallet.keypair))?,
    );
    let rpc = Arc::new(RpcClient::new(cfg.rpc.url.clone()));

    let start_token = Pubkey::from_str(&cfg.engine.start_token)
        .context("parse engine.start_token")?;
    let swap_agent = Pubkey::from_str(&cfg.programs.swap_agent)
        .context("parse programs.swap_agent")?;
    let pools = cfg
        .pools
        .addresses
        .iter()
        .map(|s| Pubkey::from_str(s).with_context(|| format!("parse pool address {s}")))
        .collect::<Result<Vec<_>>>()?;
    let venues = cfg
        .venues
        .enabled
        .iter()
        .map(|s| Venue::from_str(s))
        .collect::<Result<Vec<_>>>()?;

    let staleness = Duration::from_millis(cfg.engine.staleness_ms);
    let graph = LiquidityGraph::new();
    let registry = Arc::new(AdapterRegistry::new(&venues));

    let (update_tx, mut update_rx) = mpsc::channel(1_024);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller = FeedPoller::new(
        Arc::clone(&rpc),
        Arc::clone(&registry),
        pools,
        Duration::from_millis(cfg.engine.poll_interval_ms),
        update_tx,
    );
    let poller_task = tokio::spawn(poller.run(shutdown_rx.clone()));

    // Single writer applies feed updates to the graph.
    let apply_graph = graph.clone();
    let apply_task = tokio::spawn(async move {
        while let Some(update) = update_rx.recv().await {
            apply_graph.apply_update(update.into_pool());
        }
    });

    let mut channels: Vec<Arc<dyn SubmissionChannel>> =
        vec![Arc::new(RpcChannel::new(Arc::clone(&rpc)))];
    if let Some(relay) = &cfg.submission.bundle_relay_url {
        channels.push(Arc::new(BundleRelayChannel::new(
            relay.clone(),
            Arc::clone(&rpc),
        )));
    }

    let ctx = Arc::new(EngineContext {
        graph: graph.clone(),
        finder: PathFinder::new(cfg.engine.max_hops, cfg.engine.min_profit, staleness),
        validator: Validator::new(
            cfg.engine.min_profit,
            Duration::from_millis(cfg.engine.validator_budget_ms),
            staleness,
        ),
        composer: Composer::new(
            swap_agent,
            cfg.submission.slippage_bps,
            cfg.submission.compute_unit_limit,
            cfg.submission.compute_unit_price_microlamports,
        ),
        submitter: Submitter::new(
            channels,
            Duration::from_millis(cfg.submission.late_drain_ms),
        ),
        aggregator: cfg.aggregator.enabled.then(|| {
            AggregatorClient::new(cfg.aggregator.base_url.clone(), cfg.aggregator.tolerance_bps)
        }),
        reservations: Arc::new(ReservationBook::new()),
        ledger: Arc::new(ReportLedger::new(cfg.report.path.clone().into())),
        rpc: Arc::clone(&rpc),
        keypair,
        start_token,
        amount_in: cfg.engine.amount_in,
        detect_pacing: Duration::from_millis(cfg.engine.poll_interval_ms),
        simulate_only: cfg.submission.simulate_only,
    });

    let mut workers: FuturesUnordered<JoinHandle<Result<()>>> = FuturesUnordered::new();
    for worker_id in 0..cfg.engine.workers {
        workers.push(tokio::spawn(engine::run_detection_worker(
            Arc::clone(&ctx),
            worker_id,
            shutdown_rx.clone(),
        )));
    }

    info!(
        workers = cfg.engine.workers,
        simulate_only = cfg.submission.simulate_only,
        "engine running, ctrl-c to stop"
    );
    let failure = supervise(&mut workers, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await;
    match &failure {
        Some(err) => error!(error = %err, "worker failed, stopping engine"),
        None => info!("shutdown requested"),
    }
    let _ = shutdown_tx.send(true);

    while let Some(result) = workers.next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(error = %err, "worker exited with error"),
            Err(err) => warn!(error = %err, "worker task panicked"),
        }
    }
    let _ = poller_task.await;
    apply_task.abort();

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Watch the worker set until `stop` resolves or a worker dies. A worker
/// that exits with an error, or panics, takes the whole engine down with
/// it rather than leaving the rest running degraded.
async fn supervise<S>(
    workers: &mut FuturesUnordered<JoinHandle<Result<()>>>,
    stop: S,
) -> Option<anyhow::Error>
where
    S: std::future::Future<Output = ()>,
{
    tokio::pin!(stop);
    loop {
        tokio::select! {
            _ = &mut stop => return None,
            exited = workers.next() => match exited {
                Some(Ok(Ok(()))) => {
                    warn!("worker exited early without error");
                }
                Some(Ok(Err(err))) => return Some(err),
                Some(Err(err)) => return Some(anyhow::anyhow!("worker task panicked: {err}")),
                None => return None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker_set(
        tasks: Vec<JoinHandle<Result<()>>>,
    ) -> FuturesUnordered<JoinHandle<Result<()>>> {
        tasks.into_iter().collect()
    }

    #[tokio::test]
    async fn failed_worker_stops_the_engine() {
        let mut workers = worker_set(vec![
            tokio::spawn(async {
                Err(anyhow::anyhow!("all submission channels unavailable"))
            }),
            tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }),
        ]);

        let failure = supervise(&mut workers, std::future::pending()).await;
        let err = failure.expect("worker error must surface");
        assert!(err.to_string().contains("channels unavailable"));
    }

    #[tokio::test]
    async fn panicked_worker_stops_the_engine() {
        let mut workers = worker_set(vec![tokio::spawn(async {
            panic!("worker died");
        })]);

        let failure = supervise(&mut workers, std::future::pending()).await;
        assert!(failure.expect("panic must surface").to_string().contains("panicked"));
    }

    #[tokio::test]
    async fn operator_stop_beats_healthy_workers() {
        let mut workers = worker_set(vec![tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })]);

        let failure = supervise(&mut workers, async {}).await;
        assert!(failure.is_none());
    }
}
