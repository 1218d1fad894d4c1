//! Racing submission across channels
//!
//! The same signed bytes go to every enabled channel at once. The first
//! channel to report a terminal state decides the outcome; whatever the
//! others report afterwards is recorded but changes nothing. Only one
//! signed transaction ever exists per plan, so the race cannot double-fill.

pub mod channel;

pub use channel::{BundleRelayChannel, RpcChannel, SubmissionChannel, TerminalState};

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::shared::errors::EngineError;

/// Lifecycle of one composed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    Built,
    Submitted,
    Confirmed { slot: u64 },
    Reverted { reason: String },
    Expired,
    RejectedLocally { reason: String },
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubmissionState::Built | SubmissionState::Submitted)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SubmissionState::Built => "built",
            SubmissionState::Submitted => "submitted",
            SubmissionState::Confirmed { .. } => "confirmed",
            SubmissionState::Reverted { .. } => "reverted",
            SubmissionState::Expired => "expired",
            SubmissionState::RejectedLocally { .. } => "rejected_locally",
        }
    }
}

impl From<TerminalState> for SubmissionState {
    fn from(t: TerminalState) -> Self {
        match t {
            TerminalState::Confirmed { slot } => SubmissionState::Confirmed { slot },
            TerminalState::Reverted { reason } => SubmissionState::Reverted { reason },
            TerminalState::Expired => SubmissionState::Expired,
        }
    }
}

/// What one channel eventually reported.
#[derive(Debug, Clone)]
pub struct ChannelResult {
    pub channel: &'static str,
    pub result: Result<TerminalState, String>,
}

#[derive(Debug)]
pub struct SubmissionOutcome {
    pub plan_id: Uuid,
    pub state: SubmissionState,
    pub signature: Option<Signature>,
    pub winning_channel: Option<&'static str>,
    /// Reports that arrived after the winner, kept for the ledger.
    pub late_results: Vec<ChannelResult>,
}

enum ChannelEvent {
    Submitted {
        channel: &'static str,
        signature: Signature,
    },
    Done(ChannelResult),
}

pub struct Submitter {
    channels: Vec<Arc<dyn SubmissionChannel>>,
    late_drain: Duration,
}

impl Submitter {
    pub fn new(channels: Vec<Arc<dyn SubmissionChannel>>, late_drain: Duration) -> Self {
        Self {
            channels,
            late_drain,
        }
    }

    /// Submit `tx` to every channel and return once the first terminal state
    /// lands. Fails with `ChannelUnavailable` only when every channel failed
    /// to produce a terminal state.
    pub async fn race(
        &self,
        plan_id: Uuid,
        tx: &Transaction,
        last_valid_block_height: u64,
    ) -> Result<SubmissionOutcome, EngineError> {
        if self.channels.is_empty() {
            return Err(EngineError::ChannelUnavailable {
                channel: "all".to_string(),
                reason: "no submission channels configured".to_string(),
            });
        }

        let (events_tx, mut events_rx) = mpsc::channel::<ChannelEvent>(self.channels.len() * 2);
        for ch in &self.channels {
            let ch = Arc::clone(ch);
            let tx = tx.clone();
            let events = events_tx.clone();
            tokio::spawn(async move {
                let name = ch.name();
                let signature = match ch.submit(&tx).await {
                    Ok(sig) => sig,
                    Err(err) => {
                        let _ = events
                            .send(ChannelEvent::Done(ChannelResult {
                                channel: name,
                                result: Err(err.to_string()),
                            }))
                            .await;
                        return;
                    }
                };
                let _ = events
                    .send(ChannelEvent::Submitted {
                        channel: name,
                        signature,
                    })
                    .await;
                let result = ch
                    .await_terminal(&signature, last_valid_block_height)
                    .await
                    .map_err(|e| e.to_string());
                let _ = events
                    .send(ChannelEvent::Done(ChannelResult {
                        channel: name,
                        result,
                    }))
                    .await;
            });
        }
        drop(events_tx);

        let mut state = SubmissionState::Built;
        let mut signature = None;
        let mut failures: Vec<ChannelResult> = Vec::new();
        let mut pending = self.channels.len();

        let winner = loop {
            let Some(event) = events_rx.recv().await else {
                break None;
            };
            match event {
                ChannelEvent::Submitted {
                    channel,
                    signature: sig,
                } => {
                    if signature.is_none() {
                        signature = Some(sig);
                    }
                    if state == SubmissionState::Built {
                        state = SubmissionState::Submitted;
                        debug!(plan = %plan_id, channel, %sig, "first submission accepted");
                    }
                }
                ChannelEvent::Done(result) => {
                    pending -= 1;
                    match result.result {
                        Ok(terminal) => break Some((result.channel, terminal)),
                        Err(reason) => {
                            warn!(plan = %plan_id, channel = result.channel, %reason, "channel failed");
                            failures.push(ChannelResult {
                                channel: result.channel,
                                result: Err(reason),
                            });
                            if pending == 0 {
                                break None;
                            }
                        }
                    }
                }
            }
        };

        let Some((winning_channel, terminal)) = winner else {
            let reasons: Vec<String> = failures
                .iter()
                .map(|f| match &f.result {
                    Err(reason) => format!("{}: {}", f.channel, reason),
                    Ok(_) => unreachable!("winner path handles terminal states"),
                })
                .collect();
            return Err(EngineError::ChannelUnavailable {
                channel: "all".to_string(),
                reason: reasons.join("; "),
            });
        };

        info!(
            plan = %plan_id,
            channel = winning_channel,
            state = SubmissionState::from(terminal.clone()).label(),
            "submission settled"
        );

        // Remaining channels keep reporting; give them a short window so
        // the ledger shows the full picture.
        let mut late_results = failures;
        if pending > 0 {
            let deadline = tokio::time::Instant::now() + self.late_drain;
            while pending > 0 {
                match tokio::time::timeout_at(deadline, events_rx.recv()).await {
                    Ok(Some(ChannelEvent::Done(result))) => {
                        pending -= 1;
                        late_results.push(result);
                    }
                    Ok(Some(ChannelEvent::Submitted { .. })) => {}
                    Ok(None) | Err(_) => break,
                }
            }
        }

        Ok(SubmissionOutcome {
            plan_id,
            state: terminal.into(),
            signature,
            winning_channel: Some(winning_channel),
            late_results,
        })
    }
}
