//! Submission channels: direct RPC and bundle relay
//!
//! Both channels receive the same signed transaction bytes. Terminal state
//! is read from chain, so a bundle accepted by the relay still resolves
//! through signature status like any other submission.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use solana_transaction_status::TransactionConfirmationStatus;
use tracing::{debug, warn};

use crate::shared::errors::EngineError;

const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(400);

/// Final on-chain fate of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalState {
    Confirmed { slot: u64 },
    Reverted { reason: String },
    Expired,
}

/// One way of getting a signed transaction on chain and learning its fate.
#[async_trait]
pub trait SubmissionChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn submit(&self, tx: &Transaction) -> Result<Signature, EngineError>;

    /// Poll until the signature reaches a terminal state or the validity
    /// window lapses.
    async fn await_terminal(
        &self,
        signature: &Signature,
        last_valid_block_height: u64,
    ) -> Result<TerminalState, EngineError>;
}

/// Plain RPC submission. Preflight is skipped; the composed minimum-out
/// guards make an unprofitable fill revert on chain instead.
pub struct RpcChannel {
    rpc: Arc<RpcClient>,
}

impl RpcChannel {
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl SubmissionChannel for RpcChannel {
    fn name(&self) -> &'static str {
        "rpc"
    }

    async fn submit(&self, tx: &Transaction) -> Result<Signature, EngineError> {
        self.rpc
            .send_transaction_with_config(
                tx,
                RpcSendTransactionConfig {
                    skip_preflight: true,
                    ..RpcSendTransactionConfig::default()
                },
            )
            .await
            .map_err(|e| EngineError::ChannelUnavailable {
                channel: "rpc".to_string(),
                reason: e.to_string(),
            })
    }

    async fn await_terminal(
        &self,
        signature: &Signature,
        last_valid_block_height: u64,
    ) -> Result<TerminalState, EngineError> {
        poll_signature_status(&self.rpc, "rpc", signature, last_valid_block_height).await
    }
}

/// Bundle relay submission over JSON-RPC `sendBundle`. Status still resolves
/// through the shared RPC endpoint.
pub struct BundleRelayChannel {
    http: reqwest::Client,
    endpoint: String,
    rpc: Arc<RpcClient>,
}

impl BundleRelayChannel {
    pub fn new(endpoint: String, rpc: Arc<RpcClient>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            rpc,
        }
    }
}

#[async_trait]
impl SubmissionChannel for BundleRelayChannel {
    fn name(&self) -> &'static str {
        "bundle_relay"
    }

    async fn submit(&self, tx: &Transaction) -> Result<Signature, EngineError> {
        let unavailable = |reason: String| EngineError::ChannelUnavailable {
            channel: "bundle_relay".to_string(),
            reason,
        };

        let signature = tx
            .signatures
            .first()
            .copied()
            .ok_or_else(|| unavailable("unsigned transaction".to_string()))?;
        let bytes = bincode::serialize(tx).map_err(|e| unavailable(e.to_string()))?;
        let encoded = bs58::encode(bytes).into_string();

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendBundle",
            "params": [[encoded]],
        });
        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if let Some(err) = payload.get("error") {
            return Err(unavailable(err.to_string()));
        }

        debug!(%signature, "bundle accepted by relay");
        Ok(signature)
    }

    async fn await_terminal(
        &self,
        signature: &Signature,
        last_valid_block_height: u64,
    ) -> Result<TerminalState, EngineError> {
        poll_signature_status(&self.rpc, "bundle_relay", signature, last_valid_block_height)
            .await
    }
}

/// Shared status polling: confirmed status wins, an error in the status is
/// a revert, and a block height past the validity window is expiry.
async fn poll_signature_status(
    rpc: &RpcClient,
    channel: &'static str,
    signature: &Signature,
    last_valid_block_height: u64,
) -> Result<TerminalState, EngineError> {
    loop {
        let statuses = rpc
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| EngineError::ChannelUnavailable {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;

        if let Some(Some(status)) = statuses.value.first() {
            if let Some(err) = &status.err {
                return Ok(TerminalState::Reverted {
                    reason: err.to_string(),
                });
            }
            let confirmed = matches!(
                status.confirmation_status,
                Some(TransactionConfirmationStatus::Confirmed)
                    | Some(TransactionConfirmationStatus::Finalized)
            );
            if confirmed {
                return Ok(TerminalState::Confirmed { slot: status.slot });
            }
        } else {
            let height = rpc
                .get_block_height_with_commitment(CommitmentConfig::confirmed())
                .await
                .map_err(|e| EngineError::ChannelUnavailable {
                    channel: channel.to_string(),
                    reason: e.to_string(),
                })?;
            if height > last_valid_block_height {
                warn!(%signature, height, last_valid_block_height, "validity window lapsed");
                return Ok(TerminalState::Expired);
            }
        }

        tokio::time::sleep(STATUS_POLL_INTERVAL).await;
    }
}
