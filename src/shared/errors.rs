//! Error taxonomy for the engine
//!
//! Per-opportunity errors (stale data, reverts, expiry) are recoverable and
//! never halt the detection loop. `PricingMismatch` and losing every
//! submission channel are systemic and must reach the operator boundary.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Pipeline errors, one variant per failure class.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("pool {0} exceeded its freshness threshold")]
    StalePoolData(Pubkey),

    #[error("opportunity rejected at revalidation: {0}")]
    StaleOpportunity(String),

    #[error(
        "pricing mismatch vs reference: engine={engine_out} reference={reference_out} ({deviation_bps} bps)"
    )]
    PricingMismatch {
        engine_out: u64,
        reference_out: u64,
        deviation_bps: u32,
    },

    #[error("validity window lapsed at block height {0}")]
    TransactionExpired(u64),

    #[error("transaction reverted: {0}")]
    TransactionReverted(String),

    #[error("submission channel {channel} unavailable: {reason}")]
    ChannelUnavailable { channel: String, reason: String },

    #[error("rejected before submission: {0}")]
    RejectedLocally(String),

    #[error("quote failed: {0}")]
    Quote(#[from] QuoteError),
}

impl EngineError {
    /// Systemic errors are surfaced for investigation instead of being
    /// absorbed by the detection loop. A single channel failing is routine;
    /// losing every channel is not.
    pub fn is_systemic(&self) -> bool {
        match self {
            EngineError::PricingMismatch { .. } => true,
            EngineError::ChannelUnavailable { channel, .. } => channel == "all",
            _ => false,
        }
    }
}

/// Venue feed errors.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("account owner {0} is not a supported venue program")]
    UnknownOwner(Pubkey),

    #[error("failed to decode {venue} pool account {address}: {reason}")]
    Decode {
        venue: &'static str,
        address: Pubkey,
        reason: String,
    },

    #[error("pool account {0} not found on chain")]
    AccountMissing(Pubkey),

    #[error("rpc error: {0}")]
    Rpc(String),
}

/// Pricing errors raised by the quote engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error("pool has an empty reserve")]
    EmptyReserves,

    #[error("input amount is zero")]
    ZeroInput,

    #[error("order book side has no depth")]
    NoDepth,

    #[error("input exhausts available depth")]
    InsufficientDepth,

    #[error("zero amplification coefficient")]
    ZeroAmplification,

    #[error("invariant solve did not converge")]
    NoConvergence,

    #[error("arithmetic overflow in pricing math")]
    Overflow,
}
