//! Cross-DEX cycle arbitrage engine for Solana
//!
//! Pipeline: venue feeds keep a versioned liquidity graph fresh, detection
//! workers enumerate profitable cycles over immutable snapshots, survivors
//! are revalidated, composed into one atomic transaction, and raced across
//! submission channels.

pub mod aggregator;
pub mod app;
pub mod composer;
pub mod config;
pub mod engine;
pub mod feed;
pub mod graph;
pub mod pathfinder;
pub mod quote;
pub mod report;
pub mod shared;
pub mod submitter;
pub mod validator;

pub use engine::{EngineContext, ReservationBook};
pub use graph::{GraphSnapshot, LiquidityGraph, Pool};
pub use pathfinder::{Opportunity, PathFinder};
pub use shared::errors::EngineError;
pub use submitter::{SubmissionOutcome, SubmissionState, Submitter};
