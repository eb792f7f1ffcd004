//! Core mining logic for the solo miner application.
//!
//! This crate provides pure implementations of:
//! - Exact integer coin amounts for drift-free reward accounting
//! - Payout address validation
//! - Compact difficulty target conversion and comparison
//! - Block template and solution value types
//! - The nonce search engine with cancellation and throughput metering
//! - The reward allocation engine (fee / secondary allocation / user net)
//!
//! Everything here is free of I/O; the node-facing connector and the
//! worker pool live in the `miner-cli` crate.

pub mod address;
pub mod amount;
pub mod difficulty;
pub mod hash;
pub mod rewards;
pub mod search;
pub mod template;

pub use address::{validate_address, AddressError, ValidatedAddress};
pub use amount::{Amount, UNITS_PER_COIN};
pub use difficulty::{bits_to_target, digest_below_target};
pub use rewards::{
    AllocationState, PayoutInstruction, PayoutKind, RewardAllocationEngine, RewardConfig,
};
pub use search::{HashSearchEngine, SearchError, SearchOutcome};
pub use template::{BlockTemplate, Solution, NONCE_SIZE};
