//! Reward allocation: gross reward -> payout instructions.
//!
//! Every gross reward is split in a fixed priority order: the protocol
//! fee first, then the secondary allocation until its monetary target
//! is met, then the user's net share. Amounts are exact integers, so
//! the emitted instructions for a call always sum to the gross input
//! and cumulative totals never drift.

use tracing::{info, warn};

use crate::address::ValidatedAddress;
use crate::amount::Amount;

/// Which leg of the split an instruction belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutKind {
    Fee,
    SecondaryAllocation,
    UserNet,
}

impl PayoutKind {
    pub fn name(&self) -> &'static str {
        match self {
            PayoutKind::Fee => "fee",
            PayoutKind::SecondaryAllocation => "secondary_allocation",
            PayoutKind::UserNet => "user_net",
        }
    }
}

/// An immutable payout order for the external ledger. Zero-amount
/// instructions are never emitted.
#[derive(Debug, Clone)]
pub struct PayoutInstruction {
    pub recipient: String,
    pub amount: Amount,
    pub kind: PayoutKind,
}

/// Cumulative allocation totals. All fields are monotonically
/// non-decreasing except `target_met`, which flips false -> true at
/// most once per engine lifetime.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllocationState {
    pub cumulative_fee: Amount,
    pub cumulative_secondary: Amount,
    pub cumulative_user_net: Amount,
    pub cumulative_gross: Amount,
    pub target_met: bool,
}

/// Static configuration for the splitter.
#[derive(Debug, Clone)]
pub struct RewardConfig {
    pub user_address: ValidatedAddress,
    pub fee_address: ValidatedAddress,
    pub secondary_address: ValidatedAddress,
    /// Protocol fee in whole percent (0-100).
    pub fee_percent: u8,
    /// Secondary allocation target in USD.
    pub target_usd: f64,
    /// Initial coin/USD price, if known.
    pub initial_price: Option<f64>,
}

/// Order-sensitive reward splitter with a sticky allocation target.
#[derive(Debug)]
pub struct RewardAllocationEngine {
    config: RewardConfig,
    price: Option<f64>,
    state: AllocationState,
}

impl RewardAllocationEngine {
    pub fn new(config: RewardConfig) -> Self {
        let price = config.initial_price.filter(|p| *p > 0.0);
        let mut engine = RewardAllocationEngine {
            config,
            price,
            state: AllocationState::default(),
        };
        engine.refresh_target_met();
        engine
    }

    /// Current cumulative totals, for the display collaborator.
    pub fn state(&self) -> AllocationState {
        self.state
    }

    pub fn price(&self) -> Option<f64> {
        self.price
    }

    /// Update the coin/USD price. Non-positive or non-finite updates
    /// are ignored and never clear a previously valid price.
    pub fn update_price(&mut self, new_price: f64) {
        if !new_price.is_finite() || new_price <= 0.0 {
            warn!(new_price, "ignoring non-positive price update");
            return;
        }
        self.price = Some(new_price);
        self.refresh_target_met();
    }

    /// The secondary target converted to coin units at the current
    /// price. `None` means the price is unknown and the target is
    /// unbounded: it cannot be satisfied until a valid price is set.
    pub fn target_amount(&self) -> Option<Amount> {
        self.price
            .map(|p| Amount::from_coins_ceil(self.config.target_usd / p))
    }

    fn refresh_target_met(&mut self) {
        if self.state.target_met {
            return;
        }
        if let Some(target) = self.target_amount() {
            if self.state.cumulative_secondary >= target {
                self.state.target_met = true;
                info!(
                    target = %target,
                    target_usd = self.config.target_usd,
                    "secondary allocation target met"
                );
            }
        }
    }

    /// Split a gross reward into payout instructions and update the
    /// cumulative totals.
    ///
    /// A zero gross reward is a no-op: no instructions, no mutation.
    /// The amounts of the returned instructions always sum exactly to
    /// `gross`.
    pub fn process_reward(&mut self, gross: Amount) -> Vec<PayoutInstruction> {
        if gross.is_zero() {
            return Vec::new();
        }

        let mut instructions = Vec::with_capacity(3);

        // 1. Protocol fee comes off the top.
        let fee = gross.percent(self.config.fee_percent);
        if !fee.is_zero() {
            instructions.push(PayoutInstruction {
                recipient: self.config.fee_address.display.clone(),
                amount: fee,
                kind: PayoutKind::Fee,
            });
        }
        let mut remaining = gross - fee;

        // 2. Secondary allocation until the target is met. An unknown
        //    price makes the target unbounded, so the whole remainder
        //    flows here until a valid price arrives.
        if !self.state.target_met {
            let needed = match self.target_amount() {
                Some(target) => target.saturating_sub(self.state.cumulative_secondary),
                None => Amount::MAX,
            };
            let secondary = remaining.min(needed);
            if !secondary.is_zero() {
                self.state.cumulative_secondary += secondary;
                remaining -= secondary;
                instructions.push(PayoutInstruction {
                    recipient: self.config.secondary_address.display.clone(),
                    amount: secondary,
                    kind: PayoutKind::SecondaryAllocation,
                });
            }
            self.refresh_target_met();
        }

        // 3. Whatever is left is the user's net share.
        if !remaining.is_zero() {
            self.state.cumulative_user_net += remaining;
            instructions.push(PayoutInstruction {
                recipient: self.config.user_address.display.clone(),
                amount: remaining,
                kind: PayoutKind::UserNet,
            });
        }

        self.state.cumulative_fee += fee;
        self.state.cumulative_gross += gross;

        instructions
    }
}
