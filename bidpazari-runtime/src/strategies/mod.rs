mod decrement;
mod highest_contribution;
mod increment;

use std::sync::Arc;
use std::time::Duration;

pub use decrement::DecrementBiddingStrategy;
pub use highest_contribution::HighestContributionBiddingStrategy;
pub use increment::IncrementBiddingStrategy;

use crate::errors::{BiddingNotAllowed, CommandFailed, InsufficientBalance};
use crate::model::Money;
use crate::session_user::SessionUser;

#[derive(Debug, thiserror::Error)]
pub enum BidError {
    #[error(transparent)]
    NotAllowed(#[from] BiddingNotAllowed),

    #[error(transparent)]
    InsufficientBalance(#[from] InsufficientBalance),
}

impl From<BidError> for CommandFailed {
    fn from(err: BidError) -> Self {
        match err {
            BidError::NotAllowed(e) => e.into(),
            BidError::InsufficientBalance(e) => e.into(),
        }
    }
}

/// Returned by `on_stop`. `winner` is the session/amount settlement should
/// convert into the owner-bound purchase transaction; `extra_transactions`
/// are additional bidder -> owner transactions settlement must also
/// record (only non-empty for highest-contribution, whose losers forfeit
/// their contribution rather than being refunded).
pub struct StopOutcome {
    pub winner: Option<(Arc<SessionUser>, Money)>,
    pub extra_transactions: Vec<(Arc<SessionUser>, Money)>,
}

impl StopOutcome {
    pub fn no_winner() -> Self {
        StopOutcome {
            winner: None,
            extra_transactions: Vec::new(),
        }
    }
}

/// Result of one decrement-strategy timer fire.
pub enum TickOutcome {
    /// Not a ticking strategy; `Auction` never schedules a tick for it.
    NotApplicable,
    PriceDecremented(Money),
    ReachedMinimum,
}

#[derive(Debug, Clone, Copy)]
pub struct TickerConfig {
    pub tick: Duration,
}

/// Common contract every bidding protocol implements. `Auction` owns the
/// only mutex guarding a strategy's mutable state (the strategy itself
/// never locks anything), so these methods run to completion without
/// interleaving from other callers of the same auction.
pub trait BiddingStrategy: Send {
    fn current_price(&self) -> Money;

    /// The session and amount that would win if the auction closed now.
    fn current_winner(&self) -> Option<(Arc<SessionUser>, Money)>;

    /// Called exactly once on the Initial -> Open transition.
    fn on_start(&mut self) {}

    /// If this strategy drives a background timer (decrement only),
    /// `Auction::start` reads this once right after `on_start` to decide
    /// whether to schedule the first tick.
    fn ticker_config(&self) -> Option<TickerConfig> {
        None
    }

    /// One timer fire. Only ever called for strategies that returned
    /// `Some` from `ticker_config`.
    fn on_tick(&mut self) -> TickOutcome {
        TickOutcome::NotApplicable
    }

    /// Validates protocol preconditions, reserves funds, and records the
    /// bid. Returns whether the auction should auto-close as a result.
    /// Validation is protocol-before-funds: callers never end up holding
    /// a reservation when a bid is ultimately rejected.
    fn on_bid(&mut self, bidder: Arc<SessionUser>, amount: Option<Money>) -> Result<bool, BidError>;

    /// Called exactly once on the Open -> Closed transition, before
    /// settlement. Releases every reservation the strategy is holding.
    fn on_stop(&mut self) -> StopOutcome;

    /// Human-readable parameters/tooltip text for UI rendering.
    fn describe(&self) -> String;

    fn name(&self) -> &'static str;
}

pub enum StrategyParams {
    Increment {
        initial_price: Money,
        minimum_increment: Money,
        maximum_price: Option<Money>,
    },
    Decrement {
        initial_price: Money,
        minimum_price: Money,
        price_decrement_rate: Money,
        tick_ms: u64,
    },
    HighestContribution {
        minimum_bid_amount: Money,
        maximum_price: Money,
    },
}

impl StrategyParams {
    pub fn identifier(&self) -> &'static str {
        match self {
            StrategyParams::Increment { .. } => "increment",
            StrategyParams::Decrement { .. } => "decrement",
            StrategyParams::HighestContribution { .. } => "highest_contribution",
        }
    }

    pub fn human_readable(&self) -> &'static str {
        match self {
            StrategyParams::Increment { .. } => "Increment Bidding",
            StrategyParams::Decrement { .. } => "Decrement Bidding",
            StrategyParams::HighestContribution { .. } => "Highest Contribution Bidding",
        }
    }

    pub fn initial_price(&self) -> Money {
        match self {
            StrategyParams::Increment { initial_price, .. } => *initial_price,
            StrategyParams::Decrement { initial_price, .. } => *initial_price,
            StrategyParams::HighestContribution { .. } => Money::ZERO,
        }
    }

    pub fn build(self) -> Box<dyn BiddingStrategy> {
        match self {
            StrategyParams::Increment {
                initial_price,
                minimum_increment,
                maximum_price,
            } => Box::new(IncrementBiddingStrategy::new(
                initial_price,
                minimum_increment,
                maximum_price,
            )),
            StrategyParams::Decrement {
                initial_price,
                minimum_price,
                price_decrement_rate,
                tick_ms,
            } => Box::new(DecrementBiddingStrategy::new(
                initial_price,
                minimum_price,
                price_decrement_rate,
                tick_ms,
            )),
            StrategyParams::HighestContribution {
                minimum_bid_amount,
                maximum_price,
            } => Box::new(HighestContributionBiddingStrategy::new(
                minimum_bid_amount,
                maximum_price,
            )),
        }
    }
}
