use chrono::{DateTime, Utc};

use crate::model::{ItemId, Money, OwnershipId, UserId};

/// Body of one of the four events an auction emits to its observers.
/// Carries the same payload shape the wire protocol publishes under
/// `result` for a `notification` push (see `bidpazari-server`).
#[derive(Debug, Clone)]
pub enum AuctionEventKind {
    AuctionStarted {
        current_price: Money,
    },
    BidReceived {
        bidder: UserId,
        amount: Money,
    },
    PriceDecremented {
        current_price: Money,
    },
    AuctionStopped {
        winner: Option<UserId>,
        amount: Option<Money>,
    },
}

impl AuctionEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            AuctionEventKind::AuctionStarted { .. } => "auction_started",
            AuctionEventKind::BidReceived { .. } => "bid_received",
            AuctionEventKind::PriceDecremented { .. } => "price_decremented",
            AuctionEventKind::AuctionStopped { .. } => "auction_stopped",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuctionEvent {
    pub auction_id: OwnershipId,
    pub kind: AuctionEventKind,
    pub timestamp: DateTime<Utc>,
}

impl AuctionEvent {
    pub fn new(auction_id: OwnershipId, kind: AuctionEventKind) -> Self {
        AuctionEvent {
            auction_id,
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Registered against one `Auction`. Invoked synchronously from inside the
/// auction's lock -- implementations must not block; the expectation is
/// that they enqueue onto a bounded per-connection channel and return.
pub trait AuctionObserver: Send + Sync {
    fn notify(&self, event: &AuctionEvent);
}

/// Registered against the `Registry`. Fired once per newly created
/// auction whose item matches the optional type filter.
pub trait ItemWatcher: Send + Sync {
    fn notify(&self, item_id: ItemId, item_type: &str, initial_price: Money);
    fn item_type_filter(&self) -> Option<&str>;
}
