use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use log::{info, warn};

use crate::errors::{BiddingErrorReason, BiddingNotAllowed, CommandFailed, InvalidAuctionStatus};
use crate::events::{AuctionEvent, AuctionEventKind, AuctionObserver};
use crate::model::{ItemId, Money, NewTransaction, OwnershipId, UserId};
use crate::session_user::SessionUser;
use crate::store::Store;
use crate::strategies::{BiddingStrategy, TickOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    Initial,
    Open,
    Closed,
}

impl AuctionStatus {
    fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Initial => "initial",
            AuctionStatus::Open => "open",
            AuctionStatus::Closed => "closed",
        }
    }
}

struct AuctionInner {
    status: AuctionStatus,
    strategy: Box<dyn BiddingStrategy>,
    activity_log: Vec<String>,
    observers: Vec<Arc<dyn AuctionObserver>>,
}

/// A single item up for sale. Guarded by one non-reentrant mutex: every
/// public method below takes the lock for the duration of the call and
/// never re-enters it, so strategies can be "pure" (they only touch their
/// own state and never call back into the auction that owns them).
pub struct Auction {
    pub id: OwnershipId,
    pub owner_id: UserId,
    pub item_id: ItemId,
    pub ownership_id: OwnershipId,
    pub strategy_identifier: &'static str,
    inner: Mutex<AuctionInner>,
}

impl Auction {
    pub fn new(
        ownership_id: OwnershipId,
        owner_id: UserId,
        item_id: ItemId,
        strategy: Box<dyn BiddingStrategy>,
    ) -> Arc<Auction> {
        let strategy_identifier = strategy.name();
        Arc::new(Auction {
            id: ownership_id,
            owner_id,
            item_id,
            ownership_id,
            strategy_identifier,
            inner: Mutex::new(AuctionInner {
                status: AuctionStatus::Initial,
                strategy,
                activity_log: Vec::new(),
                observers: Vec::new(),
            }),
        })
    }

    pub fn status(&self) -> AuctionStatus {
        self.inner.lock().unwrap().status
    }

    pub fn current_price(&self) -> Money {
        self.inner.lock().unwrap().strategy.current_price()
    }

    pub fn describe_strategy(&self) -> String {
        self.inner.lock().unwrap().strategy.describe()
    }

    pub fn activity_log(&self) -> Vec<String> {
        self.inner.lock().unwrap().activity_log.clone()
    }

    /// Idempotent: a bidder calling `bid` repeatedly only ends up
    /// subscribed to this auction's events once.
    pub fn register_observer(&self, observer: Arc<dyn AuctionObserver>) {
        let mut state = self.inner.lock().unwrap();
        let already_registered = state
            .observers
            .iter()
            .any(|existing| Arc::ptr_eq(existing, &observer));
        if !already_registered {
            state.observers.push(observer);
        }
    }

    /// Initial -> Open. If the strategy wants a ticker (decrement only),
    /// the caller is responsible for spawning the returned `TickerConfig`'s
    /// interval against `Arc::downgrade(self)` and `decrement_tick`.
    pub fn start(self: &Arc<Self>) -> Result<Option<Duration>, CommandFailed> {
        let mut state = self.inner.lock().unwrap();
        if state.status != AuctionStatus::Initial {
            return Err(InvalidAuctionStatus(format!(
                "cannot start an auction in status {:?}",
                state.status
            ))
            .into());
        }

        state.strategy.on_start();
        state.status = AuctionStatus::Open;
        let price = state.strategy.current_price();
        let tick = state.strategy.ticker_config().map(|c| c.tick);

        state.activity_log.push(format!(
            "Auction started. Current price: {}",
            price
        ));
        let event = AuctionEvent::new(
            self.id,
            AuctionEventKind::AuctionStarted {
                current_price: price,
            },
        );
        for observer in &state.observers {
            observer.notify(&event);
        }

        info!("auction {} started at {}", self.id, price);
        Ok(tick)
    }

    /// Validates and applies a bid. Returns the post-bid status plus, if
    /// this call triggered auto-close, the total proceeds settlement
    /// credited to the owner -- `Auction` never calls into `Registry`
    /// itself, so it is the caller's job to pass that figure on to
    /// `Registry::credit_if_online(auction.owner_id, ...)`.
    pub fn bid(
        self: &Arc<Self>,
        bidder: Arc<SessionUser>,
        amount: Option<Money>,
        store: &dyn Store,
    ) -> Result<(AuctionStatus, Option<Money>), CommandFailed> {
        let auto_close = {
            let mut state = self.inner.lock().unwrap();
            if state.status != AuctionStatus::Open {
                return Err(BiddingNotAllowed::new(BiddingErrorReason::AuctionClosed).into());
            }
            if bidder.user_id == self.owner_id {
                return Err(BiddingNotAllowed::new(BiddingErrorReason::OwnAuction).into());
            }

            let auto_close = state.strategy.on_bid(Arc::clone(&bidder), amount)?;
            let price = state.strategy.current_price();
            state
                .activity_log
                .push(format!("Bid received from user {}: {}", bidder.user_id, price));
            let event = AuctionEvent::new(
                self.id,
                AuctionEventKind::BidReceived {
                    bidder: bidder.user_id,
                    amount: amount.unwrap_or(price),
                },
            );
            for observer in &state.observers {
                observer.notify(&event);
            }
            auto_close
        };

        if auto_close {
            let proceeds = self.stop_and_settle(store)?;
            return Ok((AuctionStatus::Closed, Some(proceeds)));
        }

        Ok((AuctionStatus::Open, None))
    }

    /// Owner-initiated early close. Returns the total proceeds settlement
    /// credited to the owner, for the caller to pass on to
    /// `Registry::credit_if_online`.
    pub fn sell(
        self: &Arc<Self>,
        caller: UserId,
        store: &dyn Store,
    ) -> Result<Money, CommandFailed> {
        if caller != self.owner_id {
            return Err(CommandFailed::message(
                "Only the owner can end this auction early.",
            ));
        }
        {
            let mut state = self.inner.lock().unwrap();
            if state.status != AuctionStatus::Open {
                return Err(InvalidAuctionStatus(format!(
                    "cannot sell an auction in status {:?}",
                    state.status
                ))
                .into());
            }
            state.activity_log.push("Auction ended manually by owner.".to_string());
        }
        self.stop_and_settle(store)
    }

    /// One timer fire for decrement-style strategies. Acquires the lock
    /// fresh -- there is no reentrancy concern because nothing else holds
    /// a reference into the strategy across await points. The second
    /// element of the result is the settlement proceeds if this tick
    /// triggered auto-close (always `0` here, since a ticker auto-close
    /// only ever happens with no winner, but returned for uniformity with
    /// `bid`/`sell` so the caller's credit-forwarding code stays one shape).
    pub fn decrement_tick(
        self: &Arc<Self>,
        store: &dyn Store,
    ) -> Result<(Option<Duration>, Option<Money>), CommandFailed> {
        let outcome = {
            let mut state = self.inner.lock().unwrap();
            if state.status != AuctionStatus::Open {
                return Ok((None, None));
            }
            let outcome = state.strategy.on_tick();
            if let TickOutcome::PriceDecremented(price) = outcome {
                state
                    .activity_log
                    .push(format!("Price decremented to {}", price));
                let event =
                    AuctionEvent::new(self.id, AuctionEventKind::PriceDecremented { current_price: price });
                for observer in &state.observers {
                    observer.notify(&event);
                }
            }
            outcome
        };

        match outcome {
            TickOutcome::PriceDecremented(_) => {
                let tick = self.inner.lock().unwrap().strategy.ticker_config().map(|c| c.tick);
                Ok((tick, None))
            }
            TickOutcome::ReachedMinimum => {
                let proceeds = self.stop_and_settle(store)?;
                Ok((None, Some(proceeds)))
            }
            TickOutcome::NotApplicable => Ok((None, None)),
        }
    }

    /// Open -> Closed, plus settlement. Any store failure here is
    /// propagated without marking the auction closed, since the status
    /// flip happens only after settlement succeeds. Returns the total
    /// proceeds (winner's payment plus, for highest-contribution, every
    /// forfeited loser contribution) that land in the owner's ledger --
    /// the caller is responsible for reflecting that in the owner's
    /// online `SessionUser.cached_balance`, since `Auction` has no handle
    /// back into the `Registry`.
    fn stop_and_settle(self: &Arc<Self>, store: &dyn Store) -> Result<Money, CommandFailed> {
        let outcome = {
            let mut state = self.inner.lock().unwrap();
            if state.status != AuctionStatus::Open {
                return Ok(Money::ZERO);
            }
            state.strategy.on_stop()
        };

        let mut proceeds = Money::ZERO;

        if let Some((winner, amount)) = &outcome.winner {
            store.record_transaction(NewTransaction {
                amount: *amount,
                source: Some(winner.user_id),
                destination: self.owner_id,
                item: Some(self.item_id),
            })?;
            winner.credit(-*amount);
            proceeds += *amount;

            let new_ownership = store.create_ownership(winner.user_id, self.item_id)?;
            store.mark_ownership_sold(self.ownership_id)?;
            let _ = new_ownership;
        }

        for (bidder, amount) in &outcome.extra_transactions {
            store.record_transaction(NewTransaction {
                amount: *amount,
                source: Some(bidder.user_id),
                destination: self.owner_id,
                item: Some(self.item_id),
            })?;
            bidder.credit(-*amount);
            proceeds += *amount;
        }

        store.set_item_on_sale(self.item_id, false)?;

        let mut state = self.inner.lock().unwrap();
        state.status = AuctionStatus::Closed;
        let winner_id = outcome.winner.as_ref().map(|(b, _)| b.user_id);
        let amount = outcome.winner.as_ref().map(|(_, a)| *a);
        state.activity_log.push(match winner_id {
            Some(id) => format!("Auction stopped. Winner: user {} for {}", id, amount.unwrap()),
            None => "Auction stopped. No winner.".to_string(),
        });
        let event = AuctionEvent::new(self.id, AuctionEventKind::AuctionStopped { winner: winner_id, amount });
        for observer in &state.observers {
            observer.notify(&event);
        }

        info!(
            "auction {} closed, winner={:?}",
            self.id, winner_id
        );
        Ok(proceeds)
    }

    pub fn report(&self) -> serde_json::Value {
        let state = self.inner.lock().unwrap();
        serde_json::json!({
            "id": self.id,
            "item_id": self.item_id,
            "owner_id": self.owner_id,
            "status": state.status.as_str(),
            "strategy": self.strategy_identifier,
            "current_price": state.strategy.current_price().to_string(),
            "description": state.strategy.describe(),
        })
    }

    pub fn history(&self) -> Vec<String> {
        self.activity_log()
    }
}

/// Spawns the background Tokio task driving a decrement auction's ticker.
/// Holds only a `Weak` reference so the task exits quietly once the
/// auction is removed from the registry and nothing else references it.
/// Takes the `Registry` alongside the `Store` so that a tick which
/// auto-closes the auction (no-winner-at-minimum) can still forward any
/// settlement proceeds to the owner's online session the same way
/// `bid`/`sell` do from the dispatcher -- `Auction` itself never calls
/// into `Registry`.
pub fn spawn_ticker(
    auction: &Arc<Auction>,
    store: Arc<dyn Store>,
    registry: Arc<crate::registry::Registry>,
    first_tick: Duration,
) {
    let weak = Arc::downgrade(auction);
    tokio::spawn(async move {
        let mut delay = first_tick;
        loop {
            tokio::time::sleep(delay).await;
            let auction = match Weak::upgrade(&weak) {
                Some(a) => a,
                None => return,
            };
            match auction.decrement_tick(store.as_ref()) {
                Ok((Some(next), _)) => delay = next,
                Ok((None, proceeds)) => {
                    if let Some(proceeds) = proceeds {
                        registry.credit_if_online(auction.owner_id, proceeds);
                    }
                    return;
                }
                Err(err) => {
                    warn!("decrement tick failed for auction {}: {}", auction.id, err);
                    return;
                }
            }
        }
    });
}
