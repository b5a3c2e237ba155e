use std::sync::Arc;

use crate::errors::BiddingErrorReason;
use crate::errors::BiddingNotAllowed;
use crate::model::Money;
use crate::session_user::SessionUser;

use super::{BidError, BiddingStrategy, StopOutcome};

/// English (ascending-price) auction. Only the current high bidder ever
/// holds a reservation for this auction -- a superseding bid releases the
/// previous high bidder's hold before taking a new one, so at most one
/// reservation against this auction is ever live at a time.
pub struct IncrementBiddingStrategy {
    pub minimum_increment: Money,
    pub maximum_price: Option<Money>,
    pub highest_bid: Money,
    highest_bidder: Option<Arc<SessionUser>>,
    highest_reserved: Money,
}

impl IncrementBiddingStrategy {
    pub fn new(initial_price: Money, minimum_increment: Money, maximum_price: Option<Money>) -> Self {
        IncrementBiddingStrategy {
            minimum_increment,
            maximum_price,
            highest_bid: initial_price,
            highest_bidder: None,
            highest_reserved: Money::ZERO,
        }
    }
}

impl BiddingStrategy for IncrementBiddingStrategy {
    fn current_price(&self) -> Money {
        self.highest_bid + self.minimum_increment
    }

    fn current_winner(&self) -> Option<(Arc<SessionUser>, Money)> {
        self.highest_bidder
            .as_ref()
            .map(|b| (Arc::clone(b), self.highest_bid))
    }

    fn on_bid(
        &mut self,
        bidder: Arc<SessionUser>,
        amount: Option<Money>,
    ) -> Result<bool, BidError> {
        let amount = amount.unwrap_or_default();

        if amount < self.highest_bid || amount - self.highest_bid < self.minimum_increment {
            return Err(BidError::NotAllowed(BiddingNotAllowed::new(
                BiddingErrorReason::InsufficientAmount,
            )));
        }

        // Release the previous high bidder's hold -- not the incoming
        // bidder's own, which may never have held one -- before taking a
        // new reservation, so at most one reservation is ever live here.
        let previous = self.highest_bidder.take().map(|b| (b, self.highest_reserved));
        if let Some((previous_bidder, previous_amount)) = &previous {
            // Infallible: we only ever reserved what we are now releasing.
            previous_bidder.release(*previous_amount).expect("release previous high bidder's reservation");
        }

        if let Err(err) = bidder.reserve(amount) {
            // Compensate: restore the reservation we just released so a
            // rejected bid never leaves the previous high bidder worse off.
            if let Some((previous_bidder, previous_amount)) = previous {
                previous_bidder
                    .reserve(previous_amount)
                    .expect("restore compensating reservation");
                self.highest_bidder = Some(previous_bidder);
            }
            return Err(BidError::InsufficientBalance(err));
        }

        self.highest_reserved = amount;
        self.highest_bid = amount;
        self.highest_bidder = Some(bidder);

        let auto_close = self
            .maximum_price
            .map_or(false, |max| self.highest_bid >= max);
        Ok(auto_close)
    }

    fn on_stop(&mut self) -> StopOutcome {
        if let Some(bidder) = &self.highest_bidder {
            let _ = bidder.release(self.highest_reserved);
        }

        StopOutcome {
            winner: self.current_winner(),
            extra_transactions: Vec::new(),
        }
    }

    fn describe(&self) -> String {
        format!(
            "Maximum Price: {}.\nAuction will stop when this bid is reached.\n",
            self.maximum_price
                .map(|p| p.to_string())
                .unwrap_or_else(|| "None".to_string())
        )
    }

    fn name(&self) -> &'static str {
        "increment"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserId;
    use rust_decimal_macros::dec;

    fn bidder(id: UserId, balance: Money) -> Arc<SessionUser> {
        Arc::new(SessionUser::new(id, balance))
    }

    #[test]
    fn rejects_bid_below_minimum_increment() {
        let mut strategy = IncrementBiddingStrategy::new(dec!(10.00), dec!(1.00), None);
        let alice = bidder(1, dec!(100.00));
        let err = strategy.on_bid(alice, Some(dec!(10.50))).unwrap_err();
        assert!(matches!(err, BidError::NotAllowed(_)));
    }

    #[test]
    fn superseding_bid_releases_previous_high_bidder() {
        let mut strategy = IncrementBiddingStrategy::new(dec!(10.00), dec!(1.00), None);
        let alice = bidder(1, dec!(100.00));
        let bob = bidder(2, dec!(100.00));

        strategy.on_bid(Arc::clone(&alice), Some(dec!(11.00))).unwrap();
        assert_eq!(alice.reserved_balance(), dec!(11.00));

        strategy.on_bid(Arc::clone(&bob), Some(dec!(12.00))).unwrap();
        assert_eq!(alice.reserved_balance(), dec!(0.00));
        assert_eq!(bob.reserved_balance(), dec!(12.00));
        assert_eq!(strategy.current_winner().unwrap().1, dec!(12.00));
    }

    #[test]
    fn auto_closes_at_maximum_price() {
        let mut strategy = IncrementBiddingStrategy::new(dec!(10.00), dec!(1.00), Some(dec!(20.00)));
        let alice = bidder(1, dec!(100.00));
        let auto_close = strategy.on_bid(alice, Some(dec!(20.00))).unwrap();
        assert!(auto_close);
    }

    #[test]
    fn stop_releases_every_bidder_including_winner() {
        let mut strategy = IncrementBiddingStrategy::new(dec!(10.00), dec!(1.00), None);
        let alice = bidder(1, dec!(100.00));
        strategy.on_bid(Arc::clone(&alice), Some(dec!(15.00))).unwrap();

        let outcome = strategy.on_stop();
        assert_eq!(alice.reserved_balance(), dec!(0.00));
        assert_eq!(outcome.winner.unwrap().1, dec!(15.00));
    }
}
