use std::sync::Arc;
use std::time::Duration;

use crate::model::Money;
use crate::session_user::SessionUser;

use super::{BidError, BiddingStrategy, StopOutcome, TickOutcome, TickerConfig};

/// Dutch (descending-price) auction. A background ticker lowers the
/// price at a fixed interval; the first bidder to accept the current
/// price wins and the auction closes immediately. If the price reaches
/// `minimum_price` with no bidder, the auction auto-closes with no
/// winner.
pub struct DecrementBiddingStrategy {
    pub initial_price: Money,
    pub current_price: Money,
    pub minimum_price: Money,
    pub price_decrement_rate: Money,
    pub tick_ms: u64,
    winner: Option<(Arc<SessionUser>, Money)>,
}

impl DecrementBiddingStrategy {
    pub fn new(
        initial_price: Money,
        minimum_price: Money,
        price_decrement_rate: Money,
        tick_ms: u64,
    ) -> Self {
        DecrementBiddingStrategy {
            initial_price,
            current_price: initial_price,
            minimum_price,
            price_decrement_rate,
            tick_ms,
            winner: None,
        }
    }
}

impl BiddingStrategy for DecrementBiddingStrategy {
    fn current_price(&self) -> Money {
        self.current_price
    }

    fn current_winner(&self) -> Option<(Arc<SessionUser>, Money)> {
        self.winner.as_ref().map(|(b, a)| (Arc::clone(b), *a))
    }

    fn ticker_config(&self) -> Option<TickerConfig> {
        Some(TickerConfig {
            tick: Duration::from_millis(self.tick_ms),
        })
    }

    fn on_tick(&mut self) -> TickOutcome {
        if self.current_price > self.minimum_price {
            self.current_price = (self.current_price - self.price_decrement_rate)
                .max(self.minimum_price);
            TickOutcome::PriceDecremented(self.current_price)
        } else {
            TickOutcome::ReachedMinimum
        }
    }

    fn on_bid(
        &mut self,
        bidder: Arc<SessionUser>,
        _amount: Option<Money>,
    ) -> Result<bool, BidError> {
        let price = self.current_price;
        bidder.reserve(price)?;
        self.winner = Some((bidder, price));
        Ok(true)
    }

    fn on_stop(&mut self) -> StopOutcome {
        if let Some((bidder, amount)) = &self.winner {
            let _ = bidder.release(*amount);
        }

        StopOutcome {
            winner: self.winner.clone(),
            extra_transactions: Vec::new(),
        }
    }

    fn describe(&self) -> String {
        format!(
            "Minimum Price: {}.\nAuction will stop when this bid is reached.\nThe first bidder to buy wins.\n",
            self.minimum_price
        )
    }

    fn name(&self) -> &'static str {
        "decrement"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn tick_lowers_price_and_clamps_to_minimum() {
        let mut strategy = DecrementBiddingStrategy::new(dec!(100.00), dec!(90.00), dec!(7.00), 1000);

        match strategy.on_tick() {
            TickOutcome::PriceDecremented(p) => assert_eq!(p, dec!(93.00)),
            other => panic!("expected a decrement, got {:?}", std::mem::discriminant(&other)),
        }

        // Next tick would go to 86.00, but must clamp to the 90.00 floor.
        match strategy.on_tick() {
            TickOutcome::PriceDecremented(p) => assert_eq!(p, dec!(90.00)),
            other => panic!("expected a decrement, got {:?}", std::mem::discriminant(&other)),
        }

        assert!(matches!(strategy.on_tick(), TickOutcome::ReachedMinimum));
    }

    #[test]
    fn reaches_minimum_with_no_bids() {
        let mut strategy = DecrementBiddingStrategy::new(dec!(100.00), dec!(95.00), dec!(10.00), 1000);
        match strategy.on_tick() {
            TickOutcome::PriceDecremented(p) => assert_eq!(p, dec!(95.00)),
            other => panic!("expected a decrement, got {:?}", std::mem::discriminant(&other)),
        }
        assert!(matches!(strategy.on_tick(), TickOutcome::ReachedMinimum));
        let outcome = strategy.on_stop();
        assert!(outcome.winner.is_none());
    }

    #[test]
    fn first_bidder_wins_at_current_price() {
        let mut strategy = DecrementBiddingStrategy::new(dec!(100.00), dec!(50.00), dec!(5.00), 1000);
        strategy.on_tick();
        let price_after_tick = strategy.current_price();

        let bidder = Arc::new(SessionUser::new(1, dec!(100.00)));
        let auto_close = strategy.on_bid(Arc::clone(&bidder), None).unwrap();
        assert!(auto_close);
        assert_eq!(bidder.reserved_balance(), price_after_tick);

        let outcome = strategy.on_stop();
        assert_eq!(outcome.winner.unwrap().1, price_after_tick);
        assert_eq!(bidder.reserved_balance(), dec!(0.00));
    }
}
