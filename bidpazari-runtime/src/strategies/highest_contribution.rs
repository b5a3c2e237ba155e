use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::BiddingErrorReason;
use crate::errors::BiddingNotAllowed;
use crate::model::{Money, UserId};
use crate::session_user::SessionUser;

use super::{BidError, BiddingStrategy, StopOutcome};

/// Sealed-pool auction. Every bid is a non-refundable contribution toward
/// the item; the bidder whose contributions sum highest wins, and every
/// other bidder's contributions are forfeit to the owner rather than
/// released back to them.
pub struct HighestContributionBiddingStrategy {
    pub minimum_bid_amount: Money,
    pub maximum_price: Money,
    current_price: Money,
    bid_log: Vec<(Arc<SessionUser>, Money)>,
    totals: HashMap<UserId, Money>,
    bidders: HashMap<UserId, Arc<SessionUser>>,
}

impl HighestContributionBiddingStrategy {
    pub fn new(minimum_bid_amount: Money, maximum_price: Money) -> Self {
        HighestContributionBiddingStrategy {
            minimum_bid_amount,
            maximum_price,
            current_price: Money::ZERO,
            bid_log: Vec::new(),
            totals: HashMap::new(),
            bidders: HashMap::new(),
        }
    }

    /// Highest total contribution, ties broken by whoever reached that
    /// total first.
    fn leader(&self) -> Option<UserId> {
        let mut best: Option<(UserId, Money)> = None;
        for (bidder, _) in &self.bid_log {
            let total = self.totals[&bidder.user_id];
            match &best {
                Some((_, best_total)) if *best_total >= total => {}
                _ => best = Some((bidder.user_id, total)),
            }
        }
        best.map(|(id, _)| id)
    }
}

impl BiddingStrategy for HighestContributionBiddingStrategy {
    fn current_price(&self) -> Money {
        self.current_price
    }

    fn current_winner(&self) -> Option<(Arc<SessionUser>, Money)> {
        let leader_id = self.leader()?;
        let bidder = self.bidders.get(&leader_id)?;
        let total = self.totals[&leader_id];
        Some((Arc::clone(bidder), total))
    }

    fn on_bid(
        &mut self,
        bidder: Arc<SessionUser>,
        amount: Option<Money>,
    ) -> Result<bool, BidError> {
        let amount = amount.unwrap_or_default();

        if amount < self.minimum_bid_amount {
            return Err(BidError::NotAllowed(BiddingNotAllowed::new(
                BiddingErrorReason::InsufficientAmount,
            )));
        }

        bidder.reserve(amount)?;

        let total = self
            .totals
            .entry(bidder.user_id)
            .and_modify(|t| *t += amount)
            .or_insert(amount);
        let total = *total;
        self.bidders.insert(bidder.user_id, Arc::clone(&bidder));
        self.bid_log.push((bidder, amount));
        self.current_price += amount;

        let auto_close = total >= self.maximum_price;
        Ok(auto_close)
    }

    fn on_stop(&mut self) -> StopOutcome {
        let leader_id = self.leader();

        let mut extra_transactions = Vec::new();
        for (user_id, bidder) in &self.bidders {
            let total = self.totals[user_id];
            let _ = bidder.release(total);
            if Some(*user_id) != leader_id {
                extra_transactions.push((Arc::clone(bidder), total));
            }
        }

        let winner = leader_id.and_then(|id| {
            self.bidders
                .get(&id)
                .map(|bidder| (Arc::clone(bidder), self.totals[&id]))
        });

        StopOutcome {
            winner,
            extra_transactions,
        }
    }

    fn describe(&self) -> String {
        format!(
            "Minimum Bid Amount: {}.\nMaximum Price: {}.\nAuction will stop when this total is reached by a single bidder.\nHighest cumulative bidder wins; other bids are forfeit.\n",
            self.minimum_bid_amount, self.maximum_price
        )
    }

    fn name(&self) -> &'static str {
        "highest_contribution"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_bid_below_minimum() {
        let mut strategy = HighestContributionBiddingStrategy::new(dec!(5.00), dec!(100.00));
        let alice = Arc::new(SessionUser::new(1, dec!(100.00)));
        let err = strategy.on_bid(alice, Some(dec!(4.00))).unwrap_err();
        assert!(matches!(err, BidError::NotAllowed(_)));
    }

    #[test]
    fn highest_cumulative_contributor_wins_ties_broken_by_order() {
        let mut strategy = HighestContributionBiddingStrategy::new(dec!(5.00), dec!(1000.00));
        let alice = Arc::new(SessionUser::new(1, dec!(100.00)));
        let bob = Arc::new(SessionUser::new(2, dec!(100.00)));

        strategy.on_bid(Arc::clone(&alice), Some(dec!(10.00))).unwrap();
        strategy.on_bid(Arc::clone(&bob), Some(dec!(10.00))).unwrap();
        strategy.on_bid(Arc::clone(&alice), Some(dec!(5.00))).unwrap();

        // Alice reached 15.00 first; Bob is still at 10.00.
        let (winner, total) = strategy.current_winner().unwrap();
        assert_eq!(winner.user_id, 1);
        assert_eq!(total, dec!(15.00));
    }

    #[test]
    fn losers_forfeit_contributions_as_extra_transactions() {
        let mut strategy = HighestContributionBiddingStrategy::new(dec!(5.00), dec!(1000.00));
        let alice = Arc::new(SessionUser::new(1, dec!(100.00)));
        let bob = Arc::new(SessionUser::new(2, dec!(100.00)));

        strategy.on_bid(Arc::clone(&alice), Some(dec!(20.00))).unwrap();
        strategy.on_bid(Arc::clone(&bob), Some(dec!(10.00))).unwrap();

        let outcome = strategy.on_stop();
        assert_eq!(outcome.winner.unwrap().0.user_id, 1);
        assert_eq!(outcome.extra_transactions.len(), 1);
        assert_eq!(outcome.extra_transactions[0].0.user_id, 2);
        assert_eq!(outcome.extra_transactions[0].1, dec!(10.00));
        assert_eq!(alice.reserved_balance(), dec!(0.00));
        assert_eq!(bob.reserved_balance(), dec!(0.00));
    }

    #[test]
    fn auto_closes_once_a_single_bidder_reaches_maximum() {
        let mut strategy = HighestContributionBiddingStrategy::new(dec!(5.00), dec!(20.00));
        let alice = Arc::new(SessionUser::new(1, dec!(100.00)));
        strategy.on_bid(Arc::clone(&alice), Some(dec!(10.00))).unwrap();
        let auto_close = strategy.on_bid(alice, Some(dec!(10.00))).unwrap();
        assert!(auto_close);
    }
}
