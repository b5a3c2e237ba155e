use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;

use crate::errors::InsufficientBalance;
use crate::events::AuctionObserver;
use crate::model::{Money, NewTransaction, User, UserId};
use crate::store::Store;

/// In-memory mirror of a persisted user: cached balance, the portion of
/// that balance currently held against open bids, and (once logged in
/// over a transport) a connection handle for server-initiated pushes.
///
/// Invariant: `cached_balance >= reserved_balance >= 0` at every
/// externally observable point. All three mutators below are serialised
/// through a single mutex.
pub struct SessionUser {
    pub user_id: UserId,
    inner: Mutex<SessionUserState>,
}

struct SessionUserState {
    cached_balance: Money,
    reserved_balance: Money,
    connection: Option<Arc<dyn AuctionObserver>>,
}

impl SessionUser {
    pub fn new(user_id: UserId, cached_balance: Money) -> Self {
        SessionUser {
            user_id,
            inner: Mutex::new(SessionUserState {
                cached_balance,
                reserved_balance: Decimal::ZERO,
                connection: None,
            }),
        }
    }

    pub fn cached_balance(&self) -> Money {
        self.inner.lock().unwrap().cached_balance
    }

    pub fn reserved_balance(&self) -> Money {
        self.inner.lock().unwrap().reserved_balance
    }

    pub fn reservable_balance(&self) -> Money {
        let state = self.inner.lock().unwrap();
        state.cached_balance - state.reserved_balance
    }

    pub fn set_connection(&self, connection: Option<Arc<dyn AuctionObserver>>) {
        self.inner.lock().unwrap().connection = connection;
    }

    pub fn connection(&self) -> Option<Arc<dyn AuctionObserver>> {
        self.inner.lock().unwrap().connection.clone()
    }

    /// Holds `amount` against the reservable balance. Fails without any
    /// side effect if the amount exceeds what is currently reservable.
    pub fn reserve(&self, amount: Money) -> Result<(), InsufficientBalance> {
        let mut state = self.inner.lock().unwrap();
        if amount > state.cached_balance - state.reserved_balance {
            return Err(InsufficientBalance(
                "Amount is higher than reservable balance.".to_string(),
            ));
        }
        state.reserved_balance += amount;
        Ok(())
    }

    /// Returns `amount` from the reservation back to free balance.
    pub fn release(&self, amount: Money) -> Result<(), InsufficientBalance> {
        let mut state = self.inner.lock().unwrap();
        if amount > state.reserved_balance {
            return Err(InsufficientBalance(
                "Amount is higher than reserved balance.".to_string(),
            ));
        }
        state.reserved_balance -= amount;
        Ok(())
    }

    pub fn release_all(&self) {
        self.inner.lock().unwrap().reserved_balance = Decimal::ZERO;
    }

    /// Applies a balance delta that has already been persisted as a
    /// transaction -- used by settlement and by the "fire and forget"
    /// credit path when a transaction lands for an online user.
    pub fn credit(&self, delta: Money) {
        self.inner.lock().unwrap().cached_balance += delta;
    }

    /// Records a deposit/withdrawal transaction through the store and
    /// updates the cached balance to match.
    pub fn add_balance_transaction(
        &self,
        store: &dyn Store,
        amount: Money,
    ) -> Result<Money, crate::errors::StoreError> {
        store.record_transaction(NewTransaction {
            amount,
            source: None,
            destination: self.user_id,
            item: None,
        })?;
        self.credit(amount);
        Ok(self.cached_balance())
    }
}

/// Loads the cached balance for a user fresh from the store -- used when
/// a `SessionUser` is first created for a newly connected user.
pub fn initial_balance(store: &dyn Store, user: &User) -> Money {
    store.balance_of(user.id).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn reserve_fails_past_reservable_balance() {
        let user = SessionUser::new(1, dec!(50.00));
        assert!(user.reserve(dec!(50.00)).is_ok());
        assert_eq!(user.reservable_balance(), dec!(0.00));
        assert!(user.reserve(dec!(0.01)).is_err());
    }

    #[test]
    fn release_cannot_exceed_reserved() {
        let user = SessionUser::new(1, dec!(50.00));
        user.reserve(dec!(20.00)).unwrap();
        assert!(user.release(dec!(20.01)).is_err());
        assert!(user.release(dec!(20.00)).is_ok());
        assert_eq!(user.reserved_balance(), dec!(0.00));
    }

    #[test]
    fn release_all_clears_reservation_regardless_of_amount() {
        let user = SessionUser::new(1, dec!(50.00));
        user.reserve(dec!(30.00)).unwrap();
        user.release_all();
        assert_eq!(user.reserved_balance(), dec!(0.00));
        assert_eq!(user.reservable_balance(), dec!(50.00));
    }

    #[test]
    fn credit_increases_cached_balance_without_touching_reservation() {
        let user = SessionUser::new(1, dec!(50.00));
        user.reserve(dec!(10.00)).unwrap();
        user.credit(dec!(25.00));
        assert_eq!(user.cached_balance(), dec!(75.00));
        assert_eq!(user.reserved_balance(), dec!(10.00));
    }
}
