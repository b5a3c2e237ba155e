use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::auction::Auction;
use crate::errors::{AuctionDoesNotExist, ItemAlreadyOnSale};
use crate::events::ItemWatcher;
use crate::model::{ItemId, Money, OwnershipId, User, UserId};
use crate::session_user::{self, SessionUser};
use crate::store::Store;

/// Process-wide runtime state: every in-flight auction, every currently
/// connected user's session, and everyone watching for new listings.
///
/// A single mutex, per the same "expected load is low enough that one
/// lock suffices" judgment applied to `SessionUser` -- the registry is
/// touched on connect/disconnect/auction-lifecycle edges, never on the
/// hot per-bid path once a `SessionUser`/`Auction` `Arc` has been handed
/// out. Callers must never call into an `Auction` or `SessionUser` while
/// holding this lock: Registry -> Auction -> SessionUser is the only
/// permitted acquisition order.
#[derive(Default)]
struct RegistryState {
    auctions: HashMap<OwnershipId, Arc<Auction>>,
    online_users: HashMap<UserId, Arc<SessionUser>>,
    item_watchers: Vec<Arc<dyn ItemWatcher>>,
}

pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub fn get_or_create_session_user(&self, store: &dyn Store, user: &User) -> Arc<SessionUser> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.online_users.get(&user.id) {
            return Arc::clone(existing);
        }
        let balance = session_user::initial_balance(store, user);
        let session = Arc::new(SessionUser::new(user.id, balance));
        state.online_users.insert(user.id, Arc::clone(&session));
        session
    }

    pub fn session_user(&self, user_id: UserId) -> Option<Arc<SessionUser>> {
        self.state.lock().unwrap().online_users.get(&user_id).cloned()
    }

    pub fn disconnect(&self, user_id: UserId) {
        if let Some(session) = self.state.lock().unwrap().online_users.remove(&user_id) {
            session.set_connection(None);
        }
    }

    pub fn online_user_count(&self) -> usize {
        self.state.lock().unwrap().online_users.len()
    }

    /// Refreshes a connected user's cached balance whenever a transaction
    /// naming them lands, regardless of who initiated it.
    pub fn credit_if_online(&self, user_id: UserId, delta: Money) {
        if let Some(session) = self.state.lock().unwrap().online_users.get(&user_id) {
            session.credit(delta);
        }
    }

    pub fn create_auction(
        &self,
        ownership_id: OwnershipId,
        owner_id: UserId,
        item_id: ItemId,
        strategy: Box<dyn crate::strategies::BiddingStrategy>,
    ) -> Result<Arc<Auction>, ItemAlreadyOnSale> {
        let mut state = self.state.lock().unwrap();
        if state.auctions.values().any(|a| a.item_id == item_id) {
            return Err(ItemAlreadyOnSale);
        }
        let auction = Auction::new(ownership_id, owner_id, item_id, strategy);
        state.auctions.insert(ownership_id, Arc::clone(&auction));
        Ok(auction)
    }

    /// Looks up a still-open auction. An auction that has settled is
    /// lazily evicted here rather than reaching back into the registry
    /// from inside `Auction::stop_and_settle` -- that would mean calling
    /// into a `Auction` while holding the registry lock, which the
    /// locking discipline forbids. The two-step lock/check/lock shape
    /// below never holds both locks at once.
    pub fn get_auction(&self, auction_id: OwnershipId) -> Result<Arc<Auction>, AuctionDoesNotExist> {
        let auction = self.state.lock().unwrap().auctions.get(&auction_id).cloned();
        let auction = auction.ok_or_else(|| AuctionDoesNotExist(auction_id.to_string()))?;

        if auction.status() == crate::auction::AuctionStatus::Closed {
            self.state.lock().unwrap().auctions.remove(&auction_id);
            return Err(AuctionDoesNotExist(auction_id.to_string()));
        }

        Ok(auction)
    }

    pub fn remove_auction(&self, auction_id: OwnershipId) {
        self.state.lock().unwrap().auctions.remove(&auction_id);
    }

    pub fn active_auction_count(&self) -> usize {
        self.state.lock().unwrap().auctions.len()
    }

    /// Snapshot of open-auction counts grouped by strategy identifier, for
    /// the server's metrics exporter. Closed auctions still awaiting lazy
    /// eviction are excluded. The `Arc`s are cloned out and the registry
    /// lock released before any `Auction::status()` call, per the
    /// Registry-never-held-while-calling-into-Auction discipline.
    pub fn strategy_counts(&self) -> HashMap<&'static str, usize> {
        let auctions: Vec<Arc<Auction>> =
            self.state.lock().unwrap().auctions.values().cloned().collect();

        let mut counts: HashMap<&'static str, usize> = HashMap::new();
        for auction in auctions {
            if auction.status() != crate::auction::AuctionStatus::Closed {
                *counts.entry(auction.strategy_identifier).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn register_item_watcher(&self, watcher: Arc<dyn ItemWatcher>) {
        self.state.lock().unwrap().item_watchers.push(watcher);
    }

    pub fn notify_item_watchers(&self, item_id: ItemId, item_type: &str, initial_price: Money) {
        let watchers = self.state.lock().unwrap().item_watchers.clone();
        for watcher in watchers {
            if watcher.item_type_filter().map_or(true, |f| f == item_type) {
                watcher.notify(item_id, item_type, initial_price);
            }
        }
    }
}
