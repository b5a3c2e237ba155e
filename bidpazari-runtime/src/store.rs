use std::sync::Mutex;

use rust_decimal::Decimal;

use crate::errors::StoreError;
use crate::model::{
    Item, ItemId, NewItem, NewTransaction, NewUser, Ownership, OwnershipId, Transaction, User,
    UserId,
};

/// Persistence collaborator. The runtime only depends on this trait, never
/// on a concrete database. `InMemoryStore` is the one implementation
/// shipped; swapping in a Postgres-backed store built on `tokio-postgres`
/// requires no change anywhere else in the runtime.
pub trait Store: Send + Sync {
    fn create_user(&self, new_user: NewUser) -> Result<User, StoreError>;
    fn find_user_by_id(&self, user_id: UserId) -> Result<User, StoreError>;
    fn find_user_by_username(&self, username: &str) -> Result<User, StoreError>;
    fn find_user_by_email(&self, email: &str) -> Result<User, StoreError>;
    fn save_user(&self, user: &User) -> Result<(), StoreError>;

    fn create_item(&self, new_item: NewItem) -> Result<Item, StoreError>;
    fn find_item_by_id(&self, item_id: ItemId) -> Result<Item, StoreError>;
    fn set_item_on_sale(&self, item_id: ItemId, on_sale: bool) -> Result<(), StoreError>;
    fn list_items_for_user(
        &self,
        user_id: UserId,
        item_type: Option<&str>,
        on_sale: Option<bool>,
    ) -> Result<Vec<Item>, StoreError>;

    fn create_ownership(&self, user_id: UserId, item_id: ItemId) -> Result<Ownership, StoreError>;
    fn mark_ownership_sold(&self, ownership_id: OwnershipId) -> Result<(), StoreError>;
    fn find_unsold_ownership_by_item(
        &self,
        item_id: ItemId,
    ) -> Result<Option<Ownership>, StoreError>;
    fn find_ownership_by_id(&self, ownership_id: OwnershipId) -> Result<Ownership, StoreError>;

    fn record_transaction(&self, new_txn: NewTransaction) -> Result<Transaction, StoreError>;
    fn balance_of(&self, user_id: UserId) -> Result<Decimal, StoreError>;
    fn transaction_history(&self, user_id: UserId) -> Result<Vec<Transaction>, StoreError>;
}

#[derive(Default)]
struct InMemoryStoreState {
    users: Vec<User>,
    items: Vec<Item>,
    ownerships: Vec<Ownership>,
    transactions: Vec<Transaction>,
    next_user_id: UserId,
    next_item_id: ItemId,
    next_ownership_id: OwnershipId,
    next_transaction_id: u64,
}

/// The only `Store` implementation this build ships. A single mutex
/// suffices given expected load, the same discipline `Registry` applies.
pub struct InMemoryStore {
    state: Mutex<InMemoryStoreState>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            state: Mutex::new(InMemoryStoreState {
                next_user_id: 1,
                next_item_id: 1,
                next_ownership_id: 1,
                next_transaction_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Convenience for seeding fixtures and tests: creates a user, an
    /// owned item, and the (unsold) ownership linking them in one call.
    pub fn seed_owned_item(
        &self,
        owner_id: UserId,
        title: &str,
        description: &str,
        item_type: &str,
    ) -> (Item, Ownership) {
        let item = self
            .create_item(NewItem {
                title: title.to_string(),
                description: description.to_string(),
                item_type: item_type.to_string(),
                image: None,
            })
            .expect("seed item");
        let ownership = self
            .create_ownership(owner_id, item.id)
            .expect("seed ownership");
        (item, ownership)
    }
}

impl Store for InMemoryStore {
    fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_user_id;
        state.next_user_id += 1;

        let user = User {
            id,
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            verification_status: crate::model::UserVerificationStatus::Unverified,
            verification_code: new_user.verification_code,
            created_at: chrono::Utc::now(),
        };
        state.users.push(user.clone());
        Ok(user)
    }

    fn find_user_by_id(&self, user_id: UserId) -> Result<User, StoreError> {
        let state = self.state.lock().unwrap();
        state
            .users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or_else(|| StoreError::UserNotFound(user_id.to_string()))
    }

    fn find_user_by_username(&self, username: &str) -> Result<User, StoreError> {
        let state = self.state.lock().unwrap();
        state
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned()
            .ok_or_else(|| StoreError::UserNotFound(username.to_string()))
    }

    fn find_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let state = self.state.lock().unwrap();
        state
            .users
            .iter()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| StoreError::UserNotFound(email.to_string()))
    }

    fn save_user(&self, user: &User) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let slot = state
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| StoreError::UserNotFound(user.id.to_string()))?;
        *slot = user.clone();
        Ok(())
    }

    fn create_item(&self, new_item: NewItem) -> Result<Item, StoreError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_item_id;
        state.next_item_id += 1;

        let item = Item {
            id,
            title: new_item.title,
            description: new_item.description,
            item_type: new_item.item_type,
            on_sale: false,
            image: new_item.image,
        };
        state.items.push(item.clone());
        Ok(item)
    }

    fn find_item_by_id(&self, item_id: ItemId) -> Result<Item, StoreError> {
        let state = self.state.lock().unwrap();
        state
            .items
            .iter()
            .find(|i| i.id == item_id)
            .cloned()
            .ok_or_else(|| StoreError::ItemNotFound(item_id.to_string()))
    }

    fn set_item_on_sale(&self, item_id: ItemId, on_sale: bool) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let item = state
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| StoreError::ItemNotFound(item_id.to_string()))?;
        item.on_sale = on_sale;
        Ok(())
    }

    fn list_items_for_user(
        &self,
        user_id: UserId,
        item_type: Option<&str>,
        on_sale: Option<bool>,
    ) -> Result<Vec<Item>, StoreError> {
        let state = self.state.lock().unwrap();
        let owned_item_ids: Vec<ItemId> = state
            .ownerships
            .iter()
            .filter(|o| o.user_id == user_id)
            .map(|o| o.item_id)
            .collect();

        let items = state
            .items
            .iter()
            .filter(|item| owned_item_ids.contains(&item.id))
            .filter(|item| item_type.map_or(true, |t| item.item_type == t))
            .filter(|item| on_sale.map_or(true, |flag| item.on_sale == flag))
            .cloned()
            .collect();
        Ok(items)
    }

    fn create_ownership(&self, user_id: UserId, item_id: ItemId) -> Result<Ownership, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state
            .ownerships
            .iter()
            .any(|o| o.item_id == item_id && !o.sold)
        {
            panic!(
                "programming error: item {} already has an unsold ownership",
                item_id
            );
        }

        let id = state.next_ownership_id;
        state.next_ownership_id += 1;
        let ownership = Ownership {
            id,
            user_id,
            item_id,
            sold: false,
        };
        state.ownerships.push(ownership.clone());
        Ok(ownership)
    }

    fn mark_ownership_sold(&self, ownership_id: OwnershipId) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let ownership = state
            .ownerships
            .iter_mut()
            .find(|o| o.id == ownership_id)
            .ok_or_else(|| StoreError::OwnershipNotFound(ownership_id.to_string()))?;
        ownership.sold = true;
        Ok(())
    }

    fn find_unsold_ownership_by_item(
        &self,
        item_id: ItemId,
    ) -> Result<Option<Ownership>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .ownerships
            .iter()
            .find(|o| o.item_id == item_id && !o.sold)
            .cloned())
    }

    fn find_ownership_by_id(&self, ownership_id: OwnershipId) -> Result<Ownership, StoreError> {
        let state = self.state.lock().unwrap();
        state
            .ownerships
            .iter()
            .find(|o| o.id == ownership_id)
            .cloned()
            .ok_or_else(|| StoreError::OwnershipNotFound(ownership_id.to_string()))
    }

    fn record_transaction(&self, new_txn: NewTransaction) -> Result<Transaction, StoreError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_transaction_id;
        state.next_transaction_id += 1;

        let txn = Transaction {
            id,
            amount: new_txn.amount,
            source: new_txn.source,
            destination: new_txn.destination,
            item: new_txn.item,
            created_at: chrono::Utc::now(),
        };
        state.transactions.push(txn.clone());
        Ok(txn)
    }

    fn balance_of(&self, user_id: UserId) -> Result<Decimal, StoreError> {
        let state = self.state.lock().unwrap();
        let balance = state
            .transactions
            .iter()
            .filter(|t| t.destination == user_id || t.source == Some(user_id))
            .fold(Decimal::ZERO, |acc, t| {
                if t.destination == user_id {
                    acc + t.amount
                } else {
                    acc - t.amount
                }
            });
        Ok(balance)
    }

    fn transaction_history(&self, user_id: UserId) -> Result<Vec<Transaction>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.destination == user_id || t.source == Some(user_id))
            .cloned()
            .collect())
    }
}
