use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fixed-point money. All arithmetic in this crate goes through
/// `rust_decimal::Decimal`; values are expected to carry at most two
/// fractional digits by the time they reach the runtime -- the dispatcher
/// boundary is responsible for rejecting anything coarser or finer.
pub type Money = Decimal;

pub type UserId = u64;
pub type ItemId = u64;
pub type OwnershipId = u64;
pub type TransactionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserVerificationStatus {
    Unverified,
    Verified,
}

/// A persisted identity. Balance is never a field here -- it is always
/// derived from the transaction ledger via `Store::balance_of`.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub verification_status: UserVerificationStatus,
    pub verification_code: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub verification_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    pub description: String,
    pub item_type: String,
    pub on_sale: bool,
    pub image: Option<String>,
}

pub struct NewItem {
    pub title: String,
    pub description: String,
    pub item_type: String,
    pub image: Option<String>,
}

/// Links a user to an item. An item has at most one unsold ownership at
/// any time -- creating a second one for the same item is a programming
/// error the store is entitled to panic on (see `InMemoryStore`).
#[derive(Debug, Clone)]
pub struct Ownership {
    pub id: OwnershipId,
    pub user_id: UserId,
    pub item_id: ItemId,
    pub sold: bool,
}

/// An immutable ledger entry. `source` null means a deposit/withdrawal;
/// `item` null means a pure balance adjustment.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub amount: Money,
    pub source: Option<UserId>,
    pub destination: UserId,
    pub item: Option<ItemId>,
    pub created_at: DateTime<Utc>,
}

pub struct NewTransaction {
    pub amount: Money,
    pub source: Option<UserId>,
    pub destination: UserId,
    pub item: Option<ItemId>,
}
