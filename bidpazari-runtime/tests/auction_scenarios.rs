//! End-to-end scenarios exercising `Registry` + `Auction` + the command
//! dispatcher together, without a real socket.

use std::sync::Arc;

use bidpazari_runtime::dispatcher::{dispatch, SessionContext};
use bidpazari_runtime::errors::CommandFailed;
use bidpazari_runtime::runtime::Runtime;
use bidpazari_runtime::store::Store;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

async fn create_user(runtime: &Runtime, ctx: &SessionContext, username: &str) -> u64 {
    let result = dispatch(
        runtime,
        ctx,
        "create_user",
        json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "hunter2",
            "first_name": "Test",
            "last_name": username,
        }),
    )
    .await
    .expect("create_user should succeed");
    result["id"].as_u64().unwrap()
}

fn expect_err(result: Result<Value, CommandFailed>) -> CommandFailed {
    match result {
        Ok(v) => panic!("expected an error, got {:?}", v),
        Err(e) => e,
    }
}

#[tokio::test]
async fn increment_auction_happy_path() {
    let runtime = Runtime::default();
    let owner_ctx = SessionContext::new();
    let owner_id = create_user(&runtime, &owner_ctx, "owner").await;

    let bidder_ctx = SessionContext::new();
    let bidder_id = create_user(&runtime, &bidder_ctx, "bidder").await;

    let (item, _ownership) = runtime
        .store
        .create_item(bidpazari_runtime::model::NewItem {
            title: "Vintage Chair".to_string(),
            description: "A chair.".to_string(),
            item_type: "furniture".to_string(),
            image: None,
        })
        .map(|item| {
            let ownership = runtime.store.create_ownership(owner_id, item.id).unwrap();
            (item, ownership)
        })
        .unwrap();

    let created = dispatch(
        &runtime,
        &owner_ctx,
        "create_auction",
        json!({
            "item_id": item.id,
            "strategy": "increment",
            "initial_price": 10.0,
            "minimum_increment": 1.0,
        }),
    )
    .await
    .unwrap();
    let auction_id = created["auction_id"].as_u64().unwrap();

    dispatch(&runtime, &owner_ctx, "start_auction", json!({ "auction_id": auction_id }))
        .await
        .unwrap();

    dispatch(&runtime, &bidder_ctx, "add_balance", json!({ "amount": 100.0 }))
        .await
        .unwrap();

    let bid_result = dispatch(
        &runtime,
        &bidder_ctx,
        "bid",
        json!({ "auction_id": auction_id, "amount": 15.0 }),
    )
    .await
    .unwrap();
    assert_eq!(bid_result["status"], "open");

    dispatch(&runtime, &owner_ctx, "sell", json!({ "auction_id": auction_id }))
        .await
        .unwrap();

    let items = runtime
        .store
        .list_items_for_user(bidder_id, None, None)
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, item.id);

    let owner_history = runtime
        .store
        .transaction_history(owner_id)
        .unwrap();
    assert_eq!(owner_history.len(), 1);
    assert_eq!(owner_history[0].amount, dec!(15.00));
    assert_eq!(owner_history[0].source, Some(bidder_id));
}

#[tokio::test]
async fn increment_auction_rejections() {
    let runtime = Runtime::default();
    let owner_ctx = SessionContext::new();
    let owner_id = create_user(&runtime, &owner_ctx, "owner2").await;
    let bidder_ctx = SessionContext::new();
    let _bidder_id = create_user(&runtime, &bidder_ctx, "bidder2").await;

    let item = runtime
        .store
        .create_item(bidpazari_runtime::model::NewItem {
            title: "Lamp".to_string(),
            description: "A lamp.".to_string(),
            item_type: "furniture".to_string(),
            image: None,
        })
        .unwrap();
    runtime.store.create_ownership(owner_id, item.id).unwrap();

    let created = dispatch(
        &runtime,
        &owner_ctx,
        "create_auction",
        json!({ "item_id": item.id, "strategy": "increment", "initial_price": 10.0, "minimum_increment": 1.0 }),
    )
    .await
    .unwrap();
    let auction_id = created["auction_id"].as_u64().unwrap();
    dispatch(&runtime, &owner_ctx, "start_auction", json!({ "auction_id": auction_id }))
        .await
        .unwrap();

    // Owner cannot bid in their own auction.
    let err = expect_err(
        dispatch(&runtime, &owner_ctx, "bid", json!({ "auction_id": auction_id, "amount": 20.0 })).await,
    );
    assert!(matches!(err, CommandFailed::BiddingNotAllowed(_)));

    // Bid below the minimum increment over the opening price is rejected.
    let err = expect_err(
        dispatch(&runtime, &bidder_ctx, "bid", json!({ "auction_id": auction_id, "amount": 10.5 })).await,
    );
    assert!(matches!(err, CommandFailed::BiddingNotAllowed(_)));

    // Bidding without enough reservable balance is rejected.
    let err = expect_err(
        dispatch(&runtime, &bidder_ctx, "bid", json!({ "auction_id": auction_id, "amount": 999.0 })).await,
    );
    assert!(matches!(err, CommandFailed::InsufficientBalance(_)));

    dispatch(&runtime, &owner_ctx, "sell", json!({ "auction_id": auction_id }))
        .await
        .unwrap();

    // Bidding on a closed auction raises AuctionDoesNotExist (lazily evicted).
    let err = expect_err(
        dispatch(&runtime, &bidder_ctx, "bid", json!({ "auction_id": auction_id, "amount": 50.0 })).await,
    );
    assert!(matches!(err, CommandFailed::AuctionDoesNotExist(_)));
}

#[tokio::test]
async fn decrement_auction_first_bidder_wins() {
    let runtime = Runtime::default();
    let owner_ctx = SessionContext::new();
    let owner_id = create_user(&runtime, &owner_ctx, "owner3").await;
    let bidder_ctx = SessionContext::new();
    let _bidder_id = create_user(&runtime, &bidder_ctx, "bidder3").await;

    let item = runtime
        .store
        .create_item(bidpazari_runtime::model::NewItem {
            title: "Painting".to_string(),
            description: "A painting.".to_string(),
            item_type: "art".to_string(),
            image: None,
        })
        .unwrap();
    runtime.store.create_ownership(owner_id, item.id).unwrap();

    let created = dispatch(
        &runtime,
        &owner_ctx,
        "create_auction",
        json!({
            "item_id": item.id,
            "strategy": "decrement",
            "initial_price": 100.0,
            "minimum_price": 10.0,
            "price_decrement_rate": 10.0,
            "tick_ms": 60_000,
        }),
    )
    .await
    .unwrap();
    let auction_id = created["auction_id"].as_u64().unwrap();

    // start_auction schedules the ticker; we never let it fire here --
    // the auction stays at its initial price until the first bid.
    dispatch(&runtime, &owner_ctx, "start_auction", json!({ "auction_id": auction_id }))
        .await
        .unwrap();

    dispatch(&runtime, &bidder_ctx, "add_balance", json!({ "amount": 200.0 }))
        .await
        .unwrap();

    let bid_result = dispatch(&runtime, &bidder_ctx, "bid", json!({ "auction_id": auction_id }))
        .await
        .unwrap();
    assert_eq!(bid_result["status"], "closed");

    let owner_history = runtime.store.transaction_history(owner_id).unwrap();
    assert_eq!(owner_history.len(), 1);
    assert_eq!(owner_history[0].amount, dec!(100.00));
}

#[tokio::test]
async fn decrement_auction_closes_with_no_winner_at_minimum() {
    use bidpazari_runtime::auction::AuctionStatus;

    let runtime = Arc::new(Runtime::default());
    let owner_ctx = SessionContext::new();
    let owner_id = create_user(&runtime, &owner_ctx, "owner4").await;

    let item = runtime
        .store
        .create_item(bidpazari_runtime::model::NewItem {
            title: "Clock".to_string(),
            description: "A clock.".to_string(),
            item_type: "furniture".to_string(),
            image: None,
        })
        .unwrap();
    runtime.store.create_ownership(owner_id, item.id).unwrap();

    let created = dispatch(
        &runtime,
        &owner_ctx,
        "create_auction",
        json!({
            "item_id": item.id,
            "strategy": "decrement",
            "initial_price": 30.0,
            "minimum_price": 20.0,
            "price_decrement_rate": 10.0,
            "tick_ms": 60_000,
        }),
    )
    .await
    .unwrap();
    let auction_id = created["auction_id"].as_u64().unwrap();
    dispatch(&runtime, &owner_ctx, "start_auction", json!({ "auction_id": auction_id }))
        .await
        .unwrap();

    // Drive the ticker manually instead of waiting on the real clock: one
    // tick brings the price to the floor, the next observes it is already
    // there and auto-closes with no winner.
    let auction = runtime.registry.get_auction(auction_id).unwrap();
    auction.decrement_tick(runtime.store.as_ref()).unwrap();
    assert_eq!(auction.status(), AuctionStatus::Open);
    auction.decrement_tick(runtime.store.as_ref()).unwrap();
    assert_eq!(auction.status(), AuctionStatus::Closed);

    let owner_history = runtime.store.transaction_history(owner_id).unwrap();
    assert!(owner_history.is_empty());
}

#[tokio::test]
async fn highest_contribution_winner_takes_item_losers_forfeit() {
    let runtime = Runtime::default();
    let owner_ctx = SessionContext::new();
    let owner_id = create_user(&runtime, &owner_ctx, "owner5").await;
    let alice_ctx = SessionContext::new();
    let alice_id = create_user(&runtime, &alice_ctx, "alice5").await;
    let bob_ctx = SessionContext::new();
    let _bob_id = create_user(&runtime, &bob_ctx, "bob5").await;

    let item = runtime
        .store
        .create_item(bidpazari_runtime::model::NewItem {
            title: "Guitar".to_string(),
            description: "A guitar.".to_string(),
            item_type: "instrument".to_string(),
            image: None,
        })
        .unwrap();
    runtime.store.create_ownership(owner_id, item.id).unwrap();

    let created = dispatch(
        &runtime,
        &owner_ctx,
        "create_auction",
        json!({
            "item_id": item.id,
            "strategy": "highest_contribution",
            "minimum_bid_amount": 5.0,
            "maximum_price": 50.0,
        }),
    )
    .await
    .unwrap();
    let auction_id = created["auction_id"].as_u64().unwrap();
    dispatch(&runtime, &owner_ctx, "start_auction", json!({ "auction_id": auction_id }))
        .await
        .unwrap();

    dispatch(&runtime, &alice_ctx, "add_balance", json!({ "amount": 100.0 }))
        .await
        .unwrap();
    dispatch(&runtime, &bob_ctx, "add_balance", json!({ "amount": 100.0 }))
        .await
        .unwrap();

    dispatch(&runtime, &bob_ctx, "bid", json!({ "auction_id": auction_id, "amount": 20.0 }))
        .await
        .unwrap();
    let final_bid = dispatch(
        &runtime,
        &alice_ctx,
        "bid",
        json!({ "auction_id": auction_id, "amount": 50.0 }),
    )
    .await
    .unwrap();
    assert_eq!(final_bid["status"], "closed");

    let items = runtime.store.list_items_for_user(alice_id, None, None).unwrap();
    assert_eq!(items.len(), 1);

    let owner_history = runtime.store.transaction_history(owner_id).unwrap();
    assert_eq!(owner_history.len(), 2);
    let total: rust_decimal::Decimal = owner_history.iter().map(|t| t.amount).sum();
    assert_eq!(total, dec!(70.00));
}
