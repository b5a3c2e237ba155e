use std::collections::VecDeque;
use std::sync::Mutex;

use bidpazari_runtime::events::{AuctionEvent, AuctionEventKind, AuctionObserver};
use serde_json::{json, Value};
use tokio::sync::Notify;

use crate::metrics;
use crate::wire;

/// Bounded per-connection outbound queue feeding server-initiated pushes
/// (WS only) to a connection's write loop. A slow reader must never
/// stall auction progress, so `push` -- called synchronously from inside
/// an `Auction`'s lock via `AuctionObserver::notify` -- never blocks: it
/// drops the oldest queued push once the queue is full.
pub struct PushQueue {
    state: Mutex<VecDeque<Value>>,
    capacity: usize,
    notify: Notify,
}

impl PushQueue {
    pub fn new(capacity: usize) -> Self {
        PushQueue {
            state: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
        }
    }

    pub fn push(&self, value: Value) {
        let mut state = self.state.lock().unwrap();
        if state.len() >= self.capacity {
            state.pop_front();
            metrics::DROPPED_PUSHES.inc();
        }
        state.push_back(value);
        drop(state);
        self.notify.notify_one();
    }

    /// Waits for and returns the next queued push.
    pub async fn recv(&self) -> Value {
        loop {
            if let Some(value) = self.state.lock().unwrap().pop_front() {
                return value;
            }
            self.notify.notified().await;
        }
    }
}

/// `AuctionObserver` implementation handed to `Auction::register_observer`
/// for a WebSocket connection's bound session. Translates an auction
/// event into its human-readable wire notification shape.
pub struct PushConnection {
    pub queue: std::sync::Arc<PushQueue>,
}

impl AuctionObserver for PushConnection {
    fn notify(&self, event: &AuctionEvent) {
        self.queue.push(wire::encode_notification(event_payload(event)));
    }
}

fn event_payload(event: &AuctionEvent) -> Value {
    let mut body = match &event.kind {
        AuctionEventKind::AuctionStarted { current_price } => {
            json!({ "current_price": current_price.to_string() })
        }
        AuctionEventKind::BidReceived { bidder, amount } => {
            json!({ "bidder": bidder, "amount": amount.to_string() })
        }
        AuctionEventKind::PriceDecremented { current_price } => {
            json!({ "current_price": current_price.to_string() })
        }
        AuctionEventKind::AuctionStopped { winner, amount } => {
            json!({
                "winner": winner,
                "amount": amount.map(|a| a.to_string()),
            })
        }
    };
    body["auction_id"] = json!(event.auction_id);
    body["event"] = json!(event.kind.name());
    body
}
