use std::sync::Arc;

use bidpazari_runtime::dispatcher::{dispatch, SessionContext};
use bidpazari_runtime::events::AuctionObserver;
use bidpazari_runtime::runtime::Runtime;
use futures::{SinkExt, StreamExt};
use log::{info, warn};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use crate::configuration::WebSocketConfig;
use crate::metrics;
use crate::transport::connection::{PushConnection, PushQueue};
use crate::wire;

/// WebSocket backend. One frame in, one frame out; unlike the TCP
/// backend this one also fans out server-initiated pushes (bid
/// updates, price decrements, auction close) to whichever connection is
/// bound to the session that is watching an auction.
pub async fn serve(
    config: WebSocketConfig,
    runtime: Arc<Runtime>,
    outbound_queue_capacity: usize,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("WebSocket listener bound on {}", addr);

    loop {
        let (socket, peer) = listener.accept().await?;
        let runtime = Arc::clone(&runtime);
        metrics::OPEN_CONNECTIONS.with_label_values(&["websocket"]).inc();

        tokio::spawn(async move {
            info!("WS connection opened: {}", peer);
            if let Err(err) = handle_connection(socket, runtime, outbound_queue_capacity).await {
                warn!("WS connection {} closed: {}", peer, err);
            }
            metrics::OPEN_CONNECTIONS.with_label_values(&["websocket"]).dec();
        });
    }
}

async fn handle_connection(
    socket: tokio::net::TcpStream,
    runtime: Arc<Runtime>,
    outbound_queue_capacity: usize,
) -> anyhow::Result<()> {
    let ws_stream = tokio_tungstenite::accept_async(socket).await?;
    let (mut sink, mut stream) = ws_stream.split();

    let ctx = SessionContext::new();
    let push_queue = Arc::new(PushQueue::new(outbound_queue_capacity));

    loop {
        tokio::select! {
            push = push_queue.recv() => {
                sink.send(Message::Text(wire::to_wire_string(&push))).await?;
            }
            incoming = stream.next() => {
                let message = match incoming {
                    Some(Ok(message)) => message,
                    Some(Err(err)) => {
                        warn!("WS read error: {}", err);
                        continue;
                    }
                    None => break,
                };

                match message {
                    Message::Text(text) => {
                        let response = handle_request(&runtime, &ctx, &push_queue, &text).await;
                        let should_close = response.1;
                        sink.send(Message::Text(wire::to_wire_string(&response.0))).await?;
                        if should_close {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    if let Some(session) = ctx.session_user() {
        runtime.registry.disconnect(session.user_id);
    }
    Ok(())
}

async fn handle_request(
    runtime: &Runtime,
    ctx: &SessionContext,
    push_queue: &Arc<PushQueue>,
    raw: &str,
) -> (serde_json::Value, bool) {
    let request = match wire::decode_request(raw) {
        Ok(request) => request,
        Err(err) => return (wire::encode_wire_error("request", &err), true),
    };

    let command = request.command.clone();
    let result = dispatch(runtime, ctx, &request.command, request.params).await;
    if command == "bid" {
        metrics::record_bid_outcome(result.is_ok());
    }
    let response = match &result {
        Ok(value) => (wire::encode_ok(&command, value.clone()), false),
        Err(err) => wire::encode_command_failed(&command, err),
    };
    metrics::refresh_gauges(runtime);

    if result.is_ok() {
        bind_push_connection(ctx, push_queue);
    }
    response
}

/// After a successful `create_user`/`login`, attach this connection's
/// push queue to the session so auction events reach it. A session
/// already carrying a connection (e.g. a later command on the same
/// socket) is left untouched.
fn bind_push_connection(ctx: &SessionContext, push_queue: &Arc<PushQueue>) {
    if let Some(session) = ctx.session_user() {
        if session.connection().is_none() {
            let observer: Arc<dyn AuctionObserver> = Arc::new(PushConnection {
                queue: Arc::clone(push_queue),
            });
            session.set_connection(Some(observer));
        }
    }
}
