use anyhow::Result;
use bidpazari_runtime::runtime::Runtime;
use hyper::{
    header::CONTENT_TYPE,
    service::{make_service_fn, service_fn},
    Body, Response, Server,
};
use lazy_static::lazy_static;
use log::{error, info};
use prometheus::{
    register_gauge_vec_with_registry, register_gauge_with_registry, Encoder, Gauge, GaugeVec,
    Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry =
        Registry::new_custom(Some("bidpazari".to_string()), None).unwrap();
    pub static ref ONLINE_USERS: Gauge = register_gauge_with_registry!(
        "online_users",
        "Number of currently connected, logged-in users",
        REGISTRY
    )
    .unwrap();
    pub static ref ACTIVE_AUCTIONS: GaugeVec = register_gauge_vec_with_registry!(
        "active_auctions",
        "Number of currently open auctions, by bidding strategy",
        &["strategy"],
        REGISTRY
    )
    .unwrap();
    pub static ref BIDS_TOTAL: GaugeVec = register_gauge_vec_with_registry!(
        "bids_total",
        "Number of bids processed, by outcome",
        &["outcome"],
        REGISTRY
    )
    .unwrap();
    pub static ref OPEN_CONNECTIONS: GaugeVec = register_gauge_vec_with_registry!(
        "open_connections",
        "Number of open client connections, by transport",
        &["transport"],
        REGISTRY
    )
    .unwrap();
    pub static ref DROPPED_PUSHES: Gauge = register_gauge_with_registry!(
        "dropped_pushes_total",
        "Number of server-initiated pushes dropped because a connection's outbound queue was full",
        REGISTRY
    )
    .unwrap();
}

/// Refreshes the level-gauges (online users, active auctions by strategy)
/// from the registry's current state. Cheap enough to call after every
/// dispatched command rather than on a separate poll loop.
pub fn refresh_gauges(runtime: &Runtime) {
    ONLINE_USERS.set(runtime.registry.online_user_count() as f64);

    let counts = runtime.registry.strategy_counts();
    for strategy in ["increment", "decrement", "highest_contribution"] {
        let count = counts.get(strategy).copied().unwrap_or(0) as f64;
        ACTIVE_AUCTIONS.with_label_values(&[strategy]).set(count);
    }
}

/// Records one bid's outcome ("accepted" or "rejected") for the
/// `bids_total` gauge.
pub fn record_bid_outcome(accepted: bool) {
    let label = if accepted { "accepted" } else { "rejected" };
    BIDS_TOTAL.with_label_values(&[label]).inc();
}

/// Starts the `/metrics` exporter as a background task.
pub async fn serve(bind_address: &str) -> Result<()> {
    let addr = bind_address.parse()?;

    tokio::spawn(async move {
        info!("Prometheus exporter listening on http://{}", addr);

        let serve_future = Server::bind(&addr).serve(make_service_fn(|_| async {
            Ok::<_, hyper::Error>(service_fn(|_req| async {
                let encoder = TextEncoder::new();
                let metric_families = REGISTRY.gather();
                let mut buffer = Vec::new();
                encoder.encode(&metric_families, &mut buffer).unwrap();

                let response = Response::builder()
                    .status(200)
                    .header(CONTENT_TYPE, encoder.format_type())
                    .body(Body::from(buffer))
                    .unwrap();
                Ok::<_, hyper::Error>(response)
            }))
        }));

        if let Err(err) = serve_future.await {
            error!("Prometheus exporter server error: {}", err);
        }
    });

    Ok(())
}
