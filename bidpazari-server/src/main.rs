mod configuration;
mod errors;
mod metrics;
mod transport;
mod wire;

use std::sync::Arc;

use anyhow::Result;
use bidpazari_runtime::runtime::Runtime;
use clap::Parser;
use env_logger::Env;
use log::info;
use tokio::signal::{
    self,
    unix::{signal, SignalKind},
};

use configuration::{Cli, Configuration};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Configuration::load(&cli.config)?;
    info!("Starting bidpazari-server");

    let runtime = Arc::new(Runtime::default());

    let tcp_runtime = Arc::clone(&runtime);
    let tcp_config = config.tcp.clone();
    tokio::spawn(async move {
        if let Err(err) = transport::tcp::serve(tcp_config, tcp_runtime).await {
            log::error!("TCP listener stopped: {}", err);
        }
    });

    let ws_runtime = Arc::clone(&runtime);
    let ws_config = config.websocket.clone();
    let outbound_queue_capacity = config.connection.outbound_queue_capacity;
    tokio::spawn(async move {
        if let Err(err) =
            transport::websocket::serve(ws_config, ws_runtime, outbound_queue_capacity).await
        {
            log::error!("WebSocket listener stopped: {}", err);
        }
    });

    metrics::serve(&config.prometheus_exporter.bind_address).await?;

    wait_termination().await;
    info!("Shutting down bidpazari-server");
    Ok(())
}

async fn wait_termination() {
    let mut term = signal(SignalKind::terminate()).unwrap();
    let mut inter = signal(SignalKind::interrupt()).unwrap();

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Ctrl-C pressed");
        },
        _ = term.recv() => {
            info!("terminate signal received");
        },
        _ = inter.recv() => {
            info!("interrupt signal received");
        },
    }
}
