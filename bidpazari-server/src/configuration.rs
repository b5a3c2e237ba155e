use anyhow::Result;
use clap::Parser;
use config::{Config, Environment};
use serde::Deserialize;

/// `--config <path>` overrides the default config file location; any key
/// below can also be set via a `BP__<SECTION>__<KEY>` environment
/// variable (e.g. `BP__TCP__PORT=7000`).
#[derive(Parser, Debug)]
#[clap(name = "bidpazari-server", about = "Online auction engine command server")]
pub struct Cli {
    #[clap(short, long, default_value = "./Config.toml")]
    pub config: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TcpConfig {
    pub host: String,
    pub port: u16,
    pub backlog_size: u32,
    pub buffer_size: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        TcpConfig {
            host: "0.0.0.0".to_string(),
            port: 6659,
            backlog_size: 5,
            buffer_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    pub host: String,
    pub port: u16,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            host: "0.0.0.0".to_string(),
            port: 8765,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub outbound_queue_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            outbound_queue_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusExporterConfig {
    pub bind_address: String,
}

impl Default for PrometheusExporterConfig {
    fn default() -> Self {
        PrometheusExporterConfig {
            bind_address: "0.0.0.0:9898".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Configuration {
    #[serde(default)]
    pub tcp: TcpConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub prometheus_exporter: PrometheusExporterConfig,
}

impl Configuration {
    /// Loads from `filename` if it exists, then layers `BP__`-prefixed
    /// environment overrides on top. A missing config file is not an
    /// error -- every section has sane defaults.
    pub fn load(filename: &str) -> Result<Self> {
        let builder = Config::builder()
            .add_source(config::File::with_name(filename).required(false))
            .add_source(
                Environment::with_prefix("bp")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        Ok(builder.build()?.try_deserialize::<Configuration>()?)
    }
}
