use std::sync::Arc;

use bidpazari_runtime::dispatcher::{dispatch, SessionContext};
use bidpazari_runtime::runtime::Runtime;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use crate::configuration::TcpConfig;
use crate::metrics;
use crate::wire;

/// Raw-socket backend. Framing is newline-delimited JSON: each inbound
/// line is one `{command, params}` request. A fixed-size single-read
/// framing breaks once a message exceeds the read buffer, so this build
/// frames on `\n` instead.
pub async fn serve(config: TcpConfig, runtime: Arc<Runtime>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(
        "TCP listener bound on {} (backlog {})",
        addr, config.backlog_size
    );

    loop {
        let (socket, peer) = listener.accept().await?;
        let runtime = Arc::clone(&runtime);
        metrics::OPEN_CONNECTIONS.with_label_values(&["tcp"]).inc();

        tokio::spawn(async move {
            info!("TCP connection opened: {}", peer);
            if let Err(err) = handle_connection(socket, runtime).await {
                warn!("TCP connection {} closed: {}", peer, err);
            }
            metrics::OPEN_CONNECTIONS.with_label_values(&["tcp"]).dec();
        });
    }
}

async fn handle_connection(
    socket: tokio::net::TcpStream,
    runtime: Arc<Runtime>,
) -> anyhow::Result<()> {
    let (reader, writer) = socket.into_split();
    handle_stream(reader, writer, runtime).await
}

/// Framing and dispatch logic, generic over the byte stream so it can be
/// driven in tests against `tokio::io::duplex` without a real socket.
async fn handle_stream<R, W>(reader: R, mut writer: W, runtime: Arc<Runtime>) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let ctx = SessionContext::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let request = match wire::decode_request(&line) {
            Ok(request) => request,
            Err(err) => {
                let body = wire::encode_wire_error("request", &err);
                write_line(&mut writer, &body).await?;
                return Ok(());
            }
        };

        let result = dispatch(&runtime, &ctx, &request.command, request.params).await;
        if request.command == "bid" {
            metrics::record_bid_outcome(result.is_ok());
        }
        let (body, should_close) = match result {
            Ok(value) => (wire::encode_ok(&request.command, value), false),
            Err(err) => wire::encode_command_failed(&request.command, &err),
        };
        metrics::refresh_gauges(&runtime);

        write_line(&mut writer, &body).await?;
        if should_close {
            return Ok(());
        }
    }

    if let Some(session) = ctx.session_user() {
        runtime.registry.disconnect(session.user_id);
    }
    Ok(())
}

async fn write_line<W: AsyncWrite + Unpin>(
    writer: &mut W,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    let mut line = wire::to_wire_string(value);
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use bidpazari_runtime::runtime::Runtime;
    use tokio::io::AsyncBufReadExt as _;

    use super::*;

    /// Drives the framing/dispatch loop over an in-memory duplex stream --
    /// no real socket involved -- sending two newline-delimited requests
    /// and checking each gets back exactly one newline-delimited reply.
    #[tokio::test]
    async fn frames_one_reply_per_newline_delimited_request() {
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let (client_read, mut client_write) = tokio::io::split(client);
        let mut client_lines = BufReader::new(client_read).lines();
        let runtime = Arc::new(Runtime::default());

        let handle = tokio::spawn(handle_stream(server_read, server_write, runtime));

        client_write
            .write_all(b"{\"command\": \"create_user\", \"params\": {\"username\": \"tcp_test\", \"email\": \"tcp_test@example.com\", \"password\": \"hunter2\"}}\n")
            .await
            .unwrap();
        client_write
            .write_all(b"{\"command\": \"does_not_exist\", \"params\": {}}\n")
            .await
            .unwrap();

        let first_reply = client_lines.next_line().await.unwrap().unwrap();
        assert!(first_reply.contains("\"code\":0"));

        let second_reply = client_lines.next_line().await.unwrap().unwrap();
        assert!(second_reply.contains("\"code\":2"));

        drop(client_write);
        handle.await.unwrap().unwrap();
    }
}
