use clap::Parser;
use hookcast_server::ServerConfig;
use hookcast_telemetry::TelemetryConfig;

/// Relay WhatsApp webhook notifications to WebSocket subscribers.
#[derive(Debug, Parser)]
#[command(name = "hookcast", version)]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Default log level (RUST_LOG takes precedence).
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    hookcast_telemetry::init_telemetry(&TelemetryConfig {
        log_level: args.log_level,
        json: args.json_logs,
        ..Default::default()
    })?;

    tracing::info!("Starting hookcast");

    let config = ServerConfig {
        host: args.host,
        port: args.port,
    };
    let handle = hookcast_server::start(config).await?;

    tracing::info!(port = handle.port(), "hookcast ready");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    handle.shutdown().await;
    Ok(())
}
