use clap::Parser;
use rustdeck::host::connection::Registration;
use rustdeck::host::protocol::RegistrationInfo;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// rustdeck: Stream Deck plugin for smart devices on a game server
#[derive(Parser)]
#[command(name = "rustdeck", version, about)]
struct Cli {
    /// WebSocket port of the Stream Deck application.
    #[arg(long, required_unless_present = "check")]
    port: Option<u16>,

    /// Context used to register the plugin.
    #[arg(long = "pluginUUID", required_unless_present = "check")]
    plugin_uuid: Option<String>,

    /// Event name of the registration frame.
    #[arg(long = "registerEvent", required_unless_present = "check")]
    register_event: Option<String>,

    /// Application and device info (JSON).
    #[arg(long, default_value = "{}")]
    info: String,

    /// Path to the plugin defaults file (TOML).
    #[arg(short, long, default_value = "rustdeck.toml")]
    config: PathBuf,

    /// Enable JSON log output.
    #[arg(long)]
    json: bool,

    /// Validate config and exit.
    #[arg(long)]
    check: bool,
}

/// The host passes long flags with a single dash (`-port 28196`).
fn normalise_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
    args.into_iter()
        .enumerate()
        .map(|(i, arg)| {
            let single_dash_long =
                i > 0 && arg.len() > 2 && arg.starts_with('-') && !arg.starts_with("--");
            if single_dash_long {
                format!("-{arg}")
            } else {
                arg
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_from(normalise_args(std::env::args()));

    // stdout belongs to the host.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rustdeck=info"));

    if cli.json {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    info!("rustdeck v{}", env!("CARGO_PKG_VERSION"));

    let config = rustdeck::config::load_or_default(&cli.config)?;

    if cli.check {
        println!(
            "config OK: base URL {}, refresh every {} ms, event stream {}",
            config.plugin.base_url,
            config.plugin.refresh_interval_ms,
            if config.stream.enabled {
                config.stream.url.as_str()
            } else {
                "disabled"
            },
        );
        return Ok(());
    }

    let info = RegistrationInfo::parse(&cli.info).unwrap_or_else(|e| {
        warn!("unreadable -info payload: {e}");
        RegistrationInfo::default()
    });

    let registration = Registration {
        port: cli.port.ok_or_else(|| anyhow::anyhow!("missing -port"))?,
        plugin_uuid: cli
            .plugin_uuid
            .ok_or_else(|| anyhow::anyhow!("missing -pluginUUID"))?,
        register_event: cli
            .register_event
            .ok_or_else(|| anyhow::anyhow!("missing -registerEvent"))?,
        info,
    };

    info!(
        "loaded config, {} device(s) reported by host",
        registration.info.devices.len()
    );

    rustdeck::plugin::run(config, registration).await?;

    Ok(())
}
