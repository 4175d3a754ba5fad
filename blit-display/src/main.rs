//! blit-display: entry point.
//!
//! ```text
//! blit-display                       Run with blit-display.toml (or defaults)
//! blit-display --config <path>       Load a custom config TOML
//! blit-display --listen 0.0.0.0:8081 Override the listen address
//! blit-display --device /dev/fb0     Override the panel device
//! blit-display --gen-config          Write the default config to --config and exit
//! ```

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use blit_core::{FrameChannel, IngestHandler, RenderConsumer, Watchdog};
use blit_display::config::{DisplayConfig, LoggingConfig, NetworkConfig};
use blit_display::server;
use blit_display::surface::PanelSurface;

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "blit-display", about = "Receive RGB565 frames over HTTP and show them on a panel")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "blit-display.toml")]
    config: PathBuf,

    /// Listen address, overriding `network.listen_address` and `network.port`.
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Framebuffer device, overriding `panel.device`.
    #[arg(long)]
    device: Option<String>,

    /// Write the default configuration to the config path and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        DisplayConfig::write_default(&cli.config)?;
        println!("Default config written to {}", cli.config.display());
        return Ok(());
    }

    let mut config = DisplayConfig::load(&cli.config);
    if let Some(addr) = cli.listen {
        config.network.listen_address = addr.ip().to_string();
        config.network.port = addr.port();
    }
    if let Some(device) = cli.device {
        config.panel.device = device;
    }

    init_tracing(&config.logging)?;
    let listen = config.network.socket_addr()?;

    info!("blit-display v{}", env!("CARGO_PKG_VERSION"));
    info!("listen: {listen}");
    info!("panel: {}x{}", config.panel.width, config.panel.height);

    // Frame pipeline: handler on the runtime, consumer on its own thread.
    let (publisher, receiver) = FrameChannel::new();
    let handler = Arc::new(IngestHandler::new(publisher));
    let watchdog = Watchdog::new();

    let surface = PanelSurface::from_config(&config.panel);
    let consumer = RenderConsumer::new(receiver, surface, watchdog.clone());
    std::thread::Builder::new()
        .name("frame-display".into())
        .spawn(move || {
            consumer.run();
        })?;

    let backlog = {
        let handler = Arc::clone(&handler);
        move || handler.backlog()
    };
    let _monitor = watchdog.monitor(config.watchdog.timeout(), backlog, config.watchdog.action());

    tokio::spawn(run_network(listen, config.network.clone(), Arc::clone(&handler)));

    // Main loop: periodic status and session changes until Ctrl-C.
    let mut status = tokio::time::interval(STATUS_INTERVAL);
    let mut session = handler.session_cell().subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            Ok(()) = session.changed() => {
                let cfg = *session.borrow_and_update();
                info!(
                    "session geometry: {}x{} ({} bytes per frame)",
                    cfg.width,
                    cfg.height,
                    cfg.expected_bytes()
                );
            }
            _ = status.tick() => {
                let stats = handler.stats();
                debug!(
                    "running: {} messages, {} queued, {} dropped, backlog {}, last render {:?} ago",
                    stats.messages,
                    stats.frames_queued,
                    stats.frames_dropped,
                    handler.backlog(),
                    watchdog.since_refresh(),
                );
            }
        }
    }

    Ok(())
}

/// Bring up the transport. Failure leaves the process running without
/// a server; the display keeps its last frame.
async fn run_network(addr: SocketAddr, network: NetworkConfig, handler: Arc<IngestHandler>) {
    let listener = match server::bind_with_deadline(addr, network.link_timeout()).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!("network unavailable ({e}); running in degraded mode");
            return;
        }
    };

    if let Err(e) = server::serve(listener, handler, network.max_payload).await {
        error!("HTTP server stopped: {e}");
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&logging.file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }
    Ok(())
}
