//! gridpilot: energy manager daemon
//!
//! Runs the charger control loop and the OCPP 1.6J central system as a
//! systemd service, Docker container, or standalone process.
//!
//! ```sh
//! # Run with default config (~/.config/gridpilot/config.toml)
//! gridpilot
//!
//! # Custom config path
//! gridpilot --config /etc/gridpilot/config.toml
//!
//! # Hold the charger at 10 A instead of following the grid
//! gridpilot --manual 10
//!
//! # Validate config without starting
//! gridpilot --check
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use gridpilot::config::AppConfig;
use gridpilot::server::{init_tracing, ServerHandle, ServerOptions};

/// gridpilot: EV charger energy manager with an OCPP 1.6J central system.
#[derive(Parser, Debug)]
#[command(
    name = "gridpilot",
    version,
    about = "Balances EV charging current against grid import",
    long_about = "gridpilot polls the grid meter, charger and heat pump, steers the \
                  charger's current limit, and accepts OCPP 1.6J charge points over WebSocket.\n\n\
                  Default config: ~/.config/gridpilot/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "GRIDPILOT_CONFIG")]
    config: Option<PathBuf>,

    /// Override the WebSocket listen port.
    #[arg(long)]
    ws_port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit without starting.
    #[arg(long)]
    check: bool,

    /// Start in MANUAL mode holding this charging current (A).
    #[arg(long, value_name = "AMPS")]
    manual: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli.config.unwrap_or_else(gridpilot::default_config_path);

    let mut config = match AppConfig::load(&config_path) {
        Ok(mut cfg) => {
            if let Some(ref level) = cli.log_level {
                cfg.logging.level = level.clone();
            }
            // Init tracing first so subsequent logs are formatted properly
            init_tracing(&cfg);
            info!("Configuration loaded from {}", config_path.display());
            cfg
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
                .init();
            error!("Failed to load config from {}: {}", config_path.display(), e);
            return Err(e.into());
        }
    };

    // ── Apply CLI overrides ────────────────────────────────────
    if let Some(port) = cli.ws_port {
        info!("CLI override: ws_port = {}", port);
        config.server.ws_port = port;
    }

    // ── Config validation mode ─────────────────────────────────
    if cli.check {
        let energy = &config.energy_manager;
        let settings = energy.settings()?;
        println!("✅ Configuration is valid");
        println!("   Config file : {}", config_path.display());
        println!("   WS address  : {}", config.server.ws_address());
        println!("   Grid meter  : {}", energy.grid_meter_host());
        println!("   Charger     : {}", energy.charger_host());
        println!("   Heat pump   : {}", energy.heat_pump_host());
        println!(
            "   Current     : {} .. {}",
            settings.limits.min, settings.limits.max
        );
        println!("   Interval    : {:?}", settings.interval);
        println!("   Log level   : {}", config.logging.level);
        return Ok(());
    }

    // ── Start server ───────────────────────────────────────────
    let handle = ServerHandle::start(ServerOptions {
        config,
        manual_current: cli.manual,
    })
    .await?;

    // Install OS signal handlers (SIGTERM, SIGINT)
    handle.install_signal_handler();

    info!("🚀 Press Ctrl+C to shutdown gracefully.");

    // Wait for shutdown signal, then clean up
    handle.shutdown_signal().wait().await;
    handle.wait().await;

    Ok(())
}
