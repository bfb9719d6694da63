//! # appbridge-replay
//!
//! Plays a scripted sequence of surface, window manager and home screen events
//! through a `SurfaceBridge` backed by the in-process loopback services, then
//! prints every call the bridge made and every delegate callback as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use appbridge::config::BridgeConfig;
use appbridge::replay::{self, ReplayScript};

#[derive(Parser)]
#[command(name = "appbridge-replay")]
#[command(about = "Replay platform events through an app bridge and report its calls")]
#[command(version)]
struct Cli {
    /// Path to a bridge configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Replay script (TOML)
    #[arg(short, long)]
    script: String,

    /// Service port (overrides the configuration file)
    #[arg(long)]
    port: Option<u16>,

    /// Session token (overrides the configuration file)
    #[arg(long)]
    token: Option<String>,

    /// Application id (overrides the configuration file)
    #[arg(long)]
    app_id: Option<String>,

    /// Window role (overrides the configuration file)
    #[arg(long)]
    role: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Cli {
    fn bridge_config(&self) -> Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let config = BridgeConfig::load(path)?;
                info!("✅ Configuration loaded from: {}", path);
                config
            }
            None => BridgeConfig::new(0, "", "", ""),
        };

        // Override config with CLI flags
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(token) = &self.token {
            config.token = token.clone();
        }
        if let Some(app_id) = &self.app_id {
            config.app_id = app_id.clone();
        }
        if let Some(role) = &self.role {
            config.role = role.clone();
        }

        config.validate().context("Incomplete bridge configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    info!("🚀 Starting appbridge-replay {}", appbridge::VERSION);

    let config = cli.bridge_config()?;
    let script = ReplayScript::load(&cli.script)?;
    info!("📄 {} events to replay for role {}", script.events.len(), config.role);

    let report = match replay::run(config, &script) {
        Ok(report) => report,
        Err(e) => {
            error!("❌ Replay failed: {:#}", e);
            return Err(e);
        }
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize replay report")?
    );

    info!("👋 Replay finished");
    Ok(())
}
