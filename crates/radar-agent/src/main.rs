//! # radar-agent
//!
//! Runs exposure reconciliation and decoy scheduling against the files the
//! tracing SDK bridge maintains.
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package radar-agent
//!
//! # Production
//! RADAR_ENV=production RADAR_CONFIG=/etc/radar/config.toml ./radar-agent
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;

use radar_agent::agent::startup_hint;
use radar_agent::logging::{self, LogMode};
use radar_agent::Agent;
use radar_core::RadarConfig;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(LogMode::from_env(), None)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting radar-agent");

    let agent = match load_agent() {
        Ok(agent) => agent,
        Err(err) => {
            error!(
                code = err.error_code(),
                error = %err,
                hint = startup_hint(&err),
                "Startup failed"
            );
            return Err(err.into());
        }
    };
    let last_known = agent.reconciler().last_known_from_store();
    info!(level = %last_known.level, since = ?last_known.since, "Last known exposure state");

    let (stop, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(err) => error!(error = %err, "Failed to listen for shutdown signal"),
        }
        let _ = stop.send(true);
    });

    agent.run(shutdown).await
}

fn load_agent() -> radar_core::Result<Agent> {
    let config_path = std::env::var_os("RADAR_CONFIG").map(PathBuf::from);
    let config = RadarConfig::load(config_path.as_deref())?;
    Agent::from_config(&config)
}
