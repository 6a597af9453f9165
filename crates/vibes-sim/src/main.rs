//! # Vibes Sim
//!
//! Headless room simulator for the Vibes Hunters spatial audio stack.
//!
//! Runs a scripted session against the in-memory room and audio backend:
//! - a voice publisher walks through the listener's earshot
//! - the listener joins and leaves a music party
//! - a moderator ends the party
//!
//! Exits with an error if anything outlives the session.
//!
//! Usage: `vibes-sim [--init] [config.toml]`. With `--init` the default
//! configuration is written to the path instead.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod config;
mod scenario;

use std::path::PathBuf;

use anyhow::{bail, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{SimConfig, CONFIG_FILE};

/// Main entry point.
fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("vibes=info".parse()?))
        .init();

    info!("Vibes sim starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args_os().skip(1).peekable();
    let init = args.next_if(|a| a == "--init").is_some();
    let path = args
        .next()
        .map_or_else(|| PathBuf::from(CONFIG_FILE), PathBuf::from);

    if init {
        SimConfig::default().save_to(&path)?;
        return Ok(());
    }

    let mut config = SimConfig::load_from(&path);
    config.validate();
    info!(
        projection = config.session.spatial.projection.name(),
        radius_m = config.session.proximity.radius_m,
        steps = config.scenario.walk_steps,
        "Running scenario"
    );

    let report = scenario::run(&config)?;
    info!(
        steps = report.steps,
        audible_steps = report.audible_steps,
        peak_volume = report.peak_volume,
        notices = report.notices.len(),
        "Scenario complete"
    );

    if !report.is_clean() {
        bail!(
            "resources outlived the session: {} elements, {} nodes, {} tracked, {} subscriptions",
            report.leaked_elements,
            report.leaked_nodes,
            report.leaked_resources,
            report.leaked_subscriptions
        );
    }

    info!("Vibes sim shutdown complete");
    Ok(())
}
