//! Relay server command.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use wavedrop_core::relay::{serve, RelayState};
use wavedrop_core::session::CoordinatorConfig;

use super::RelayArgs;

/// Run the relay server until interrupted.
pub async fn run(args: RelayArgs) -> Result<()> {
    let config = super::load_config();

    let bind = match args.bind {
        Some(addr) => addr,
        None => config
            .relay
            .bind
            .parse()
            .with_context(|| format!("invalid bind address '{}'", config.relay.bind))?,
    };
    let cleanup_secret = args
        .cleanup_secret
        .clone()
        .or_else(|| config.relay.cleanup_secret.clone());

    let coordinator_config = CoordinatorConfig {
        session_ttl: chrono::Duration::seconds(
            i64::try_from(config.session.expiry_secs).unwrap_or(i64::MAX),
        ),
        ..Default::default()
    };
    let state = RelayState::with_config(coordinator_config, cleanup_secret);

    // Expired sessions are also rejected lazily on access; the sweep just
    // keeps the store from accumulating abandoned ones.
    let sweeper = state.coordinator.clone();
    let sweep_interval = Duration::from_secs(args.sweep_interval.max(1));
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(sweep_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            match sweeper.sweep_expired().await {
                Ok(0) => {}
                Ok(n) => info!(deleted = n, "swept expired sessions"),
                Err(e) => warn!(%e, "sweep failed"),
            }
        }
    });

    info!(%bind, "relay listening");
    println!("Wavedrop relay listening on {bind}");

    serve(bind, state).await?;
    Ok(())
}
