//! Timer-driven background loops.
//!
//! Each loop ticks on its own interval and exits when the shutdown
//! channel flips. Loop bodies log failures and keep ticking; a flaky
//! dependency must not kill the saga machinery.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::state::AppState;

/// Spawns every background loop. The returned handles complete once
/// shutdown is signalled.
pub fn spawn_loops(
    state: Arc<AppState>,
    config: &Config,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    vec![
        spawn_outbox_loop(state.clone(), config.publish_interval, shutdown.clone()),
        spawn_timeout_sweep(state.clone(), config.timeout_sweep_interval, shutdown.clone()),
        spawn_expiry_sweep(state.clone(), config.expiry_sweep_interval, shutdown.clone()),
        spawn_cleanup_loop(state, config.cleanup_interval, shutdown),
    ]
}

/// Drains pending outbox rows to the broker, then dispatches delivered
/// messages to the registered consumers.
fn spawn_outbox_loop(
    state: Arc<AppState>,
    period: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match state.publisher.publish_pending().await {
                        Ok(published) if published > 0 => {
                            debug!(published, "outbox rows published");
                        }
                        Ok(_) => {}
                        Err(err) => error!(error = %err, "outbox publish failed"),
                    }
                    let delivered = state.broker.drain_pending();
                    if !delivered.is_empty() {
                        state.dispatcher.dispatch_all(&delivered).await;
                    }
                }
                _ = shutdown.changed() => {
                    info!("outbox loop shutting down");
                    break;
                }
            }
        }
    })
}

fn spawn_timeout_sweep(
    state: Arc<AppState>,
    period: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match state.orders.mark_timed_out_orders().await {
                        Ok(cancelled) if cancelled > 0 => {
                            info!(cancelled, "timed-out orders cancelled");
                        }
                        Ok(_) => {}
                        Err(err) => error!(error = %err, "order timeout sweep failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("timeout sweep shutting down");
                    break;
                }
            }
        }
    })
}

fn spawn_expiry_sweep(
    state: Arc<AppState>,
    period: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match state.inventory.release_expired(100).await {
                        Ok(released) if released > 0 => {
                            info!(released, "expired reservations released");
                        }
                        Ok(_) => {}
                        Err(err) => error!(error = %err, "reservation expiry sweep failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("expiry sweep shutting down");
                    break;
                }
            }
        }
    })
}

fn spawn_cleanup_loop(
    state: Arc<AppState>,
    period: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match state.cleanup.run().await {
                        Ok(report) if report.total() > 0 => {
                            info!(
                                sent = report.sent_outbox,
                                failed = report.failed_outbox,
                                markers = report.dedup_markers,
                                "retention cleanup pass"
                            );
                        }
                        Ok(_) => {}
                        Err(err) => error!(error = %err, "retention cleanup failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("cleanup loop shutting down");
                    break;
                }
            }
        }
    })
}
