//! Payment status poller.
//!
//! One status request per interval, racing an overall ceiling. The first to
//! finish wins and the other future is dropped; on a tie the ceiling wins.

use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{OrderBackend, OrderStatus};
use crate::config::PaymentConfig;
use crate::session::Session;

/// How a watch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Succeeded,
    Cancelled,
    /// Ceiling reached while still pending; the order is left as is.
    TimedOut,
    /// Stopped from outside (user cancel or a newer attempt).
    Aborted,
}

/// Poll until the order reaches a terminal status.
///
/// The first request goes out one `interval` after the call. A failed request
/// leaves the status pending and waits for the next tick. Never returns
/// `TimedOut` or `Aborted`; bound it with [`watch_payment`].
pub async fn poll_until_terminal(
    backend: &dyn OrderBackend,
    session: &Session,
    order_id: &str,
    interval: Duration,
) -> PollOutcome {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut status = OrderStatus::Pending;
    let mut tick: u32 = 0;

    loop {
        ticker.tick().await;
        tick += 1;
        match backend.order_status(session, order_id).await {
            Ok(raw) => {
                let mapped = OrderStatus::from_remote(&raw);
                if status.advance(mapped) {
                    info!(order_id, tick, raw = %raw, status = ?status, "Payment status changed");
                } else {
                    debug!(order_id, tick, raw = %raw, "Payment still pending");
                }
            }
            Err(e) => {
                warn!(order_id, tick, error = %e, "Payment status check failed");
            }
        }

        match status {
            OrderStatus::Succeeded => return PollOutcome::Succeeded,
            OrderStatus::Cancelled => return PollOutcome::Cancelled,
            OrderStatus::Pending => {}
        }
    }
}

/// Race the poll loop against the ceiling timer and an external cancel.
pub async fn watch_payment(
    backend: &dyn OrderBackend,
    session: &Session,
    order_id: &str,
    config: &PaymentConfig,
    cancel: &CancellationToken,
) -> PollOutcome {
    let ceiling = config.poll_ceiling();
    info!(
        order_id,
        interval_ms = config.poll_interval_ms,
        ceiling_ms = config.poll_ceiling_ms,
        "Payment status polling started"
    );

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => PollOutcome::Aborted,
        _ = tokio::time::sleep(ceiling) => PollOutcome::TimedOut,
        outcome = poll_until_terminal(backend, session, order_id, config.poll_interval()) => outcome,
    };

    info!(order_id, outcome = ?outcome, "Payment status polling finished");
    outcome
}
