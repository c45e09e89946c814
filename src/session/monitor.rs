// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Expiry monitor: proactive token renewal on a timer.
//!
//! While a session is authenticated, the monitor periodically inspects the
//! current token's expiry (a structural decode - cheap, no signature work
//! on the polling path) and asks the session manager to refresh once the
//! remaining lifetime drops below the renewal threshold. Anything it cannot
//! recover from - an undecodable token, a rejected refresh - degrades to a
//! forced logout; the monitor itself never surfaces an error. Downstream
//! observers see the state transition through the manager's watch channel.
//!
//! The interval only exists while the session is authenticated: it is armed
//! on the transition in (with an immediate first check) and dropped on the
//! transition out, so no timer callback can ever fire against a cleared
//! session.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::session::manager::SessionManager;
use crate::token::TokenCodec;

/// Handle to the background monitor task. Dropping it stops the task.
pub struct ExpiryMonitor {
    handle: JoinHandle<()>,
}

impl ExpiryMonitor {
    /// Spawn a monitor using the manager's configured poll interval and
    /// renewal threshold.
    pub fn spawn(manager: Arc<SessionManager>) -> Self {
        let poll = manager.config().poll_interval;
        let threshold = manager.config().renew_threshold;
        Self::spawn_with(manager, poll, threshold)
    }

    /// Spawn a monitor with explicit timings.
    pub fn spawn_with(
        manager: Arc<SessionManager>,
        poll_interval: Duration,
        renew_threshold: Duration,
    ) -> Self {
        let handle = tokio::spawn(run(manager, poll_interval, renew_threshold));
        Self { handle }
    }

    /// Stop the monitor.
    pub fn shutdown(self) {
        self.handle.abort();
    }
}

impl Drop for ExpiryMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(manager: Arc<SessionManager>, poll_interval: Duration, renew_threshold: Duration) {
    let mut authed: watch::Receiver<bool> = manager.subscribe();

    loop {
        // Idle until the session becomes authenticated.
        while !*authed.borrow_and_update() {
            if authed.changed().await.is_err() {
                return;
            }
        }

        tracing::debug!("MONITOR_ARMED | poll_secs={}", poll_interval.as_secs());
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick completes immediately: a freshly restored session
        // near expiry is renewed right away, not a full interval later.
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !check_once(&manager, renew_threshold) {
                        break;
                    }
                }
                changed = authed.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if !*authed.borrow() {
                        tracing::debug!("MONITOR_DISARMED | session left authenticated state");
                        break;
                    }
                }
            }
        }
        // The interval is dropped here; its lifetime never exceeds the
        // authenticated session's.
    }
}

/// One expiry check. Returns `false` when the session is no longer worth
/// watching (logged out, forced out, or gone).
fn check_once(manager: &SessionManager, renew_threshold: Duration) -> bool {
    let Some(token) = manager.current_token() else {
        // Token vanished between the watch update and this tick.
        manager.logout();
        return false;
    };

    let Some(claims) = TokenCodec::decode(&token) else {
        tracing::warn!("MONITOR_FORCED_LOGOUT | current token undecodable");
        manager.logout();
        return false;
    };

    let remaining = claims.exp - Utc::now().timestamp();
    if remaining >= renew_threshold.as_secs() as i64 {
        tracing::debug!("MONITOR_CHECK | remaining_secs={}", remaining);
        return true;
    }

    tracing::info!("MONITOR_RENEWING | remaining_secs={}", remaining);
    if manager.refresh() {
        true
    } else {
        tracing::warn!("MONITOR_FORCED_LOGOUT | refresh rejected");
        manager.logout();
        false
    }
}

// ============================================================================
// TESTS
// ============================================================================
