//! Process-wide shutdown coordination (§5 "Cancellation").
//!
//! Grounded on the teacher's `spawn_shutdown_handler` (`commands/run/shutdown.rs`):
//! a `ctrl_c()`-triggered signal that every long-running loop observes
//! cooperatively. The teacher hand-rolls queue-draining with a polling
//! loop over `flume` channel depths; here the signal itself is a
//! `tokio_util::sync::CancellationToken`, since the scheduler's "drain" is
//! just "let the in-flight tick finish" rather than multiple queues to
//! watch.

use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
pub struct ShutdownToken(CancellationToken);

impl ShutdownToken {
    pub fn new() -> Self {
        Self(CancellationToken::new())
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub async fn cancelled(&self) {
        self.0.cancelled().await;
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a task that cancels `token` on Ctrl+C / SIGTERM.
pub fn spawn_shutdown_handler(token: ShutdownToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received shutdown signal, cancelling in-flight work");
                token.cancel();
            }
            Err(err) => {
                tracing::error!(error = %err, "unable to listen for shutdown signal");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_resolves_cancelled_future() {
        let token = ShutdownToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }
}
