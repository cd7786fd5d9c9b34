//! Connection manager: owns the websocket link to the lesson backend.
//!
//! One spawned task is the only code that ever touches the socket, so
//! connect attempts are serialized by construction. The session loop
//! consumes parsed inbound messages and lifecycle events from a channel;
//! a `watch` stream mirrors the up/down status for anyone else.

use crate::protocol::{ClientMessage, ServerMessage};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection retry budget exhausted after {0} attempts")]
    RetryBudgetExhausted(u32),
    #[error("cannot send while disconnected")]
    NotConnected,
}

/// Events surfaced to the session loop.
#[derive(Debug)]
pub enum ConnectionEvent {
    Message(ServerMessage),
    StatusChanged(bool),
    /// The retry budget is exhausted; emitted exactly once, after which the
    /// connection task stops.
    Fatal(ConnectionError),
}

/// Bounded, fixed-delay retry schedule for the websocket link.
///
/// The budget counts reconnect attempts after a drop; a successful open
/// resets it.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            attempts: 0,
        }
    }

    /// A connection was established; the budget starts over.
    pub fn on_open(&mut self) {
        self.attempts = 0;
    }

    /// A connect attempt failed or the link dropped.
    pub fn on_failure(&mut self) -> RetryDecision {
        self.attempts += 1;
        if self.attempts > self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::RetryAfter(self.delay)
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub endpoint: String,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

#[derive(Debug)]
enum Command {
    Send(ClientMessage),
    Disconnect,
}

/// Handle to the connection task.
pub struct ConnectionManager {
    cmd_tx: mpsc::Sender<Command>,
    status_rx: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl ConnectionManager {
    /// Spawns the connection task. Returns the handle and the inbound
    /// event stream.
    pub fn connect(config: ConnectionConfig) -> (Self, mpsc::Receiver<ConnectionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (status_tx, status_rx) = watch::channel(false);
        let task = tokio::spawn(run_connection(config, cmd_rx, event_tx, status_tx));
        (
            Self {
                cmd_tx,
                status_rx,
                task,
            },
            event_rx,
        )
    }

    pub fn is_connected(&self) -> bool {
        *self.status_rx.borrow()
    }

    /// Boolean connection-status stream.
    pub fn status_stream(&self) -> watch::Receiver<bool> {
        self.status_rx.clone()
    }

    /// Sends a message over the live link. While disconnected this is a
    /// no-op: the message is dropped with a warning, never queued for
    /// replay.
    pub async fn send(&self, msg: ClientMessage) -> Result<(), ConnectionError> {
        if !self.is_connected() {
            warn!("dropping outbound message: not connected");
            return Err(ConnectionError::NotConnected);
        }
        self.cmd_tx
            .send(Command::Send(msg))
            .await
            .map_err(|_| ConnectionError::NotConnected)
    }

    /// Closes the link and ends the connection task. Idempotent.
    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect).await;
    }

    /// Hard-stops the connection task. Only for teardown paths where the
    /// graceful close cannot complete.
    pub fn abort(&self) {
        self.task.abort();
    }
}

async fn run_connection(
    config: ConnectionConfig,
    mut cmd_rx: mpsc::Receiver<Command>,
    event_tx: mpsc::Sender<ConnectionEvent>,
    status_tx: watch::Sender<bool>,
) {
    let mut retry = RetryPolicy::new(config.max_reconnect_attempts, config.reconnect_delay);

    'reconnect: loop {
        info!(endpoint = %config.endpoint, "connecting to lesson backend");
        let ws_stream = match connect_async(config.endpoint.as_str()).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                warn!(error = %e, "websocket connect failed");
                match retry.on_failure() {
                    RetryDecision::RetryAfter(delay) => {
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    RetryDecision::GiveUp => {
                        give_up(&event_tx, retry.attempts()).await;
                        break;
                    }
                }
            }
        };

        retry.on_open();
        let _ = status_tx.send(true);
        let _ = event_tx.send(ConnectionEvent::StatusChanged(true)).await;
        info!("connection established");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        loop {
            tokio::select! {
                Some(cmd) = cmd_rx.recv() => match cmd {
                    Command::Send(msg) => {
                        let text = match serde_json::to_string(&msg) {
                            Ok(text) => text,
                            Err(e) => {
                                error!(error = %e, "failed to serialize outbound message");
                                continue;
                            }
                        };
                        if let Err(e) = ws_tx.send(WsMessage::Text(text.into())).await {
                            warn!(error = %e, "send failed; treating link as dropped");
                            break;
                        }
                    }
                    Command::Disconnect => {
                        let _ = ws_tx.send(WsMessage::Close(None)).await;
                        let _ = status_tx.send(false);
                        let _ = event_tx.send(ConnectionEvent::StatusChanged(false)).await;
                        info!("disconnected by request");
                        break 'reconnect;
                    }
                },
                inbound = ws_rx.next() => match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(parsed) => {
                                if event_tx.send(ConnectionEvent::Message(parsed)).await.is_err() {
                                    // Session is gone; nothing left to do.
                                    break 'reconnect;
                                }
                            }
                            Err(e) => warn!(error = %e, "dropping unparseable frame"),
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket receive error");
                        break;
                    }
                },
            }
        }

        // The link dropped without a local disconnect request.
        let _ = status_tx.send(false);
        let _ = event_tx.send(ConnectionEvent::StatusChanged(false)).await;
        match retry.on_failure() {
            RetryDecision::RetryAfter(delay) => {
                warn!(attempt = retry.attempts(), "connection lost, retrying");
                tokio::time::sleep(delay).await;
            }
            RetryDecision::GiveUp => {
                give_up(&event_tx, retry.attempts()).await;
                break;
            }
        }
    }

    let _ = status_tx.send(false);
}

async fn give_up(event_tx: &mpsc::Sender<ConnectionEvent>, attempts: u32) {
    let err = ConnectionError::RetryBudgetExhausted(attempts);
    error!(%err, "giving up on the lesson backend");
    let _ = event_tx.send(ConnectionEvent::Fatal(err)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_allows_exactly_the_budget() {
        let mut policy = RetryPolicy::new(3, Duration::from_millis(100));
        for _ in 0..3 {
            assert_eq!(
                policy.on_failure(),
                RetryDecision::RetryAfter(Duration::from_millis(100))
            );
        }
        assert_eq!(policy.on_failure(), RetryDecision::GiveUp);
    }

    #[test]
    fn test_retry_policy_resets_on_open() {
        let mut policy = RetryPolicy::new(2, Duration::from_millis(50));
        policy.on_failure();
        policy.on_failure();
        policy.on_open();
        assert_eq!(policy.attempts(), 0);
        assert_eq!(
            policy.on_failure(),
            RetryDecision::RetryAfter(Duration::from_millis(50))
        );
    }

    #[test]
    fn test_zero_budget_gives_up_on_first_failure() {
        let mut policy = RetryPolicy::new(0, Duration::from_millis(50));
        assert_eq!(policy.on_failure(), RetryDecision::GiveUp);
    }
}
