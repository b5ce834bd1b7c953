//! Upstream connection task
//!
//! Owns the physical WebSocket exclusively. The task cycles through
//! connect → serve → backoff: on connect it replays the registry's live
//! channel set (the same code path serves initial subscription and
//! resubscription-on-reconnect), while serving it multiplexes inbound
//! frames, bridge commands, and keepalive probes in one `select!` loop.
//! Any failure lands in the backoff wait, which still answers shutdown so
//! no retry timer outlives the bridge.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::backoff::BackoffPolicy;
use crate::channel::Event;
use crate::config::BridgeConfig;
use crate::registry::SubscriptionRegistry;

use super::frame::{classify, TrackAddressFrame, WantFrame};
use super::{ConnectionState, FeedCommand};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Sleep horizon used to park an inactive deadline without overflowing
/// `Instant + Duration` arithmetic.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Handle to the upstream connection task
///
/// Cheap command/status plumbing; the WebSocket itself never leaves the
/// background task.
pub struct FeedConnection {
    cmd_tx: mpsc::Sender<FeedCommand>,
    status_rx: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl FeedConnection {
    /// Spawn the connection task.
    ///
    /// Decoded events flow out through `events_tx` to the dispatcher; the
    /// registry is read back on every (re)connect to replay subscriptions.
    pub(crate) fn spawn(
        config: BridgeConfig,
        registry: Arc<SubscriptionRegistry>,
        events_tx: mpsc::Sender<Event>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (status_tx, status_rx) = watch::channel(ConnectionState::Disconnected);
        let backoff = BackoffPolicy::new(config.backoff_base, config.backoff_max);

        let task = ConnectionTask {
            config,
            registry,
            events_tx,
            cmd_rx,
            status_tx,
            backoff,
        };

        Self {
            cmd_tx,
            status_rx,
            task: tokio::spawn(task.run()),
        }
    }

    /// Ask the task to re-declare the full simple-channel set
    pub(crate) async fn sync_want(&self) {
        let _ = self.cmd_tx.send(FeedCommand::SyncWant).await;
    }

    /// Ask the task to declare a newly tracked address
    pub(crate) async fn track(&self, address: String) {
        let _ = self.cmd_tx.send(FeedCommand::Track(address)).await;
    }

    /// Stop the task, closing the link and canceling any retry timer
    pub(crate) async fn shutdown(&self) {
        let _ = self.cmd_tx.send(FeedCommand::Shutdown).await;
    }

    /// Current connection state snapshot
    pub(crate) fn status(&self) -> ConnectionState {
        self.status_rx.borrow().clone()
    }

    /// Watch receiver for connection state changes
    pub(crate) fn watch_status(&self) -> watch::Receiver<ConnectionState> {
        self.status_rx.clone()
    }
}

impl Drop for FeedConnection {
    fn drop(&mut self) {
        // Shutdown signal so the task does not keep reconnecting after the
        // bridge is gone; if the command channel is full, abort outright.
        if self.cmd_tx.try_send(FeedCommand::Shutdown).is_err() {
            self.task.abort();
        }
    }
}

/// Why the serve loop exited
enum Exit {
    /// Shutdown was requested; stop for good
    Shutdown,
    /// The link failed; enter backoff and reconnect
    Failed,
}

struct ConnectionTask {
    config: BridgeConfig,
    registry: Arc<SubscriptionRegistry>,
    events_tx: mpsc::Sender<Event>,
    cmd_rx: mpsc::Receiver<FeedCommand>,
    status_tx: watch::Sender<ConnectionState>,
    backoff: BackoffPolicy,
}

impl ConnectionTask {
    async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            self.set_state(ConnectionState::Connecting);

            match self.establish().await {
                Ok(mut ws) => {
                    self.set_state(ConnectionState::Connected);
                    let connected_at = Instant::now();

                    match self.serve(&mut ws).await {
                        Exit::Shutdown => {
                            let _ = ws.close(None).await;
                            self.set_state(ConnectionState::Disconnected);
                            return;
                        }
                        Exit::Failed => {
                            // A link that survived the grace period was
                            // stable; start the backoff curve over.
                            if connected_at.elapsed() >= self.config.stability_grace {
                                attempt = 0;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %self.config.ws_url, error = %e, "Upstream connect failed");
                }
            }

            let delay = self.backoff.next_delay(attempt);
            attempt = attempt.saturating_add(1);
            tracing::info!(attempt = attempt, delay_ms = delay.as_millis() as u64, "Reconnecting after backoff");
            self.set_state(ConnectionState::Backoff { attempt, delay });

            if !self.wait_backoff(delay).await {
                self.set_state(ConnectionState::Disconnected);
                return;
            }
        }
    }

    /// Open the transport and replay the registry's live channel set.
    ///
    /// Replay makes a reconnect invisible to consumers apart from a
    /// possible delivery gap: whatever the registry says is live right now
    /// is declared upstream before the first frame is read.
    async fn establish(&self) -> Result<WsStream, tokio_tungstenite::tungstenite::Error> {
        tracing::debug!(url = %self.config.ws_url, "Opening upstream connection");
        let (mut ws, _) = connect_async(&self.config.ws_url).await?;

        let simple = self.registry.live_simple_names().await;
        if !simple.is_empty() {
            ws.send(Message::Text(WantFrame::new(simple).to_text().into()))
                .await?;
        }
        for address in self.registry.live_addresses().await {
            ws.send(Message::Text(TrackAddressFrame::new(address).to_text().into()))
                .await?;
        }

        let channels = self.registry.channel_count().await;
        tracing::info!(channels, "Upstream connected, subscriptions replayed");
        Ok(ws)
    }

    /// Serve one live connection until it fails or shutdown is requested
    async fn serve(&mut self, ws: &mut WsStream) -> Exit {
        let keepalive = self.config.keepalive_interval;
        let mut awaiting_pong = false;
        let mut idle_deadline = TokioInstant::now() + keepalive;
        let mut pong_deadline = TokioInstant::now() + FAR_FUTURE;

        loop {
            let idle_sleep = tokio::time::sleep_until(idle_deadline);
            tokio::pin!(idle_sleep);
            let pong_sleep = tokio::time::sleep_until(pong_deadline);
            tokio::pin!(pong_sleep);

            tokio::select! {
                biased;

                // No frame arrived within the window after our ping.
                _ = &mut pong_sleep, if awaiting_pong => {
                    tracing::warn!(
                        timeout = ?self.config.keepalive_timeout,
                        "Keepalive timed out, treating connection as dead"
                    );
                    return Exit::Failed;
                }

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(FeedCommand::SyncWant) => {
                        let simple = self.registry.live_simple_names().await;
                        let text = WantFrame::new(simple).to_text();
                        if let Err(e) = ws.send(Message::Text(text.into())).await {
                            tracing::warn!(error = %e, "Failed to send want frame");
                            return Exit::Failed;
                        }
                    }
                    Some(FeedCommand::Track(address)) => {
                        let text = TrackAddressFrame::new(address).to_text();
                        if let Err(e) = ws.send(Message::Text(text.into())).await {
                            tracing::warn!(error = %e, "Failed to send track-address frame");
                            return Exit::Failed;
                        }
                    }
                    Some(FeedCommand::Shutdown) | None => return Exit::Shutdown,
                },

                // Idle too long: probe liveness.
                _ = &mut idle_sleep, if !awaiting_pong => {
                    if let Err(e) = ws.send(Message::Ping(Bytes::new())).await {
                        tracing::warn!(error = %e, "Keepalive ping failed");
                        return Exit::Failed;
                    }
                    awaiting_pong = true;
                    pong_deadline = TokioInstant::now() + self.config.keepalive_timeout;
                    idle_deadline = TokioInstant::now() + keepalive;
                }

                frame = ws.next() => {
                    // Any inbound frame proves the link is alive.
                    idle_deadline = TokioInstant::now() + keepalive;
                    if awaiting_pong {
                        awaiting_pong = false;
                        pong_deadline = TokioInstant::now() + FAR_FUTURE;
                    }

                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if !self.dispatch_text(&text).await {
                                // Dispatcher gone means the bridge is gone.
                                return Exit::Shutdown;
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = ws.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Pong(_))) => {}
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(frame = ?frame, "Upstream closed the connection");
                            return Exit::Failed;
                        }
                        Some(Ok(_)) => {} // binary and raw frames are not part of the feed
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "Upstream transport error");
                            return Exit::Failed;
                        }
                        None => {
                            tracing::warn!("Upstream stream ended");
                            return Exit::Failed;
                        }
                    }
                }
            }
        }
    }

    /// Decode one text frame and hand it to the dispatcher.
    ///
    /// Malformed or unrecognized frames are discarded and logged, never
    /// fatal to the connection. Returns `false` only when the dispatcher
    /// has gone away.
    async fn dispatch_text(&self, text: &str) -> bool {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => match classify(&value) {
                Some(channel) => {
                    tracing::trace!(channel = %channel, "Decoded upstream event");
                    self.events_tx.send(Event::new(channel, value)).await.is_ok()
                }
                None => {
                    tracing::debug!("Ignoring frame for unrecognized channel");
                    true
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed upstream frame");
                true
            }
        }
    }

    /// Wait out the backoff delay while still answering commands.
    ///
    /// Sync/track commands arriving here are absorbed: the registry already
    /// holds the change and the connect path replays it. Returns `false` on
    /// shutdown.
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(FeedCommand::Shutdown) | None => return false,
                    Some(FeedCommand::SyncWant) | Some(FeedCommand::Track(_)) => {}
                },

                _ = &mut sleep => return true,
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        tracing::debug!(state = %state, "Connection state changed");
        self.status_tx.send_replace(state);
    }
}
