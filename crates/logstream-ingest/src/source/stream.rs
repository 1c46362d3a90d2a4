//! Streaming WebSocket source with fixed-delay reconnection.
//!
//! # Lifecycle
//!
//! ```text
//!   ┌──────────────┐  connect   ┌────────────┐ handshake ┌───────────┐
//!   │ Disconnected │ ─────────▶ │ Connecting │ ────────▶ │ Connected │
//!   └──────────────┘            └────────────┘           └───────────┘
//!          ▲   fixed delay            │ error/timeout          │ close/error/
//!          └──────────────────────────┴────────────────────────┘ keepalive timeout
//! ```
//!
//! There is no terminal state; the loop only ends on shutdown or when the
//! router reports that persistence has failed too many times in a row.
//!
//! # Keepalive
//!
//! A ping is sent every `keepalive_interval`. If nothing at all is read from
//! the socket within `keepalive_timeout` of the ping, the session is treated
//! as dead and torn down. Data frames count as a reply: a slow forward
//! target can delay reading the pong, but must not end a healthy session.
//!
//! # Shutdown
//!
//! The shutdown receiver is watched while waiting for a connection, the next
//! frame, and the reconnect delay. It is never observed in the middle of
//! routing a frame, so an in-flight append always finishes first.

use super::SourceStats;
use crate::pipeline::EventRouter;
use crate::{Error, Result};

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use logstream_core::Event;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tracing::{debug, error, info, trace, warn};
use url::Url;

/// Connection descriptor and timing for the upstream stream.
#[derive(Clone)]
pub struct StreamConfig {
    /// WebSocket endpoint, without query parameters.
    pub endpoint: String,

    /// Cluster identifier, sent as the `cid` query parameter.
    pub cluster_id: String,

    /// Bearer token for the `Authorization` header.
    pub access_token: String,

    /// Stream type, sent as the `type` query parameter.
    pub stream_type: String,

    /// Interval between keepalive pings.
    pub keepalive_interval: Duration,

    /// How long to wait for a pong before declaring the session dead.
    pub keepalive_timeout: Duration,

    /// Upper bound for the TCP/TLS/WebSocket handshake.
    pub connect_timeout: Duration,

    /// Fixed delay before every reconnect attempt.
    pub reconnect_delay: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://logstream.proofpoint.com/v1/stream".to_string(),
            cluster_id: String::new(),
            access_token: String::new(),
            stream_type: "message".to_string(),
            keepalive_interval: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for StreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConfig")
            .field("endpoint", &self.endpoint)
            .field("cluster_id", &self.cluster_id)
            .field("access_token", &"<redacted>")
            .field("stream_type", &self.stream_type)
            .field("keepalive_interval", &self.keepalive_interval)
            .field("keepalive_timeout", &self.keepalive_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("reconnect_delay", &self.reconnect_delay)
            .finish()
    }
}

impl StreamConfig {
    /// Check that the descriptor is complete.
    ///
    /// The stream refuses to start without a cluster id and token rather
    /// than connecting anonymously.
    pub fn validate(&self) -> Result<()> {
        if self.cluster_id.trim().is_empty() {
            return Err(Error::Config("cluster id is required".to_string()));
        }
        if self.access_token.trim().is_empty() {
            return Err(Error::Config("access token is required".to_string()));
        }
        if self.stream_type.trim().is_empty() {
            return Err(Error::Config("stream type must not be empty".to_string()));
        }
        for (name, value) in [
            ("keepalive interval", self.keepalive_interval),
            ("keepalive timeout", self.keepalive_timeout),
            ("connect timeout", self.connect_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::Config(format!("{name} must be greater than zero")));
            }
        }
        self.authorization()?;
        self.stream_url()?;
        Ok(())
    }

    /// Full stream URL: `<endpoint>?cid=<cluster_id>&type=<stream_type>`.
    pub fn stream_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("invalid endpoint '{}': {e}", self.endpoint)))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::Config(format!(
                "endpoint must use ws:// or wss://, got '{}'",
                url.scheme()
            )));
        }

        url.query_pairs_mut()
            .append_pair("cid", &self.cluster_id)
            .append_pair("type", &self.stream_type);
        Ok(url)
    }

    fn authorization(&self) -> Result<HeaderValue> {
        HeaderValue::from_str(&format!("Bearer {}", self.access_token))
            .map_err(|_| Error::Config("access token contains invalid characters".to_string()))
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session; waiting to (re)connect.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Session established; frames are being routed.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

/// How a single session ended.
#[derive(Debug)]
enum SessionEnd {
    /// Shutdown was requested.
    Shutdown,
    /// The server closed the stream.
    Closed { code: Option<u16>, reason: String },
    /// Transport error, handshake failure, or keepalive timeout.
    Failed(String),
}

impl SessionEnd {
    fn label(&self) -> &'static str {
        match self {
            Self::Shutdown => "shutdown",
            Self::Closed { .. } => "closed",
            Self::Failed(_) => "error",
        }
    }
}

/// One lifetime of the upstream connection.
struct StreamSession {
    connected_at: DateTime<Utc>,
    opened: Instant,
    frames: u64,
}

impl StreamSession {
    fn open() -> Self {
        Self {
            connected_at: Utc::now(),
            opened: Instant::now(),
            frames: 0,
        }
    }
}

#[derive(Default)]
struct StreamStats {
    frames_received: AtomicU64,
    events_received: AtomicU64,
    frames_rejected: AtomicU64,
    sessions: AtomicU64,
    connect_failures: AtomicU64,
    disconnects: AtomicU64,
}

/// Live stream source.
///
/// Owns at most one session at a time and processes its frames strictly
/// sequentially.
pub struct StreamSource {
    config: StreamConfig,
    stream_url: Url,
    state: watch::Sender<ConnectionState>,
    stats: StreamStats,
}

impl StreamSource {
    /// Create a stream source, validating the connection descriptor.
    pub fn new(config: StreamConfig) -> Result<Self> {
        config.validate()?;
        let stream_url = config.stream_url()?;
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            config,
            stream_url,
            state,
            stats: StreamStats::default(),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Run the connect/receive/reconnect loop until shutdown.
    ///
    /// Shutdown is requested by sending `true` on the channel; dropping the
    /// sender also stops the loop.
    ///
    /// # Errors
    ///
    /// Returns an error only when the router reports that persistence failed
    /// `max_persist_failures` times in a row, or the request cannot be built.
    /// Connection errors are logged and retried.
    pub async fn run(
        &self,
        router: &mut EventRouter,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<SourceStats> {
        info!(
            endpoint = %self.config.endpoint,
            cluster_id = %self.config.cluster_id,
            stream_type = %self.config.stream_type,
            "Starting stream source"
        );
        if self.stream_url.scheme() == "ws" {
            warn!("Stream endpoint is not using TLS");
        }

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            let end = self.run_session(router, &mut shutdown).await;
            self.set_state(ConnectionState::Disconnected);

            match end? {
                SessionEnd::Shutdown => break,
                SessionEnd::Closed { code, reason } => {
                    info!(code = ?code, reason = %reason, "Stream closed by server");
                }
                SessionEnd::Failed(reason) => {
                    warn!(error = %reason, "Stream connection error");
                }
            }

            info!("Reconnecting in {:?}", self.config.reconnect_delay);
            tokio::select! {
                () = tokio::time::sleep(self.config.reconnect_delay) => {}
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
        }

        info!("Stream source stopped");
        Ok(self.stats())
    }

    /// Connect once and route frames until the session ends.
    async fn run_session(
        &self,
        router: &mut EventRouter,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd> {
        let request = self.build_request()?;
        debug!(endpoint = %self.config.endpoint, "Connecting to stream");

        let connect = tokio::time::timeout(self.config.connect_timeout, connect_async(request));
        let ws = tokio::select! {
            result = connect => match result {
                Ok(Ok((ws, response))) => {
                    debug!(status = %response.status(), "WebSocket handshake complete");
                    ws
                }
                Ok(Err(e)) => {
                    self.record_connect_failure();
                    return Ok(SessionEnd::Failed(format!("connect failed: {e}")));
                }
                Err(_) => {
                    self.record_connect_failure();
                    return Ok(SessionEnd::Failed(format!(
                        "connect timed out after {:?}",
                        self.config.connect_timeout
                    )));
                }
            },
            _ = shutdown.wait_for(|stop| *stop) => return Ok(SessionEnd::Shutdown),
        };

        let mut session = StreamSession::open();
        self.stats.sessions.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("stream_connects_total").increment(1);
        self.set_state(ConnectionState::Connected);
        info!(
            connected_at = %session.connected_at.to_rfc3339(),
            "Connected to stream"
        );

        let (mut write, mut read) = ws.split();
        let period = self.config.keepalive_interval;
        let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pong_deadline: Option<Instant> = None;

        let end = 'session: loop {
            let deadline = pong_deadline;
            tokio::select! {
                biased;

                _ = shutdown.wait_for(|stop| *stop) => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(error = %e, "failed to send close frame");
                    }
                    break 'session Ok(SessionEnd::Shutdown);
                }
                frame = read.next() => {
                    // Any inbound frame proves the link is alive
                    if matches!(frame, Some(Ok(_))) {
                        pong_deadline = None;
                    }
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            let event = Event::from_text(text.as_str());
                            if let Err(e) = self.dispatch(router, &mut session, event).await {
                                break 'session Err(e);
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            let event = Event::from_bytes(&data);
                            if let Err(e) = self.dispatch(router, &mut session, event).await {
                                break 'session Err(e);
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            if let Err(e) = write.send(Message::Pong(payload)).await {
                                break 'session Ok(SessionEnd::Failed(format!("failed to answer ping: {e}")));
                            }
                        }
                        Some(Ok(Message::Pong(_))) => trace!("keepalive pong received"),
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = match frame {
                                Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                                None => (None, String::new()),
                            };
                            break 'session Ok(SessionEnd::Closed { code, reason });
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => break 'session Ok(SessionEnd::Failed(e.to_string())),
                        None => {
                            break 'session Ok(SessionEnd::Closed {
                                code: None,
                                reason: "stream ended".to_string(),
                            });
                        }
                    }
                }
                _ = keepalive.tick() => {
                    if pong_deadline.is_none() {
                        if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                            break 'session Ok(SessionEnd::Failed(format!("failed to send ping: {e}")));
                        }
                        trace!("keepalive ping sent");
                        pong_deadline = Some(Instant::now() + self.config.keepalive_timeout);
                    }
                }
                () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    break 'session Ok(SessionEnd::Failed(format!(
                        "no keepalive response within {:?}",
                        self.config.keepalive_timeout
                    )));
                }
            }
        };

        self.stats.disconnects.fetch_add(1, Ordering::Relaxed);
        let label = match &end {
            Ok(end) => end.label(),
            Err(_) => "fatal",
        };
        metrics::counter!("stream_disconnects_total", "reason" => label).increment(1);
        info!(
            connected_at = %session.connected_at.to_rfc3339(),
            duration_secs = session.opened.elapsed().as_secs(),
            frames = session.frames,
            reason = label,
            "Stream session ended"
        );

        end
    }

    /// Route one frame's event. Only exhausted persistence is an error.
    async fn dispatch(
        &self,
        router: &mut EventRouter,
        session: &mut StreamSession,
        event: logstream_core::Result<Event>,
    ) -> Result<()> {
        session.frames += 1;
        self.stats.frames_received.fetch_add(1, Ordering::Relaxed);

        let event = match event {
            Ok(event) => event,
            Err(e) => {
                self.stats.frames_rejected.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("ingest_frames_rejected_total").increment(1);
                warn!(error = %e, "Rejecting stream frame");
                return Ok(());
            }
        };

        self.stats.events_received.fetch_add(1, Ordering::Relaxed);
        match router.handle(event).await {
            Ok(_) => Ok(()),
            Err(e) if router.persistence_exhausted() => {
                error!(
                    failures = router.consecutive_failures(),
                    "Persistence keeps failing, stopping ingestion"
                );
                Err(e)
            }
            // Already logged by the router; the next event retries the log
            Err(_) => Ok(()),
        }
    }

    fn build_request(&self) -> Result<Request> {
        let mut request = self.stream_url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(AUTHORIZATION, self.config.authorization()?);
        Ok(request)
    }

    fn record_connect_failure(&self) {
        self.stats.connect_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("stream_connect_failures_total").increment(1);
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
        }
        metrics::gauge!("stream_connected").set(if state == ConnectionState::Connected {
            1.0
        } else {
            0.0
        });
    }

    /// Snapshot of the source counters.
    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_received: self.stats.frames_received.load(Ordering::Relaxed),
            events_received: self.stats.events_received.load(Ordering::Relaxed),
            frames_rejected: self.stats.frames_rejected.load(Ordering::Relaxed),
            sessions: self.stats.sessions.load(Ordering::Relaxed),
            connect_failures: self.stats.connect_failures.load(Ordering::Relaxed),
            disconnects: self.stats.disconnects.load(Ordering::Relaxed),
        }
    }
}
