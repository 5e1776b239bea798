//! WebSocket connection with state management and auto-reconnect.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anochat_shared::{ClientCommand, ServerEvent};
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::lock;
use crate::ws::bus::{EventBus, SocketEvent};

/// Connection state of the realtime socket.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of connect attempts per outage
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 1.5,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay before the given (zero-based) retry attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis((delay as u64).min(self.max_delay_ms as u64))
    }
}

/// Cheap cloneable handle for emitting commands on the socket.
#[derive(Clone)]
pub struct SocketHandle {
    sender: UnboundedSender<ClientCommand>,
    state: watch::Receiver<ConnectionState>,
}

impl SocketHandle {
    /// Queue a command for the write task.
    ///
    /// Fails fast while the socket is not connected; nothing is buffered
    /// across outages, the caller surfaces the error to the user.
    pub fn send(&self, command: ClientCommand) -> Result<(), ClientError> {
        if !self.state.borrow().is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.sender
            .unbounded_send(command)
            .map_err(|_| ClientError::NotConnected)
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }
}

/// Owns the single realtime socket; exactly one exists per session.
///
/// All inbound frames are decoded and forwarded verbatim to the
/// [`EventBus`]; no business logic lives in this layer.
pub struct SocketConnection {
    config: ClientConfig,
    reconnect_config: ReconnectConfig,
    bus: Arc<EventBus>,
    sender: UnboundedSender<ClientCommand>,
    /// Shared with the write task of whichever socket is currently live, so
    /// the command channel survives reconnects.
    receiver: Arc<tokio::sync::Mutex<UnboundedReceiver<ClientCommand>>>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    inner: Mutex<ConnInner>,
}

#[derive(Default)]
struct ConnInner {
    connecting: bool,
    task: Option<JoinHandle<()>>,
}

impl SocketConnection {
    pub fn new(config: ClientConfig, reconnect_config: ReconnectConfig, bus: Arc<EventBus>) -> Self {
        let (sender, receiver) = unbounded();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            reconnect_config,
            bus,
            sender,
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
            state_tx: Arc::new(state_tx),
            state_rx,
            inner: Mutex::new(ConnInner::default()),
        }
    }

    /// Get a handle for sending commands.
    pub fn handle(&self) -> SocketHandle {
        SocketHandle {
            sender: self.sender.clone(),
            state: self.state_rx.clone(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state_rx.borrow().is_connected()
    }

    /// Open the socket, authenticating with the given bearer token.
    ///
    /// Resolves once the handshake completes. A call while connected, or
    /// while another attempt is in flight, is a logged no-op; concurrent
    /// calls never open a second socket. Fails after the configured attempt
    /// budget, or immediately when the server rejects the token.
    pub async fn connect(&self, token: &str) -> Result<(), ClientError> {
        let ready_rx = {
            let mut inner = lock(&self.inner);
            if self.is_connected() {
                info!("socket already connected");
                return Ok(());
            }
            if inner.connecting || self.state().is_connecting() {
                info!("socket connect already in flight");
                return Ok(());
            }
            if let Some(task) = inner.task.take() {
                task.abort();
            }
            inner.connecting = true;

            let (ready_tx, ready_rx) = oneshot::channel();
            let run = RunLoop {
                url: self.config.socket_url_with_token(token),
                reconnect_config: self.reconnect_config.clone(),
                bus: Arc::clone(&self.bus),
                receiver: Arc::clone(&self.receiver),
                state: Arc::clone(&self.state_tx),
                ready: Some(ready_tx),
            };
            inner.task = Some(tokio::spawn(run.run()));
            ready_rx
        };

        let result = match ready_rx.await {
            Ok(result) => result,
            // The run loop was aborted before the handshake resolved.
            Err(_) => Err(ClientError::ConnectCancelled),
        };
        lock(&self.inner).connecting = false;
        result
    }

    /// Tear down the socket and cancel any in-flight connect attempt.
    /// `is_connected` reports false immediately afterwards.
    pub fn disconnect(&self) {
        let task = {
            let mut inner = lock(&self.inner);
            inner.connecting = false;
            inner.task.take()
        };
        if let Some(task) = task {
            task.abort();
        }
        let previous = self.state_tx.send_replace(ConnectionState::Disconnected);
        if previous.is_connected() {
            self.bus.emit(&SocketEvent::Disconnected);
        }
        info!("socket disconnected");
    }

    #[cfg(test)]
    pub(crate) fn force_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    #[cfg(test)]
    pub(crate) fn take_commands(&self) -> Vec<ClientCommand> {
        let mut receiver = self
            .receiver
            .try_lock()
            .expect("command receiver held by a write task");
        let mut commands = Vec::new();
        while let Ok(Some(command)) = receiver.try_next() {
            commands.push(command);
        }
        commands
    }
}

impl Drop for SocketConnection {
    // Force-close on teardown so the server does not keep an orphaned
    // session alive (what the page-unload hook does for a web client).
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Aborts the wrapped task when dropped, so the read/write tasks of a dead
/// socket never outlive the connection loop that spawned them.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct RunLoop {
    url: String,
    reconnect_config: ReconnectConfig,
    bus: Arc<EventBus>,
    receiver: Arc<tokio::sync::Mutex<UnboundedReceiver<ClientCommand>>>,
    state: Arc<watch::Sender<ConnectionState>>,
    ready: Option<oneshot::Sender<Result<(), ClientError>>>,
}

impl RunLoop {
    async fn run(mut self) {
        let mut attempt = 0u32;

        loop {
            if attempt == 0 {
                self.state.send_replace(ConnectionState::Connecting);
            } else {
                self.state
                    .send_replace(ConnectionState::Reconnecting { attempt });
            }

            match connect_async(self.url.as_str()).await {
                Ok((stream, _response)) => {
                    info!("socket connected");
                    self.state.send_replace(ConnectionState::Connected);
                    attempt = 0;
                    if let Some(ready) = self.ready.take() {
                        let _ = ready.send(Ok(()));
                    }
                    self.bus.emit(&SocketEvent::Connected);

                    let (mut write, mut read) = stream.split();

                    // Channel to signal when the connection closes
                    let (close_tx, mut close_rx) = tokio::sync::mpsc::unbounded_channel::<()>();

                    // Read task: decode frames and fan them out
                    let bus = Arc::clone(&self.bus);
                    let close_for_read = close_tx.clone();
                    let read_task = AbortOnDrop(tokio::spawn(async move {
                        while let Some(frame) = read.next().await {
                            match frame {
                                Ok(Message::Text(text)) => {
                                    match serde_json::from_str::<ServerEvent>(text.as_str()) {
                                        Ok(event) => bus.emit(&SocketEvent::Event(event)),
                                        Err(err) => {
                                            warn!("dropping unrecognized frame: {err}");
                                        }
                                    }
                                }
                                Ok(Message::Close(_)) => {
                                    debug!("close frame received");
                                    break;
                                }
                                Ok(Message::Ping(_)) => {
                                    // Pong is handled by tungstenite
                                }
                                Ok(_) => {
                                    // Ignore binary, pong, etc.
                                }
                                Err(err) => {
                                    error!("socket read error: {err}");
                                    break;
                                }
                            }
                        }
                        let _ = close_for_read.send(());
                    }));

                    // Write task: drain the shared command channel
                    let receiver = Arc::clone(&self.receiver);
                    let write_task = AbortOnDrop(tokio::spawn(async move {
                        loop {
                            let command = {
                                let mut rx = receiver.lock().await;
                                rx.next().await
                            };
                            match command {
                                Some(command) => match serde_json::to_string(&command) {
                                    Ok(json) => {
                                        debug!("sending: {json}");
                                        if let Err(err) = write.send(Message::text(json)).await {
                                            error!("socket send failed: {err}");
                                            break;
                                        }
                                    }
                                    Err(err) => {
                                        error!("command serialize failed: {err}");
                                    }
                                },
                                None => {
                                    debug!("command channel closed, stopping write task");
                                    break;
                                }
                            }
                        }
                        let _ = close_tx.send(());
                    }));

                    // Wait for the connection to close
                    close_rx.recv().await;
                    drop(read_task);
                    drop(write_task);
                    info!("socket closed");
                    self.state.send_replace(ConnectionState::Disconnected);
                    self.bus.emit(&SocketEvent::Disconnected);
                }
                Err(err) => {
                    if is_auth_rejection(&err) {
                        warn!("socket handshake rejected: unauthorized");
                        self.state.send_replace(ConnectionState::Failed {
                            reason: "unauthorized".to_string(),
                        });
                        self.bus.emit(&SocketEvent::Event(ServerEvent::Error {
                            message: "unauthorized".to_string(),
                        }));
                        if let Some(ready) = self.ready.take() {
                            let _ = ready.send(Err(ClientError::Unauthorized));
                        }
                        return;
                    }

                    error!("socket connect error: {err}");
                    attempt += 1;
                    if attempt >= self.reconnect_config.max_attempts {
                        let reason = format!("connection failed after {attempt} attempts");
                        self.state.send_replace(ConnectionState::Failed {
                            reason: reason.clone(),
                        });
                        self.bus
                            .emit(&SocketEvent::Event(ServerEvent::Error { message: reason }));
                        if let Some(ready) = self.ready.take() {
                            let _ = ready.send(Err(ClientError::ConnectFailed { attempts: attempt }));
                        }
                        return;
                    }

                    let delay = self.reconnect_config.delay_for_attempt(attempt - 1);
                    debug!("retrying connect in {delay:?} (attempt {attempt})");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// A handshake rejected with 401/403 means the token is bad; retrying with
/// the same token would loop forever.
fn is_auth_rejection(err: &tungstenite::Error) -> bool {
    match err {
        tungstenite::Error::Http(response) => {
            matches!(response.status().as_u16(), 401 | 403)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delays_are_nondecreasing_and_capped() {
        let config = ReconnectConfig::default();
        let mut previous = Duration::ZERO;
        for attempt in 0..10 {
            let delay = config.delay_for_attempt(attempt);
            assert!(delay >= previous, "delay shrank at attempt {attempt}");
            assert!(delay <= Duration::from_millis(config.max_delay_ms as u64));
            previous = delay;
        }
    }

    #[test]
    fn first_retry_waits_the_initial_delay() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(1000));
    }

    #[test]
    fn state_predicates() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(ConnectionState::Connecting.is_connecting());
        assert!(ConnectionState::Reconnecting { attempt: 2 }.is_connecting());
        assert!(!ConnectionState::Disconnected.is_connecting());
    }
}
