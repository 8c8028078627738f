//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Buffering server implementation
//!
//! The TcpBufferServer is the main entry point. It owns the lifecycle state
//! and the cancellation signal, binds the listener, and runs the accept loop
//! that hands every connection to its own receive loop.

use crate::{
    BufferRegistry, ConnectionId, ConnectionRegistry, EventHub, ReceiveConfig, ReceiveLoop,
    Result, ServerConfig, ServerError, ServerHandler, ServerMetrics, ServerSnapshot, ServerState,
    SubscriptionId,
};
use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Asynchronous TCP buffering server
///
/// Accepts connections, accumulates the text each client sends, and
/// publishes lifecycle events through its [`EventHub`]. A server instance
/// runs at most once: after `stop` a fresh instance must be constructed.
///
/// # Example
///
/// ```no_run
/// use bytehub_server::{ServerConfig, TcpBufferServer};
/// use std::net::Ipv4Addr;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = TcpBufferServer::new(ServerConfig::default())?;
///     let (_, mut events) = server.hub().subscribe_channel();
///
///     let addr = server.start(Ipv4Addr::LOCALHOST, 8080).await?;
///     println!("Listening on {addr}");
///
///     if let Some(event) = events.recv().await {
///         println!("{event:?}");
///     }
///
///     server.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct TcpBufferServer {
    /// Server configuration
    config: ServerConfig,
    /// Connection registry shared with every receive loop
    registry: Arc<dyn BufferRegistry>,
    /// Event hub shared with every loop
    hub: Arc<EventHub>,
    /// Server metrics
    metrics: Arc<ServerMetrics>,
    /// Lifecycle state (atomic for lock-free transitions)
    state: Arc<AtomicU8>,
    /// Shared single-shot cancellation signal
    cancel: CancellationToken,
    /// Cancelled once the accept loop has published Stopped
    finished: CancellationToken,
    /// Tracks every spawned receive loop
    tracker: TaskTracker,
    /// Actual bind address
    local_addr: OnceLock<SocketAddr>,
    /// Server construction time
    created_at: Instant,
}

impl TcpBufferServer {
    /// Create a new server with the default registry
    ///
    /// This validates the configuration but does not bind. Call `start()` to
    /// begin accepting connections.
    pub fn new(config: ServerConfig) -> Result<Self> {
        Self::with_registry(config, Arc::new(ConnectionRegistry::new()))
    }

    /// Create a new server with a caller supplied registry
    pub fn with_registry(config: ServerConfig, registry: Arc<dyn BufferRegistry>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry,
            hub: Arc::new(EventHub::new()),
            metrics: Arc::new(ServerMetrics::new()),
            state: Arc::new(AtomicU8::new(ServerState::Created.as_u8())),
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
            tracker: TaskTracker::new(),
            local_addr: OnceLock::new(),
            created_at: Instant::now(),
        })
    }

    /// Bind to `address:port` and start the accept loop
    ///
    /// Returns the actual bound address, which differs from the requested one
    /// when `port` is 0. Binding failures are returned here and never reach
    /// the event hub; no task is spawned in that case.
    pub async fn start(&self, address: impl Into<IpAddr>, port: u16) -> Result<SocketAddr> {
        let state = self.state();
        if state != ServerState::Created {
            return Err(ServerError::InvalidState(state));
        }

        let requested = SocketAddr::new(address.into(), port);
        let listener = TcpListener::bind(requested)
            .await
            .map_err(|source| ServerError::Bind {
                address: requested,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        // A concurrent start or stop may have won while we were binding.
        if let Err(current) = self.transition(ServerState::Created, ServerState::Running) {
            return Err(ServerError::InvalidState(current));
        }
        let _ = self.local_addr.set(local_addr);

        info!(%local_addr, "Buffering server listening");
        tokio::spawn(self.accept_loop(listener).run());

        Ok(local_addr)
    }

    /// Build the accept loop over `listener`, sharing this server's state
    fn accept_loop<L: Acceptor>(&self, listener: L) -> AcceptLoop<L> {
        AcceptLoop {
            listener,
            config: self.config.clone(),
            registry: self.registry.clone(),
            hub: self.hub.clone(),
            metrics: self.metrics.clone(),
            state: self.state.clone(),
            cancel: self.cancel.clone(),
            finished: self.finished.clone(),
            tracker: self.tracker.clone(),
        }
    }

    /// Request shutdown
    ///
    /// Sets the cancellation signal and returns without waiting. Completion
    /// is observed through the Stopped event or `wait()`. Calling this more
    /// than once is a no-op.
    pub fn stop(&self) {
        if self
            .transition(ServerState::Running, ServerState::Stopping)
            .is_ok()
        {
            info!("Stopping buffering server");
            self.cancel.cancel();
        } else if self
            .transition(ServerState::Created, ServerState::Stopped)
            .is_ok()
        {
            debug!("Server stopped before it was started");
            self.cancel.cancel();
            self.tracker.close();
            self.finished.cancel();
        }
    }

    /// Wait for the accept loop to exit
    ///
    /// Returns immediately if the server was never started.
    pub async fn wait(&self) {
        if self.state() == ServerState::Created {
            return;
        }
        self.finished.cancelled().await;
    }

    /// Stop the server and wait for every connection to drain
    ///
    /// Receive loops get up to the configured shutdown timeout to publish
    /// Disconnected and remove their buffers.
    pub async fn shutdown(&self) -> Result<()> {
        self.stop();
        self.wait().await;

        match tokio::time::timeout(self.config.shutdown_timeout, self.tracker.wait()).await {
            Ok(()) => {
                info!("Buffering server shutdown complete");
                Ok(())
            }
            Err(_) => {
                warn!(
                    remaining = self.tracker.len(),
                    "Receive loops did not drain before the shutdown timeout"
                );
                Err(ServerError::Timeout)
            }
        }
    }

    /// Compare-and-swap the lifecycle state
    fn transition(
        &self,
        from: ServerState,
        to: ServerState,
    ) -> std::result::Result<(), ServerState> {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(ServerState::from_u8)
    }

    /// Get the current lifecycle state
    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        self.state() == ServerState::Running
    }

    /// Get the bound address, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Get the number of registered connections
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Subscribe a handler to the server's events
    pub fn subscribe(&self, handler: Arc<dyn ServerHandler>) -> SubscriptionId {
        self.hub.subscribe(handler)
    }

    /// Get the event hub
    pub fn hub(&self) -> Arc<EventHub> {
        self.hub.clone()
    }

    /// Get the connection registry
    pub fn registry(&self) -> Arc<dyn BufferRegistry> {
        self.registry.clone()
    }

    /// Get the server metrics
    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.metrics.clone()
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get a snapshot of the server state
    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            state: self.state(),
            active_connections: self.registry.len(),
            total_connections: self.metrics.total_connections(),
            local_addr: self.local_addr(),
            uptime: self.created_at.elapsed(),
            created_at: self.created_at,
        }
    }
}

impl std::fmt::Debug for TcpBufferServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpBufferServer")
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .field("connection_count", &self.connection_count())
            .field("uptime", &self.created_at.elapsed())
            .finish()
    }
}

impl Drop for TcpBufferServer {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("TcpBufferServer dropped while still running");
            self.stop();
        }
    }
}

/// Source of inbound connections for the accept loop
#[async_trait]
trait Acceptor: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static;

    async fn accept(&mut self) -> io::Result<(Self::Stream, SocketAddr)>;
}

#[async_trait]
impl Acceptor for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// State moved into the accept loop task
struct AcceptLoop<L> {
    listener: L,
    config: ServerConfig,
    registry: Arc<dyn BufferRegistry>,
    hub: Arc<EventHub>,
    metrics: Arc<ServerMetrics>,
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
    finished: CancellationToken,
    tracker: TaskTracker,
}

impl<L: Acceptor> AcceptLoop<L> {
    async fn run(mut self) {
        let receive_config = ReceiveConfig::from(&self.config);

        loop {
            let accepted = select! {
                biased;
                _ = self.cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((socket, peer_addr)) => {
                    if self.registry.len() >= self.config.max_connections {
                        warn!(
                            %peer_addr,
                            "{}",
                            ServerError::MaxConnectionsReached(self.config.max_connections)
                        );
                        self.metrics.connection_rejected();
                        drop(socket);
                        continue;
                    }

                    let id = ConnectionId::next();
                    debug!(connection_id = %id, %peer_addr, "Accepted connection");

                    // The receive loop publishes Connected; nothing here awaits
                    // a subscriber.
                    self.registry.register(id);

                    let receiver = ReceiveLoop::new(
                        id,
                        socket,
                        self.registry.clone(),
                        self.hub.clone(),
                        self.cancel.clone(),
                    )
                    .with_peer_addr(peer_addr)
                    .with_config(receive_config.clone())
                    .with_metrics(self.metrics.clone());
                    self.tracker.spawn(receiver.run());
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    self.metrics.accept_error();
                    self.hub.error(None, &ServerError::Io(e)).await;

                    // Back off on errors to avoid a tight loop
                    select! {
                        biased;
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.accept_backoff) => {}
                    }
                }
            }
        }

        drop(self.listener);
        self.tracker.close();
        info!("Accept loop terminated");

        self.hub.stopped().await;
        self.state
            .store(ServerState::Stopped.as_u8(), Ordering::Release);
        self.finished.cancel();
    }
}
