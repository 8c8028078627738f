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

//! Receive loop implementation
//!
//! The ReceiveLoop owns a single connection for its whole lifetime:
//! - Registers the connection's buffer and publishes Connected before the
//!   first read
//! - Reads, decodes and appends each chunk, publishing Received
//! - Stops on end-of-stream, read failure, timeout or cancellation
//! - Publishes Disconnected exactly once, then removes the buffer

use crate::{
    BufferRegistry, ConnectionId, EventHub, Result, ServerConfig, ServerError, ServerMetrics,
    Utf8Decoder,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

/// Receive loop configuration
#[derive(Debug, Clone)]
pub struct ReceiveConfig {
    /// Read buffer size (max bytes per chunk)
    pub read_buffer_size: usize,
    /// Read timeout (None waits forever)
    pub read_timeout: Option<Duration>,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 1024,
            read_timeout: None,
        }
    }
}

impl From<&ServerConfig> for ReceiveConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            read_buffer_size: config.read_buffer_size,
            read_timeout: config.read_timeout,
        }
    }
}

/// Per-connection receive loop
///
/// Generic over the transport so it can run on a `TcpStream` or on any
/// in-memory stream in tests.
pub struct ReceiveLoop<S> {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    stream: S,
    registry: Arc<dyn BufferRegistry>,
    hub: Arc<EventHub>,
    metrics: Arc<ServerMetrics>,
    cancel: CancellationToken,
    config: ReceiveConfig,
    decoder: Utf8Decoder,
}

impl<S> ReceiveLoop<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a receive loop with default configuration
    pub fn new(
        id: ConnectionId,
        stream: S,
        registry: Arc<dyn BufferRegistry>,
        hub: Arc<EventHub>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer_addr: None,
            stream,
            registry,
            hub,
            metrics: Arc::new(ServerMetrics::new()),
            cancel,
            config: ReceiveConfig::default(),
            decoder: Utf8Decoder::new(),
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: ReceiveConfig) -> Self {
        self.config = config;
        self
    }

    /// Publish Connected for `peer_addr` before the first read
    pub fn with_peer_addr(mut self, peer_addr: SocketAddr) -> Self {
        self.peer_addr = Some(peer_addr);
        self
    }

    /// Record into a shared metrics instance
    pub fn with_metrics(mut self, metrics: Arc<ServerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Get the connection ID
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Run the loop until the connection ends
    ///
    /// Never fails. Every fault is published as an Error event and is
    /// followed by Disconnected.
    #[instrument(name = "receive_loop", skip(self), fields(connection_id = %self.id))]
    pub async fn run(mut self) {
        let started = Instant::now();
        self.metrics.connection_opened();
        self.registry.register(self.id);
        debug!("Connection registered");

        if let Some(peer_addr) = self.peer_addr {
            self.hub.connected(self.id, peer_addr).await;
        }

        if let Err(e) = self.receive().await {
            if matches!(e, ServerError::Cancelled) {
                debug!("Receive cancelled");
            } else {
                warn!(error = %e, "Receive failed");
                self.metrics.read_error();
            }
            self.hub.error(Some(self.id), &e).await;
            // The stream is dropped below regardless of how shutdown goes.
            let _ = self.stream.shutdown().await;
        }

        self.hub.disconnected(self.id).await;
        self.registry.remove(self.id);
        self.metrics.connection_closed(started.elapsed());
        debug!(duration = ?started.elapsed(), "Connection removed");
    }

    /// Read until end-of-stream or failure
    async fn receive(&mut self) -> Result<()> {
        let mut buffer = vec![0u8; self.config.read_buffer_size];
        loop {
            let count = select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ServerError::Cancelled),
                read = read_chunk(&mut self.stream, &mut buffer, self.config.read_timeout) => read?,
            };

            if count == 0 {
                trace!("End of stream");
                if let Some(tail) = self.decoder.finish() {
                    self.deliver(&tail).await?;
                }
                return Ok(());
            }

            self.metrics.chunk_received(count as u64);
            let chunk = self.decoder.decode(&buffer[..count]);
            if !chunk.is_empty() {
                self.deliver(&chunk).await?;
            }
        }
    }

    /// Append a decoded chunk and publish it
    async fn deliver(&self, chunk: &str) -> Result<()> {
        let accumulated = self
            .registry
            .try_append(self.id, chunk)
            .ok_or(ServerError::RegistryState(self.id))?;
        trace!(bytes = chunk.len(), total = accumulated.len(), "Chunk appended");
        self.hub.received(self.id, chunk, &accumulated).await;
        Ok(())
    }
}

/// Read a single chunk, honouring the optional read timeout
async fn read_chunk<S>(stream: &mut S, buffer: &mut [u8], limit: Option<Duration>) -> Result<usize>
where
    S: AsyncRead + Unpin,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, stream.read(buffer)).await {
            Ok(read) => Ok(read?),
            Err(_) => Err(ServerError::Timeout),
        },
        None => Ok(stream.read(buffer).await?),
    }
}

impl<S> std::fmt::Debug for ReceiveLoop<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiveLoop")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
