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

//! Lifecycle events and the handler traits that observe them

use crate::{ConnectionId, ServerError};
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// A published lifecycle fact
///
/// For a single connection the order is always `Connected`, zero or more
/// `Received`, then exactly one `Disconnected`. No order is promised between
/// different connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A client connection was accepted
    Connected {
        /// Connection ID
        id: ConnectionId,
        /// Remote address of the client
        peer_addr: SocketAddr,
    },
    /// A chunk of text was received and appended to the connection buffer
    Received {
        /// Connection ID
        id: ConnectionId,
        /// The newly received chunk
        chunk: String,
        /// Everything received on this connection so far
        accumulated: String,
    },
    /// A fault was observed
    Error {
        /// Connection the fault belongs to, `None` for listener faults
        id: Option<ConnectionId>,
        /// Description of the failure
        error: String,
    },
    /// A connection's receive loop terminated
    Disconnected {
        /// Connection ID
        id: ConnectionId,
    },
    /// The accept loop exited
    Stopped,
}

impl ServerEvent {
    /// Get the connection this event belongs to, if any
    pub fn connection_id(&self) -> Option<ConnectionId> {
        match self {
            ServerEvent::Connected { id, .. }
            | ServerEvent::Received { id, .. }
            | ServerEvent::Disconnected { id } => Some(*id),
            ServerEvent::Error { id, .. } => *id,
            ServerEvent::Stopped => None,
        }
    }
}

/// Server event handler trait
///
/// Implement this trait to observe the server. All methods are async and
/// have default implementations that do nothing. Handlers are awaited in
/// turn by the publishing task, so a slow handler delays that task.
///
/// # Example
///
/// ```no_run
/// use bytehub_server::{ConnectionId, ServerHandler};
/// use async_trait::async_trait;
///
/// struct MyHandler;
///
/// #[async_trait]
/// impl ServerHandler for MyHandler {
///     async fn on_receive(&self, id: ConnectionId, chunk: &str, _accumulated: &str) {
///         println!("{id}: {chunk}");
///     }
/// }
/// ```
#[async_trait]
pub trait ServerHandler: Send + Sync + 'static {
    /// Called when a new connection is accepted, before any data is read
    async fn on_connect(&self, _id: ConnectionId, _peer_addr: SocketAddr) {}

    /// Called after each chunk is appended to the connection buffer
    async fn on_receive(&self, _id: ConnectionId, _chunk: &str, _accumulated: &str) {}

    /// Called when a connection or the listener fails
    ///
    /// For connection faults the connection is closed after this returns.
    async fn on_error(&self, _id: Option<ConnectionId>, _error: &ServerError) {}

    /// Called exactly once when a connection's receive loop ends
    async fn on_disconnect(&self, _id: ConnectionId) {}

    /// Called exactly once when the accept loop exits
    async fn on_stopped(&self) {}
}

type ConnectCallback = Box<dyn Fn(ConnectionId, SocketAddr) + Send + Sync + 'static>;
type ReceiveCallback = Box<dyn Fn(ConnectionId, &str, &str) + Send + Sync + 'static>;
type ErrorCallback = Box<dyn Fn(Option<ConnectionId>, &ServerError) + Send + Sync + 'static>;
type DisconnectCallback = Box<dyn Fn(ConnectionId) + Send + Sync + 'static>;
type StoppedCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// Callback-based handler implementation
///
/// This provides a way to observe the server with closures instead of
/// implementing the `ServerHandler` trait.
///
/// # Example
///
/// ```no_run
/// use bytehub_server::CallbackHandler;
/// use std::sync::Arc;
///
/// let handler = Arc::new(CallbackHandler {
///     on_connect: Some(Box::new(|id, peer| {
///         println!("Connection {} established from {}", id, peer);
///     })),
///     on_disconnect: Some(Box::new(|id| {
///         println!("Connection {} closed", id);
///     })),
///     ..Default::default()
/// });
/// ```
#[derive(Default)]
pub struct CallbackHandler {
    /// Called on connection establishment
    pub on_connect: Option<ConnectCallback>,
    /// Called on each received chunk
    pub on_receive: Option<ReceiveCallback>,
    /// Called on error
    pub on_error: Option<ErrorCallback>,
    /// Called on disconnection
    pub on_disconnect: Option<DisconnectCallback>,
    /// Called when the server stops
    pub on_stopped: Option<StoppedCallback>,
}

#[async_trait]
impl ServerHandler for CallbackHandler {
    async fn on_connect(&self, id: ConnectionId, peer_addr: SocketAddr) {
        if let Some(ref f) = self.on_connect {
            f(id, peer_addr);
        }
    }

    async fn on_receive(&self, id: ConnectionId, chunk: &str, accumulated: &str) {
        if let Some(ref f) = self.on_receive {
            f(id, chunk, accumulated);
        }
    }

    async fn on_error(&self, id: Option<ConnectionId>, error: &ServerError) {
        if let Some(ref f) = self.on_error {
            f(id, error);
        }
    }

    async fn on_disconnect(&self, id: ConnectionId) {
        if let Some(ref f) = self.on_disconnect {
            f(id);
        }
    }

    async fn on_stopped(&self) {
        if let Some(ref f) = self.on_stopped {
            f();
        }
    }
}

/// Handler that forwards every event into an unbounded channel
///
/// Events published by one task arrive on the receiver in publication order.
/// Once the receiver is dropped events are discarded.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ChannelHandler {
    /// Create a handler and the receiver its events are delivered to
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: ServerEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

#[async_trait]
impl ServerHandler for ChannelHandler {
    async fn on_connect(&self, id: ConnectionId, peer_addr: SocketAddr) {
        self.forward(ServerEvent::Connected { id, peer_addr });
    }

    async fn on_receive(&self, id: ConnectionId, chunk: &str, accumulated: &str) {
        self.forward(ServerEvent::Received {
            id,
            chunk: chunk.to_string(),
            accumulated: accumulated.to_string(),
        });
    }

    async fn on_error(&self, id: Option<ConnectionId>, error: &ServerError) {
        self.forward(ServerEvent::Error {
            id,
            error: error.to_string(),
        });
    }

    async fn on_disconnect(&self, id: ConnectionId) {
        self.forward(ServerEvent::Disconnected { id });
    }

    async fn on_stopped(&self) {
        self.forward(ServerEvent::Stopped);
    }
}
