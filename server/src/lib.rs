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

//! Asynchronous TCP Buffering Server
//!
//! This crate provides a reusable networking primitive: a TCP server that
//! accepts connections, accumulates the text each client sends into a
//! per-connection buffer, and notifies observers of lifecycle events.
//!
//! - One task per connection plus one accept task
//! - A single cancellation signal shared by every task
//! - Guaranteed per-connection event order and buffer cleanup
//! - Runtime subscription to events via handlers or channels
//!
//! No framing is applied: buffers hold the raw received text.
//!
//! # Architecture
//!
//! ```text
//! TcpBufferServer (lifecycle, cancellation)
//!     ↓
//! AcceptLoop → EventHub
//!     ↓
//! ReceiveLoop → ConnectionRegistry
//! ```
//!
//! # Example
//!
//! ```no_run
//! use bytehub_server::{ConnectionId, ServerConfig, ServerHandler, TcpBufferServer};
//! use async_trait::async_trait;
//! use std::net::Ipv4Addr;
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl ServerHandler for Printer {
//!     async fn on_receive(&self, id: ConnectionId, chunk: &str, accumulated: &str) {
//!         println!("{id} sent {chunk:?}, buffer is now {accumulated:?}");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = TcpBufferServer::new(ServerConfig::default())?;
//!     server.subscribe(Arc::new(Printer));
//!     server.start(Ipv4Addr::UNSPECIFIED, 8080).await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod decode;
mod error;
mod event;
mod hub;
mod metrics;
mod receiver;
mod registry;
mod server;
mod types;

pub use config::ServerConfig;
pub use decode::Utf8Decoder;
pub use error::{Result, ServerError};
pub use event::{CallbackHandler, ChannelHandler, ServerEvent, ServerHandler};
pub use hub::{EventHub, SubscriptionId};
pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use receiver::{ReceiveConfig, ReceiveLoop};
pub use registry::{BufferRegistry, ConnectionRegistry};
pub use server::TcpBufferServer;
pub use types::{ConnectionId, ServerSnapshot, ServerState};
