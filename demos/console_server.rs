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

//! Console Server Example
//!
//! This example hosts a buffering server and prints every lifecycle event
//! to the console:
//! - Listens on `0.0.0.0:8080` unless an address and port are given
//! - Prints connects, disconnects, received chunks and errors
//! - Stops cleanly on Ctrl+C
//!
//! ## Usage
//!
//! Run the server:
//! ```bash
//! cargo run --example console_server -- 127.0.0.1 9000
//! ```
//!
//! Send it some text:
//! ```bash
//! nc localhost 9000
//! ```

use async_trait::async_trait;
use bytehub_server::{ConnectionId, ServerConfig, ServerError, ServerHandler, TcpBufferServer};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let address: IpAddr = match args.next() {
        Some(address) => address.parse()?,
        None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
    };
    let port: u16 = match args.next() {
        Some(port) => port.parse()?,
        None => 8080,
    };

    let server = TcpBufferServer::new(ServerConfig::default())?;
    server.subscribe(Arc::new(ConsoleHandler));

    let addr = server.start(address, port).await?;
    println!("Listening on {addr}...");
    println!("Press Ctrl+C to stop the server\n");

    tokio::signal::ctrl_c().await?;
    println!("Stopping server...");

    server.shutdown().await?;
    println!("Server stopped");

    Ok(())
}

/// Handler that renders events to stdout
struct ConsoleHandler;

#[async_trait]
impl ServerHandler for ConsoleHandler {
    async fn on_connect(&self, id: ConnectionId, peer_addr: SocketAddr) {
        println!("Client connected: {id} from {peer_addr}");
    }

    async fn on_receive(&self, id: ConnectionId, chunk: &str, accumulated: &str) {
        println!(
            "{id} sent {chunk:?} ({} bytes buffered)",
            accumulated.len()
        );
    }

    async fn on_error(&self, id: Option<ConnectionId>, error: &ServerError) {
        match id {
            Some(id) => eprintln!("{id} error: {error}"),
            None => eprintln!("Listener error: {error}"),
        }
    }

    async fn on_disconnect(&self, id: ConnectionId) {
        println!("Client disconnected: {id}");
    }

    async fn on_stopped(&self) {
        println!("Accept loop stopped");
    }
}
