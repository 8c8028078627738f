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

//! Connection lifecycle and buffering tests over real loopback sockets

use bytehub_server::{ConnectionId, ServerConfig, ServerEvent, TcpBufferServer};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

/// Helper to start a server on an ephemeral port with a channel subscriber
async fn start_server(
    config: ServerConfig,
) -> (TcpBufferServer, SocketAddr, UnboundedReceiver<ServerEvent>) {
    let server = TcpBufferServer::new(config).unwrap();
    let (_, rx) = server.hub().subscribe_channel();
    let addr = server.start(Ipv4Addr::LOCALHOST, 0).await.unwrap();
    (server, addr, rx)
}

/// Helper to wait for the next event
async fn next_event(rx: &mut UnboundedReceiver<ServerEvent>) -> ServerEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_two_chunks_then_close() {
    let (server, addr, mut rx) = start_server(ServerConfig::default()).await;
    let registry = server.registry();

    let mut client = TcpStream::connect(addr).await.unwrap();

    let id = match next_event(&mut rx).await {
        ServerEvent::Connected { id, peer_addr } => {
            assert_eq!(peer_addr, client.local_addr().unwrap());
            id
        }
        other => panic!("expected Connected, got {other:?}"),
    };

    client.write_all(b"AB").await.unwrap();
    assert_eq!(
        next_event(&mut rx).await,
        ServerEvent::Received {
            id,
            chunk: "AB".to_string(),
            accumulated: "AB".to_string(),
        }
    );

    client.write_all(b"CD").await.unwrap();
    assert_eq!(
        next_event(&mut rx).await,
        ServerEvent::Received {
            id,
            chunk: "CD".to_string(),
            accumulated: "ABCD".to_string(),
        }
    );
    assert_eq!(registry.get(id), Some(Some("ABCD".to_string())));

    client.shutdown().await.unwrap();
    drop(client);

    assert_eq!(next_event(&mut rx).await, ServerEvent::Disconnected { id });
    assert!(!registry.contains(id));

    server.shutdown().await.unwrap();
    assert_eq!(next_event(&mut rx).await, ServerEvent::Stopped);
}

#[tokio::test]
async fn test_concurrent_connections_have_isolated_lifecycles() {
    const CLIENTS: usize = 10;
    let (server, addr, mut rx) = start_server(ServerConfig::default()).await;

    let mut tasks = Vec::new();
    for n in 0..CLIENTS {
        tasks.push(tokio::spawn(async move {
            let mut client = TcpStream::connect(addr).await.unwrap();
            let payload = format!("client-{n}:payload");
            client.write_all(payload.as_bytes()).await.unwrap();
            client.shutdown().await.unwrap();
            // Wait for the server to close its side.
            let mut sink = Vec::new();
            let _ = client.read_to_end(&mut sink).await;
            payload
        }));
    }
    let mut payloads: Vec<String> = futures_util::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let mut events: HashMap<ConnectionId, Vec<ServerEvent>> = HashMap::new();
    let mut disconnected = 0;
    while disconnected < CLIENTS {
        let event = next_event(&mut rx).await;
        if matches!(event, ServerEvent::Disconnected { .. }) {
            disconnected += 1;
        }
        let id = event.connection_id().expect("per-connection event");
        events.entry(id).or_default().push(event);
    }

    assert_eq!(events.len(), CLIENTS);
    let mut received = Vec::new();
    for (id, history) in &events {
        assert!(matches!(history.first(), Some(ServerEvent::Connected { .. })));
        assert_eq!(history.last(), Some(&ServerEvent::Disconnected { id: *id }));

        let connects = history
            .iter()
            .filter(|e| matches!(e, ServerEvent::Connected { .. }))
            .count();
        let disconnects = history
            .iter()
            .filter(|e| matches!(e, ServerEvent::Disconnected { .. }))
            .count();
        assert_eq!(connects, 1);
        assert_eq!(disconnects, 1);

        let accumulated = history
            .iter()
            .rev()
            .find_map(|e| match e {
                ServerEvent::Received { accumulated, .. } => Some(accumulated.clone()),
                _ => None,
            })
            .expect("every client sent data");
        received.push(accumulated);
    }

    payloads.sort();
    received.sort();
    assert_eq!(payloads, received);
    assert_eq!(server.connection_count(), 0);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_abrupt_client_disconnect() {
    let (server, addr, mut rx) = start_server(ServerConfig::default()).await;

    {
        let _client = TcpStream::connect(addr).await.unwrap();
        assert!(matches!(
            next_event(&mut rx).await,
            ServerEvent::Connected { .. }
        ));
        // Client drops here without graceful shutdown
    }

    loop {
        match next_event(&mut rx).await {
            ServerEvent::Disconnected { .. } => break,
            ServerEvent::Error { .. } => continue,
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(server.connection_count(), 0);
    assert_eq!(server.metrics().active_connections(), 0);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_connection_limit_rejects_excess_clients() {
    let config = ServerConfig::default().with_max_connections(1);
    let (server, addr, mut rx) = start_server(config).await;

    let _first = TcpStream::connect(addr).await.unwrap();
    assert!(matches!(
        next_event(&mut rx).await,
        ServerEvent::Connected { .. }
    ));

    let mut second = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 8];
    let read = timeout(Duration::from_secs(5), second.read(&mut buf))
        .await
        .expect("rejected client should be closed");
    assert!(matches!(read, Ok(0) | Err(_)));

    assert_eq!(server.metrics().snapshot().rejected_connections, 1);
    assert_eq!(server.connection_count(), 1);
    assert!(rx.try_recv().is_err());

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_closes_active_connections() {
    let (server, addr, mut rx) = start_server(ServerConfig::default()).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    let id = match next_event(&mut rx).await {
        ServerEvent::Connected { id, .. } => id,
        other => panic!("expected Connected, got {other:?}"),
    };
    client.write_all(b"partial").await.unwrap();
    assert!(matches!(
        next_event(&mut rx).await,
        ServerEvent::Received { .. }
    ));

    server.shutdown().await.unwrap();

    let mut remaining = Vec::new();
    while let Ok(event) = rx.try_recv() {
        remaining.push(event);
    }
    assert!(remaining.contains(&ServerEvent::Error {
        id: Some(id),
        error: "Operation cancelled".to_string(),
    }));
    assert!(remaining.contains(&ServerEvent::Disconnected { id }));
    assert_eq!(
        remaining
            .iter()
            .filter(|e| **e == ServerEvent::Stopped)
            .count(),
        1
    );
    assert!(server.registry().is_empty());

    let mut buf = [0u8; 8];
    let read = timeout(Duration::from_secs(5), client.read(&mut buf))
        .await
        .expect("server should close the socket");
    assert!(matches!(read, Ok(0) | Err(_)));
}
