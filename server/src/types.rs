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

//! Core types for the buffering server

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Unique identifier for a connection (monotonically increasing, never reused)
///
/// Identifiers are opaque map keys. They are never dereferenced or
/// interpreted beyond equality and hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create a new connection ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocate the next process-unique connection ID
    pub fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Server lifecycle state (stored as atomic u8 for lock-free state management)
///
/// Transitions only move forward: `Created -> Running -> Stopping -> Stopped`.
/// A stopped server cannot be restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    /// Server has been constructed but not started
    Created = 0,
    /// Accept loop is running
    Running = 1,
    /// Stop has been requested, accept loop is unwinding
    Stopping = 2,
    /// Accept loop has exited
    Stopped = 3,
}

impl ServerState {
    /// Convert from u8 (for atomic operations)
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }

    /// Convert to u8 (for atomic operations)
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if the server is in a terminal or terminating state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopping | Self::Stopped)
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Server snapshot for non-blocking debug information
#[derive(Debug, Clone)]
pub struct ServerSnapshot {
    /// Current lifecycle state
    pub state: ServerState,
    /// Number of registered connections
    pub active_connections: usize,
    /// Total connections since server start
    pub total_connections: u64,
    /// Bound address, if the server has been started
    pub local_addr: Option<SocketAddr>,
    /// Time since the server was constructed
    pub uptime: Duration,
    /// Server construction time
    pub created_at: Instant,
}

impl fmt::Display for ServerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr = self
            .local_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unbound".to_string());
        write!(
            f,
            "TcpBufferServer {{ state: {}, active: {}, total: {}, addr: {}, uptime: {:?} }}",
            self.state, self.active_connections, self.total_connections, addr, self.uptime
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id() {
        let id1 = ConnectionId::new(1);
        let id2 = ConnectionId::new(2);

        assert_eq!(id1.as_u64(), 1);
        assert_eq!(id2.as_u64(), 2);
        assert_ne!(id1, id2);
        assert!(id1 < id2);
        assert_eq!(id2.to_string(), "conn-2");
    }

    #[test]
    fn test_connection_id_next_is_unique() {
        let ids: Vec<_> = (0..100).map(|_| ConnectionId::next()).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_server_state_conversion() {
        for state in [
            ServerState::Created,
            ServerState::Running,
            ServerState::Stopping,
            ServerState::Stopped,
        ] {
            assert_eq!(ServerState::from_u8(state.as_u8()), state);
        }
        assert_eq!(ServerState::from_u8(200), ServerState::Stopped);
    }

    #[test]
    fn test_server_state_terminal() {
        assert!(!ServerState::Created.is_terminal());
        assert!(!ServerState::Running.is_terminal());
        assert!(ServerState::Stopping.is_terminal());
        assert!(ServerState::Stopped.is_terminal());
    }
}
