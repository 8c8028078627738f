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

//! Lock-free metrics for the buffering server
//!
//! Every update is recorded twice: in the per-server atomics exposed through
//! [`ServerMetrics::snapshot`], and in the global `metrics` facade so an
//! installed exporter sees the same counters.

use ::metrics::{counter, gauge, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free server metrics
///
/// All metrics are stored as atomics and can be accessed concurrently
/// without locks. Use the `snapshot()` method to get a consistent view
/// of all metrics at a point in time.
#[derive(Debug)]
pub struct ServerMetrics {
    // Connection counts
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    rejected_connections: AtomicU64,

    // Throughput
    bytes_received: AtomicU64,
    chunks_received: AtomicU64,

    // Errors
    read_errors: AtomicU64,
    accept_errors: AtomicU64,

    // Timing (stored as nanoseconds)
    total_connection_duration_ns: AtomicU64,
    closed_connections: AtomicU64,

    started_at: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            rejected_connections: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            chunks_received: AtomicU64::new(0),
            read_errors: AtomicU64::new(0),
            accept_errors: AtomicU64::new(0),
            total_connection_duration_ns: AtomicU64::new(0),
            closed_connections: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    // Connection tracking

    /// Record a new connection being opened
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        counter!("bytehub.connections.total").increment(1);
        gauge!("bytehub.connections.active").increment(1.0);
    }

    /// Record a connection being closed
    pub fn connection_closed(&self, duration: Duration) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
        self.closed_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connection_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        gauge!("bytehub.connections.active").decrement(1.0);
        histogram!("bytehub.connections.duration").record(duration.as_secs_f64());
    }

    /// Record a connection dropped at the connection limit
    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
        counter!("bytehub.connections.rejected").increment(1);
    }

    /// Get the current number of active connections
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get the total number of connections since server start
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    // Throughput tracking

    /// Record a received chunk of `count` bytes
    pub fn chunk_received(&self, count: u64) {
        self.bytes_received.fetch_add(count, Ordering::Relaxed);
        self.chunks_received.fetch_add(1, Ordering::Relaxed);
        counter!("bytehub.bytes.received").increment(count);
        counter!("bytehub.chunks.received").increment(1);
    }

    // Error tracking

    /// Record a failed or timed out read
    pub fn read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
        counter!("bytehub.errors.read").increment(1);
    }

    /// Record a failed accept
    pub fn accept_error(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
        counter!("bytehub.errors.accept").increment(1);
    }

    // Snapshot

    /// Get a snapshot of all metrics
    ///
    /// Counters are loaded one at a time, so the snapshot may be slightly
    /// inconsistent while connections are being updated concurrently.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            accept_errors: self.accept_errors.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
            avg_connection_duration: self.average_connection_duration(),
        }
    }

    fn average_connection_duration(&self) -> Duration {
        let closed = self.closed_connections.load(Ordering::Relaxed);
        if closed == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_connection_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / closed)
    }
}

/// A snapshot of server metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Total connections since server start
    pub total_connections: u64,
    /// Current active connections
    pub active_connections: u64,
    /// Connections dropped at the connection limit
    pub rejected_connections: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Total chunks received
    pub chunks_received: u64,
    /// Total read errors
    pub read_errors: u64,
    /// Total accept errors
    pub accept_errors: u64,
    /// Time since the metrics were created
    pub uptime: Duration,
    /// Average duration of closed connections
    pub avg_connection_duration: Duration,
}

impl MetricsSnapshot {
    /// Calculate bytes per second (received)
    pub fn bytes_received_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.bytes_received as f64 / self.uptime.as_secs_f64()
    }

    /// Calculate total error count
    pub fn total_errors(&self) -> u64 {
        self.read_errors + self.accept_errors
    }
}
