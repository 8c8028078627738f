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

//! Server configuration

use crate::{Result, ServerError};
use std::time::Duration;

/// Server configuration
///
/// This structure contains the tuning options for the buffering server. The
/// bind address is supplied to `start` rather than stored here. Use the
/// builder pattern methods to customize the configuration.
///
/// # Example
///
/// ```
/// use bytehub_server::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::default()
///     .with_max_connections(500)
///     .with_read_buffer_size(4096)
///     .with_read_timeout(Some(Duration::from_secs(600)));
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Size of the per-connection read buffer in bytes
    ///
    /// Each read yields at most this many bytes, so it bounds the size of a
    /// single Received chunk.
    pub read_buffer_size: usize,

    /// Maximum number of concurrent connections
    pub max_connections: usize,

    /// Timeout for a single read (None waits forever)
    ///
    /// If no data is received within this duration the connection is
    /// reported as timed out and closed.
    pub read_timeout: Option<Duration>,

    /// Delay before retrying after a failed accept
    pub accept_backoff: Duration,

    /// Timeout for graceful shutdown
    ///
    /// `shutdown` waits this long for receive loops to drain.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 1024,
            max_connections: 1000,
            read_timeout: None,
            accept_backoff: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-connection read buffer size
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the read timeout duration
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the accept error backoff
    pub fn with_accept_backoff(mut self, backoff: Duration) -> Self {
        self.accept_backoff = backoff;
        self
    }

    /// Set the shutdown timeout duration
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Validate the configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_size == 0 {
            return Err(ServerError::InvalidConfig(
                "read_buffer_size must be greater than 0".to_string(),
            ));
        }

        if self.max_connections == 0 {
            return Err(ServerError::InvalidConfig(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        if self.read_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(ServerError::InvalidConfig(
                "read_timeout must be greater than 0".to_string(),
            ));
        }

        if self.shutdown_timeout.is_zero() {
            return Err(ServerError::InvalidConfig(
                "shutdown_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
