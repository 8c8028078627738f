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

//! Error types for the buffering server

use crate::types::{ConnectionId, ServerState};
use std::net::SocketAddr;
use thiserror::Error;

/// Result type for operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Buffering server error types
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound to the requested address
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Requested bind address
        address: SocketAddr,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// I/O error from an established connection or the listener
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A registry entry was mutated for an identity that is not registered
    #[error("Connection {0} is not registered")]
    RegistryState(ConnectionId),

    /// The operation was interrupted by server shutdown
    #[error("Operation cancelled")]
    Cancelled,

    /// No data arrived within the configured read timeout
    #[error("Operation timed out")]
    Timeout,

    /// The requested lifecycle transition is not allowed from this state
    #[error("Invalid server state: {0}")]
    InvalidState(ServerState),

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Maximum number of connections reached
    #[error("Maximum connections ({0}) reached")]
    MaxConnectionsReached(usize),
}

impl ServerError {
    /// Check if the error is recoverable
    ///
    /// Recoverable errors affect a single connection or operation and leave
    /// the server able to continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ServerError::Io(_)
                | ServerError::Timeout
                | ServerError::RegistryState(_)
                | ServerError::MaxConnectionsReached(_)
        )
    }

    /// Check if the error is scoped to a single connection
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ServerError::Io(_)
                | ServerError::Timeout
                | ServerError::RegistryState(_)
                | ServerError::Cancelled
        )
    }
}
