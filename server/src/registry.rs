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

//! Connection registry implementation
//!
//! The registry maps each live connection to the text accumulated from it so
//! far. It is shared by the accept loop and every receive loop. Each entry has
//! a single writer (its receive loop), so the map only has to protect its
//! structural operations, which [`DashMap`] does with sharded locking.

use crate::ConnectionId;
use dashmap::DashMap;

/// Concurrent mapping from connection identity to accumulated buffer
///
/// Implementations must make `append`, `try_append` and `remove` atomic with
/// respect to each other for the same identity. Registry operations never
/// fail; transport failures are reported by the caller.
pub trait BufferRegistry: Send + Sync + 'static {
    /// Create or reset the entry for `id` to empty
    fn register(&self, id: ConnectionId);

    /// Append `chunk` to the entry for `id`, creating it if absent
    ///
    /// Returns the full accumulated content after the append.
    fn append(&self, id: ConnectionId, chunk: &str) -> String;

    /// Append `chunk` to the entry for `id` only if it is registered
    ///
    /// Returns `None` when no entry exists.
    fn try_append(&self, id: ConnectionId, chunk: &str) -> Option<String>;

    /// Delete the entry for `id` if present
    fn remove(&self, id: ConnectionId);

    /// Look up the entry for `id`
    ///
    /// The outer `Option` is `None` when the identity is not registered, the
    /// inner one is `None` when nothing has been received yet.
    fn get(&self, id: ConnectionId) -> Option<Option<String>>;

    /// Number of registered connections
    fn len(&self) -> usize;

    /// Check if an entry exists for `id`
    fn contains(&self, id: ConnectionId) -> bool {
        self.get(id).is_some()
    }

    /// Check if no connections are registered
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Default registry backed by a lock-free concurrent map
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    buffers: DashMap<ConnectionId, Option<String>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all registered connection IDs
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.buffers.iter().map(|entry| *entry.key()).collect()
    }
}

impl BufferRegistry for ConnectionRegistry {
    fn register(&self, id: ConnectionId) {
        self.buffers.insert(id, None);
    }

    fn append(&self, id: ConnectionId, chunk: &str) -> String {
        let mut entry = self.buffers.entry(id).or_insert(None);
        let buffer = entry.value_mut().get_or_insert_with(String::new);
        buffer.push_str(chunk);
        buffer.clone()
    }

    fn try_append(&self, id: ConnectionId, chunk: &str) -> Option<String> {
        self.buffers.get_mut(&id).map(|mut entry| {
            let buffer = entry.value_mut().get_or_insert_with(String::new);
            buffer.push_str(chunk);
            buffer.clone()
        })
    }

    fn remove(&self, id: ConnectionId) {
        self.buffers.remove(&id);
    }

    fn get(&self, id: ConnectionId) -> Option<Option<String>> {
        self.buffers.get(&id).map(|entry| entry.value().clone())
    }

    fn len(&self) -> usize {
        self.buffers.len()
    }

    fn contains(&self, id: ConnectionId) -> bool {
        self.buffers.contains_key(&id)
    }
}
