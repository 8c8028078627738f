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

//! Event hub implementation
//!
//! The EventHub fans lifecycle events out to every registered
//! [`ServerHandler`]. Subscribers can be added and removed at runtime while
//! the server is running. A panicking handler is logged and skipped so the
//! publishing loop always reaches its cleanup.

use crate::{ChannelHandler, ConnectionId, ServerError, ServerEvent, ServerHandler};
use dashmap::DashMap;
use futures_util::FutureExt;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Handle returned by [`EventHub::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Publish/subscribe hub for server events
///
/// Publishing awaits each subscriber in subscription order, so everything a
/// single task publishes is observed by every subscriber in the same order.
pub struct EventHub {
    subscribers: DashMap<SubscriptionId, Arc<dyn ServerHandler>>,
    next_id: AtomicU64,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    /// Create a hub with no subscribers
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler for all event kinds
    pub fn subscribe(&self, handler: Arc<dyn ServerHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.insert(id, handler);
        tracing::debug!(subscription = %id, "Handler subscribed");
        id
    }

    /// Register a channel subscriber and return its receiving end
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (handler, rx) = ChannelHandler::new();
        (self.subscribe(Arc::new(handler)), rx)
    }

    /// Remove a subscriber
    ///
    /// Returns `false` if the subscription was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            tracing::debug!(subscription = %id, "Handler unsubscribed");
        }
        removed
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Take an ordered copy of the subscriber list
    ///
    /// Map guards must not be held across an await, so publishing works on a
    /// snapshot. A handler removed mid-publish may still see that event.
    fn snapshot(&self) -> Vec<Arc<dyn ServerHandler>> {
        let mut subscribers: Vec<_> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        subscribers.sort_by_key(|(id, _)| *id);
        subscribers.into_iter().map(|(_, handler)| handler).collect()
    }

    /// Publish a Connected event
    pub async fn connected(&self, id: ConnectionId, peer_addr: SocketAddr) {
        for handler in self.snapshot() {
            isolate("connect", handler.on_connect(id, peer_addr)).await;
        }
    }

    /// Publish a Received event
    pub async fn received(&self, id: ConnectionId, chunk: &str, accumulated: &str) {
        for handler in self.snapshot() {
            isolate("receive", handler.on_receive(id, chunk, accumulated)).await;
        }
    }

    /// Publish an Error event
    pub async fn error(&self, id: Option<ConnectionId>, error: &ServerError) {
        for handler in self.snapshot() {
            isolate("error", handler.on_error(id, error)).await;
        }
    }

    /// Publish a Disconnected event
    pub async fn disconnected(&self, id: ConnectionId) {
        for handler in self.snapshot() {
            isolate("disconnect", handler.on_disconnect(id)).await;
        }
    }

    /// Publish a Stopped event
    pub async fn stopped(&self) {
        for handler in self.snapshot() {
            isolate("stopped", handler.on_stopped()).await;
        }
    }
}

/// Run one handler callback, containing any panic it raises
async fn isolate<F>(event: &'static str, callback: F)
where
    F: Future<Output = ()>,
{
    if AssertUnwindSafe(callback).catch_unwind().await.is_err() {
        tracing::error!(handler_event = event, "Event handler panicked");
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ServerHandler for Recorder {
        async fn on_disconnect(&self, id: ConnectionId) {
            self.log.lock().unwrap().push(format!("{}:{}", self.name, id));
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers_in_order() {
        let hub = EventHub::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        hub.subscribe(Arc::new(Recorder {
            name: "first",
            log: log.clone(),
        }));
        hub.subscribe(Arc::new(Recorder {
            name: "second",
            log: log.clone(),
        }));

        hub.disconnected(ConnectionId::new(3)).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:conn-3".to_string(), "second:conn-3".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let hub = EventHub::new();
        let (sub, mut rx) = hub.subscribe_channel();
        assert_eq!(hub.subscriber_count(), 1);

        hub.stopped().await;
        assert!(hub.unsubscribe(sub));
        assert!(!hub.unsubscribe(sub));
        hub.stopped().await;

        assert_eq!(rx.recv().await, Some(ServerEvent::Stopped));
        // The hub dropped the only sender on unsubscribe.
        assert_eq!(rx.recv().await, None);
    }

    struct Exploding;

    #[async_trait]
    impl ServerHandler for Exploding {
        async fn on_stopped(&self) {
            panic!("subscriber bug");
        }
    }

    #[tokio::test]
    async fn test_panicking_subscriber_is_skipped() {
        let hub = EventHub::new();
        hub.subscribe(Arc::new(Exploding));
        let (_, mut rx) = hub.subscribe_channel();

        hub.stopped().await;

        assert_eq!(rx.try_recv().ok(), Some(ServerEvent::Stopped));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let hub = EventHub::default();
        hub.error(None, &ServerError::Cancelled).await;
        assert_eq!(hub.subscriber_count(), 0);
    }
}
