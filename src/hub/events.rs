// Copyright (c) 2026 Eonhub
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Bounded pub-sub fan-out of hub events.
//!
//! Each watcher owns a bounded queue. Delivery reserves the final queue slot
//! for a terminal [`HubEvent::WatcherOverflow`]: a watcher that cannot keep
//! up receives the overflow marker and is dropped, so buffering is never
//! unbounded. Unsubscribing stops further delivery but does not retract
//! already-queued events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::types::{Address, HubEvent};

/// Watch errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WatchError {
    /// No matching event arrived within the deadline.
    #[error("timed out waiting for event")]
    Timeout,
    /// The broker dropped this subscription.
    #[error("subscription closed")]
    Closed,
}

/// Which events a watcher receives.
#[derive(Clone)]
pub enum WatchFilter {
    /// Every event.
    All,
    /// Events scoped to one address.
    Address(Address),
    /// Only per-eon root commitments.
    HubRoot,
    /// Arbitrary predicate.
    Predicate(Arc<dyn Fn(&HubEvent) -> bool + Send + Sync>),
}

impl WatchFilter {
    fn matches(&self, event: &HubEvent) -> bool {
        match self {
            WatchFilter::All => true,
            WatchFilter::Address(a) => event.address() == Some(*a),
            WatchFilter::HubRoot => matches!(event, HubEvent::NewHubRoot(_)),
            WatchFilter::Predicate(p) => p(event),
        }
    }
}

struct Watcher {
    id: u64,
    filter: WatchFilter,
    tx: mpsc::Sender<HubEvent>,
}

/// A held subscription. Release it with [`EventBroker::unsubscribe`].
pub struct Subscription {
    /// Broker-unique watcher id.
    pub id: u64,
    rx: mpsc::Receiver<HubEvent>,
}

impl Subscription {
    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<HubEvent> {
        self.rx.recv().await
    }

    /// Wait for the next event with an explicit timeout.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<HubEvent, WatchError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Err(_) => Err(WatchError::Timeout),
            Ok(None) => Err(WatchError::Closed),
            Ok(Some(ev)) => Ok(ev),
        }
    }

    /// Drain without waiting (tests).
    pub fn try_recv(&mut self) -> Option<HubEvent> {
        self.rx.try_recv().ok()
    }
}

/// Event fan-out with bounded per-watcher queues.
pub struct EventBroker {
    next_id: AtomicU64,
    queue_depth: usize,
    watchers: Mutex<Vec<Watcher>>,
}

impl EventBroker {
    /// Broker with the given per-watcher queue depth (min 2: one slot is
    /// reserved for the terminal overflow marker).
    pub fn new(queue_depth: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            queue_depth: queue_depth.max(2),
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Register a watcher.
    pub fn subscribe(&self, filter: WatchFilter) -> Subscription {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.watchers
            .lock()
            .expect("watcher list poisoned")
            .push(Watcher { id, filter, tx });
        Subscription { id, rx }
    }

    /// Release a watcher. Already-queued events stay readable.
    pub fn unsubscribe(&self, id: u64) {
        self.watchers
            .lock()
            .expect("watcher list poisoned")
            .retain(|w| w.id != id);
    }

    /// Registered watcher count.
    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().expect("watcher list poisoned").len()
    }

    /// Fan an event out to all matching watchers. Returns how many watchers
    /// overflowed and were dropped.
    pub fn publish(&self, event: &HubEvent) -> usize {
        let mut dropped = 0usize;
        let mut watchers = self.watchers.lock().expect("watcher list poisoned");
        watchers.retain(|w| {
            if !w.filter.matches(event) {
                return true;
            }
            // Keep one slot free for the overflow marker.
            if w.tx.capacity() >= 2 && w.tx.try_send(event.clone()).is_ok() {
                return true;
            }
            let _ = w.tx.try_send(HubEvent::WatcherOverflow);
            dropped += 1;
            false
        });
        dropped
    }
}
