// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assignment fan-out to filtered subscribers.
//!
//! One bounded broadcast ring per bus. Publishing never blocks: a subscriber
//! that falls behind skips the oldest events and keeps going. Delivery is
//! at-least-once within a process lifetime and nothing is persisted.

use std::fmt;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use crate::filter::SubscriptionFilter;
use crate::model::Assignment;

/// Returned by [`NotificationBus::publish`] after shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusClosed;

impl fmt::Display for BusClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("notification bus is closed")
    }
}

impl std::error::Error for BusClosed {}

/// Owned publish/subscribe hub for assignment events.
pub struct NotificationBus {
    tx: Mutex<Option<broadcast::Sender<Assignment>>>,
    capacity: usize,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx: Mutex::new(Some(tx)), capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fan `assignment` out to every live subscription.
    ///
    /// Returns how many subscriptions received it before filtering. Zero
    /// subscribers is not an error.
    pub fn publish(&self, assignment: Assignment) -> Result<usize, BusClosed> {
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or(BusClosed)?;
        Ok(tx.send(assignment).unwrap_or(0))
    }

    /// Register a subscription that sees events published from now on.
    ///
    /// After shutdown the returned subscription ends immediately.
    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        let rx = match self.tx.lock().as_ref() {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        };
        let id = Uuid::new_v4();
        tracing::debug!(subscriber = %id, department = %filter.department, "subscribed");
        Subscription { id, filter, rx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.lock().as_ref().map_or(0, |tx| tx.receiver_count())
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Close the bus. Subscriptions drain what is already buffered, then end.
    pub fn shutdown(&self) {
        if self.tx.lock().take().is_some() {
            tracing::info!("notification bus closed");
        }
    }
}

/// A filtered, non-restartable view of the bus.
pub struct Subscription {
    id: Uuid,
    filter: SubscriptionFilter,
    rx: broadcast::Receiver<Assignment>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn filter(&self) -> &SubscriptionFilter {
        &self.filter
    }

    /// Next matching assignment, or `None` once the bus has shut down and
    /// the buffer is drained. Cancel-safe.
    pub async fn recv(&mut self) -> Option<Assignment> {
        loop {
            match self.rx.recv().await {
                Ok(assignment) if self.filter.matches(&assignment) => return Some(assignment),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(subscriber = %self.id, skipped, "subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Consume the subscription as a stream of matching assignments.
    pub fn into_stream(self) -> impl Stream<Item = Assignment> + Send + 'static {
        let Subscription { id, filter, rx } = self;
        BroadcastStream::new(rx).filter_map(move |item| match item {
            Ok(assignment) => filter.matches(&assignment).then_some(assignment),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(subscriber = %id, skipped, "subscriber lagged");
                None
            }
        })
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
