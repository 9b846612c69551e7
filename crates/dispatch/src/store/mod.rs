// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authoritative agent availability and room assignment state.
//!
//! Two logical collections: `agents` keyed by agent ID (indexed by
//! department) and `assignments` keyed by room ID. The assignment engine is
//! the only writer. [`StateStore::try_set_unavailable`] is the single point
//! of mutual exclusion for routing.

pub mod memory;
pub mod persist;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::{Agent, Assignment};

pub use memory::MemoryStore;

/// Boxed future returned by [`StateStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CoreError>> + Send + 'a>>;

/// Counters reported by the health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub agents: usize,
    pub available_agents: usize,
    pub active_assignments: usize,
}

/// Key-value state store with compare-and-swap availability updates.
///
/// Object-safe for use as `Arc<dyn StateStore>`. Every operation may
/// suspend. An unreachable backend yields [`CoreError::StoreUnavailable`];
/// a missing key yields [`CoreError::NotFound`].
pub trait StateStore: Send + Sync + 'static {
    fn get_agent<'a>(&'a self, agent_id: &'a str) -> StoreFuture<'a, Agent>;

    /// Available agents in `department`, ordered by agent ID.
    fn list_available_agents<'a>(&'a self, department: &'a str) -> StoreFuture<'a, Vec<Agent>>;

    /// Flip `agent_id` from available to unavailable in one atomic step.
    ///
    /// Returns `false` if the agent was already unavailable.
    fn try_set_unavailable<'a>(&'a self, agent_id: &'a str) -> StoreFuture<'a, bool>;

    fn set_available<'a>(&'a self, agent_id: &'a str) -> StoreFuture<'a, ()>;

    /// Bind `room_id`, returning the binding it replaced.
    fn put_assignment<'a>(
        &'a self,
        room_id: &'a str,
        assignment: Assignment,
    ) -> StoreFuture<'a, Option<Assignment>>;

    fn get_assignment<'a>(&'a self, room_id: &'a str) -> StoreFuture<'a, Assignment>;

    /// Remove the binding for `room_id`, returning it if one existed.
    fn delete_assignment<'a>(&'a self, room_id: &'a str) -> StoreFuture<'a, Option<Assignment>>;

    /// Compare-and-swap the binding for `room_id`.
    ///
    /// Commits only if the current binding is the same binding as `expected`
    /// (or the room is unbound when `expected` is `None`). `replacement`
    /// `None` removes the binding. Returns whether the swap was committed.
    fn swap_assignment<'a>(
        &'a self,
        room_id: &'a str,
        expected: Option<&'a Assignment>,
        replacement: Option<Assignment>,
    ) -> StoreFuture<'a, bool>;

    /// Bulk-load agent records. Existing agents keep their availability.
    fn register_agents(&self, agents: Vec<Agent>) -> StoreFuture<'_, usize>;

    /// All agents regardless of availability, ordered by agent ID.
    fn list_agents<'a>(&'a self, department: Option<&'a str>) -> StoreFuture<'a, Vec<Agent>>;

    fn stats(&self) -> StoreFuture<'_, StoreStats>;
}
