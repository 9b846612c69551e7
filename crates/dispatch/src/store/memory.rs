// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory state store built on versioned agent slots.
//!
//! Agents live in an append-only arena addressed through an ID index and a
//! per-department shard index. Every slot carries a version that increases
//! on each write. Updates are optimistic: read `(version, agent)`, compute
//! the replacement, and commit only if the version still matches, retrying
//! on conflict.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::error::CoreError;
use crate::model::{Agent, Assignment};
use crate::store::persist::Snapshot;
use crate::store::{StateStore, StoreFuture, StoreStats};

struct Slot {
    version: u64,
    agent: Agent,
}

#[derive(Default)]
struct Arena {
    slots: Vec<RwLock<Slot>>,
    index: HashMap<String, usize>,
    by_department: HashMap<String, BTreeSet<String>>,
}

impl Arena {
    fn slot(&self, agent_id: &str) -> Result<&RwLock<Slot>, CoreError> {
        let idx = *self.index.get(agent_id).ok_or(CoreError::NotFound)?;
        self.slots.get(idx).ok_or(CoreError::NotFound)
    }

    fn insert(&mut self, agent: Agent) {
        if let Some(&idx) = self.index.get(&agent.agent_id) {
            let Some(slot) = self.slots.get(idx) else {
                return;
            };
            let mut slot = slot.write();
            if slot.agent.department != agent.department {
                if let Some(ids) = self.by_department.get_mut(&slot.agent.department) {
                    ids.remove(&agent.agent_id);
                }
                self.by_department
                    .entry(agent.department.clone())
                    .or_default()
                    .insert(agent.agent_id.clone());
            }
            let is_available = slot.agent.is_available;
            slot.agent = Agent { is_available, ..agent };
            slot.version += 1;
            return;
        }

        self.by_department
            .entry(agent.department.clone())
            .or_default()
            .insert(agent.agent_id.clone());
        self.index.insert(agent.agent_id.clone(), self.slots.len());
        self.slots.push(RwLock::new(Slot { version: 0, agent }));
    }

    /// Agents in index order, optionally restricted to one department.
    fn collect(&self, department: Option<&str>, only_available: bool) -> Vec<Agent> {
        let read = |id: &String| {
            let idx = *self.index.get(id)?;
            let slot = self.slots.get(idx)?.read();
            (!only_available || slot.agent.is_available).then(|| slot.agent.clone())
        };
        match department {
            Some(dept) => match self.by_department.get(dept) {
                Some(ids) => ids.iter().filter_map(read).collect(),
                None => Vec::new(),
            },
            None => {
                let ids: BTreeSet<&String> = self.index.keys().collect();
                ids.into_iter().filter_map(read).collect()
            }
        }
    }
}

/// Process-local [`StateStore`] with optional JSON snapshots.
pub struct MemoryStore {
    arena: RwLock<Arena>,
    assignments: RwLock<HashMap<String, Assignment>>,
    closed: AtomicBool,
    dirty: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            arena: RwLock::new(Arena::default()),
            assignments: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
        }
    }

    /// Rebuild a store from a persisted snapshot.
    ///
    /// Availability is derived from the restored assignments: an agent is
    /// unavailable exactly when some room is bound to it. A snapshot taken
    /// mid-route can hold a reservation whose assignment was never written;
    /// that agent comes back available.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let store = Self::new();
        let bound: HashSet<String> =
            snapshot.assignments.iter().filter_map(|a| a.agent_id.clone()).collect();
        {
            let mut arena = store.arena.write();
            for agent in snapshot.agents {
                let is_available = !bound.contains(&agent.agent_id);
                if is_available != agent.is_available {
                    tracing::warn!(
                        agent_id = %agent.agent_id,
                        is_available,
                        "snapshot availability reconciled"
                    );
                }
                arena.insert(Agent { is_available, ..agent });
            }
        }
        {
            let mut assignments = store.assignments.write();
            for assignment in snapshot.assignments {
                assignments.insert(assignment.room_id.clone(), assignment);
            }
        }
        store
    }

    /// Capture the current agents and assignments, ordered by key.
    pub fn snapshot(&self) -> Snapshot {
        let agents = self.arena.read().collect(None, false);
        let mut assignments: Vec<Assignment> = self.assignments.read().values().cloned().collect();
        assignments.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        Snapshot { agents, assignments }
    }

    /// Stop serving requests. Every later call fails with `StoreUnavailable`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Clear the dirty flag, returning whether anything changed since the
    /// last call.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Current write version of an agent slot.
    pub fn version(&self, agent_id: &str) -> Option<u64> {
        let arena = self.arena.read();
        arena.slot(agent_id).ok().map(|slot| slot.read().version)
    }

    fn ensure_open(&self) -> Result<(), CoreError> {
        if self.is_closed() {
            return Err(CoreError::StoreUnavailable("store is closed".to_owned()));
        }
        Ok(())
    }

    /// Optimistically replace an agent record.
    ///
    /// `next` sees the current record and returns the replacement, or `None`
    /// to leave the slot untouched. Returns whether a write was committed.
    fn update_agent<F>(&self, agent_id: &str, next: F) -> Result<bool, CoreError>
    where
        F: Fn(&Agent) -> Option<Agent>,
    {
        self.ensure_open()?;
        let arena = self.arena.read();
        let slot = arena.slot(agent_id)?;
        loop {
            let (seen, replacement) = {
                let current = slot.read();
                (current.version, next(&current.agent))
            };
            let Some(replacement) = replacement else {
                return Ok(false);
            };
            let mut current = slot.write();
            if current.version != seen {
                tracing::trace!(agent_id, seen, now = current.version, "slot write conflict");
                continue;
            }
            current.agent = replacement;
            current.version += 1;
            self.mark_dirty();
            return Ok(true);
        }
    }

    fn try_set_unavailable_now(&self, agent_id: &str) -> Result<bool, CoreError> {
        self.update_agent(agent_id, |agent| {
            agent.is_available.then(|| Agent { is_available: false, ..agent.clone() })
        })
    }

    fn set_available_now(&self, agent_id: &str) -> Result<(), CoreError> {
        self.update_agent(agent_id, |agent| {
            (!agent.is_available).then(|| Agent { is_available: true, ..agent.clone() })
        })?;
        Ok(())
    }

    fn get_agent_now(&self, agent_id: &str) -> Result<Agent, CoreError> {
        self.ensure_open()?;
        let arena = self.arena.read();
        let agent = arena.slot(agent_id)?.read().agent.clone();
        Ok(agent)
    }

    fn list_now(&self, department: Option<&str>, only_available: bool) -> Result<Vec<Agent>, CoreError> {
        self.ensure_open()?;
        Ok(self.arena.read().collect(department, only_available))
    }

    fn put_assignment_now(
        &self,
        room_id: &str,
        assignment: Assignment,
    ) -> Result<Option<Assignment>, CoreError> {
        self.ensure_open()?;
        let previous = self.assignments.write().insert(room_id.to_owned(), assignment);
        self.mark_dirty();
        Ok(previous)
    }

    fn get_assignment_now(&self, room_id: &str) -> Result<Assignment, CoreError> {
        self.ensure_open()?;
        self.assignments.read().get(room_id).cloned().ok_or(CoreError::NotFound)
    }

    fn delete_assignment_now(&self, room_id: &str) -> Result<Option<Assignment>, CoreError> {
        self.ensure_open()?;
        let removed = self.assignments.write().remove(room_id);
        if removed.is_some() {
            self.mark_dirty();
        }
        Ok(removed)
    }

    fn swap_assignment_now(
        &self,
        room_id: &str,
        expected: Option<&Assignment>,
        replacement: Option<Assignment>,
    ) -> Result<bool, CoreError> {
        self.ensure_open()?;
        let mut assignments = self.assignments.write();
        let matches = match (assignments.get(room_id), expected) {
            (Some(current), Some(expected)) => current.same_binding(expected),
            (None, None) => true,
            _ => false,
        };
        if !matches {
            return Ok(false);
        }
        match replacement {
            Some(assignment) => {
                assignments.insert(room_id.to_owned(), assignment);
            }
            None => {
                assignments.remove(room_id);
            }
        }
        drop(assignments);
        self.mark_dirty();
        Ok(true)
    }

    fn register_now(&self, agents: Vec<Agent>) -> Result<usize, CoreError> {
        self.ensure_open()?;
        let count = agents.len();
        let mut arena = self.arena.write();
        for agent in agents {
            arena.insert(agent);
        }
        drop(arena);
        if count > 0 {
            self.mark_dirty();
        }
        Ok(count)
    }

    fn stats_now(&self) -> Result<StoreStats, CoreError> {
        self.ensure_open()?;
        let all = self.arena.read().collect(None, false);
        Ok(StoreStats {
            agents: all.len(),
            available_agents: all.iter().filter(|a| a.is_available).count(),
            active_assignments: self.assignments.read().len(),
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemoryStore {
    fn get_agent<'a>(&'a self, agent_id: &'a str) -> StoreFuture<'a, Agent> {
        Box::pin(std::future::ready(self.get_agent_now(agent_id)))
    }

    fn list_available_agents<'a>(&'a self, department: &'a str) -> StoreFuture<'a, Vec<Agent>> {
        Box::pin(std::future::ready(self.list_now(Some(department), true)))
    }

    fn try_set_unavailable<'a>(&'a self, agent_id: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(std::future::ready(self.try_set_unavailable_now(agent_id)))
    }

    fn set_available<'a>(&'a self, agent_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(std::future::ready(self.set_available_now(agent_id)))
    }

    fn put_assignment<'a>(
        &'a self,
        room_id: &'a str,
        assignment: Assignment,
    ) -> StoreFuture<'a, Option<Assignment>> {
        Box::pin(std::future::ready(self.put_assignment_now(room_id, assignment)))
    }

    fn get_assignment<'a>(&'a self, room_id: &'a str) -> StoreFuture<'a, Assignment> {
        Box::pin(std::future::ready(self.get_assignment_now(room_id)))
    }

    fn delete_assignment<'a>(&'a self, room_id: &'a str) -> StoreFuture<'a, Option<Assignment>> {
        Box::pin(std::future::ready(self.delete_assignment_now(room_id)))
    }

    fn swap_assignment<'a>(
        &'a self,
        room_id: &'a str,
        expected: Option<&'a Assignment>,
        replacement: Option<Assignment>,
    ) -> StoreFuture<'a, bool> {
        Box::pin(std::future::ready(self.swap_assignment_now(room_id, expected, replacement)))
    }

    fn register_agents(&self, agents: Vec<Agent>) -> StoreFuture<'_, usize> {
        Box::pin(std::future::ready(self.register_now(agents)))
    }

    fn list_agents<'a>(&'a self, department: Option<&'a str>) -> StoreFuture<'a, Vec<Agent>> {
        Box::pin(std::future::ready(self.list_now(department, false)))
    }

    fn stats(&self) -> StoreFuture<'_, StoreStats> {
        Box::pin(std::future::ready(self.stats_now()))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
