// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assignment engine: picks an agent for a room, reserves it, obtains a
//! credential, and records the binding.
//!
//! No lock is held across a routing decision. The store's
//! [`StateStore::try_set_unavailable`] is the only point of mutual exclusion,
//! so any number of `route` calls may run concurrently. Every failure after a
//! reservation hands the agent back before the error is returned.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::config::DispatchConfig;
use crate::error::CoreError;
use crate::issuer::CredentialIssuer;
use crate::model::{epoch_ms, Agent, Assignment, RoutingRequest};
use crate::store::{StateStore, StoreStats};

/// Retry behaviour for credential issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure. Capped at 1.
    pub retries: u8,
    /// Upper bound of the random wait before a retry.
    pub jitter: Duration,
}

impl RetryPolicy {
    pub const MAX_RETRIES: u8 = 1;

    pub fn new(retries: u8, jitter: Duration) -> Self {
        Self { retries: retries.min(Self::MAX_RETRIES), jitter }
    }

    /// One retry with no wait.
    pub fn immediate() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Fail on the first issuer error.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.issuer_retries, config.retry_jitter())
    }

    /// Random delay in `[0, jitter]`.
    fn delay(&self) -> Duration {
        let max = self.jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1, Duration::from_millis(250))
    }
}

/// Routes rooms to agents. Cheap to clone.
#[derive(Clone)]
pub struct AssignmentEngine {
    store: Arc<dyn StateStore>,
    issuer: Arc<dyn CredentialIssuer>,
    retry: RetryPolicy,
}

impl AssignmentEngine {
    pub fn new(
        store: Arc<dyn StateStore>,
        issuer: Arc<dyn CredentialIssuer>,
        retry: RetryPolicy,
    ) -> Self {
        Self { store, issuer, retry }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Bind `request.room_id` to an available agent.
    ///
    /// Every error is an [`CoreError::AssignmentFailed`] carrying the reason.
    /// Publishing the result is the caller's job.
    ///
    /// Reservation, issuance, and the assignment write run on a spawned task,
    /// so dropping the returned future never strands a reserved agent.
    pub async fn route(&self, request: RoutingRequest) -> Result<Assignment, CoreError> {
        let room_id = request.room_id.clone();
        let candidates = self
            .candidates(&request)
            .await
            .map_err(|e| CoreError::assignment_failed(&room_id, e))?;
        if candidates.is_empty() {
            debug!(room_id = %room_id, department = %request.department, "no matching agent");
            return Err(CoreError::assignment_failed(&room_id, CoreError::NoAgentAvailable));
        }

        let engine = self.clone();
        let task = tokio::spawn(async move { engine.commit(request, candidates).await });
        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!(room_id = %room_id, err = %e, "routing task aborted");
                Err(CoreError::assignment_failed(
                    &room_id,
                    CoreError::StoreUnavailable(format!("routing task aborted: {e}")),
                ))
            }
        }
    }

    /// Available agents that satisfy `request`, ordered by agent ID.
    async fn candidates(&self, request: &RoutingRequest) -> Result<Vec<Agent>, CoreError> {
        let mut agents = self.store.list_available_agents(&request.department).await?;
        agents.retain(|agent| {
            agent.speaks_all(&request.languages)
                && agent.matches_type(&request.agent_type)
                && request.agent_id.as_ref().is_none_or(|wanted| *wanted == agent.agent_id)
        });
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(agents)
    }

    async fn commit(
        &self,
        request: RoutingRequest,
        candidates: Vec<Agent>,
    ) -> Result<Assignment, CoreError> {
        let room_id = request.room_id.as_str();
        let agent = self
            .reserve(room_id, &candidates)
            .await
            .map_err(|e| CoreError::assignment_failed(room_id, e))?;
        let agent_id = agent.agent_id.as_str();

        let credential = match self.issue(room_id, agent_id).await {
            Ok(credential) => credential,
            Err(e) => {
                self.compensate(room_id, agent_id, &e).await;
                return Err(CoreError::assignment_failed(room_id, e));
            }
        };

        let assignment = Assignment {
            room_id: request.room_id.clone(),
            agent_id: Some(agent.agent_id.clone()),
            credential,
            department: request.department.clone(),
            languages: request.languages.clone(),
            session: request.session.clone(),
            assigned_at_ms: epoch_ms(),
        };
        let previous = match self.store.put_assignment(room_id, assignment.clone()).await {
            Ok(previous) => previous,
            Err(e) => {
                self.compensate(room_id, agent_id, &e).await;
                return Err(CoreError::assignment_failed(room_id, e));
            }
        };

        if let Some(superseded) = previous.and_then(|p| p.agent_id).filter(|id| id != agent_id) {
            match self.store.set_available(&superseded).await {
                Ok(()) => info!(room_id, agent_id = %superseded, "superseded agent released"),
                Err(CoreError::NotFound) => {
                    warn!(room_id, agent_id = %superseded, "superseded agent is not registered")
                }
                Err(e) => {
                    error!(room_id, agent_id = %superseded, err = %e, "failed to release superseded agent")
                }
            }
        }

        info!(room_id, agent_id, department = %assignment.department, "room assigned");
        Ok(assignment)
    }

    /// Reserve the first candidate whose CAS succeeds.
    async fn reserve(&self, room_id: &str, candidates: &[Agent]) -> Result<Agent, CoreError> {
        for agent in candidates {
            match self.store.try_set_unavailable(&agent.agent_id).await {
                Ok(true) => return Ok(agent.clone()),
                Ok(false) => debug!(room_id, agent_id = %agent.agent_id, "lost reservation race"),
                Err(CoreError::NotFound) => {
                    debug!(room_id, agent_id = %agent.agent_id, "candidate vanished")
                }
                Err(e) => return Err(e),
            }
        }
        Err(CoreError::NoAgentAvailable)
    }

    async fn issue(&self, room_id: &str, agent_id: &str) -> Result<String, CoreError> {
        let mut attempt: u8 = 0;
        loop {
            match self.issuer.issue(room_id, agent_id).await {
                Ok(credential) => return Ok(credential),
                Err(e) if attempt < self.retry.retries => {
                    attempt += 1;
                    let delay = self.retry.delay();
                    warn!(
                        room_id,
                        agent_id,
                        err = %e,
                        delay_ms = delay.as_millis() as u64,
                        "credential issue failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(room_id, agent_id, err = %e, "credential issue failed");
                    return Err(e);
                }
            }
        }
    }

    /// Hand a reserved agent back after a failed routing step.
    async fn compensate(&self, room_id: &str, agent_id: &str, cause: &CoreError) {
        match self.store.set_available(agent_id).await {
            Ok(()) => warn!(room_id, agent_id, reason = %cause.reason(), "reservation rolled back"),
            Err(e) => error!(
                room_id,
                agent_id,
                reason = %cause.reason(),
                err = %e,
                "reservation rollback failed"
            ),
        }
    }

    /// Free the agent bound to `room_id` and drop the binding.
    ///
    /// Returns whether this call removed a binding. Releasing an unknown room
    /// succeeds.
    pub async fn release(&self, room_id: &str) -> Result<bool, CoreError> {
        let assignment = match self.store.get_assignment(room_id).await {
            Ok(assignment) => assignment,
            Err(CoreError::NotFound) => {
                debug!(room_id, "release of unbound room");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        // Unbind only the binding read above. A route that rebound the room
        // in between owns the room now and has already freed this agent.
        if !self.store.swap_assignment(room_id, Some(&assignment), None).await? {
            debug!(room_id, "room rebound during release");
            return Ok(false);
        }

        if let Some(agent_id) = assignment.agent_id.clone() {
            match self.store.set_available(&agent_id).await {
                Ok(()) => {}
                Err(CoreError::NotFound) => {
                    warn!(room_id, agent_id = %agent_id, "released agent is not registered")
                }
                Err(e) => {
                    self.rebind(room_id, assignment, &e).await;
                    return Err(e);
                }
            }
        }
        info!(room_id, agent_id = ?assignment.agent_id, "room released");
        Ok(true)
    }

    /// Put back a binding whose agent could not be freed, unless the room
    /// was bound again meanwhile.
    async fn rebind(&self, room_id: &str, assignment: Assignment, cause: &CoreError) {
        let agent_id = assignment.agent_id.clone();
        match self.store.swap_assignment(room_id, None, Some(assignment)).await {
            Ok(true) => warn!(room_id, agent_id = ?agent_id, err = %cause, "release rolled back"),
            Ok(false) => error!(
                room_id,
                agent_id = ?agent_id,
                err = %cause,
                "release rollback lost to a newer binding"
            ),
            Err(e) => error!(
                room_id,
                agent_id = ?agent_id,
                err = %cause,
                rollback_err = %e,
                "release rollback failed"
            ),
        }
    }

    /// The active assignment for `room_id`.
    pub async fn lookup(&self, room_id: &str) -> Result<Assignment, CoreError> {
        self.store.get_assignment(room_id).await
    }

    pub async fn register_agents(&self, agents: Vec<Agent>) -> Result<usize, CoreError> {
        let count = self.store.register_agents(agents).await?;
        info!(count, "agents registered");
        Ok(count)
    }

    /// Registered agents, optionally narrowed by department and availability.
    pub async fn list_agents(
        &self,
        department: Option<&str>,
        available: Option<bool>,
    ) -> Result<Vec<Agent>, CoreError> {
        let mut agents = self.store.list_agents(department).await?;
        if let Some(available) = available {
            agents.retain(|a| a.is_available == available);
        }
        Ok(agents)
    }

    pub async fn stats(&self) -> Result<StoreStats, CoreError> {
        self.store.stats().await
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
