// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Records shared by the store, engine, bus, and front door.
//!
//! All wire and snapshot formats use camelCase field names.

use serde::{Deserialize, Serialize};

/// Agent type assumed when a registration omits one.
pub const DEFAULT_AGENT_TYPE: &str = "human";

/// Request type that matches agents of any type.
pub const ANY_AGENT_TYPE: &str = "any";

/// A human agent that can be bound to rooms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    #[serde(alias = "id")]
    pub agent_id: String,
    #[serde(default)]
    pub name: String,
    pub department: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default = "default_agent_type")]
    pub agent_type: String,
    #[serde(default = "default_available")]
    pub is_available: bool,
}

fn default_agent_type() -> String {
    DEFAULT_AGENT_TYPE.to_owned()
}

fn default_available() -> bool {
    true
}

impl Agent {
    pub fn new(agent_id: impl Into<String>, department: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: String::new(),
            department: department.into(),
            languages: Vec::new(),
            agent_type: default_agent_type(),
            is_available: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_languages(mut self, languages: &[&str]) -> Self {
        self.languages = languages.iter().map(|l| (*l).to_owned()).collect();
        self
    }

    pub fn with_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = agent_type.into();
        self
    }

    /// True if this agent speaks every language in `required`.
    pub fn speaks_all(&self, required: &[String]) -> bool {
        covers(&self.languages, required)
    }

    /// True if this agent satisfies the requested agent type.
    ///
    /// An empty request or [`ANY_AGENT_TYPE`] matches every agent.
    pub fn matches_type(&self, requested: &str) -> bool {
        let requested = requested.trim();
        requested.is_empty()
            || requested.eq_ignore_ascii_case(ANY_AGENT_TYPE)
            || self.agent_type.eq_ignore_ascii_case(requested)
    }
}

/// An inbound request to bind a room to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRequest {
    pub room_id: String,
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub agent_type: String,
    pub department: String,
    #[serde(default)]
    pub languages: Vec<String>,
    /// Caller-chosen agent. When set, only this agent is considered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

impl RoutingRequest {
    pub fn new(room_id: impl Into<String>, department: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            session: String::new(),
            agent_type: String::new(),
            department: department.into(),
            languages: Vec::new(),
            agent_id: None,
        }
    }

    pub fn with_languages(mut self, languages: &[&str]) -> Self {
        self.languages = languages.iter().map(|l| (*l).to_owned()).collect();
        self
    }

    pub fn with_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = agent_type.into();
        self
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = session.into();
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Check the fields the front door requires before routing.
    pub fn validate(&self) -> Result<(), String> {
        if self.room_id.trim().is_empty() {
            return Err("roomId must not be empty".to_owned());
        }
        if self.department.trim().is_empty() {
            return Err("department must not be empty".to_owned());
        }
        if self.languages.iter().any(|l| l.trim().is_empty()) {
            return Err("languages must not contain empty entries".to_owned());
        }
        Ok(())
    }
}

/// The binding of a room to an agent plus the issued credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub room_id: String,
    /// `None` while the room is bound but no agent has been picked yet.
    pub agent_id: Option<String>,
    pub credential: String,
    pub department: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub assigned_at_ms: u64,
}

impl Assignment {
    /// A room binding that has not been given an agent.
    pub fn pending(room_id: impl Into<String>, department: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            agent_id: None,
            credential: String::new(),
            department: department.into(),
            languages: Vec::new(),
            session: String::new(),
            assigned_at_ms: epoch_ms(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.agent_id.is_none()
    }

    /// True if both bind the same agent under the same credential.
    pub fn same_binding(&self, other: &Assignment) -> bool {
        self.agent_id == other.agent_id && self.credential == other.credential
    }
}

/// True if `have` contains every entry of `want`.
pub fn covers(have: &[String], want: &[String]) -> bool {
    want.iter().all(|w| have.iter().any(|h| h == w))
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
