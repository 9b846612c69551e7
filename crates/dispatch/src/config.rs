// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::engine::RetryPolicy;

/// Configuration for the dispatch server.
#[derive(Debug, Clone, Parser)]
#[command(name = "agent-dispatch", version, about = "Route rooms to available agents.")]
pub struct DispatchConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "DISPATCH_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9700, env = "DISPATCH_PORT")]
    pub port: u16,

    /// Bearer token for API auth. If unset, auth is disabled.
    #[arg(long, env = "DISPATCH_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Credential service endpoint (POST).
    #[arg(long, env = "DISPATCH_ISSUER_URL")]
    pub issuer_url: String,

    /// Bearer token sent to the credential service.
    #[arg(long, env = "DISPATCH_ISSUER_TOKEN")]
    pub issuer_token: Option<String>,

    /// Per-request credential service timeout in milliseconds.
    #[arg(long, default_value_t = 5000, env = "DISPATCH_ISSUER_TIMEOUT_MS")]
    pub issuer_timeout_ms: u64,

    /// Retries after a failed credential request (0 or 1).
    #[arg(long, default_value_t = 1, env = "DISPATCH_ISSUER_RETRIES")]
    pub issuer_retries: u8,

    /// Upper bound of the random wait before a retry, in milliseconds.
    #[arg(long, default_value_t = 250, env = "DISPATCH_RETRY_JITTER_MS")]
    pub retry_jitter_ms: u64,

    /// JSON file of agents to register at startup.
    #[arg(long, env = "DISPATCH_AGENTS_FILE")]
    pub agents_file: Option<PathBuf>,

    /// Snapshot file for agents and assignments. Memory only when unset.
    #[arg(long, env = "DISPATCH_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Snapshot flush interval in milliseconds.
    #[arg(long, default_value_t = 5000, env = "DISPATCH_SNAPSHOT_INTERVAL_MS")]
    pub snapshot_interval_ms: u64,

    /// Events buffered per subscriber before the oldest are dropped.
    #[arg(long, default_value_t = 256, env = "DISPATCH_BUS_CAPACITY")]
    pub bus_capacity: usize,

    /// Log format (json or text).
    #[arg(long, default_value = "json", env = "DISPATCH_LOG_FORMAT")]
    pub log_format: String,

    /// Log level filter (e.g. `info`, `agent_dispatch=debug`).
    #[arg(long, default_value = "info", env = "DISPATCH_LOG_LEVEL")]
    pub log_level: String,
}

impl DispatchConfig {
    /// Validate values clap cannot check on its own.
    pub fn validate(&self) -> anyhow::Result<()> {
        let url = self.issuer_url.trim();
        if url.is_empty() {
            anyhow::bail!("--issuer-url must not be empty");
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("--issuer-url must be an http:// or https:// URL");
        }
        if self.issuer_retries > RetryPolicy::MAX_RETRIES {
            anyhow::bail!("--issuer-retries must be 0 or 1");
        }
        if self.issuer_timeout_ms == 0 {
            anyhow::bail!("--issuer-timeout-ms must be greater than zero");
        }
        if self.bus_capacity == 0 {
            anyhow::bail!("--bus-capacity must be greater than zero");
        }
        if self.snapshot_interval_ms == 0 {
            anyhow::bail!("--snapshot-interval-ms must be greater than zero");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn issuer_timeout(&self) -> Duration {
        Duration::from_millis(self.issuer_timeout_ms)
    }

    pub fn retry_jitter(&self) -> Duration {
        Duration::from_millis(self.retry_jitter_ms)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }

    /// Build a minimal config for tests (port 0, unreachable issuer).
    #[doc(hidden)]
    pub fn test() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            auth_token: None,
            issuer_url: "http://127.0.0.1:1/issue".into(),
            issuer_token: None,
            issuer_timeout_ms: 1000,
            issuer_retries: 1,
            retry_jitter_ms: 0,
            agents_file: None,
            state_file: None,
            snapshot_interval_ms: 5000,
            bus_capacity: 64,
            log_format: "text".into(),
            log_level: "debug".into(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
