// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent dispatch: binds rooms to available agents, issues each binding a
//! credential, and streams assignments to filtered subscribers.

pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod issuer;
pub mod model;
pub mod state;
pub mod store;
pub mod test_support;
pub mod transport;

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::bus::NotificationBus;
use crate::config::DispatchConfig;
use crate::engine::{AssignmentEngine, RetryPolicy};
use crate::issuer::HttpIssuer;
use crate::model::Agent;
use crate::state::AppState;
use crate::store::{persist, MemoryStore, StateStore};
use crate::transport::build_router;

/// Install the process-wide rustls crypto provider. Safe to call repeatedly.
pub fn ensure_crypto() {
    static INSTALL: std::sync::Once = std::sync::Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Agents file contents: a bare array or `{"agents": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum AgentsFile {
    List(Vec<Agent>),
    Wrapped { agents: Vec<Agent> },
}

/// Read agents for startup registration.
pub fn load_agents(path: &Path) -> anyhow::Result<Vec<Agent>> {
    let contents = std::fs::read_to_string(path)?;
    let agents = match serde_json::from_str::<AgentsFile>(&contents)? {
        AgentsFile::List(agents) | AgentsFile::Wrapped { agents } => agents,
    };
    if let Some(bad) =
        agents.iter().find(|a| a.agent_id.trim().is_empty() || a.department.trim().is_empty())
    {
        anyhow::bail!("agent {:?} needs a non-empty agentId and department", bad.agent_id);
    }
    Ok(agents)
}

/// Bind `config.addr()` and serve until `shutdown` fires.
pub async fn run(config: DispatchConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.addr()).await?;
    serve(listener, config, shutdown).await
}

/// Serve on an already-bound listener until `shutdown` fires.
///
/// On shutdown the bus is closed first so open streams drain and end, then
/// in-flight requests finish, then the snapshot is flushed one last time and
/// the store is closed.
pub async fn serve(
    listener: TcpListener,
    config: DispatchConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    ensure_crypto();

    let store = Arc::new(match config.state_file {
        Some(ref path) => {
            let snapshot = persist::load_or_default(path)?;
            tracing::info!(
                path = %path.display(),
                agents = snapshot.agents.len(),
                assignments = snapshot.assignments.len(),
                "state loaded"
            );
            MemoryStore::from_snapshot(snapshot)
        }
        None => MemoryStore::new(),
    });

    if let Some(ref path) = config.agents_file {
        let agents = load_agents(path)?;
        let count = store.register_agents(agents).await?;
        tracing::info!(path = %path.display(), count, "agents file loaded");
    }

    let issuer = Arc::new(HttpIssuer::new(
        config.issuer_url.clone(),
        config.issuer_token.clone(),
        config.issuer_timeout(),
    )?);
    let engine = AssignmentEngine::new(
        Arc::clone(&store) as Arc<dyn StateStore>,
        issuer,
        RetryPolicy::from_config(&config),
    );
    let bus = NotificationBus::new(config.bus_capacity);

    // The flusher stops after the server does, so its final write sees every
    // completed request.
    let flush_stop = CancellationToken::new();
    let flusher = config.state_file.clone().map(|path| {
        persist::spawn_flusher(
            Arc::clone(&store),
            path,
            config.snapshot_interval(),
            flush_stop.clone(),
        )
    });

    let state = Arc::new(AppState::new(engine, bus, config, shutdown.clone()));
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            state.shutdown.cancelled().await;
            state.bus.shutdown();
        });
    }

    let addr = listener.local_addr()?;
    tracing::info!(
        %addr,
        issuer = %state.config.issuer_url,
        auth = state.config.auth_token.is_some(),
        "agent-dispatch listening"
    );
    let router = build_router(Arc::clone(&state));
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    state.bus.shutdown();
    flush_stop.cancel();
    if let Some(flusher) = flusher {
        if let Err(e) = flusher.await {
            tracing::error!(err = %e, "snapshot flusher panicked");
        }
    }
    store.close();
    tracing::info!("agent-dispatch stopped");
    Ok(())
}
