// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: fake issuers, fault-injecting stores, a mock
//! credential service, and assertion helpers.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::bus::NotificationBus;
use crate::config::DispatchConfig;
use crate::engine::{AssignmentEngine, RetryPolicy};
use crate::error::CoreError;
use crate::issuer::{CredentialIssuer, IssueFuture};
use crate::model::{Agent, Assignment};
use crate::state::AppState;
use crate::store::{MemoryStore, StateStore, StoreFuture, StoreStats};

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}

/// The two-agent customer-service pool used across engine and API tests.
///
/// `A1` speaks English only, `A2` speaks English and Spanish.
pub fn sample_agents() -> Vec<Agent> {
    vec![
        Agent::new("A1", "customer-service").with_name("Ada").with_languages(&["en"]),
        Agent::new("A2", "customer-service").with_name("Bo").with_languages(&["en", "es"]),
    ]
}

/// A memory store preloaded with `agents`.
pub fn seeded_store(agents: Vec<Agent>) -> Arc<MemoryStore> {
    let store = MemoryStore::from_snapshot(crate::store::persist::Snapshot {
        agents,
        assignments: Vec::new(),
    });
    Arc::new(store)
}

// -- Scripted issuer ----------------------------------------------------------

/// In-process [`CredentialIssuer`] that replays scripted outcomes.
///
/// Once the script is exhausted every call succeeds with
/// `cred-{room}-{agent}`.
#[derive(Default)]
pub struct ScriptedIssuer {
    script: Mutex<VecDeque<Result<String, CoreError>>>,
    calls: Mutex<Vec<(String, String)>>,
    delay: Option<Duration>,
}

impl ScriptedIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls with `IssuerUnavailable`.
    pub fn fail_times(self, n: usize) -> Self {
        {
            let mut script = self.script.lock();
            for _ in 0..n {
                script.push_back(Err(CoreError::IssuerUnavailable("scripted failure".into())));
            }
        }
        self
    }

    /// Fail every call.
    pub fn always_fail(self) -> Self {
        self.fail_times(64)
    }

    /// Sleep for `delay` before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// `(room_id, agent_id)` for every call, in order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

impl CredentialIssuer for ScriptedIssuer {
    fn issue<'a>(&'a self, room_id: &'a str, agent_id: &'a str) -> IssueFuture<'a> {
        Box::pin(async move {
            self.calls.lock().push((room_id.to_owned(), agent_id.to_owned()));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let scripted = self.script.lock().pop_front();
            scripted.unwrap_or_else(|| Ok(format!("cred-{room_id}-{agent_id}")))
        })
    }
}

// -- Faulty store -------------------------------------------------------------

/// Store operations that [`FaultyStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetAgent,
    ListAvailable,
    TrySetUnavailable,
    SetAvailable,
    PutAssignment,
    GetAssignment,
    DeleteAssignment,
    SwapAssignment,
    Stats,
}

/// Parks the next call of one [`StoreOp`] after it completes, until resumed.
#[derive(Default)]
pub struct StoreHold {
    reached: Notify,
    resume: Notify,
}

impl StoreHold {
    /// Wait until the held operation has run.
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    /// Let the held call return to its caller.
    pub fn resume(&self) {
        self.resume.notify_one();
    }
}

/// [`StateStore`] wrapper that fails selected operations with
/// `StoreUnavailable`, or parks them to force an interleaving.
pub struct FaultyStore {
    inner: Arc<MemoryStore>,
    failing: Mutex<HashSet<StoreOp>>,
    holds: Mutex<HashMap<StoreOp, Arc<StoreHold>>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self { inner, failing: Mutex::new(HashSet::new()), holds: Mutex::new(HashMap::new()) }
    }

    /// Park the next call of `op` once the inner store has served it.
    pub fn hold_after(&self, op: StoreOp) -> Arc<StoreHold> {
        let hold = Arc::new(StoreHold::default());
        self.holds.lock().insert(op, Arc::clone(&hold));
        hold
    }

    pub fn inner(&self) -> &Arc<MemoryStore> {
        &self.inner
    }

    pub fn fail(&self, op: StoreOp) {
        self.failing.lock().insert(op);
    }

    pub fn heal(&self, op: StoreOp) {
        self.failing.lock().remove(&op);
    }

    fn check(&self, op: StoreOp) -> Result<(), CoreError> {
        if self.failing.lock().contains(&op) {
            return Err(CoreError::StoreUnavailable(format!("injected fault: {op:?}")));
        }
        Ok(())
    }

    /// Run `call` against the inner store unless `op` is failing. The inner
    /// call is not started when the fault fires.
    fn guarded<'a, T, F>(&'a self, op: StoreOp, call: F) -> StoreFuture<'a, T>
    where
        T: Send + 'a,
        F: FnOnce() -> StoreFuture<'a, T> + Send + 'a,
    {
        Box::pin(async move {
            self.check(op)?;
            let result = call().await;
            let hold = self.holds.lock().remove(&op);
            if let Some(hold) = hold {
                hold.reached.notify_one();
                hold.resume.notified().await;
            }
            result
        })
    }
}

impl StateStore for FaultyStore {
    fn get_agent<'a>(&'a self, agent_id: &'a str) -> StoreFuture<'a, Agent> {
        self.guarded(StoreOp::GetAgent, || self.inner.get_agent(agent_id))
    }

    fn list_available_agents<'a>(&'a self, department: &'a str) -> StoreFuture<'a, Vec<Agent>> {
        self.guarded(StoreOp::ListAvailable, || self.inner.list_available_agents(department))
    }

    fn try_set_unavailable<'a>(&'a self, agent_id: &'a str) -> StoreFuture<'a, bool> {
        self.guarded(StoreOp::TrySetUnavailable, || self.inner.try_set_unavailable(agent_id))
    }

    fn set_available<'a>(&'a self, agent_id: &'a str) -> StoreFuture<'a, ()> {
        self.guarded(StoreOp::SetAvailable, || self.inner.set_available(agent_id))
    }

    fn put_assignment<'a>(
        &'a self,
        room_id: &'a str,
        assignment: Assignment,
    ) -> StoreFuture<'a, Option<Assignment>> {
        self.guarded(StoreOp::PutAssignment, || self.inner.put_assignment(room_id, assignment))
    }

    fn get_assignment<'a>(&'a self, room_id: &'a str) -> StoreFuture<'a, Assignment> {
        self.guarded(StoreOp::GetAssignment, || self.inner.get_assignment(room_id))
    }

    fn delete_assignment<'a>(&'a self, room_id: &'a str) -> StoreFuture<'a, Option<Assignment>> {
        self.guarded(StoreOp::DeleteAssignment, || self.inner.delete_assignment(room_id))
    }

    fn swap_assignment<'a>(
        &'a self,
        room_id: &'a str,
        expected: Option<&'a Assignment>,
        replacement: Option<Assignment>,
    ) -> StoreFuture<'a, bool> {
        self.guarded(StoreOp::SwapAssignment, move || {
            self.inner.swap_assignment(room_id, expected, replacement)
        })
    }

    fn register_agents(&self, agents: Vec<Agent>) -> StoreFuture<'_, usize> {
        self.inner.register_agents(agents)
    }

    fn list_agents<'a>(&'a self, department: Option<&'a str>) -> StoreFuture<'a, Vec<Agent>> {
        self.inner.list_agents(department)
    }

    fn stats(&self) -> StoreFuture<'_, StoreStats> {
        self.guarded(StoreOp::Stats, || self.inner.stats())
    }
}

// -- Mock credential service --------------------------------------------------

/// How [`MockIssuerServer`] answers `POST /issue`.
#[derive(Debug, Clone, Copy)]
pub enum IssuerBehavior {
    /// `200 {"credential": "cred:{room}:{agent}"}`
    Credential,
    /// `200 {"token": "token:{room}:{agent}"}`
    TokenField,
    /// `200` carrying both `credential` and `token`.
    BothFields,
    /// Bare status code with an empty body.
    Status(u16),
    /// `200 {"credential": ""}`
    EmptyCredential,
    /// `200` with a body that is not JSON.
    Garbage,
    /// Sleep, then answer like [`IssuerBehavior::Credential`].
    Delay(Duration),
    /// Answer `503` for the first `n` calls, then like `Credential`.
    FailFirst(usize),
}

/// One request received by [`MockIssuerServer`].
#[derive(Debug, Clone)]
pub struct IssuedCall {
    pub room_id: String,
    pub agent_id: String,
    pub bearer: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueBody {
    room_id: String,
    agent_id: String,
}

struct MockInner {
    behavior: IssuerBehavior,
    calls: Mutex<Vec<IssuedCall>>,
    served: AtomicUsize,
}

/// Local HTTP credential service bound to an ephemeral port.
///
/// Stops serving when dropped.
pub struct MockIssuerServer {
    addr: SocketAddr,
    inner: Arc<MockInner>,
    shutdown: CancellationToken,
}

impl MockIssuerServer {
    pub async fn spawn(behavior: IssuerBehavior) -> anyhow::Result<Self> {
        let inner = Arc::new(MockInner {
            behavior,
            calls: Mutex::new(Vec::new()),
            served: AtomicUsize::new(0),
        });
        let router = Router::new().route("/issue", post(mock_issue)).with_state(Arc::clone(&inner));
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).with_graceful_shutdown(sd.cancelled_owned()).await;
        });
        Ok(Self { addr, inner, shutdown })
    }

    /// Full URL of the issue endpoint.
    pub fn url(&self) -> String {
        format!("http://{}/issue", self.addr)
    }

    pub fn calls(&self) -> Vec<IssuedCall> {
        self.inner.calls.lock().clone()
    }
}

impl Drop for MockIssuerServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn mock_issue(
    State(inner): State<Arc<MockInner>>,
    headers: HeaderMap,
    Json(body): Json<IssueBody>,
) -> Response {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned);
    inner.calls.lock().push(IssuedCall {
        room_id: body.room_id.clone(),
        agent_id: body.agent_id.clone(),
        bearer,
    });
    let nth = inner.served.fetch_add(1, Ordering::SeqCst);

    let credential = format!("cred:{}:{}", body.room_id, body.agent_id);
    match inner.behavior {
        IssuerBehavior::Credential => Json(serde_json::json!({ "credential": credential })).into_response(),
        IssuerBehavior::TokenField => {
            let token = format!("token:{}:{}", body.room_id, body.agent_id);
            Json(serde_json::json!({ "token": token })).into_response()
        }
        IssuerBehavior::BothFields => {
            let token = format!("token:{}:{}", body.room_id, body.agent_id);
            Json(serde_json::json!({ "credential": credential, "token": token })).into_response()
        }
        IssuerBehavior::Status(code) => {
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
        IssuerBehavior::EmptyCredential => Json(serde_json::json!({ "credential": "" })).into_response(),
        IssuerBehavior::Garbage => (StatusCode::OK, "<html>nope</html>").into_response(),
        IssuerBehavior::Delay(delay) => {
            tokio::time::sleep(delay).await;
            Json(serde_json::json!({ "credential": credential })).into_response()
        }
        IssuerBehavior::FailFirst(n) if nth < n => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        IssuerBehavior::FailFirst(_) => Json(serde_json::json!({ "credential": credential })).into_response(),
    }
}

// -- AppState builder ---------------------------------------------------------

/// Builder for constructing [`AppState`] in tests with sensible defaults.
pub struct AppStateBuilder {
    agents: Vec<Agent>,
    store: Option<Arc<dyn StateStore>>,
    issuer: Arc<dyn CredentialIssuer>,
    retry: RetryPolicy,
    config: DispatchConfig,
}

impl Default for AppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self {
            agents: sample_agents(),
            store: None,
            issuer: Arc::new(ScriptedIssuer::new()),
            retry: RetryPolicy::immediate(),
            config: DispatchConfig::test(),
        }
    }

    pub fn agents(mut self, agents: Vec<Agent>) -> Self {
        self.agents = agents;
        self
    }

    /// Use `store` instead of a fresh memory store. Ignores `agents`.
    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn issuer(mut self, issuer: Arc<dyn CredentialIssuer>) -> Self {
        self.issuer = issuer;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.config.auth_token = Some(token.into());
        self
    }

    pub fn bus_capacity(mut self, capacity: usize) -> Self {
        self.config.bus_capacity = capacity;
        self
    }

    pub fn build(self) -> Arc<AppState> {
        let store: Arc<dyn StateStore> = match self.store {
            Some(store) => store,
            None => seeded_store(self.agents),
        };
        let engine = AssignmentEngine::new(store, self.issuer, self.retry);
        let bus = NotificationBus::new(self.config.bus_capacity);
        Arc::new(AppState::new(engine, bus, self.config, CancellationToken::new()))
    }
}
