// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client for the external credential-issuing service.
//!
//! One bounded-timeout request per credential. Every failure (timeout,
//! transport error, non-success status, unusable body) becomes
//! [`CoreError::IssuerUnavailable`]. Retry policy belongs to the caller.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Boxed future returned by [`CredentialIssuer::issue`].
pub type IssueFuture<'a> = Pin<Box<dyn Future<Output = Result<String, CoreError>> + Send + 'a>>;

/// Mints a session credential for a room/agent pair.
///
/// Object-safe for use as `Arc<dyn CredentialIssuer>`.
pub trait CredentialIssuer: Send + Sync + 'static {
    fn issue<'a>(&'a self, room_id: &'a str, agent_id: &'a str) -> IssueFuture<'a>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IssueRequest<'a> {
    room_id: &'a str,
    agent_id: &'a str,
}

/// Older issuer builds answer with `token`; `credential` wins when both
/// are present.
#[derive(Debug, Deserialize)]
struct IssueResponse {
    #[serde(default)]
    credential: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

impl IssueResponse {
    fn into_credential(self) -> Option<String> {
        let non_empty = |s: &String| !s.is_empty();
        self.credential.filter(non_empty).or(self.token.filter(non_empty))
    }
}

/// HTTP client for the credential service.
pub struct HttpIssuer {
    url: String,
    auth_token: Option<String>,
    client: Client,
}

impl HttpIssuer {
    pub fn new(url: String, auth_token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        crate::ensure_crypto();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build credential issuer client")?;
        Ok(Self { url, auth_token, client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn request(&self, room_id: &str, agent_id: &str) -> Result<String, CoreError> {
        let req = self.client.post(&self.url).json(&IssueRequest { room_id, agent_id });
        let resp = self.apply_auth(req).send().await.map_err(describe)?;
        let resp = resp.error_for_status().map_err(describe)?;
        let body: IssueResponse = resp.json().await.map_err(describe)?;
        body.into_credential()
            .ok_or_else(|| CoreError::IssuerUnavailable("response carried no credential".to_owned()))
    }
}

impl CredentialIssuer for HttpIssuer {
    fn issue<'a>(&'a self, room_id: &'a str, agent_id: &'a str) -> IssueFuture<'a> {
        Box::pin(self.request(room_id, agent_id))
    }
}

fn describe(e: reqwest::Error) -> CoreError {
    let detail = if e.is_timeout() {
        "request timed out".to_owned()
    } else if let Some(status) = e.status() {
        format!("status {status}")
    } else if e.is_decode() {
        format!("malformed response: {e}")
    } else {
        format!("request failed: {e}")
    };
    CoreError::IssuerUnavailable(detail)
}

#[cfg(test)]
#[path = "issuer_tests.rs"]
mod tests;
