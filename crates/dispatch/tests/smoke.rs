// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Smoke tests against the compiled `agent-dispatch` binary.

use std::process::Stdio;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;
use tokio::process::{Child, Command};

use agent_dispatch::model::Assignment;
use agent_dispatch::test_support::{IssuerBehavior, MockIssuerServer};

const BIN: &str = env!("CARGO_BIN_EXE_agent-dispatch");

/// Reserve a free local port by binding and releasing it.
fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

fn spawn(args: &[&str]) -> anyhow::Result<Child> {
    let child = Command::new(BIN)
        .args(args)
        .env_remove("DISPATCH_AUTH_TOKEN")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;
    Ok(child)
}

async fn wait_healthy(client: &reqwest::Client, base: &str) -> anyhow::Result<()> {
    for _ in 0..100 {
        if let Ok(resp) = client.get(format!("{base}/api/v1/health")).send().await {
            if resp.status().is_success() {
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    anyhow::bail!("server at {base} never became healthy")
}

#[tokio::test]
async fn rejects_invalid_config() -> anyhow::Result<()> {
    let status = Command::new(BIN)
        .args(["--issuer-url", "ftp://nowhere", "--port", "0"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    assert_eq!(status.code(), Some(2));
    Ok(())
}

#[tokio::test]
async fn routes_streams_and_stops_on_sigterm() -> anyhow::Result<()> {
    agent_dispatch::ensure_crypto();
    let issuer = MockIssuerServer::spawn(IssuerBehavior::TokenField).await?;
    let dir = tempfile::tempdir()?;
    let agents_file = dir.path().join("agents.json");
    std::fs::write(
        &agents_file,
        serde_json::to_vec(&json!({
            "agents": [{ "id": "A1", "department": "support", "languages": ["en", "fr"] }]
        }))?,
    )?;
    let port = free_port()?.to_string();
    let issuer_url = issuer.url();
    let agents_path = agents_file.display().to_string();

    let mut child = spawn(&[
        "--port",
        &port,
        "--issuer-url",
        &issuer_url,
        "--agents-file",
        &agents_path,
        "--auth-token",
        "smoke",
        "--log-format",
        "text",
    ])?;

    let base = format!("http://127.0.0.1:{port}");
    let client = reqwest::Client::new();
    wait_healthy(&client, &base).await?;

    let ws_url = format!("ws://127.0.0.1:{port}/ws/assignments?department=support&languages=fr&token=smoke");
    let (mut ws, _) = tokio_tungstenite::connect_async(ws_url).await?;

    let resp = client
        .post(format!("{base}/api/v1/route"))
        .bearer_auth("smoke")
        .json(&json!({ "roomId": "room-42", "department": "support", "languages": ["fr"] }))
        .send()
        .await?;
    assert_eq!(resp.status(), 200);
    let assignment: Assignment = resp.json().await?;
    assert_eq!(assignment.agent_id.as_deref(), Some("A1"));
    assert_eq!(assignment.credential, "token:room-42:A1");

    let frame = tokio::time::timeout(Duration::from_secs(5), ws.next()).await?;
    let frame = frame.ok_or_else(|| anyhow::anyhow!("stream ended"))??;
    let pushed: Assignment = serde_json::from_str(frame.to_text()?)?;
    assert_eq!(pushed.room_id, "room-42");

    let released: serde_json::Value = client
        .delete(format!("{base}/api/v1/rooms/room-42"))
        .bearer_auth("smoke")
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(released["released"], true);

    let pid = child.id().ok_or_else(|| anyhow::anyhow!("child already exited"))?;
    let killed = Command::new("kill").args(["-TERM", &pid.to_string()]).status().await?;
    assert!(killed.success());

    let status = tokio::time::timeout(Duration::from_secs(10), child.wait()).await??;
    assert!(status.success(), "unexpected exit: {status:?}");
    Ok(())
}
