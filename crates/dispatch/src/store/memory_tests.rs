// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;
use crate::store::persist;

fn seeded() -> MemoryStore {
    let store = MemoryStore::new();
    let agents = vec![
        Agent::new("a2", "support").with_languages(&["en", "fr"]),
        Agent::new("a1", "support").with_languages(&["en"]),
        Agent::new("b1", "billing").with_languages(&["en"]),
    ];
    store.register_now(agents).ok();
    store
}

fn ids(agents: &[Agent]) -> Vec<&str> {
    agents.iter().map(|a| a.agent_id.as_str()).collect()
}

#[tokio::test]
async fn list_available_is_sorted_and_sharded() -> anyhow::Result<()> {
    let store = seeded();
    let support = store.list_available_agents("support").await?;
    assert_eq!(ids(&support), vec!["a1", "a2"]);

    let billing = store.list_available_agents("billing").await?;
    assert_eq!(ids(&billing), vec!["b1"]);

    assert!(store.list_available_agents("nobody").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn try_set_unavailable_succeeds_once() -> anyhow::Result<()> {
    let store = seeded();
    assert!(store.try_set_unavailable("a1").await?);
    assert!(!store.try_set_unavailable("a1").await?);

    let support = store.list_available_agents("support").await?;
    assert_eq!(ids(&support), vec!["a2"]);
    assert!(!store.get_agent("a1").await?.is_available);
    Ok(())
}

#[tokio::test]
async fn set_available_restores_and_bumps_version() -> anyhow::Result<()> {
    let store = seeded();
    let v0 = store.version("a1");
    store.try_set_unavailable("a1").await?;
    store.set_available("a1").await?;
    assert!(store.get_agent("a1").await?.is_available);
    assert_eq!(store.version("a1"), v0.map(|v| v + 2));

    // Already available: no write, no version change.
    store.set_available("a1").await?;
    assert_eq!(store.version("a1"), v0.map(|v| v + 2));
    Ok(())
}

#[tokio::test]
async fn unknown_agent_is_not_found() {
    let store = seeded();
    assert_eq!(store.get_agent("ghost").await, Err(CoreError::NotFound));
    assert_eq!(store.try_set_unavailable("ghost").await, Err(CoreError::NotFound));
    assert_eq!(store.set_available("ghost").await, Err(CoreError::NotFound));
}

#[tokio::test]
async fn concurrent_cas_has_exactly_one_winner() -> anyhow::Result<()> {
    let store = Arc::new(seeded());
    let winners = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..32 {
        let store = Arc::clone(&store);
        let winners = Arc::clone(&winners);
        handles.push(tokio::spawn(async move {
            if let Ok(true) = store.try_set_unavailable("a2").await {
                winners.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for handle in handles {
        handle.await?;
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn reregistration_keeps_availability_and_moves_department() -> anyhow::Result<()> {
    let store = seeded();
    store.try_set_unavailable("a1").await?;

    let moved = Agent::new("a1", "billing").with_name("Renamed").with_languages(&["en", "de"]);
    assert_eq!(store.register_agents(vec![moved]).await?, 1);

    let agent = store.get_agent("a1").await?;
    assert_eq!(agent.name, "Renamed");
    assert_eq!(agent.department, "billing");
    assert!(!agent.is_available);

    let support = store.list_agents(Some("support")).await?;
    assert_eq!(ids(&support), vec!["a2"]);
    let billing = store.list_agents(Some("billing")).await?;
    assert_eq!(ids(&billing), vec!["a1", "b1"]);
    Ok(())
}

#[tokio::test]
async fn assignments_replace_and_delete() -> anyhow::Result<()> {
    let store = seeded();
    let mut first = Assignment::pending("room-1", "support");
    first.agent_id = Some("a1".into());
    assert_eq!(store.put_assignment("room-1", first.clone()).await?, None);

    let mut second = first.clone();
    second.agent_id = Some("a2".into());
    assert_eq!(store.put_assignment("room-1", second.clone()).await?, Some(first));
    assert_eq!(store.get_assignment("room-1").await?, second);

    assert_eq!(store.delete_assignment("room-1").await?, Some(second));
    assert_eq!(store.delete_assignment("room-1").await?, None);
    assert_eq!(store.get_assignment("room-1").await, Err(CoreError::NotFound));
    Ok(())
}

#[tokio::test]
async fn closed_store_is_unavailable() {
    let store = seeded();
    store.close();
    assert!(matches!(store.get_agent("a1").await, Err(CoreError::StoreUnavailable(_))));
    assert!(matches!(store.try_set_unavailable("a1").await, Err(CoreError::StoreUnavailable(_))));
    assert!(matches!(store.get_assignment("room").await, Err(CoreError::StoreUnavailable(_))));
    assert!(matches!(store.stats().await, Err(CoreError::StoreUnavailable(_))));
}

#[tokio::test]
async fn stats_count_agents_and_rooms() -> anyhow::Result<()> {
    let store = seeded();
    store.try_set_unavailable("b1").await?;
    store.put_assignment("room-1", Assignment::pending("room-1", "billing")).await?;

    let stats = store.stats().await?;
    assert_eq!(stats, StoreStats { agents: 3, available_agents: 2, active_assignments: 1 });
    Ok(())
}

#[tokio::test]
async fn snapshot_round_trips_through_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("state").join("dispatch.json");

    let store = seeded();
    store.try_set_unavailable("a2").await?;
    let mut assignment = Assignment::pending("room-1", "support");
    assignment.agent_id = Some("a2".into());
    assignment.credential = "tok".into();
    store.put_assignment("room-1", assignment.clone()).await?;

    assert!(persist::flush(&store, &path)?);
    assert!(!persist::flush(&store, &path)?, "clean store should not rewrite");

    let restored = MemoryStore::from_snapshot(persist::load(&path)?);
    assert_eq!(restored.snapshot(), store.snapshot());
    assert!(!restored.get_agent("a2").await?.is_available);
    assert_eq!(restored.get_assignment("room-1").await?, assignment);
    Ok(())
}

#[tokio::test]
async fn swap_assignment_requires_matching_binding() -> anyhow::Result<()> {
    let store = seeded();
    let mut first = Assignment::pending("room-1", "support");
    first.agent_id = Some("a1".into());
    first.credential = "tok-1".into();
    let mut second = first.clone();
    second.agent_id = Some("a2".into());
    second.credential = "tok-2".into();

    assert!(store.swap_assignment("room-1", None, Some(first.clone())).await?);
    assert!(!store.swap_assignment("room-1", None, Some(second.clone())).await?);
    assert!(!store.swap_assignment("room-1", Some(&second), None).await?);
    assert_eq!(store.get_assignment("room-1").await?, first);

    // Same agent and credential counts as the same binding.
    let mut restamped = first.clone();
    restamped.assigned_at_ms += 1;
    assert!(store.swap_assignment("room-1", Some(&restamped), None).await?);
    assert_eq!(store.get_assignment("room-1").await, Err(CoreError::NotFound));
    assert!(!store.swap_assignment("room-1", Some(&first), None).await?);
    Ok(())
}

#[tokio::test]
async fn restore_reconciles_availability_with_assignments() -> anyhow::Result<()> {
    let store = seeded();
    // a1 reserved by a route whose assignment was never written.
    assert!(store.try_set_unavailable("a1").await?);
    // b1 bound to a room but recorded as available.
    let mut bound = Assignment::pending("room-9", "billing");
    bound.agent_id = Some("b1".into());
    bound.credential = "tok".into();
    store.put_assignment("room-9", bound.clone()).await?;

    let restored = MemoryStore::from_snapshot(store.snapshot());
    assert!(restored.get_agent("a1").await?.is_available);
    assert!(restored.get_agent("a2").await?.is_available);
    assert!(!restored.get_agent("b1").await?.is_available);
    assert_eq!(restored.get_assignment("room-9").await?, bound);
    assert_eq!(
        restored.stats().await?,
        StoreStats { agents: 3, available_agents: 2, active_assignments: 1 }
    );
    Ok(())
}

#[test]
fn missing_snapshot_loads_empty() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let snapshot = persist::load_or_default(&dir.path().join("absent.json"))?;
    assert_eq!(snapshot, persist::Snapshot::default());
    Ok(())
}

#[tokio::test]
async fn flusher_writes_on_shutdown() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("dispatch.json");
    let store = Arc::new(seeded());
    let shutdown = tokio_util::sync::CancellationToken::new();

    let handle = persist::spawn_flusher(
        Arc::clone(&store),
        path.clone(),
        std::time::Duration::from_secs(3600),
        shutdown.clone(),
    );
    shutdown.cancel();
    handle.await?;

    let snapshot = persist::load(&path)?;
    assert_eq!(ids(&snapshot.agents), vec!["a1", "a2", "b1"]);
    Ok(())
}
