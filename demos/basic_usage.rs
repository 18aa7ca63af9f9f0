//! Basic usage: open a store, write records, reconcile against a remote
//! snapshot, report usage and shut down.
//!
//! Run with: `cargo run --example basic_usage`

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use task_sync_engine::entity::{Entity, Project, Task, TaskPriority};
use task_sync_engine::{
    DeletionPolicy, Reconciler, RemoteSource, StoreConfig, SyncError, TieredStore,
};

/// Stand-in for a cloud collection.
struct InMemoryRemote {
    tasks: Vec<Task>,
}

#[async_trait]
impl RemoteSource<Task> for InMemoryRemote {
    async fn fetch_all(&self) -> Result<Vec<Task>, SyncError> {
        Ok(self.tasks.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let dir = tempfile::tempdir()?;
    let config = StoreConfig {
        slow_tier_dir: dir.path().join("records"),
        ..Default::default()
    };
    let store = Arc::new(TieredStore::open(config).await?);
    store.start_maintenance();

    // Local edits
    let project = store.create(Project::new("Website relaunch")).await?;
    let mut draft = Task::new("Draft copy");
    draft.project_id = Some(project.id());
    let draft = store.create(draft).await?;
    let stale = store.create(Task::new("Old idea")).await?;

    let mut edit = draft.clone();
    edit.priority = TaskPriority::High;
    let draft = store.update(edit).await?;
    info!(version = draft.meta.version, "Draft updated locally");

    // The remote has a newer draft, one new task, and no longer has "Old idea"
    let mut remote_draft = draft.clone();
    remote_draft.title = "Draft copy (reviewed)".into();
    remote_draft.meta.updated_at = Utc::now() + Duration::seconds(1);
    let remote = InMemoryRemote {
        tasks: vec![remote_draft, Task::new("Publish")],
    };

    let reconciler = Reconciler::new(store.clone());
    let report = reconciler
        .sync_collection(&remote, &DeletionPolicy::MirrorSnapshot, &CancellationToken::new())
        .await?;
    info!(
        created = report.created,
        updated = report.updated,
        deleted = report.deleted,
        "Synced tasks"
    );
    assert!(store.get::<Task>(stale.id()).await?.is_none());

    for task in store.list::<Task>().await? {
        info!(title = %task.title, version = task.meta.version, "Task");
    }

    let info = store.info().await?;
    info!(
        strategy = %info.strategy,
        fast_bytes = info.usage.fast_bytes,
        slow_bytes = info.usage.slow_bytes,
        cache_bytes = info.usage.cache_bytes,
        optimized = info.is_optimized,
        "Storage usage"
    );

    store.shutdown().await;
    Ok(())
}
