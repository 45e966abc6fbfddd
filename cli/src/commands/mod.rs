mod helpers;
mod pantry;
mod plan;
mod recipe;
mod sync;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, warn};

use crate::remote::HttpCollection;
use cookoo_core::db::Database;
use cookoo_core::store::{RecipeStore, RemoteOutcome, SyncConfig, WriteReceipt};

pub(crate) use helpers::parse_date;
pub(crate) use pantry::{
    cmd_pantry_add, cmd_pantry_expiring, cmd_pantry_list, cmd_pantry_recommend, cmd_pantry_remove,
};
pub(crate) use plan::{
    cmd_plan_add, cmd_plan_remove, cmd_plan_shopping_list, cmd_plan_show, cmd_plan_week,
};
pub(crate) use recipe::{
    RecipeFields, cmd_recipe_add, cmd_recipe_favorite, cmd_recipe_list, cmd_recipe_remove,
    cmd_recipe_show, cmd_recipe_update, cmd_suggest,
};
pub(crate) use sync::cmd_sync;

/// How long to wait for the first seed pass and snapshot before working
/// from the local cache alone.
const READY_TIMEOUT: Duration = Duration::from_secs(15);
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(3);
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the shared recipe collection lives.
pub(crate) struct RemoteTarget {
    pub url: String,
    pub project: String,
}

/// Open the recipe store and, with a remote configured, bring it up to date
/// before returning.
pub(crate) async fn open_store(db: &Database, remote: Option<&RemoteTarget>) -> Result<RecipeStore> {
    let config = SyncConfig::default();
    let Some(target) = remote else {
        return Ok(RecipeStore::open(db.clone(), None, config));
    };

    let collection = HttpCollection::new(&target.url, &target.project, &config.collection)?;
    let store = RecipeStore::open(db.clone(), Some(Arc::new(collection)), config);
    store.start();

    if tokio::time::timeout(READY_TIMEOUT, store.ready()).await.is_err() {
        warn!(url = %target.url, "remote still seeding, using local recipes");
        return Ok(store);
    }
    if tokio::time::timeout(SNAPSHOT_TIMEOUT, store.wait_for_revision(1))
        .await
        .is_err()
    {
        eprintln!("Warning: could not reach {}, using local recipes", target.url);
    }
    Ok(store)
}

/// Whether a write reached the remote collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum SyncStatus {
    Synced,
    LocalOnly,
    Failed,
    Pending,
}

impl SyncStatus {
    pub(crate) fn describe(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::LocalOnly => "saved locally only",
            Self::Failed => "saved locally, remote write failed",
            Self::Pending => "saved locally, remote write still pending",
        }
    }
}

pub(super) async fn await_remote(receipt: WriteReceipt) -> SyncStatus {
    if !receipt.remote_pending() {
        return SyncStatus::LocalOnly;
    }
    match tokio::time::timeout(WRITE_TIMEOUT, receipt.remote_outcome()).await {
        Ok(RemoteOutcome::Committed) => SyncStatus::Synced,
        Ok(RemoteOutcome::Skipped) => SyncStatus::LocalOnly,
        Ok(RemoteOutcome::Failed(reason)) => {
            debug!(%reason, "remote write failed");
            SyncStatus::Failed
        }
        Err(_) => SyncStatus::Pending,
    }
}
