//! Reconciliation between the local cache and the remote collection.
//!
//! Identity across the two sides is by id once a record has synced, and by
//! name for anything that has not: seeding and drift resync both treat a
//! name already present remotely as "already there".

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::models::{Document, Recipe, is_local_id};
use crate::remote::{RemoteCollection, encode_recipe};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub created: usize,
    pub skipped_existing: usize,
    pub failed: usize,
}

/// Names present in a snapshot, trimmed. Documents without a name are ignored.
#[must_use]
pub fn remote_names(docs: &[Document]) -> HashSet<String> {
    docs.iter()
        .filter_map(|d| d.fields.get("name").and_then(Value::as_str))
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

/// Create every default recipe whose name is missing remotely, one request at
/// a time with `delay` between requests.
///
/// Fails only if the collection cannot be listed; individual create failures
/// are logged and counted.
pub async fn seed_missing(
    remote: &dyn RemoteCollection,
    defaults: &[Recipe],
    delay: Duration,
) -> Result<SeedReport> {
    let existing = remote
        .list()
        .await
        .context("Failed to list remote collection for seeding")?;
    let names = remote_names(&existing);

    let missing: Vec<&Recipe> = defaults
        .iter()
        .filter(|r| !names.contains(r.name.trim()))
        .collect();
    let mut report = SeedReport {
        skipped_existing: defaults.len() - missing.len(),
        ..SeedReport::default()
    };
    debug!(
        missing = missing.len(),
        existing = report.skipped_existing,
        "seeding remote collection"
    );

    for (i, recipe) in missing.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match remote.create(encode_recipe(recipe)).await {
            Ok(id) => {
                debug!(name = %recipe.name, %id, "seeded recipe");
                report.created += 1;
            }
            Err(e) => {
                warn!(name = %recipe.name, error = %format!("{e:#}"), "failed to seed recipe");
                report.failed += 1;
            }
        }
    }

    info!(
        created = report.created,
        skipped = report.skipped_existing,
        failed = report.failed,
        "seed pass finished"
    );
    Ok(report)
}

/// Remote writes that have been issued but not yet answered.
#[derive(Debug, Default)]
pub struct PendingWrites {
    updates: HashMap<String, usize>,
    deletes: HashSet<String>,
    creating: HashSet<String>,
    orphaned: HashSet<String>,
}

impl PendingWrites {
    pub fn begin_update(&mut self, id: &str) {
        *self.updates.entry(id.to_string()).or_default() += 1;
    }

    pub fn finish_update(&mut self, id: &str) {
        if let Some(count) = self.updates.get_mut(id) {
            *count -= 1;
            if *count == 0 {
                self.updates.remove(id);
            }
        }
    }

    #[must_use]
    pub fn has_update(&self, id: &str) -> bool {
        self.updates.contains_key(id)
    }

    pub fn begin_delete(&mut self, id: &str) {
        self.deletes.insert(id.to_string());
    }

    pub fn finish_delete(&mut self, id: &str) {
        self.deletes.remove(id);
    }

    #[must_use]
    pub fn has_delete(&self, id: &str) -> bool {
        self.deletes.contains(id)
    }

    /// Returns false if a create for this local id is already in flight.
    pub fn begin_create(&mut self, local_id: &str) -> bool {
        self.creating.insert(local_id.to_string())
    }

    /// Returns true if the record was removed locally while its create was
    /// in flight, in which case the new remote document is an orphan.
    pub fn finish_create(&mut self, local_id: &str) -> bool {
        self.creating.remove(local_id);
        self.orphaned.remove(local_id)
    }

    #[must_use]
    pub fn is_creating(&self, local_id: &str) -> bool {
        self.creating.contains(local_id)
    }

    /// Note a local removal. Returns true if a create for it is in flight.
    pub fn mark_removed(&mut self, id: &str) -> bool {
        if self.creating.contains(id) {
            self.orphaned.insert(id.to_string());
            true
        } else {
            false
        }
    }
}

/// Merge a decoded snapshot into the local list.
///
/// The snapshot decides membership and order, with these exceptions:
/// - records with a pending delete are left out;
/// - records with an in-flight update keep their local version;
/// - records without an id are dropped;
/// - locally-minted records follow the snapshot when their name is absent
///   from it or their create is still in flight.
#[must_use]
pub fn merge_snapshot(local: &[Recipe], remote: Vec<Recipe>, pending: &PendingWrites) -> Vec<Recipe> {
    let names: HashSet<String> = remote.iter().map(|r| r.name.trim().to_string()).collect();
    let local_by_id: HashMap<&str, &Recipe> = local.iter().map(|r| (r.id.as_str(), r)).collect();

    let mut merged = Vec::with_capacity(remote.len());
    let mut seen = HashSet::new();
    for recipe in remote {
        if recipe.id.is_empty() || pending.has_delete(&recipe.id) || !seen.insert(recipe.id.clone()) {
            continue;
        }
        match local_by_id.get(recipe.id.as_str()) {
            Some(mine) if pending.has_update(&recipe.id) => merged.push((*mine).clone()),
            _ => merged.push(recipe),
        }
    }

    for recipe in local {
        if !is_local_id(&recipe.id) || seen.contains(&recipe.id) {
            continue;
        }
        if pending.is_creating(&recipe.id) || !names.contains(recipe.name.trim()) {
            seen.insert(recipe.id.clone());
            merged.push(recipe.clone());
        }
    }
    merged
}

/// Locally-minted records that never reached the remote collection.
#[must_use]
pub fn drift_candidates(
    local: &[Recipe],
    remote_names: &HashSet<String>,
    pending: &PendingWrites,
) -> Vec<Recipe> {
    local
        .iter()
        .filter(|r| is_local_id(&r.id))
        .filter(|r| !pending.is_creating(&r.id))
        .filter(|r| !remote_names.contains(r.name.trim()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{Map, json};

    use super::*;
    use crate::memory::MemoryCollection;
    use crate::models::{Difficulty, MealCategory};
    use crate::remote::Snapshots;

    fn recipe(id: &str, name: &str) -> Recipe {
        Recipe {
            id: id.to_string(),
            name: name.to_string(),
            image: String::new(),
            minutes: 10,
            difficulty: Difficulty::Easy,
            category: MealCategory::Dinner,
            tags: vec![],
            ingredients: vec![],
            steps: vec![],
            tips: None,
            is_favorite: false,
        }
    }

    fn named_doc(id: &str, name: &str) -> Document {
        let mut fields = Map::new();
        fields.insert("name".into(), json!(name));
        Document {
            id: id.to_string(),
            fields,
        }
    }

    /// Lists fine, fails every create whose name is in `reject`.
    struct FlakyRemote {
        reject: Vec<&'static str>,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl RemoteCollection for FlakyRemote {
        async fn list(&self) -> Result<Vec<Document>> {
            Ok(vec![])
        }
        async fn create(&self, fields: Map<String, serde_json::Value>) -> Result<String> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let name = fields["name"].as_str().unwrap_or_default();
            if self.reject.contains(&name) {
                anyhow::bail!("quota exceeded");
            }
            Ok(format!("id-{name}"))
        }
        async fn update(&self, _id: &str, _fields: Map<String, serde_json::Value>) -> Result<()> {
            Ok(())
        }
        async fn delete(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn subscribe(&self) -> Result<Snapshots> {
            anyhow::bail!("not supported")
        }
    }

    struct DownRemote;

    #[async_trait]
    impl RemoteCollection for DownRemote {
        async fn list(&self) -> Result<Vec<Document>> {
            anyhow::bail!("connection refused")
        }
        async fn create(&self, _fields: Map<String, serde_json::Value>) -> Result<String> {
            anyhow::bail!("connection refused")
        }
        async fn update(&self, _id: &str, _fields: Map<String, serde_json::Value>) -> Result<()> {
            anyhow::bail!("connection refused")
        }
        async fn delete(&self, _id: &str) -> Result<()> {
            anyhow::bail!("connection refused")
        }
        async fn subscribe(&self) -> Result<Snapshots> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let remote = MemoryCollection::new();
        let defaults = vec![recipe("", "Tomato Egg Stir-fry"), recipe("", "Congee")];

        let first = seed_missing(&remote, &defaults, Duration::ZERO).await.unwrap();
        assert_eq!(first.created, 2);
        assert_eq!(remote.len(), 2);

        let second = seed_missing(&remote, &defaults, Duration::ZERO).await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.skipped_existing, 2);
        assert_eq!(remote.len(), 2);
    }

    #[tokio::test]
    async fn test_seed_only_creates_missing_names() {
        let remote = MemoryCollection::with_documents(vec![named_doc("r1", "Congee")]);
        let defaults = vec![recipe("", "Tomato Egg Stir-fry"), recipe("", "Congee")];

        let report = seed_missing(&remote, &defaults, Duration::ZERO).await.unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped_existing, 1);
        let docs = remote.documents();
        assert_eq!(docs[1].fields["name"], "Tomato Egg Stir-fry");
    }

    #[tokio::test]
    async fn test_seed_item_failures_are_skipped() {
        let remote = FlakyRemote {
            reject: vec!["B"],
            attempts: AtomicUsize::new(0),
        };
        let defaults = vec![recipe("", "A"), recipe("", "B"), recipe("", "C")];
        let report = seed_missing(&remote, &defaults, Duration::ZERO).await.unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(remote.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_seed_fails_when_list_fails() {
        let defaults = vec![recipe("", "A")];
        assert!(seed_missing(&DownRemote, &defaults, Duration::ZERO).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_seed_waits_between_requests() {
        let remote = MemoryCollection::new();
        let defaults = vec![recipe("", "A"), recipe("", "B"), recipe("", "C")];
        let started = tokio::time::Instant::now();
        seed_missing(&remote, &defaults, Duration::from_millis(300))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(600));
    }

    #[test]
    fn test_merge_remote_wins_and_keeps_snapshot_order() {
        let local = vec![recipe("r1", "Old name"), recipe("r2", "Gone remotely")];
        let remote = vec![recipe("r3", "New"), recipe("r1", "New name")];
        let merged = merge_snapshot(&local, remote, &PendingWrites::default());
        let ids: Vec<&str> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r3", "r1"]);
        assert_eq!(merged[1].name, "New name");
    }

    #[test]
    fn test_merge_drops_placeholders() {
        let local = vec![recipe("", "Tomato Egg Stir-fry")];
        let remote = vec![recipe("r1", "Tomato Egg Stir-fry"), recipe("", "Broken")];
        let merged = merge_snapshot(&local, remote, &PendingWrites::default());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "r1");
    }

    #[test]
    fn test_merge_keeps_unsynced_local_records() {
        let local = vec![
            recipe("1700000000000", "Only here"),
            recipe("1700000000001", "Also remote"),
        ];
        let remote = vec![recipe("r1", "Also remote")];
        let merged = merge_snapshot(&local, remote, &PendingWrites::default());
        let ids: Vec<&str> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "1700000000000"]);
    }

    #[test]
    fn test_merge_respects_pending_writes() {
        let mut mine = recipe("r1", "Mine");
        mine.is_favorite = true;
        let local = vec![mine, recipe("r2", "Deleting"), recipe("1700000000000", "Creating")];
        let remote = vec![
            recipe("r1", "Stale"),
            recipe("r2", "Deleting"),
            recipe("r9", "Creating"),
        ];

        let mut pending = PendingWrites::default();
        pending.begin_update("r1");
        pending.begin_delete("r2");
        assert!(pending.begin_create("1700000000000"));

        let merged = merge_snapshot(&local, remote, &pending);
        let ids: Vec<&str> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r9", "1700000000000"]);
        assert!(merged[0].is_favorite);
        assert_eq!(merged[0].name, "Mine");
    }

    #[test]
    fn test_pending_update_counts_nest() {
        let mut pending = PendingWrites::default();
        pending.begin_update("r1");
        pending.begin_update("r1");
        pending.finish_update("r1");
        assert!(pending.has_update("r1"));
        pending.finish_update("r1");
        assert!(!pending.has_update("r1"));
        pending.finish_update("r1");
        assert!(!pending.has_update("r1"));
    }

    #[test]
    fn test_remove_during_create_marks_orphan() {
        let mut pending = PendingWrites::default();
        assert!(!pending.mark_removed("1"));
        assert!(pending.begin_create("1"));
        assert!(!pending.begin_create("1"));
        assert!(pending.mark_removed("1"));
        assert!(pending.finish_create("1"));
        assert!(!pending.is_creating("1"));
        assert!(!pending.finish_create("1"));
    }

    #[test]
    fn test_drift_candidates() {
        let local = vec![
            recipe("r1", "Synced"),
            recipe("1700000000000", "Never pushed"),
            recipe("1700000000001", "Pushed under old id"),
            recipe("1700000000002", "In flight"),
        ];
        let names = remote_names(&[named_doc("r1", "Synced"), named_doc("r2", "Pushed under old id")]);
        let mut pending = PendingWrites::default();
        pending.begin_create("1700000000002");

        let candidates = drift_candidates(&local, &names, &pending);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Never pushed");
    }

    #[test]
    fn test_remote_names_ignores_unnamed() {
        let mut blank = named_doc("x", "  ");
        blank.fields.insert("time".into(), json!(3));
        let names = remote_names(&[named_doc("a", " Soup "), blank, Document {
            id: "y".to_string(),
            fields: Map::new(),
        }]);
        assert_eq!(names.len(), 1);
        assert!(names.contains("Soup"));
    }
}
