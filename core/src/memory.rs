use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::models::Document;
use crate::remote::{RemoteCollection, Snapshots, merge_fields, resolve_server_values};

#[derive(Default)]
struct Collection {
    docs: Vec<Document>,
    subscribers: Vec<mpsc::UnboundedSender<Vec<Document>>>,
}

impl Collection {
    /// Push the current snapshot to every live subscriber, dropping the
    /// ones whose receiver is gone.
    fn notify(&mut self) {
        let snapshot = self.docs.clone();
        self.subscribers
            .retain(|tx| tx.send(snapshot.clone()).is_ok());
    }
}

/// An in-process document collection for tests and for embedders that want
/// a remote without a network.
#[derive(Default)]
pub struct MemoryCollection {
    inner: Mutex<Collection>,
}

impl MemoryCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing documents.
    #[must_use]
    pub fn with_documents(docs: Vec<Document>) -> Self {
        Self {
            inner: Mutex::new(Collection {
                docs,
                subscribers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Collection> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn documents(&self) -> Vec<Document> {
        self.lock().docs.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock();
        inner.subscribers.retain(|tx| !tx.is_closed());
        inner.subscribers.len()
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[async_trait]
impl RemoteCollection for MemoryCollection {
    async fn list(&self) -> Result<Vec<Document>> {
        Ok(self.documents())
    }

    async fn create(&self, mut fields: Map<String, Value>) -> Result<String> {
        resolve_server_values(&mut fields, &now());
        let id = uuid::Uuid::new_v4().simple().to_string();
        let mut inner = self.lock();
        inner.docs.push(Document {
            id: id.clone(),
            fields,
        });
        inner.notify();
        Ok(id)
    }

    async fn update(&self, id: &str, mut fields: Map<String, Value>) -> Result<()> {
        resolve_server_values(&mut fields, &now());
        let mut inner = self.lock();
        let Some(doc) = inner.docs.iter_mut().find(|d| d.id == id) else {
            bail!("No document with id '{id}'");
        };
        merge_fields(&mut doc.fields, fields);
        inner.notify();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut inner = self.lock();
        let Some(idx) = inner.docs.iter().position(|d| d.id == id) else {
            bail!("No document with id '{id}'");
        };
        inner.docs.remove(idx);
        inner.notify();
        Ok(())
    }

    async fn subscribe(&self) -> Result<Snapshots> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        // A fresh subscriber always hears the current state first
        let _ = tx.send(inner.docs.clone());
        inner.subscribers.push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::UPDATED_AT_FIELD;
    use serde_json::json;

    fn fields(name: &str) -> Map<String, Value> {
        let mut f = Map::new();
        f.insert("name".into(), json!(name));
        f.insert(UPDATED_AT_FIELD.into(), crate::remote::server_timestamp());
        f
    }

    #[tokio::test]
    async fn test_create_assigns_non_numeric_ids_and_resolves_timestamp() {
        let remote = MemoryCollection::new();
        let a = remote.create(fields("A")).await.unwrap();
        let b = remote.create(fields("B")).await.unwrap();
        assert_ne!(a, b);
        assert!(!crate::models::is_local_id(&a));

        let docs = remote.list().await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].fields["name"], "A");
        assert!(docs[0].fields[UPDATED_AT_FIELD].is_string());
    }

    #[tokio::test]
    async fn test_update_merges_and_missing_id_errors() {
        let remote = MemoryCollection::new();
        let id = remote.create(fields("A")).await.unwrap();

        let mut patch = Map::new();
        patch.insert("isFavorite".into(), json!(true));
        remote.update(&id, patch).await.unwrap();

        let doc = &remote.documents()[0];
        assert_eq!(doc.fields["name"], "A");
        assert_eq!(doc.fields["isFavorite"], true);

        assert!(remote.update("missing", Map::new()).await.is_err());
        assert!(remote.delete("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_subscribe_sends_current_then_each_change() {
        let remote = MemoryCollection::with_documents(vec![Document {
            id: "seed".to_string(),
            fields: fields("Seeded"),
        }]);
        let mut rx = remote.subscribe().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().len(), 1);

        let id = remote.create(fields("New")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().len(), 2);

        remote.delete(&id).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let remote = MemoryCollection::new();
        let rx = remote.subscribe().await.unwrap();
        assert_eq!(remote.subscriber_count(), 1);
        drop(rx);
        assert_eq!(remote.subscriber_count(), 0);
        remote.create(fields("A")).await.unwrap();
        assert_eq!(remote.len(), 1);
    }
}
