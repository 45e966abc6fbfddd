use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use cookoo_core::models::Document;
use cookoo_core::remote::{RemoteCollection, Snapshots};

/// Longer than the server's long-poll window.
const WATCH_TIMEOUT: Duration = Duration::from_secs(35);
const WATCH_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Deserialize)]
struct SnapshotResponse {
    version: u64,
    documents: Vec<Document>,
}

#[derive(Deserialize)]
struct CreatedResponse {
    id: String,
}

/// A collection on a `cookoo serve` document store.
#[derive(Clone)]
pub struct HttpCollection {
    client: reqwest::Client,
    base: String,
}

impl HttpCollection {
    pub fn new(base_url: &str, project: &str, collection: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("cookoo-cli/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base: collection_url(base_url, project, collection),
        })
    }

    fn documents_url(&self) -> String {
        format!("{}/documents", self.base)
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/documents/{id}", self.base)
    }

    async fn snapshot(&self) -> Result<SnapshotResponse> {
        self.client
            .get(self.documents_url())
            .send()
            .await
            .context("Failed to reach document store")?
            .error_for_status()?
            .json()
            .await
            .context("Failed to parse document list")
    }

    async fn watch(&self, after: u64) -> Result<SnapshotResponse> {
        self.client
            .get(format!("{}/watch", self.base))
            .query(&[("after", after)])
            .timeout(WATCH_TIMEOUT)
            .send()
            .await
            .context("Failed to reach document store")?
            .error_for_status()?
            .json()
            .await
            .context("Failed to parse watch response")
    }
}

fn collection_url(base_url: &str, project: &str, collection: &str) -> String {
    format!(
        "{}/api/projects/{project}/collections/{collection}",
        base_url.trim_end_matches('/')
    )
}

#[async_trait]
impl RemoteCollection for HttpCollection {
    async fn list(&self) -> Result<Vec<Document>> {
        Ok(self.snapshot().await?.documents)
    }

    async fn create(&self, fields: Map<String, Value>) -> Result<String> {
        let created: CreatedResponse = self
            .client
            .post(self.documents_url())
            .json(&fields)
            .send()
            .await
            .context("Failed to reach document store")?
            .error_for_status()?
            .json()
            .await
            .context("Failed to parse create response")?;
        Ok(created.id)
    }

    async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<()> {
        let resp = self
            .client
            .patch(self.document_url(id))
            .json(&fields)
            .send()
            .await
            .context("Failed to reach document store")?;
        if resp.status() == StatusCode::NOT_FOUND {
            bail!("Document '{id}' not found");
        }
        resp.error_for_status()?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.document_url(id))
            .send()
            .await
            .context("Failed to reach document store")?;
        // Already gone is as good as deleted.
        if resp.status() != StatusCode::NOT_FOUND {
            resp.error_for_status()?;
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<Snapshots> {
        let first = self.snapshot().await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut version = first.version;
        // Receiver is still held here, so this cannot fail.
        let _ = tx.send(first.documents);

        let this = self.clone();
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    () = tx.closed() => break,
                    next = this.watch(version) => next,
                };
                match next {
                    Ok(snapshot) if snapshot.version > version => {
                        version = snapshot.version;
                        if tx.send(snapshot.documents).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %format!("{e:#}"), "watch request failed, retrying");
                        tokio::select! {
                            () = tx.closed() => break,
                            () = tokio::time::sleep(WATCH_RETRY_DELAY) => {}
                        }
                    }
                }
            }
            debug!(url = %this.base, "subscription closed");
        });
        Ok(rx)
    }
}
