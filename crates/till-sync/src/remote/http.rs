//! # HTTP Remote
//!
//! Document and blob store over a JSON REST API.
//!
//! ```text
//!   GET    {base}/collections/{c}/documents          → [Document]
//!   PUT    {base}/collections/{c}/documents/{id}     ← Document
//!   DELETE {base}/collections/{c}/documents/{id}?version=N
//!   GET    {base}/collections/{c}/tombstones         → [Tombstone]
//!   PUT    {base}/blobs/{path}                       → { "url": ... }
//!
//!   Authorization: Bearer <token>   (when configured)
//! ```
//!
//! The API has no push channel, so [`DocumentStore::watch`] polls both
//! collections and publishes what changed since the previous poll. Deletes
//! carry the stamp their tombstone was written with.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

use till_db::Collection;

use super::{BlobStore, Document, DocumentStore, RemoteChange, Tombstone};
use crate::config::RemoteSettings;
use crate::error::{SyncError, SyncResult};

const CHANGE_CAPACITY: usize = 256;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

/// Shared between the remote and its poller.
#[derive(Debug, Clone)]
struct Api {
    client: Client,
    base_url: String,
    token: Option<String>,
    timeout_secs: u64,
}

impl Api {
    fn documents_url(&self, collection: Collection) -> String {
        format!("{}/collections/{}/documents", self.base_url, collection.table())
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> SyncResult<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(SyncError::RemoteRejected {
            status: status.as_u16(),
            message,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(self.timeout_secs)
        } else {
            SyncError::from(err)
        }
    }

    async fn list(&self, collection: Collection) -> SyncResult<Vec<Document>> {
        let response = self
            .send(self.client.get(self.documents_url(collection)))
            .await?;
        response.json().await.map_err(|e| self.transport_error(e))
    }

    async fn tombstones(&self, collection: Collection) -> SyncResult<Vec<Tombstone>> {
        let url = format!("{}/collections/{}/tombstones", self.base_url, collection.table());
        match self.send(self.client.get(url)).await {
            Ok(response) => response.json().await.map_err(|e| self.transport_error(e)),
            // Nothing deleted yet
            Err(SyncError::RemoteRejected { status: 404, .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn listing(&self, collection: Collection) -> SyncResult<(Vec<Document>, Vec<Tombstone>)> {
        let documents = self.list(collection).await?;
        let tombstones = self.tombstones(collection).await?;
        Ok((documents, tombstones))
    }
}

/// Remote store reached over HTTP.
#[derive(Debug)]
pub struct HttpRemote {
    api: Api,
    poll_interval: Duration,
    changes: broadcast::Sender<RemoteChange>,
    polling: Arc<AtomicBool>,
}

impl HttpRemote {
    /// Creates a remote from `[remote]` settings. Requires a URL.
    pub fn new(settings: &RemoteSettings) -> SyncResult<Self> {
        let raw = settings
            .url
            .as_deref()
            .ok_or_else(|| SyncError::InvalidConfig("remote.url is required".into()))?;
        let base = Url::parse(raw)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| SyncError::Http(e.to_string()))?;

        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);

        Ok(HttpRemote {
            api: Api {
                client,
                base_url: base.as_str().trim_end_matches('/').to_string(),
                token: settings.token.clone(),
                timeout_secs: settings.timeout_secs,
            },
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
            changes,
            polling: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.api.base_url
    }

    fn spawn_poller(&self) {
        if self.polling.swap(true, Ordering::SeqCst) {
            return;
        }

        let api = self.api.clone();
        let changes = self.changes.clone();
        let polling = self.polling.clone();
        let period = self.poll_interval;

        tokio::spawn(async move {
            info!(base_url = %api.base_url, "Remote poller starting");
            let mut seen: HashMap<(Collection, String), Seen> = HashMap::new();
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if changes.receiver_count() == 0 {
                    break;
                }

                for collection in Collection::ALL {
                    match api.listing(collection).await {
                        Ok((documents, tombstones)) => {
                            for change in diff(&mut seen, collection, documents, tombstones) {
                                let _ = changes.send(change);
                            }
                        }
                        Err(e) => warn!(%collection, error = %e, "Remote poll failed"),
                    }
                }
            }

            polling.store(false, Ordering::SeqCst);
            info!("Remote poller stopped");
        });
    }
}

/// Last state the poller published for an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seen {
    Document(i64),
    Deleted(i64),
}

/// Changes between what was last published and a fresh listing.
///
/// A document that vanished without a tombstone is stamped one past its
/// last seen version, so any local edit made after it still wins.
fn diff(
    seen: &mut HashMap<(Collection, String), Seen>,
    collection: Collection,
    documents: Vec<Document>,
    tombstones: Vec<Tombstone>,
) -> Vec<RemoteChange> {
    let mut changes = Vec::new();
    let mut present = Vec::with_capacity(documents.len() + tombstones.len());

    for document in documents {
        let key = (collection, document.id.clone());
        present.push(document.id.clone());
        if seen.get(&key) != Some(&Seen::Document(document.version)) {
            seen.insert(key, Seen::Document(document.version));
            changes.push(RemoteChange::Upsert {
                collection,
                document,
            });
        }
    }

    for tombstone in tombstones {
        let key = (collection, tombstone.id.clone());
        present.push(tombstone.id.clone());
        if seen.get(&key) != Some(&Seen::Deleted(tombstone.version)) {
            seen.insert(key, Seen::Deleted(tombstone.version));
            changes.push(RemoteChange::Delete {
                collection,
                id: tombstone.id,
                version: tombstone.version,
            });
        }
    }

    let vanished: Vec<(String, i64)> = seen
        .iter()
        .filter(|((c, id), _)| *c == collection && !present.contains(id))
        .filter_map(|((_, id), state)| match state {
            Seen::Document(version) => Some((id.clone(), *version)),
            Seen::Deleted(_) => None,
        })
        .collect();

    for (id, version) in vanished {
        seen.insert((collection, id.clone()), Seen::Deleted(version + 1));
        changes.push(RemoteChange::Delete {
            collection,
            id,
            version: version + 1,
        });
    }

    changes
}

#[async_trait]
impl DocumentStore for HttpRemote {
    async fn list(&self, collection: Collection) -> SyncResult<Vec<Document>> {
        self.api.list(collection).await
    }

    async fn put(&self, collection: Collection, document: Document) -> SyncResult<()> {
        let url = format!("{}/{}", self.api.documents_url(collection), document.id);
        debug!(%collection, id = %document.id, "PUT document");
        self.api
            .send(self.api.client.put(url).json(&document))
            .await?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str, version: i64) -> SyncResult<()> {
        let url = format!("{}/{}", self.api.documents_url(collection), id);
        debug!(%collection, id = %id, "DELETE document");
        let request = self
            .api
            .client
            .delete(url)
            .query(&[("version", version)]);

        match self.api.send(request).await {
            Ok(_) => Ok(()),
            // Already gone
            Err(SyncError::RemoteRejected { status: 404, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn tombstones(&self, collection: Collection) -> SyncResult<Vec<Tombstone>> {
        self.api.tombstones(collection).await
    }

    fn watch(&self) -> broadcast::Receiver<RemoteChange> {
        let rx = self.changes.subscribe();
        self.spawn_poller();
        rx
    }
}

#[async_trait]
impl BlobStore for HttpRemote {
    async fn upload(&self, path: &str, contents: Vec<u8>) -> SyncResult<String> {
        let url = format!("{}/blobs/{}", self.api.base_url, path);
        debug!(path = %path, bytes = contents.len(), "Uploading blob");

        let request = self
            .api
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(contents);

        let response = self.api.send(request).await?;
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| self.api.transport_error(e))?;
        Ok(body.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(uri: &str, token: Option<&str>) -> RemoteSettings {
        RemoteSettings {
            url: Some(uri.to_string()),
            token: token.map(String::from),
            timeout_secs: 5,
            poll_interval_secs: 1,
        }
    }

    fn doc(id: &str, version: i64) -> Document {
        Document {
            id: id.to_string(),
            version,
            body: json!({ "id": id, "name": "Coffee" }),
        }
    }

    #[test]
    fn test_requires_url() {
        let err = HttpRemote::new(&RemoteSettings::default()).unwrap_err();
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_list_documents() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/catalog/documents"))
            .and(header("authorization", "Bearer t0ken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![doc("p1", 1_000)]))
            .mount(&server)
            .await;

        let remote = HttpRemote::new(&settings(&server.uri(), Some("t0ken"))).unwrap();
        let documents = remote.list(Collection::Catalog).await.unwrap();

        assert_eq!(documents, vec![doc("p1", 1_000)]);
    }

    #[tokio::test]
    async fn test_put_sends_document() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/collections/ledger/documents/s1"))
            .and(body_json(doc("s1", 42)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let remote = HttpRemote::new(&settings(&server.uri(), None)).unwrap();
        remote.put(Collection::Ledger, doc("s1", 42)).await.unwrap();
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/collections/catalog/documents/busy"))
            .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/collections/catalog/documents/bad"))
            .respond_with(ResponseTemplate::new(400).set_body_string("malformed"))
            .mount(&server)
            .await;

        let remote = HttpRemote::new(&settings(&server.uri(), None)).unwrap();

        let err = remote.put(Collection::Catalog, doc("busy", 1)).await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteRejected { status: 503, .. }));
        assert!(err.is_retryable());

        let err = remote.put(Collection::Catalog, doc("bad", 1)).await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteRejected { status: 400, ref message } if message == "malformed"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/collections/catalog/documents/p1"))
            .and(query_param("version", "7"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let remote = HttpRemote::new(&settings(&server.uri(), None)).unwrap();
        remote.delete(Collection::Catalog, "p1", 7).await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_returns_url() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/blobs/backups/full_backup_x.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "url": "https://cdn.example.com/full_backup_x.json" })),
            )
            .mount(&server)
            .await;

        let remote = HttpRemote::new(&settings(&server.uri(), None)).unwrap();
        let url = remote
            .upload("backups/full_backup_x.json", b"{}".to_vec())
            .await
            .unwrap();

        assert_eq!(url, "https://cdn.example.com/full_backup_x.json");
    }

    #[tokio::test]
    async fn test_unreachable_is_retryable() {
        // Nothing listens on port 9 (discard) in the test environment
        let remote = HttpRemote::new(&settings("http://127.0.0.1:9", None)).unwrap();
        let err = remote.list(Collection::Catalog).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_watch_polls_changes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/catalog/documents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![doc("p1", 1_000)]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/collections/ledger/documents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<Document>::new()))
            .mount(&server)
            .await;

        let remote = HttpRemote::new(&settings(&server.uri(), None)).unwrap();
        let mut changes = remote.watch();

        let change = tokio::time::timeout(Duration::from_secs(5), changes.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            change,
            RemoteChange::Upsert { collection: Collection::Catalog, ref document } if document.id == "p1"
        ));
    }

    fn tombstone(id: &str, version: i64) -> Tombstone {
        Tombstone {
            id: id.to_string(),
            version,
        }
    }

    #[test]
    fn test_diff() {
        let mut seen = HashMap::new();

        let first = diff(&mut seen, Collection::Catalog, vec![doc("a", 1), doc("b", 1)], vec![]);
        assert_eq!(first.len(), 2);

        // Unchanged listing yields nothing
        assert!(diff(&mut seen, Collection::Catalog, vec![doc("a", 1), doc("b", 1)], vec![]).is_empty());

        let next = diff(&mut seen, Collection::Catalog, vec![doc("a", 2)], vec![]);
        assert_eq!(next.len(), 2);
        assert!(matches!(next[0], RemoteChange::Upsert { ref document, .. } if document.version == 2));
        assert!(matches!(next[1], RemoteChange::Delete { ref id, .. } if id == "b"));

        // Other collections are untouched
        assert!(diff(&mut seen, Collection::Ledger, vec![], vec![]).is_empty());
    }

    #[test]
    fn test_diff_uses_delete_stamps() {
        let mut seen = HashMap::new();
        diff(&mut seen, Collection::Catalog, vec![doc("a", 1_000), doc("b", 1_000)], vec![]);

        // "a" was deleted at 2_000; "b" vanished with no tombstone
        let changes = diff(&mut seen, Collection::Catalog, vec![], vec![tombstone("a", 2_000)]);
        assert_eq!(
            changes,
            vec![
                RemoteChange::Delete {
                    collection: Collection::Catalog,
                    id: "a".to_string(),
                    version: 2_000,
                },
                RemoteChange::Delete {
                    collection: Collection::Catalog,
                    id: "b".to_string(),
                    version: 1_001,
                },
            ]
        );

        // Reported once
        assert!(diff(&mut seen, Collection::Catalog, vec![], vec![tombstone("a", 2_000)]).is_empty());
    }

    #[tokio::test]
    async fn test_tombstones() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/catalog/tombstones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![tombstone("p1", 2_000)]))
            .mount(&server)
            .await;

        let remote = HttpRemote::new(&settings(&server.uri(), None)).unwrap();

        assert_eq!(
            remote.tombstones(Collection::Catalog).await.unwrap(),
            vec![tombstone("p1", 2_000)]
        );
        // No route for ledger tombstones: nothing deleted there
        assert!(remote.tombstones(Collection::Ledger).await.unwrap().is_empty());
    }
}
