//! Document store capability
//!
//! [`DocumentStore`] is the query capability the MongoDB source consumes: an
//! ordered cursor over raw documents for a collection, filter, sort key and
//! optional limit/skip. [`MongoStore`] backs it with the `mongodb` driver,
//! [`MemoryStore`] with in-process collections.

use crate::config::{redact_uri, MongoConfig};
use crate::domain::{ExporterError, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::FindOptions;
use mongodb::{Client, Database};
use secrecy::ExposeSecret;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

/// Lazy cursor over raw documents
pub type DocumentStream = BoxStream<'static, Result<Document>>;

/// A single find query
#[derive(Debug, Clone, PartialEq)]
pub struct FindQuery {
    pub collection: String,
    pub filter: Document,
    pub sort: Document,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
}

impl FindQuery {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filter: Document::new(),
            sort: Document::new(),
            limit: None,
            skip: None,
        }
    }

    pub fn filter(mut self, filter: Document) -> Self {
        self.filter = filter;
        self
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = sort;
        self
    }

    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit.and_then(|l| i64::try_from(l).ok());
        self
    }

    pub fn skip(mut self, skip: Option<u64>) -> Self {
        self.skip = skip;
        self
    }
}

/// Query capability over a document database
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Run a find query, returning documents in sort order
    async fn find(&self, query: FindQuery) -> Result<DocumentStream>;

    /// Release the underlying connection
    async fn close(&self) -> Result<()>;
}

/// MongoDB-backed document store
///
/// Owns its client exclusively.
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl MongoStore {
    /// Connect and verify the server is reachable
    ///
    /// # Errors
    ///
    /// Returns [`ExporterError::Connection`] if the URI is invalid or the
    /// server does not answer a ping.
    pub async fn connect(config: &MongoConfig) -> Result<Self> {
        let uri = config.uri.expose_secret();
        let client = Client::with_uri_str(&**uri).await.map_err(|e| {
            ExporterError::Connection(format!(
                "Failed to create MongoDB client for {}: {e}",
                redact_uri(uri)
            ))
        })?;
        let database = client.database(&config.database);

        database
            .run_command(doc! {"ping": 1}, None)
            .await
            .map_err(|e| {
                ExporterError::Connection(format!(
                    "MongoDB at {} is unreachable: {e}",
                    redact_uri(uri)
                ))
            })?;

        tracing::info!(
            uri = %redact_uri(uri),
            database = %config.database,
            "Connected to MongoDB"
        );

        Ok(Self { client, database })
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn find(&self, query: FindQuery) -> Result<DocumentStream> {
        let options = FindOptions::builder()
            .sort(query.sort)
            .limit(query.limit)
            .skip(query.skip)
            .build();

        let cursor = self
            .database
            .collection::<Document>(&query.collection)
            .find(query.filter, options)
            .await?;

        Ok(cursor.map_err(ExporterError::from).boxed())
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        tracing::debug!("MongoDB client shut down");
        Ok(())
    }
}

/// In-process document store
///
/// Supports equality and `$exists` filters on top-level keys, sorting by
/// top-level keys, and limit/skip. Clones share the close counter.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: HashMap<String, Vec<Document>>,
    closes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append documents to a collection
    pub fn with_documents(
        mut self,
        collection: impl Into<String>,
        documents: impl IntoIterator<Item = Document>,
    ) -> Self {
        self.collections
            .entry(collection.into())
            .or_default()
            .extend(documents);
        self
    }

    /// How many times the store was closed
    pub fn close_count(&self) -> usize {
        self.closes.load(AtomicOrdering::SeqCst)
    }

    fn matches(document: &Document, filter: &Document) -> bool {
        filter.iter().all(|(key, condition)| match condition {
            Bson::Document(op) if op.contains_key("$exists") => {
                let wanted = op.get_bool("$exists").unwrap_or(true);
                document.contains_key(key) == wanted
            }
            expected => document.get(key) == Some(expected),
        })
    }

    fn compare(a: &Document, b: &Document, sort: &Document) -> Ordering {
        for (key, direction) in sort {
            let ordering = compare_values(a.get(key), b.get(key));
            let descending = matches!(direction, Bson::Int32(d) if *d < 0)
                || matches!(direction, Bson::Int64(d) if *d < 0);
            let ordering = if descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

fn compare_values(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Bson::String(a)), Some(Bson::String(b))) => a.cmp(b),
        (Some(Bson::DateTime(a)), Some(Bson::DateTime(b))) => a.cmp(b),
        (Some(a), Some(b)) => match (numeric(a), numeric(b)) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

fn numeric(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(v) => Some(*v),
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        _ => None,
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, query: FindQuery) -> Result<DocumentStream> {
        let mut documents: Vec<Document> = self
            .collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| Self::matches(d, &query.filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        documents.sort_by(|a, b| Self::compare(a, b, &query.sort));

        let skip = query.skip.and_then(|s| usize::try_from(s).ok()).unwrap_or(0);
        let limit = query
            .limit
            .filter(|l| *l != 0)
            .and_then(|l| usize::try_from(l.unsigned_abs()).ok())
            .unwrap_or(usize::MAX);

        let page: Vec<Result<Document>> =
            documents.into_iter().skip(skip).take(limit).map(Ok).collect();
        Ok(stream::iter(page).boxed())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::new().with_documents(
            "devicestatus",
            vec![
                doc! {"created_at": "2024-03-01T10:00:00Z", "openaps": {"iob": {}}},
                doc! {"created_at": "2024-03-01T10:10:00Z", "pump": {}},
                doc! {"created_at": "2024-03-01T10:05:00Z", "openaps": {"iob": {}}},
                doc! {"created_at": "2024-03-01T10:15:00Z", "openaps": {"iob": {}}},
            ],
        )
    }

    async fn collect(store: &MemoryStore, query: FindQuery) -> Vec<String> {
        store
            .find(query)
            .await
            .unwrap()
            .map(|d| d.unwrap().get_str("created_at").unwrap().to_string())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_memory_store_filters_and_sorts_descending() {
        let query = FindQuery::new("devicestatus")
            .filter(doc! {"openaps": {"$exists": true}})
            .sort(doc! {"created_at": -1});

        let found = collect(&store(), query).await;
        assert_eq!(
            found,
            vec![
                "2024-03-01T10:15:00Z",
                "2024-03-01T10:05:00Z",
                "2024-03-01T10:00:00Z"
            ]
        );
    }

    #[tokio::test]
    async fn test_memory_store_limit_and_skip() {
        let query = FindQuery::new("devicestatus")
            .sort(doc! {"created_at": -1})
            .limit(Some(2))
            .skip(Some(1));

        let found = collect(&store(), query).await;
        assert_eq!(found, vec!["2024-03-01T10:10:00Z", "2024-03-01T10:05:00Z"]);
    }

    #[tokio::test]
    async fn test_memory_store_unknown_collection_is_empty() {
        let found = collect(&store(), FindQuery::new("treatments")).await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_close_is_shared_between_clones() {
        let store = store();
        let handle = store.clone();
        store.close().await.unwrap();
        assert_eq!(handle.close_count(), 1);
    }
}
