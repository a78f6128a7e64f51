//! Worker-side handler wiring the search index to the request protocol.
//!
//! The handler owns one index per library. Builds read rows from an injected
//! [`RecordSource`] and run on the blocking pool; queries serve from the
//! in-memory indexes and never touch storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use citelet::RequestHandler;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::index::{SearchHit, SearchIndex};
use crate::records::{RecordBatch, merge_rows};

/// Requests the index worker services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SearchRequest {
    /// Read the library's rows and (re)build its index.
    BuildIndex {
        library_id: i64,
        /// Re-open the underlying storage before reading.
        #[serde(default)]
        refresh: bool,
    },
    /// Rank titles in a previously built index.
    Query {
        library_id: i64,
        query: String,
        #[serde(default = "default_limit")]
        limit: usize,
    },
}

fn default_limit() -> usize {
    20
}

/// Replies paired with [`SearchRequest`] operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SearchReply {
    Built { library_id: i64, items: usize },
    Matches { hits: Vec<SearchHit> },
}

/// Source of record rows, typically a database reader.
///
/// Loads are expected to block; the handler runs them off the async
/// executor.
pub trait RecordSource: Send + Sync + 'static {
    fn load(&self, library_id: i64) -> anyhow::Result<RecordBatch>;

    /// Re-open underlying storage before a load. Only called when a build
    /// asks for it.
    fn refresh(&self, library_id: i64) -> anyhow::Result<()> {
        let _ = library_id;
        Ok(())
    }
}

type IndexMap = HashMap<i64, Arc<SearchIndex>>;

fn read_indexes(map: &RwLock<IndexMap>) -> std::sync::RwLockReadGuard<'_, IndexMap> {
    match map.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_indexes(map: &RwLock<IndexMap>) -> std::sync::RwLockWriteGuard<'_, IndexMap> {
    match map.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Handler owning one search index per library.
pub struct SearchHandler {
    source: Arc<dyn RecordSource>,
    indexes: RwLock<IndexMap>,
}

impl SearchHandler {
    pub fn new(source: Arc<dyn RecordSource>) -> Self {
        Self {
            source,
            indexes: RwLock::new(IndexMap::new()),
        }
    }

    async fn build(&self, library_id: i64, refresh: bool) -> anyhow::Result<SearchReply> {
        let source = Arc::clone(&self.source);
        let index = tokio::task::spawn_blocking(move || -> anyhow::Result<SearchIndex> {
            if refresh {
                source
                    .refresh(library_id)
                    .context("refreshing record source")?;
            }
            let batch = source.load(library_id).context("reading library records")?;
            Ok(SearchIndex::build(merge_rows(batch)))
        })
        .await
        .map_err(|join_error| anyhow!("index build task failed: {join_error}"))??;

        let items = index.len();
        tracing::info!(library_id, items, "search index ready");
        write_indexes(&self.indexes).insert(library_id, Arc::new(index));
        Ok(SearchReply::Built { library_id, items })
    }

    fn query(&self, library_id: i64, query: &str, limit: usize) -> anyhow::Result<SearchReply> {
        let index = read_indexes(&self.indexes)
            .get(&library_id)
            .cloned()
            .ok_or_else(|| anyhow!("no index built for library {library_id}"))?;
        Ok(SearchReply::Matches {
            hits: index.query(query, limit),
        })
    }
}

#[async_trait]
impl RequestHandler for SearchHandler {
    async fn handle(&self, payload: Value) -> anyhow::Result<Value> {
        let request: SearchRequest =
            serde_json::from_value(payload).context("unsupported search payload")?;
        let reply = match request {
            SearchRequest::BuildIndex { library_id, refresh } => {
                tracing::info!(library_id, refresh, "start indexing");
                self.build(library_id, refresh).await?
            }
            SearchRequest::Query { library_id, query, limit } => {
                self.query(library_id, &query, limit)?
            }
        };
        Ok(serde_json::to_value(reply)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::FieldRow;
    use citelet::{CallError, RequestClient, WorkerEndpoint, channel};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeLibrary {
        refreshes: AtomicUsize,
    }

    impl FakeLibrary {
        fn new() -> Arc<Self> {
            Arc::new(Self { refreshes: AtomicUsize::new(0) })
        }
    }

    impl RecordSource for FakeLibrary {
        fn load(&self, library_id: i64) -> anyhow::Result<RecordBatch> {
            if library_id != 1 {
                return Err(anyhow!("no library {library_id}"));
            }
            Ok(RecordBatch {
                fields: vec![
                    FieldRow {
                        item_id: 10,
                        item_key: "AAAA1111".into(),
                        field: "title".into(),
                        value: "Quantum Error Correction".into(),
                    },
                    FieldRow {
                        item_id: 11,
                        item_key: "BBBB2222".into(),
                        field: "title".into(),
                        value: "Classical Shadows".into(),
                    },
                ],
                ..Default::default()
            })
        }

        fn refresh(&self, _library_id: i64) -> anyhow::Result<()> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn wired_client(source: Arc<FakeLibrary>) -> (RequestClient, WorkerEndpoint) {
        let (client_side, worker_side) = channel::pair();
        let endpoint = WorkerEndpoint::start(worker_side);
        endpoint.register(SearchHandler::new(source));
        (RequestClient::new(client_side), endpoint)
    }

    #[tokio::test]
    async fn build_then_query_over_the_protocol() {
        let (client, _endpoint) = wired_client(FakeLibrary::new());

        let built: SearchReply = client
            .call_as(&SearchRequest::BuildIndex { library_id: 1, refresh: false })
            .await
            .unwrap();
        match built {
            SearchReply::Built { library_id, items } => {
                assert_eq!(library_id, 1);
                assert_eq!(items, 2);
            }
            other => panic!("expected build reply, got {other:?}"),
        }

        let reply: SearchReply = client
            .call_as(&SearchRequest::Query {
                library_id: 1,
                query: "quantum".into(),
                limit: 10,
            })
            .await
            .unwrap();
        match reply {
            SearchReply::Matches { hits } => {
                assert_eq!(hits.len(), 1);
                assert_eq!(hits[0].record.item_key, "AAAA1111");
            }
            other => panic!("expected matches, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_flag_reopens_the_source() {
        let library = FakeLibrary::new();
        let (client, _endpoint) = wired_client(Arc::clone(&library));

        let _: SearchReply = client
            .call_as(&SearchRequest::BuildIndex { library_id: 1, refresh: true })
            .await
            .unwrap();
        assert_eq!(library.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn query_before_build_fails_with_a_description() {
        let (client, _endpoint) = wired_client(FakeLibrary::new());

        let err = client
            .call_as::<_, SearchReply>(&SearchRequest::Query {
                library_id: 7,
                query: "anything".into(),
                limit: 10,
            })
            .await
            .unwrap_err();
        match err {
            CallError::Handler(description) => {
                assert_eq!(description, "no index built for library 7");
            }
            other => panic!("expected handler failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn source_errors_cross_the_channel_as_failures() {
        let (client, _endpoint) = wired_client(FakeLibrary::new());

        let err = client
            .call_as::<_, SearchReply>(&SearchRequest::BuildIndex {
                library_id: 2,
                refresh: false,
            })
            .await
            .unwrap_err();
        match err {
            CallError::Handler(description) => {
                assert!(description.contains("no library 2"), "got {description}");
            }
            other => panic!("expected handler failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsupported_payloads_fail_without_killing_the_worker() {
        let (client, _endpoint) = wired_client(FakeLibrary::new());

        let err = client.call(json!({"op": "defragment"})).await.unwrap_err();
        assert!(matches!(err, CallError::Handler(_)));

        // The endpoint keeps servicing well-formed requests.
        let built: SearchReply = client
            .call_as(&SearchRequest::BuildIndex { library_id: 1, refresh: false })
            .await
            .unwrap();
        assert!(matches!(built, SearchReply::Built { .. }));
    }

    #[test]
    fn request_wire_shape_is_stable() {
        let request = SearchRequest::Query {
            library_id: 1,
            query: "residual".into(),
            limit: 5,
        };
        insta::assert_json_snapshot!(request, @r###"
        {
          "op": "query",
          "library_id": 1,
          "query": "residual",
          "limit": 5
        }
        "###);
    }

    #[test]
    fn build_request_defaults_refresh_off() {
        let parsed: SearchRequest =
            serde_json::from_value(json!({"op": "build_index", "library_id": 3})).unwrap();
        assert!(matches!(
            parsed,
            SearchRequest::BuildIndex { library_id: 3, refresh: false }
        ));
    }
}
