//! Demo: build and query a search index through the worker protocol.
//!
//! Wires a client and a worker endpoint over an in-memory channel pair,
//! builds an index from a canned record source, and ranks titles against
//! the query given on the command line.

use std::process;
use std::sync::Arc;

use citelet::{RequestClient, WorkerEndpoint, channel};
use citelet_search::handler::{RecordSource, SearchHandler, SearchReply, SearchRequest};
use citelet_search::records::{CitekeyRow, CreatorRow, FieldRow, RecordBatch};

struct DemoLibrary;

impl RecordSource for DemoLibrary {
    fn load(&self, _library_id: i64) -> anyhow::Result<RecordBatch> {
        let titles = [
            (1, "AAAA1111", "Attention Is All You Need", "2017-06-12"),
            (2, "BBBB2222", "Deep Residual Learning for Image Recognition", "2015-12-10"),
            (3, "CCCC3333", "Quantum Computation and Quantum Information", "2000"),
            (4, "DDDD4444", "A Mathematical Theory of Communication", "1948-07"),
        ];
        let mut batch = RecordBatch::default();
        for (item_id, item_key, title, date) in titles {
            batch.fields.push(FieldRow {
                item_id,
                item_key: item_key.to_string(),
                field: "title".to_string(),
                value: title.to_string(),
            });
            batch.fields.push(FieldRow {
                item_id,
                item_key: item_key.to_string(),
                field: "date".to_string(),
                value: date.to_string(),
            });
        }
        batch.creators.push(CreatorRow {
            item_id: 4,
            first_name: "Claude".to_string(),
            last_name: "Shannon".to_string(),
        });
        batch.citekeys.push(CitekeyRow {
            item_id: 4,
            citekey: "shannon1948".to_string(),
        });
        Ok(batch)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let query = match std::env::args().nth(1) {
        Some(query) => query,
        None => {
            eprintln!("Usage: citelet-search <query>");
            process::exit(2);
        }
    };

    let (client_side, worker_side) = channel::pair();
    let endpoint = WorkerEndpoint::start(worker_side);
    endpoint.register(SearchHandler::new(Arc::new(DemoLibrary)));

    let client = RequestClient::new(client_side);

    let built: SearchReply = client
        .call_as(&SearchRequest::BuildIndex { library_id: 1, refresh: false })
        .await?;
    if let SearchReply::Built { items, .. } = built {
        tracing::info!(items, "index built");
    }

    let reply: SearchReply = client
        .call_as(&SearchRequest::Query { library_id: 1, query: query.clone(), limit: 10 })
        .await?;
    match reply {
        SearchReply::Matches { hits } if hits.is_empty() => {
            println!("no matches for {query:?}");
        }
        SearchReply::Matches { hits } => {
            for hit in hits {
                let title = hit.record.title.as_deref().unwrap_or("<untitled>");
                let year = hit.record.date.as_deref().unwrap_or("????");
                println!("{:>6.3}  {title} ({year})", hit.score);
            }
        }
        other => anyhow::bail!("unexpected reply: {other:?}"),
    }

    client.teardown();
    drop(endpoint);
    Ok(())
}
