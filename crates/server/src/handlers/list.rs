//! Streaming list endpoint.
//!
//! Rows are written into the response body as they arrive from the store,
//! so a large result set never sits in memory. The document is
//!
//! ```json
//! {"items": [...], "resultInfo": {"totalRecords": 42, "diagnostics": []}}
//! ```
//!
//! A failure after streaming has begun cannot change the status line any
//! more; it is reported as a `resultInfo.diagnostics` message and the
//! `totalRecords` field is omitted.

use crate::error::{ApiError, ApiResult};
use crate::identity::Identity;
use crate::state::AppState;
use alcove_core::filter::{Filter, OrderSpec};
use alcove_storage::ListEvent;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::Response;
use bytes::Bytes;
use futures::stream;
use serde::Deserialize;
use std::convert::Infallible;
use tokio::sync::mpsc;

/// Bound on rows in flight between the store and the response body. Also
/// the backpressure point: a slow client stalls the producing query instead
/// of ballooning the channel.
const STREAM_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Filter expression, e.g. `scope = ui and key = theme*`.
    pub query: Option<String>,
    /// Result ordering, `<field>` or `<field>.asc` / `<field>.desc`.
    pub order_by: Option<String>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

/// List settings entries. `GET /settings/entries`
pub async fn list_entries(
    State(state): State<AppState>,
    identity: Identity,
    Query(params): Query<ListParams>,
) -> ApiResult<Response> {
    let filter = params.query.as_deref().map(Filter::parse).transpose()?;
    let order = params.order_by.as_deref().map(OrderSpec::parse).transpose()?;
    let limit = params
        .limit
        .unwrap_or(i64::from(state.config.server.default_list_limit));
    let offset = params.offset.unwrap_or(0);
    if limit < 0 || offset < 0 {
        return Err(ApiError::BadRequest(
            "limit and offset must be non-negative".to_string(),
        ));
    }

    let access = state.access(identity);
    // Authorization and query compilation happen before the 200 status line
    // is committed; a caller with no read grants gets a clean 403.
    let query = access.list_query(filter.as_ref(), order, limit, offset)?;

    let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        access.stream(query, tx).await;
    });

    let body = Body::from_stream(stream::unfold(DocumentWriter::new(rx), |mut w| async move {
        let chunk = w.next_chunk().await?;
        Some((Ok::<Bytes, Infallible>(chunk), w))
    }));
    Response::builder()
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Incremental writer for the listing document.
struct DocumentWriter {
    rx: mpsc::Receiver<ListEvent>,
    started: bool,
    wrote_row: bool,
    finished: bool,
}

impl DocumentWriter {
    fn new(rx: mpsc::Receiver<ListEvent>) -> Self {
        Self {
            rx,
            started: false,
            wrote_row: false,
            finished: false,
        }
    }

    async fn next_chunk(&mut self) -> Option<Bytes> {
        if self.finished {
            return None;
        }
        match self.rx.recv().await {
            Some(ListEvent::Row(entry)) => match serde_json::to_string(&entry) {
                Ok(json) => {
                    let mut out = String::new();
                    self.open(&mut out);
                    if self.wrote_row {
                        out.push(',');
                    }
                    self.wrote_row = true;
                    out.push_str(&json);
                    Some(Bytes::from(out))
                }
                Err(e) => Some(self.terminal(None, Some(e.to_string()))),
            },
            Some(ListEvent::End { total_records }) => Some(self.terminal(Some(total_records), None)),
            Some(ListEvent::Failed { message }) => Some(self.terminal(None, Some(message))),
            // Producer died without a terminal event.
            None => Some(self.terminal(None, Some("result stream aborted".to_string()))),
        }
    }

    fn open(&mut self, out: &mut String) {
        if !self.started {
            out.push_str("{\"items\":[");
            self.started = true;
        }
    }

    fn terminal(&mut self, total: Option<u64>, diagnostic: Option<String>) -> Bytes {
        self.finished = true;
        let mut out = String::new();
        self.open(&mut out);
        out.push_str("],\"resultInfo\":{");
        if let Some(total) = total {
            out.push_str(&format!("\"totalRecords\":{total},"));
        }
        let diagnostics = match diagnostic {
            Some(message) => serde_json::json!([{"message": message}]),
            None => serde_json::json!([]),
        };
        out.push_str(&format!("\"diagnostics\":{diagnostics}}}}}"));
        Bytes::from(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alcove_core::Entry;
    use serde_json::{Value, json};
    use uuid::Uuid;

    fn row() -> ListEvent {
        ListEvent::Row(Entry {
            id: Some(Uuid::new_v4()),
            scope: "ui".into(),
            key: "theme".into(),
            value: json!(1),
            owner: None,
        })
    }

    /// Feed events into a writer and return the full document it emits.
    /// The sender is dropped after the last event, terminal or not.
    async fn render(events: Vec<ListEvent>) -> Value {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);
        let mut writer = DocumentWriter::new(rx);
        let mut out = Vec::new();
        while let Some(chunk) = writer.next_chunk().await {
            out.extend_from_slice(&chunk);
        }
        serde_json::from_slice(&out).expect("document must stay parseable")
    }

    #[tokio::test]
    async fn success_trailer_carries_total_and_empty_diagnostics() {
        let doc = render(vec![row(), ListEvent::End { total_records: 7 }]).await;
        assert_eq!(doc["items"].as_array().unwrap().len(), 1);
        assert_eq!(doc["resultInfo"]["totalRecords"], 7);
        assert_eq!(doc["resultInfo"]["diagnostics"], json!([]));
    }

    #[tokio::test]
    async fn failure_after_rows_truncates_with_diagnostic() {
        let doc = render(vec![
            row(),
            row(),
            ListEvent::Failed {
                message: "cursor lost".into(),
            },
        ])
        .await;
        assert_eq!(doc["items"].as_array().unwrap().len(), 2);
        assert!(doc["resultInfo"].get("totalRecords").is_none());
        assert_eq!(
            doc["resultInfo"]["diagnostics"],
            json!([{"message": "cursor lost"}])
        );
    }

    #[tokio::test]
    async fn failure_before_any_row_is_an_empty_document() {
        let doc = render(vec![ListEvent::Failed {
            message: "no connection".into(),
        }])
        .await;
        assert_eq!(doc["items"], json!([]));
        assert!(doc["resultInfo"].get("totalRecords").is_none());
        assert_eq!(
            doc["resultInfo"]["diagnostics"][0]["message"],
            "no connection"
        );
    }

    #[tokio::test]
    async fn dropped_producer_still_closes_the_document() {
        // No terminal event at all: the producer died mid-stream.
        let doc = render(vec![row()]).await;
        assert_eq!(doc["items"].as_array().unwrap().len(), 1);
        assert!(doc["resultInfo"].get("totalRecords").is_none());
        assert_eq!(
            doc["resultInfo"]["diagnostics"],
            json!([{"message": "result stream aborted"}])
        );
    }
}
