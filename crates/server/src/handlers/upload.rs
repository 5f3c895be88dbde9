//! Bulk upload endpoint.
//!
//! The request body is a single JSON array of entries, streamed and framed
//! incrementally so arbitrarily large uploads run in constant memory. Each
//! entry is upserted on `(scope, key, owner)` with a bounded number of
//! upserts in flight: reading the body pauses once the high watermark is
//! reached and resumes after the set drains to the low watermark. The first
//! failure stops the intake, but upserts already in flight are awaited, so
//! the reported counts only ever cover completed operations.

use crate::error::{ApiError, ApiResult};
use crate::identity::Identity;
use crate::ingest::JsonArrayFramer;
use crate::state::AppState;
use alcove_core::Entry;
use axum::Json;
use axum::extract::{Request, State};
use axum::http::header;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::Serialize;

/// Pause reading the body when this many upserts are in flight.
const HIGH_WATERMARK: usize = 5;
/// Resume reading once in-flight upserts drain to this many.
const LOW_WATERMARK: usize = 2;

/// Outcome of a bulk upload.
#[derive(Debug, Serialize)]
pub struct UploadSummary {
    pub inserted: u64,
    pub updated: u64,
}

/// Bulk upsert settings entries. `PUT /settings/upload`
pub async fn upload_entries(
    State(state): State<AppState>,
    identity: Identity,
    request: Request,
) -> ApiResult<Json<UploadSummary>> {
    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().starts_with("application/json"));
    if !is_json {
        return Err(ApiError::BadRequest(
            "content type must be application/json".to_string(),
        ));
    }

    let access = state.access(identity);
    let mut body = request.into_body().into_data_stream();
    let mut framer = JsonArrayFramer::new();
    let mut in_flight = FuturesUnordered::new();
    let mut summary = UploadSummary {
        inserted: 0,
        updated: 0,
    };
    let mut failure: Option<ApiError> = None;

    'intake: while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                failure = Some(ApiError::BadRequest(format!("body read failed: {e}")));
                break 'intake;
            }
        };
        let mut elements = Vec::new();
        if let Err(e) = framer.push(&chunk, &mut elements) {
            failure = Some(ApiError::BadRequest(e.to_string()));
            break 'intake;
        }
        for element in elements {
            let entry: Entry = match serde_json::from_slice(&element) {
                Ok(entry) => entry,
                Err(e) => {
                    failure = Some(ApiError::BadRequest(format!("malformed entry: {e}")));
                    break 'intake;
                }
            };
            let access = access.clone();
            in_flight.push(async move { access.upsert(entry).await });

            if in_flight.len() >= HIGH_WATERMARK {
                while in_flight.len() > LOW_WATERMARK {
                    match in_flight.next().await {
                        Some(Ok(true)) => summary.inserted += 1,
                        Some(Ok(false)) => summary.updated += 1,
                        Some(Err(e)) => {
                            failure = Some(e.into());
                            break 'intake;
                        }
                        None => break,
                    }
                }
            }
        }
    }

    if failure.is_none()
        && let Err(e) = framer.finish()
    {
        failure = Some(ApiError::BadRequest(e.to_string()));
    }

    // Settle whatever is still in flight; cancelling mid-write would make
    // the summary lie about what reached the database.
    while let Some(result) = in_flight.next().await {
        match result {
            Ok(true) => summary.inserted += 1,
            Ok(false) => summary.updated += 1,
            Err(e) => {
                if failure.is_none() {
                    failure = Some(e.into());
                }
            }
        }
    }

    if let Some(err) = failure {
        return Err(err);
    }
    tracing::info!(
        tenant = %access.tenant(),
        inserted = summary.inserted,
        updated = summary.updated,
        "bulk upload complete"
    );
    Ok(Json(summary))
}
