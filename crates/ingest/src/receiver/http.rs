use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use jtrace_core::TraceConsumer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;

use crate::jaeger::thrift;
use crate::receiver::{AdapterError, HandleOutcome, deliver};
use crate::translate::translate_batch;

pub const TRACES_PATH: &str = "/api/traces";

const THRIFT_CONTENT_TYPES: [&str; 2] = [
    "application/x-thrift",
    "application/vnd.apache.thrift.binary",
];

#[derive(Clone)]
pub struct HttpCollectorState {
    pub consumer: Arc<dyn TraceConsumer>,
    pub consumer_timeout: Duration,
    pub max_request_bytes: usize,
}

pub fn router(state: HttpCollectorState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    Router::new()
        .route(TRACES_PATH, post(post_traces))
        .layer(DefaultBodyLimit::max(state.max_request_bytes))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .on_request(tower_http::trace::DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .with_state(state)
}

async fn post_traces(
    State(state): State<HttpCollectorState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match handle(&state, &headers, &body).await {
        Ok(outcome) => {
            tracing::debug!(
                count = outcome.accepted,
                rejected = outcome.rejected.len(),
                "jaeger http spans accepted"
            );
            StatusCode::ACCEPTED.into_response()
        }
        Err(err) => {
            tracing::warn!(error = %err, "jaeger http request failed");
            (err.http_status(), err.to_string()).into_response()
        }
    }
}

async fn handle(
    state: &HttpCollectorState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<HandleOutcome, AdapterError> {
    check_content_type(headers)?;
    let batch = thrift::decode_batch(body).map_err(|e| AdapterError::Decode(e.to_string()))?;
    let outcome = translate_batch(&batch)?;
    deliver(state.consumer.as_ref(), outcome, state.consumer_timeout).await
}

/// A missing content type is treated as Thrift; parameters are ignored.
fn check_content_type(headers: &HeaderMap) -> Result<(), AdapterError> {
    let Some(value) = headers.get(header::CONTENT_TYPE) else {
        return Ok(());
    };
    let raw = value
        .to_str()
        .map_err(|_| AdapterError::UnsupportedContentType("<non-ascii>".into()))?;
    let mime = raw.split(';').next().unwrap_or_default().trim();
    if THRIFT_CONTENT_TYPES
        .iter()
        .any(|ct| ct.eq_ignore_ascii_case(mime))
    {
        Ok(())
    } else {
        Err(AdapterError::UnsupportedContentType(raw.to_string()))
    }
}
