use std::time::Instant;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::api::error::ErrorKind;
use crate::api::handler_utils::{error_response, internal_error, jpeg_response};
use crate::api::server::AppState;
use crate::fetch::{FetchError, ImageFetcher};
use crate::pipeline::codec::{decode, encode_jpeg, sniff_format};
use crate::pipeline::operation::{resolve_all, Operation, ParamPolicy, ResolveError};
use crate::pipeline::transforms::{ImageTransforms, TransformError};
use crate::pipeline::execute;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessRequest {
    pub url: String,
    #[serde(default)]
    pub operations: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("decode failed: {0}")]
    Decode(#[source] image::ImageError),
    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),
    #[error("encode failed: {0}")]
    Encode(#[source] image::ImageError),
}

impl ProcessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::Fetch(_) => ErrorKind::FetchError,
            Self::Decode(_) => ErrorKind::DecodeError,
            Self::Transform(_) => ErrorKind::TransformError,
            Self::Encode(_) => ErrorKind::EncodeError,
        }
    }
}

impl From<ResolveError> for ProcessError {
    fn from(error: ResolveError) -> Self {
        Self::BadRequest(error.to_string())
    }
}

/// A parsed request with its operation tokens already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
    pub url: String,
    pub operations: Vec<Operation>,
}

pub fn parse_process_request(
    body: &[u8],
    policy: ParamPolicy,
) -> Result<ResolvedRequest, ProcessError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ProcessError::BadRequest(String::from("request body is empty")));
    }
    let request: ProcessRequest = serde_json::from_slice(body)
        .map_err(|e| ProcessError::BadRequest(format!("malformed JSON body: {e}")))?;
    if request.url.trim().is_empty() {
        return Err(ProcessError::BadRequest(String::from(
            "field 'url' must not be empty",
        )));
    }
    let operations = resolve_all(request.operations.as_slice(), policy)?;
    Ok(ResolvedRequest {
        url: request.url,
        operations,
    })
}

/// Fetch, decode, run the pipeline and encode. Blocking.
pub fn run_process_request(
    request: &ResolvedRequest,
    fetcher: &dyn ImageFetcher,
    transforms: &dyn ImageTransforms,
) -> Result<Vec<u8>, ProcessError> {
    let bytes = fetcher.fetch(request.url.as_str())?;
    info!(
        url = %request.url,
        bytes = bytes.len(),
        format = ?sniff_format(&bytes),
        "fetched source image"
    );

    let image = decode(&bytes).map_err(ProcessError::Decode)?;
    drop(bytes);

    let started = Instant::now();
    let result = execute(image, request.operations.as_slice(), transforms)?;
    info!(
        operations = request.operations.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        width = result.width(),
        height = result.height(),
        "pipeline finished"
    );

    encode_jpeg(&result).map_err(ProcessError::Encode)
}

pub async fn process_image_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => return process_error_response(&body_rejection_error(&rejection)),
    };
    let request = match parse_process_request(body.as_ref(), state.param_policy) {
        Ok(request) => request,
        Err(error) => return process_error_response(&error),
    };

    let fetcher = state.fetcher.clone();
    let transforms = state.transforms.clone();
    let result = tokio::task::spawn_blocking(move || {
        run_process_request(&request, fetcher.as_ref(), transforms.as_ref())
    })
    .await;

    match result {
        Ok(Ok(jpeg)) => jpeg_response(jpeg),
        Ok(Err(error)) => process_error_response(&error),
        Err(join_error) => {
            internal_error(format!("processing task failed: {join_error}")).into_response()
        }
    }
}

/// Oversized, timed out or otherwise unreadable bodies.
fn body_rejection_error(rejection: &BytesRejection) -> ProcessError {
    ProcessError::BadRequest(format!(
        "unreadable request body: {}",
        rejection.body_text()
    ))
}

fn process_error_response(error: &ProcessError) -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        error.kind(),
        error.to_string(),
    )
    .into_response()
}
