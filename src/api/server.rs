use std::sync::Arc;

use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{BoxError, Router};
use tower::timeout::error::Elapsed;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::timeout::RequestBodyTimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::error::ErrorKind;
use crate::api::handler_utils::{error_response, internal_error};
use crate::api::process::process_image_handler;
use crate::config::ServiceConfig;
use crate::fetch::{HttpFetcher, SharedImageFetcher};
use crate::pipeline::transforms::{ImageCrateTransforms, SharedImageTransforms};
use crate::pipeline::ParamPolicy;

#[derive(Clone)]
pub struct AppState {
    pub service_name: &'static str,
    pub service_version: &'static str,
    pub fetcher: SharedImageFetcher,
    pub transforms: SharedImageTransforms,
    pub param_policy: ParamPolicy,
}

impl AppState {
    pub fn new(
        fetcher: SharedImageFetcher,
        transforms: SharedImageTransforms,
        param_policy: ParamPolicy,
    ) -> Self {
        Self {
            service_name: "imgproc-backend",
            service_version: env!("CARGO_PKG_VERSION"),
            fetcher,
            transforms,
            param_policy,
        }
    }

    /// Real HTTP fetching and `image`-crate transforms, sized by `config`.
    pub fn from_config(config: &ServiceConfig) -> Self {
        // The fetch runs inside the request, so it gets the same budget.
        let fetcher: SharedImageFetcher =
            Arc::new(HttpFetcher::new(Some(config.write_timeout)));
        let transforms: SharedImageTransforms =
            Arc::new(ImageCrateTransforms::new(config.max_dimension));
        Self::new(fetcher, transforms, config.param_policy)
    }
}

pub fn build_router(config: &ServiceConfig) -> Router {
    build_router_with_state(AppState::from_config(config), config)
}

pub fn build_router_with_state(state: AppState, config: &ServiceConfig) -> Router {
    Router::new()
        .route("/process", post(process_image_handler))
        .layer(RequestBodyTimeoutLayer::new(config.read_timeout))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .layer(TimeoutLayer::new(config.write_timeout)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_middleware_error(error: BoxError) -> Response {
    if error.is::<Elapsed>() {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Timeout,
            "request timed out",
        )
        .into_response();
    }
    internal_error(format!("middleware failure: {error}")).into_response()
}

pub async fn serve(config: ServiceConfig) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    let state = AppState::from_config(&config);
    info!(
        bind = %config.bind,
        service = state.service_name,
        version = state.service_version,
        read_timeout_secs = config.read_timeout.as_secs(),
        write_timeout_secs = config.write_timeout.as_secs(),
        max_dimension = config.max_dimension,
        param_policy = ?config.param_policy,
        "starting image processing HTTP surface"
    );
    let app = build_router_with_state(state, &config);
    axum::serve(listener, app).await
}
