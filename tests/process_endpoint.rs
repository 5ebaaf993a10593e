use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use imgproc_backend::api::server::{build_router_with_state, AppState};
use imgproc_backend::config::ServiceConfig;
use imgproc_backend::fetch::{FetchError, ImageFetcher};
use imgproc_backend::pipeline::codec::{decode, encode_jpeg};
use imgproc_backend::pipeline::{ImageCrateTransforms, ParamPolicy};

/// Serves fixed bodies by URL; anything else is a 404.
struct MapFetcher {
    bodies: HashMap<String, Vec<u8>>,
}

impl ImageFetcher for MapFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

const PHOTO_URL: &str = "http://images.test/photo.png";
const GARBAGE_URL: &str = "http://images.test/garbage.bin";

fn photo() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(400, 300, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .expect("fixture should encode");
    out.into_inner()
}

fn test_app(policy: ParamPolicy) -> axum::Router {
    let mut bodies = HashMap::new();
    bodies.insert(String::from(PHOTO_URL), png_bytes(&photo()));
    bodies.insert(String::from(GARBAGE_URL), b"not an image at all".to_vec());
    let state = AppState::new(
        Arc::new(MapFetcher { bodies }),
        Arc::new(ImageCrateTransforms::default()),
        policy,
    );
    build_router_with_state(state, &ServiceConfig::default())
}

struct RawResponse {
    status: StatusCode,
    content_type: Option<String>,
    content_length: Option<String>,
    body: Vec<u8>,
}

async fn send(app: axum::Router, method: Method, body: Body) -> RawResponse {
    let request = Request::builder()
        .method(method)
        .uri("/process")
        .header("content-type", "application/json")
        .body(body)
        .expect("request should build");

    let response = app
        .oneshot(request)
        .await
        .expect("router should return response");
    let status = response.status();
    let header_value = |name: header::HeaderName| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let content_type = header_value(header::CONTENT_TYPE);
    let content_length = header_value(header::CONTENT_LENGTH);
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    RawResponse {
        status,
        content_type,
        content_length,
        body: body.to_vec(),
    }
}

async fn process(app: axum::Router, payload: Value) -> RawResponse {
    send(app, Method::POST, Body::from(payload.to_string())).await
}

async fn process_image(app: axum::Router, operations: Value) -> DynamicImage {
    let response = process(app, json!({"url": PHOTO_URL, "operations": operations})).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type.as_deref(), Some("image/jpeg"));
    decode(&response.body).expect("response should be a decodable image")
}

fn error_body(response: &RawResponse) -> Value {
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let value: Value =
        serde_json::from_slice(&response.body).expect("error body should be valid JSON");
    let keys = value
        .as_object()
        .expect("error body should be an object")
        .keys()
        .cloned()
        .collect::<Vec<_>>();
    assert_eq!(keys, vec![String::from("error")]);
    value
}

#[tokio::test]
async fn empty_operations_return_the_source_reencoded() {
    let response = process(
        test_app(ParamPolicy::Lenient),
        json!({"url": PHOTO_URL, "operations": []}),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(
        response.content_length,
        Some(response.body.len().to_string())
    );

    let expected = encode_jpeg(&photo()).expect("reference encode");
    assert_eq!(response.body, expected);
}

#[tokio::test]
async fn explicit_resize_ignores_aspect_ratio() {
    let image = process_image(test_app(ParamPolicy::Lenient), json!(["resize,200,150"])).await;
    assert_eq!(image.dimensions(), (200, 150));

    let image = process_image(test_app(ParamPolicy::Lenient), json!(["resize,120,500"])).await;
    assert_eq!(image.dimensions(), (120, 500));
}

#[tokio::test]
async fn width_only_resize_keeps_aspect_ratio() {
    let image = process_image(test_app(ParamPolicy::Lenient), json!(["resize,200"])).await;
    assert_eq!(image.dimensions(), (200, 150));
}

#[tokio::test]
async fn thumbnail_and_rotations_compose_in_order() {
    let image = process_image(
        test_app(ParamPolicy::Lenient),
        json!(["thumbnail", "rotateLeft"]),
    )
    .await;
    assert_eq!(image.dimensions(), (75, 100));
}

#[tokio::test]
async fn grayscale_output_has_equal_channels() {
    let image = process_image(test_app(ParamPolicy::Lenient), json!(["grayscale"])).await;
    for pixel in image.to_rgb8().pixels() {
        assert_eq!(pixel[0], pixel[1]);
        assert_eq!(pixel[1], pixel[2]);
    }
}

#[tokio::test]
async fn unknown_operations_leave_the_image_unchanged() {
    let plain = process(
        test_app(ParamPolicy::Lenient),
        json!({"url": PHOTO_URL, "operations": []}),
    )
    .await;
    let with_unknown = process(
        test_app(ParamPolicy::Lenient),
        json!({"url": PHOTO_URL, "operations": ["sepia", "vignette,3"]}),
    )
    .await;
    assert_eq!(with_unknown.status, StatusCode::OK);
    assert_eq!(with_unknown.body, plain.body);
}

#[tokio::test]
async fn malformed_json_is_reported_as_error_message() {
    let response = send(
        test_app(ParamPolicy::Lenient),
        Method::POST,
        Body::from("{\"url\": "),
    )
    .await;
    let body = error_body(&response);
    assert!(body["error"]
        .as_str()
        .expect("error should be a string")
        .starts_with("invalid request: malformed JSON body"));
}

#[tokio::test]
async fn empty_body_is_rejected() {
    let response = send(test_app(ParamPolicy::Lenient), Method::POST, Body::empty()).await;
    assert_eq!(
        error_body(&response),
        json!({"error": "invalid request: request body is empty"})
    );
}

#[tokio::test]
async fn fetch_failure_does_not_poison_later_requests() {
    let app = test_app(ParamPolicy::Lenient);

    let failed = process(
        app.clone(),
        json!({"url": "http://images.test/missing.png", "operations": ["grayscale"]}),
    )
    .await;
    assert_eq!(
        error_body(&failed),
        json!({"error": "fetch failed: 'http://images.test/missing.png' responded with HTTP 404"})
    );

    let image = process_image(app, json!(["flipVertical"])).await;
    assert_eq!(image.dimensions(), (400, 300));
}

#[tokio::test]
async fn undecodable_source_is_a_decode_error() {
    let response = process(
        test_app(ParamPolicy::Lenient),
        json!({"url": GARBAGE_URL, "operations": []}),
    )
    .await;
    let body = error_body(&response);
    assert!(body["error"]
        .as_str()
        .expect("error should be a string")
        .starts_with("decode failed:"));
}

#[tokio::test]
async fn failing_transform_is_a_transform_error() {
    let response = process(
        test_app(ParamPolicy::Lenient),
        json!({"url": PHOTO_URL, "operations": ["resize,100000,10"]}),
    )
    .await;
    let body = error_body(&response);
    assert!(body["error"]
        .as_str()
        .expect("error should be a string")
        .starts_with("transform failed:"));
}

#[tokio::test]
async fn strict_policy_rejects_unparsable_parameters() {
    let payload = json!({"url": PHOTO_URL, "operations": ["resize,wide"]});

    let lenient = process(test_app(ParamPolicy::Lenient), payload.clone()).await;
    assert_eq!(lenient.status, StatusCode::OK);

    let strict = process(test_app(ParamPolicy::Strict), payload).await;
    assert_eq!(
        error_body(&strict),
        json!({"error": "invalid request: operation 'resize,wide' has invalid numeric parameter 'wide'"})
    );
}

#[tokio::test]
async fn only_post_is_routed() {
    let response = send(test_app(ParamPolicy::Lenient), Method::GET, Body::empty()).await;
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
}

/// Never answers within a one second request budget.
struct StalledFetcher;

impl ImageFetcher for StalledFetcher {
    fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        std::thread::sleep(Duration::from_secs(2));
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn request_timeout_is_reported_as_error_message() {
    let config = ServiceConfig {
        write_timeout: Duration::from_secs(1),
        ..ServiceConfig::default()
    };
    let state = AppState::new(
        Arc::new(StalledFetcher),
        Arc::new(ImageCrateTransforms::default()),
        ParamPolicy::Lenient,
    );
    let app = build_router_with_state(state, &config);

    let response = process(app, json!({"url": PHOTO_URL, "operations": []})).await;
    assert_eq!(response.content_type.as_deref(), Some("application/json"));
    assert_eq!(
        error_body(&response),
        json!({"error": "request timed out"})
    );
}

#[tokio::test]
async fn oversized_body_is_a_bad_request_message() {
    let operations = vec!["sepia"; 300_000];
    let response = process(
        test_app(ParamPolicy::Lenient),
        json!({"url": PHOTO_URL, "operations": operations}),
    )
    .await;
    let body = error_body(&response);
    assert!(body["error"]
        .as_str()
        .expect("error should be a string")
        .starts_with("invalid request: unreadable request body:"));
}
