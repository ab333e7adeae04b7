use std::{io::Cursor, sync::Arc};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use face_infernum::{
    DetectionRequest, DetectorSettings, InfernumEngine, InfernumModel, SeetaFaceModel, report,
    server,
};
use image::{ImageFormat, Rgb, RgbImage};
use rstest::rstest;
use serde_json::{Value, json};
use tower::ServiceExt;

const BOUNDARY: &str = "seetaface-test-boundary";
const MAX_UPLOAD: usize = 1024 * 1024;
const MODEL_BYTES: &[u8] = include_bytes!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/model/seeta_fd_frontal_v1.0.bin"
));

fn bundled_model() -> SeetaFaceModel {
    SeetaFaceModel::from_reader(MODEL_BYTES, DetectorSettings::default())
        .expect("bundled model should load")
}

fn app(workers: usize) -> Router {
    let models = (0..workers).map(|_| bundled_model()).collect();
    server::router(Arc::new(InfernumEngine::with_workers(models)), MAX_UPLOAD)
}

fn textured() -> RgbImage {
    RgbImage::from_fn(160, 120, |x, y| {
        let v = ((x * 7 + y * 13) ^ (x * y)) as u8;
        Rgb([v, v.wrapping_mul(3), v.wrapping_add(x as u8)])
    })
}

fn encode_png(image: &RgbImage) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

fn upload(uri: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[rstest]
#[case("/detect-face-info/")]
#[case("/detect-faces-image/")]
#[tokio::test]
async fn black_png_has_no_faces(#[case] uri: &str) {
    let png = encode_png(&RgbImage::new(100, 100));
    let (status, body) = send(app(1), upload(uri, "black.png", &png)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "No faces found in the image." }));
}

#[rstest]
#[case("/detect-face-info/")]
#[case("/detect-faces-image/")]
#[tokio::test]
async fn same_upload_gives_identical_bodies(#[case] uri: &str) {
    let app = app(2);
    let png = encode_png(&textured());

    let (first_status, first) = send(app.clone(), upload(uri, "noise.png", &png)).await;
    let (second_status, second) = send(app, upload(uri, "noise.png", &png)).await;

    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert!(first.get("error").is_none(), "unexpected error body: {first}");
    assert_eq!(first, second);
}

#[tokio::test]
async fn face_info_matches_direct_detection() {
    let image = textured();
    let mut model = bundled_model();
    let faces = model
        .run(DetectionRequest {
            image: Arc::new(image.clone()),
        })
        .unwrap()
        .faces;
    let expected = serde_json::to_value(report::face_info(&faces)).unwrap();

    let png = encode_png(&image);
    let (status, body) = send(app(1), upload("/detect-face-info/", "noise.png", &png)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, expected);
}

#[tokio::test]
async fn too_small_image_is_answered_not_dropped() {
    let png = encode_png(&RgbImage::new(1, 1));
    let (status, body) = send(app(1), upload("/detect-face-info/", "dot.png", &png)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "No faces found in the image." }));
}
