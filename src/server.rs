use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use image::RgbImage;
use serde::Serialize;

use crate::{
    annotate::{self, AnnotateParams, AnnotatedImage, BoxColor},
    codec,
    engine::InfernumEngine,
    error::ServiceError,
    model::{DetectionRequest, FaceBox, FaceModel},
    report::{self, DetectionOutcome, DetectionReport},
    upload::{self, UploadedImage},
};

/// Engine handle shared by every request.
pub type SharedEngine<M> = Arc<InfernumEngine<M>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub status: &'static str,
    pub busy_workers: usize,
    pub workers: usize,
}

/// Build the HTTP surface around a running engine.
///
/// Both detection endpoints are served with and without a trailing slash.
pub fn router<M: FaceModel>(engine: SharedEngine<M>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(|| async { "Welcome to Face Infernum!" }))
        .route("/status", get(get_status::<M>))
        .route("/detect-face-info/", post(post_face_info::<M>))
        .route("/detect-face-info", post(post_face_info::<M>))
        .route("/detect-faces-image/", post(post_faces_image::<M>))
        .route("/detect-faces-image", post(post_faces_image::<M>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(engine)
}

async fn get_status<M: FaceModel>(State(engine): State<SharedEngine<M>>) -> Json<EngineStatus> {
    Json(EngineStatus {
        status: engine.state().as_str(),
        busy_workers: engine.busy_workers(),
        workers: engine.workers(),
    })
}

async fn post_face_info<M: FaceModel>(
    State(engine): State<SharedEngine<M>>,
    multipart: Multipart,
) -> Response {
    let upload = match upload::read_upload(multipart).await {
        Ok(upload) => upload,
        Err(e) => return e.into_response(),
    };

    match face_info(&engine, upload).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn post_faces_image<M: FaceModel>(
    State(engine): State<SharedEngine<M>>,
    Query(query): Query<Vec<(String, String)>>,
    multipart: Multipart,
) -> Response {
    let upload = match upload::read_upload(multipart).await {
        Ok(upload) => upload,
        Err(e) => return e.into_response(),
    };
    let params = AnnotateParams::from_query(query);
    let color = BoxColor::parse_or_default(params.box_color.as_deref());

    match faces_image(&engine, upload, color).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn face_info<M: FaceModel>(
    engine: &InfernumEngine<M>,
    upload: UploadedImage,
) -> Result<DetectionOutcome<DetectionReport>, ServiceError> {
    let image = decode(upload.bytes).await?;
    let faces = detect(engine, &upload.filename, Arc::new(image)).await?;
    Ok(report::face_info(&faces))
}

async fn faces_image<M: FaceModel>(
    engine: &InfernumEngine<M>,
    upload: UploadedImage,
    color: BoxColor,
) -> Result<DetectionOutcome<AnnotatedImage>, ServiceError> {
    let image = Arc::new(decode(upload.bytes).await?);
    let faces = detect(engine, &upload.filename, image.clone()).await?;
    if faces.is_empty() {
        return Ok(DetectionOutcome::no_faces());
    }

    // the engine has dropped its handle by now, so this does not copy
    let image = Arc::unwrap_or_clone(image);
    let annotated = tokio::task::spawn_blocking(move || {
        annotate::annotate(image, &faces, color, upload.format)
    })
    .await
    .map_err(|e| ServiceError::EncodeFailure(e.to_string()))??;

    Ok(DetectionOutcome::Found(annotated))
}

async fn decode(bytes: Bytes) -> Result<RgbImage, ServiceError> {
    tokio::task::spawn_blocking(move || codec::decode_rgb(&bytes))
        .await
        .map_err(|e| ServiceError::DecodeFailure(e.to_string()))?
}

async fn detect<M: FaceModel>(
    engine: &InfernumEngine<M>,
    filename: &str,
    image: Arc<RgbImage>,
) -> Result<Vec<FaceBox>, ServiceError> {
    let result = engine
        .infer(DetectionRequest { image })
        .await
        .map_err(|e| ServiceError::DetectionFailure(e.to_string()))?;

    log::info!(
        "Found {} face(s) in {filename} ({}x{}) in {:?}",
        result.response.faces.len(),
        result.request_metadata.width,
        result.request_metadata.height,
        result.duration,
    );

    Ok(result.response.faces)
}
