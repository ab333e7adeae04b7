use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
    sync::Arc,
};

use image::RgbImage;
use thiserror::Error;

use crate::engine::{InfernumModel, RequestMetadata};

/// Smallest face size the SeetaFace cascade accepts.
pub const MIN_FACE_SIZE: u32 = 20;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("failed to load face model from {}: {source}", .path.display())]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read face model: {0}")]
    ModelRead(#[source] std::io::Error),

    #[error("minimum face size must be at least 20, got {0}")]
    MinFaceSize(u32),

    #[error("pyramid scale factor must be within [0.01, 0.99], got {0}")]
    PyramidScale(f32),

    #[error("score threshold must be greater than zero, got {0}")]
    ScoreThreshold(f64),

    #[error("slide window step must be greater than zero")]
    WindowStep,

    #[error("cannot run detection on a {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },
}

/// Bounding box of a detected face, in pixels from the top-left corner.
///
/// Coordinates are reported exactly as the detector produced them; a box may
/// extend past the image border.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Detector score; higher is more confident.
    pub score: f64,
}

impl FaceBox {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            score: 0.0,
        }
    }

    fn from_face_info(face: &rustface::FaceInfo) -> Self {
        let bbox = face.bbox();
        Self {
            x: bbox.x(),
            y: bbox.y(),
            width: bbox.width(),
            height: bbox.height(),
            score: face.score(),
        }
    }
}

/// Tuning knobs forwarded to the SeetaFace detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorSettings {
    pub min_face_size: u32,
    pub score_thresh: f64,
    pub pyramid_scale_factor: f32,
    pub window_step: u32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            min_face_size: MIN_FACE_SIZE,
            score_thresh: 2.0,
            pyramid_scale_factor: 0.8,
            window_step: 4,
        }
    }
}

impl DetectorSettings {
    /// Rejects values rustface would panic on or silently ignore.
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.min_face_size < MIN_FACE_SIZE {
            return Err(DetectorError::MinFaceSize(self.min_face_size));
        }
        if !(0.01..=0.99).contains(&self.pyramid_scale_factor) {
            return Err(DetectorError::PyramidScale(self.pyramid_scale_factor));
        }
        if !(self.score_thresh > 0.0 && self.score_thresh.is_finite()) {
            return Err(DetectorError::ScoreThreshold(self.score_thresh));
        }
        if self.window_step == 0 {
            return Err(DetectorError::WindowStep);
        }
        Ok(())
    }
}

/// A decoded upload queued for detection.
pub struct DetectionRequest {
    pub image: Arc<RgbImage>,
}

/// Image dimensions kept for telemetry once the request has been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionMetadata {
    pub width: u32,
    pub height: u32,
}

impl RequestMetadata for DetectionRequest {
    type Metadata = DetectionMetadata;

    fn metadata(&self) -> Self::Metadata {
        let (width, height) = self.image.dimensions();
        DetectionMetadata { width, height }
    }
}

/// Faces in the order the detector returned them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionResponse {
    pub faces: Vec<FaceBox>,
}

/// Any model that turns a [`DetectionRequest`] into a [`DetectionResponse`]
/// and can be moved onto an engine worker.
pub trait FaceModel:
    InfernumModel<Request = DetectionRequest, Response = DetectionResponse> + Send + 'static
{
}

impl<M> FaceModel for M where
    M: InfernumModel<Request = DetectionRequest, Response = DetectionResponse> + Send + 'static
{
}

/// Face detector backed by the `rustface` crate (SeetaFace engine).
///
/// The model file is parsed once; every worker holds a clone of the parsed
/// weights and builds its scratch detector from them per run.
#[derive(Clone)]
pub struct SeetaFaceModel {
    model: rustface::Model,
    settings: DetectorSettings,
}

impl SeetaFaceModel {
    /// Load a SeetaFace model (e.g. `seeta_fd_frontal_v1.0.bin`) from disk.
    pub fn from_file(path: &Path, settings: DetectorSettings) -> Result<Self, DetectorError> {
        settings.validate()?;
        let file = File::open(path).map_err(|source| DetectorError::ModelLoad {
            path: path.to_path_buf(),
            source,
        })?;
        let model = rustface::read_model(BufReader::new(file)).map_err(|source| {
            DetectorError::ModelLoad {
                path: path.to_path_buf(),
                source,
            }
        })?;
        log::info!("Loaded face model from {}", path.display());
        Ok(Self { model, settings })
    }

    /// Load a SeetaFace model from any byte source.
    pub fn from_reader<R: Read>(
        reader: R,
        settings: DetectorSettings,
    ) -> Result<Self, DetectorError> {
        settings.validate()?;
        let model = rustface::read_model(reader).map_err(DetectorError::ModelRead)?;
        Ok(Self { model, settings })
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }
}

impl InfernumModel for SeetaFaceModel {
    type Request = DetectionRequest;
    type Response = DetectionResponse;
    type Error = DetectorError;

    fn run(&mut self, request: Self::Request) -> Result<Self::Response, Self::Error> {
        let (width, height) = request.image.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectorError::EmptyImage { width, height });
        }

        let gray = image::imageops::grayscale(request.image.as_ref());
        // release our handle so the caller can reclaim the buffer for drawing
        drop(request);

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.settings.min_face_size);
        detector.set_score_thresh(self.settings.score_thresh);
        detector.set_pyramid_scale_factor(self.settings.pyramid_scale_factor);
        detector.set_slide_window_step(self.settings.window_step, self.settings.window_step);

        let faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), width, height));

        Ok(DetectionResponse {
            faces: faces.iter().map(FaceBox::from_face_info).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_settings_are_valid() {
        assert!(DetectorSettings::default().validate().is_ok());
    }

    #[rstest]
    #[case(DetectorSettings { min_face_size: 19, ..Default::default() })]
    #[case(DetectorSettings { pyramid_scale_factor: 1.0, ..Default::default() })]
    #[case(DetectorSettings { pyramid_scale_factor: 0.0, ..Default::default() })]
    #[case(DetectorSettings { score_thresh: f64::NAN, ..Default::default() })]
    #[case(DetectorSettings { score_thresh: f64::INFINITY, ..Default::default() })]
    #[case(DetectorSettings { score_thresh: 0.0, ..Default::default() })]
    #[case(DetectorSettings { score_thresh: -1.0, ..Default::default() })]
    #[case(DetectorSettings { window_step: 0, ..Default::default() })]
    fn invalid_settings_are_rejected(#[case] settings: DetectorSettings) {
        assert!(settings.validate().is_err());
    }

    #[test]
    fn missing_model_file_reports_path() {
        let path = Path::new("/nonexistent/seeta_fd_frontal_v1.0.bin");
        let err = SeetaFaceModel::from_file(path, DetectorSettings::default())
            .err()
            .expect("loading a missing model must fail");

        assert!(matches!(err, DetectorError::ModelLoad { .. }));
        assert!(err.to_string().contains("seeta_fd_frontal_v1.0.bin"));
    }

    #[test]
    fn settings_are_checked_before_the_model_is_read() {
        let settings = DetectorSettings {
            min_face_size: 4,
            ..Default::default()
        };
        let err = SeetaFaceModel::from_reader(std::io::empty(), settings)
            .err()
            .expect("invalid settings must fail");

        assert!(matches!(err, DetectorError::MinFaceSize(4)));
    }

    fn bundled_model() -> SeetaFaceModel {
        let bytes: &[u8] = include_bytes!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/model/seeta_fd_frontal_v1.0.bin"
        ));
        SeetaFaceModel::from_reader(bytes, DetectorSettings::default())
            .expect("bundled model should load")
    }

    fn detect(model: &mut SeetaFaceModel, image: RgbImage) -> Vec<FaceBox> {
        model
            .run(DetectionRequest {
                image: Arc::new(image),
            })
            .unwrap()
            .faces
    }

    #[test]
    fn bundled_model_loads_from_disk() {
        let path = Path::new(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/model/seeta_fd_frontal_v1.0.bin"
        ));
        let model = SeetaFaceModel::from_file(path, DetectorSettings::default()).unwrap();
        assert_eq!(model.settings(), &DetectorSettings::default());
    }

    #[test]
    fn black_image_has_no_faces() {
        let mut model = bundled_model();
        assert!(detect(&mut model, RgbImage::new(100, 100)).is_empty());
    }

    #[rstest]
    #[case(1, 1)]
    #[case(19, 19)]
    #[case(41, 7)]
    #[case(260, 50)]
    fn odd_sizes_do_not_panic(#[case] width: u32, #[case] height: u32) {
        let mut model = bundled_model();
        detect(&mut model, RgbImage::new(width, height));
    }

    #[test]
    fn empty_image_is_rejected() {
        let mut model = bundled_model();
        let err = model
            .run(DetectionRequest {
                image: Arc::new(RgbImage::new(0, 10)),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            DetectorError::EmptyImage {
                width: 0,
                height: 10
            }
        ));
    }

    #[test]
    fn repeated_runs_give_identical_boxes() {
        let textured = RgbImage::from_fn(160, 120, |x, y| {
            let v = ((x * 7 + y * 13) ^ (x * y)) as u8;
            image::Rgb([v, v.wrapping_mul(3), v.wrapping_add(x as u8)])
        });
        let mut model = bundled_model();

        let first = detect(&mut model, textured.clone());
        let second = detect(&mut model, textured);
        assert_eq!(first, second);
    }

    #[test]
    fn request_metadata_carries_dimensions() {
        let request = DetectionRequest {
            image: Arc::new(RgbImage::new(64, 48)),
        };
        assert_eq!(
            request.metadata(),
            DetectionMetadata {
                width: 64,
                height: 48
            }
        );
    }
}
