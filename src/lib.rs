//! Face Infernum: an HTTP service that finds faces in uploaded images.
//!
//! Uploads are validated by extension, decoded to RGB and queued to an
//! [`InfernumEngine`] whose workers run the SeetaFace detector. Results are
//! returned either as a flat bounding-box report or as the input image with
//! the faces outlined, re-encoded in its original format.

pub mod annotate;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod report;
pub mod server;
pub mod upload;

pub use engine::{
    EngineError, InfernumEngine, InfernumEngineResponse, InfernumEngineState, InfernumModel,
    RequestMetadata,
};
pub use error::ServiceError;
pub use model::{
    DetectionRequest, DetectionResponse, DetectorError, DetectorSettings, FaceBox, FaceModel,
    SeetaFaceModel,
};
