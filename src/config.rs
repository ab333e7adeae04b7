use std::path::PathBuf;

use argh::FromArgs;
use thiserror::Error;

use crate::model::{DetectorError, DetectorSettings};

// defaults for the server
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MODEL_PATH: &str = "model/seeta_fd_frontal_v1.0.bin";
pub const DEFAULT_WORKERS: usize = 1;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("at least one worker is required")]
    NoWorkers,

    #[error("maximum upload size must be greater than zero")]
    NoUploadLimit,

    #[error(transparent)]
    Detector(#[from] DetectorError),
}

#[derive(FromArgs, Debug)]
/// Face Infernum detects faces in uploaded images over HTTP.
pub struct ServerArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    pub host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    pub port: u16,

    /// path to the SeetaFace model file
    #[argh(option, short = 'm', default = "PathBuf::from(DEFAULT_MODEL_PATH)")]
    pub model: PathBuf,

    /// number of detection worker threads
    #[argh(option, short = 'w', default = "DEFAULT_WORKERS")]
    pub workers: usize,

    /// largest accepted upload, in megabytes
    #[argh(option, default = "DEFAULT_MAX_UPLOAD_MB")]
    pub max_upload_mb: usize,

    /// smallest face to look for, in pixels (at least 20)
    #[argh(option, default = "DetectorSettings::default().min_face_size")]
    pub min_face_size: u32,

    /// detector score threshold
    #[argh(option, default = "DetectorSettings::default().score_thresh")]
    pub score_thresh: f64,

    /// image pyramid scale factor, between 0.01 and 0.99
    #[argh(option, default = "DetectorSettings::default().pyramid_scale_factor")]
    pub pyramid_scale: f32,

    /// sliding window step, in pixels
    #[argh(option, default = "DetectorSettings::default().window_step")]
    pub window_step: u32,
}

/// Validated server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub addr: String,
    pub model_path: PathBuf,
    pub workers: usize,
    pub max_upload_bytes: usize,
    pub detector: DetectorSettings,
}

impl ServerArgs {
    pub fn into_config(self) -> Result<ServerConfig, ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.max_upload_mb == 0 {
            return Err(ConfigError::NoUploadLimit);
        }

        let detector = DetectorSettings {
            min_face_size: self.min_face_size,
            score_thresh: self.score_thresh,
            pyramid_scale_factor: self.pyramid_scale,
            window_step: self.window_step,
        };
        detector.validate()?;

        Ok(ServerConfig {
            // format the host and port
            addr: format!("{}:{}", self.host, self.port),
            model_path: self.model,
            workers: self.workers,
            max_upload_bytes: self.max_upload_mb.saturating_mul(1024 * 1024),
            detector,
        })
    }
}
