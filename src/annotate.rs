use std::{num::ParseIntError, str::FromStr};

use base64::prelude::*;
use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{codec, error::ServiceError, model::FaceBox, upload::UploadFormat};

/// Stroke width of the drawn boxes, in pixels.
pub const BOX_THICKNESS: u32 = 2;

/// Rectangle color as an `R,G,B` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxColor(pub [u8; 3]);

impl BoxColor {
    pub const GREEN: BoxColor = BoxColor([0, 255, 0]);

    /// Parse the `box_color` query value, falling back to green when it is
    /// absent or malformed.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        let Some(raw) = raw.filter(|raw| !raw.is_empty()) else {
            return Self::default();
        };
        raw.parse().unwrap_or_else(|e| {
            log::debug!("Ignoring box_color {raw:?}: {e}");
            Self::default()
        })
    }
}

impl Default for BoxColor {
    fn default() -> Self {
        Self::GREEN
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseBoxColorError {
    #[error("expected 3 comma-separated components, got {0}")]
    Arity(usize),
    #[error("invalid color component: {0}")]
    Component(#[from] ParseIntError),
}

impl FromStr for BoxColor {
    type Err = ParseBoxColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();
        let [r, g, b] = parts.as_slice() else {
            return Err(ParseBoxColorError::Arity(parts.len()));
        };
        Ok(BoxColor([
            r.trim().parse()?,
            g.trim().parse()?,
            b.trim().parse()?,
        ]))
    }
}

/// Query parameters of the annotated-image endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotateParams {
    pub box_color: Option<String>,
}

impl AnnotateParams {
    /// Collect parameters from raw query pairs; a repeated key keeps its last value.
    pub fn from_query(pairs: Vec<(String, String)>) -> Self {
        let box_color = pairs
            .into_iter()
            .filter(|(key, _)| key == "box_color")
            .map(|(_, value)| value)
            .last();
        Self { box_color }
    }
}

/// Response body carrying the re-encoded, base64 annotated image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedImage {
    pub image: String,
}

/// Draw a hollow rectangle over every face, clipped to the image.
pub fn draw_face_boxes(image: &mut RgbImage, faces: &[FaceBox], color: BoxColor) {
    for face in faces {
        for inset in 0..BOX_THICKNESS {
            let width = face.width.saturating_sub(2 * inset);
            let height = face.height.saturating_sub(2 * inset);
            if width == 0 || height == 0 {
                break;
            }
            let rect =
                Rect::at(face.x + inset as i32, face.y + inset as i32).of_size(width, height);
            draw_hollow_rect_mut(image, rect, Rgb(color.0));
        }
    }
}

/// Draw the faces, re-encode in the upload's format and base64 the result.
pub fn annotate(
    mut image: RgbImage,
    faces: &[FaceBox],
    color: BoxColor,
    format: UploadFormat,
) -> Result<AnnotatedImage, ServiceError> {
    draw_face_boxes(&mut image, faces, color);
    let encoded = codec::encode(&image, format)?;
    Ok(AnnotatedImage {
        image: BASE64_STANDARD.encode(encoded),
    })
}
