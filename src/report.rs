use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::model::FaceBox;

pub const NO_FACES_MESSAGE: &str = "No faces found in the image.";
pub const FACES_DETECTED_MESSAGE: &str = "Faces detected successfully";

/// Either a payload for the detected faces or the fixed no-faces message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DetectionOutcome<T> {
    Found(T),
    NoFaces { message: &'static str },
}

impl<T> DetectionOutcome<T> {
    pub fn no_faces() -> Self {
        DetectionOutcome::NoFaces {
            message: NO_FACES_MESSAGE,
        }
    }
}

/// Corner and size form of one detected face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FaceRecord {
    pub xmin: i64,
    pub ymin: i64,
    pub xmax: i64,
    pub ymax: i64,
    pub width: u32,
    pub height: u32,
}

impl From<&FaceBox> for FaceRecord {
    fn from(face: &FaceBox) -> Self {
        let (x, y) = (i64::from(face.x), i64::from(face.y));
        Self {
            xmin: x,
            ymin: y,
            xmax: x + i64::from(face.width),
            ymax: y + i64::from(face.height),
            width: face.width,
            height: face.height,
        }
    }
}

/// Flat JSON report: `face1..faceN` in detector order, then `total_faces`
/// and `message`.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionReport {
    pub faces: Vec<FaceRecord>,
}

impl DetectionReport {
    pub fn new(faces: &[FaceBox]) -> Self {
        Self {
            faces: faces.iter().map(FaceRecord::from).collect(),
        }
    }

    pub fn total_faces(&self) -> usize {
        self.faces.len()
    }
}

impl Serialize for DetectionReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.faces.len() + 2))?;
        for (index, face) in self.faces.iter().enumerate() {
            map.serialize_entry(&format!("face{}", index + 1), face)?;
        }
        map.serialize_entry("total_faces", &self.total_faces())?;
        map.serialize_entry("message", FACES_DETECTED_MESSAGE)?;
        map.end()
    }
}

/// Report for `faces`, or the no-faces message when the slice is empty.
pub fn face_info(faces: &[FaceBox]) -> DetectionOutcome<DetectionReport> {
    if faces.is_empty() {
        DetectionOutcome::no_faces()
    } else {
        DetectionOutcome::Found(DetectionReport::new(faces))
    }
}
