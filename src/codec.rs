//! Decoding uploads into RGB pixel buffers and encoding them back.

use std::io::Cursor;

use image::RgbImage;

use crate::{error::ServiceError, upload::UploadFormat};

/// Decode an upload as a color image.
///
/// The codec is sniffed from the bytes, not taken from the filename. Alpha
/// and grayscale inputs are converted to 8-bit RGB.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, ServiceError> {
    let image =
        image::load_from_memory(bytes).map_err(|e| ServiceError::DecodeFailure(e.to_string()))?;

    if image.width() == 0 || image.height() == 0 {
        return Err(ServiceError::DecodeFailure(
            "image dimensions are zero".to_string(),
        ));
    }

    Ok(image.to_rgb8())
}

/// Encode an RGB buffer in the upload's format. WebP output is lossless.
pub fn encode(image: &RgbImage, format: UploadFormat) -> Result<Vec<u8>, ServiceError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, format.image_format())
        .map_err(|e| ServiceError::EncodeFailure(e.to_string()))?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb};

    fn checkerboard() -> RgbImage {
        RgbImage::from_fn(16, 8, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    #[test]
    fn garbage_is_a_decode_failure() {
        let err = decode_rgb(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ServiceError::DecodeFailure(_)));
        assert_eq!(err.kind(), "decode_failure");
    }

    #[test]
    fn empty_upload_is_a_decode_failure() {
        assert!(matches!(
            decode_rgb(&[]),
            Err(ServiceError::DecodeFailure(_))
        ));
    }

    #[test]
    fn png_keeps_pixels() {
        let image = checkerboard();
        let encoded = encode(&image, UploadFormat::Png).unwrap();

        assert_eq!(&encoded[1..4], b"PNG");
        assert_eq!(decode_rgb(&encoded).unwrap(), image);
    }

    #[test]
    fn jpeg_output_has_jpeg_magic() {
        let encoded = encode(&checkerboard(), UploadFormat::Jpeg).unwrap();

        assert_eq!(&encoded[0..2], &[0xFF, 0xD8]);
        assert_eq!(decode_rgb(&encoded).unwrap().dimensions(), (16, 8));
    }

    #[test]
    fn webp_output_is_lossless() {
        let image = checkerboard();
        let encoded = encode(&image, UploadFormat::WebP).unwrap();

        assert_eq!(&encoded[0..4], b"RIFF");
        assert_eq!(&encoded[8..12], b"WEBP");
        assert_eq!(decode_rgb(&encoded).unwrap(), image);
    }

    #[test]
    fn grayscale_input_decodes_to_rgb() {
        let gray = GrayImage::from_pixel(4, 4, Luma([128]));
        let mut buffer = Cursor::new(Vec::new());
        gray.write_to(&mut buffer, image::ImageFormat::Png).unwrap();

        let decoded = decode_rgb(buffer.get_ref()).unwrap();
        assert_eq!(decoded.get_pixel(0, 0), &Rgb([128, 128, 128]));
    }
}
