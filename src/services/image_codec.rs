//! Decoding of inline `data:image/<type>;base64,<payload>` images.

use base64::{
    Engine, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use image::ImageFormat;
use thiserror::Error;

// Browsers are not consistent about trailing padding.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const SUPPORTED_TYPES: &[&str] = &["png", "jpeg", "jpg", "gif", "webp", "bmp"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageDecodeError {
    #[error("Expected an image as a data URL (data:image/<type>;base64,<payload>).")]
    NotADataUrl,
    #[error("Unsupported image type '{0}'.")]
    UnsupportedType(String),
    #[error("The image payload is not valid base64.")]
    InvalidBase64,
    #[error("The uploaded image is not of the declared type '{0}'.")]
    TypeMismatch(String),
    #[error("Upload a valid image. The file you uploaded was either not an image or a corrupted image.")]
    NotAnImage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    /// File extension taken from the declared media type, e.g. `png`. Always agrees with the
    /// detected format.
    pub extension: String,
}

pub fn decode_data_url(input: &str) -> Result<DecodedImage, ImageDecodeError> {
    let rest = input
        .trim()
        .strip_prefix("data:image/")
        .ok_or(ImageDecodeError::NotADataUrl)?;
    let (media_subtype, payload) = rest
        .split_once(";base64,")
        .ok_or(ImageDecodeError::NotADataUrl)?;

    let extension = media_subtype.to_ascii_lowercase();
    let declared = SUPPORTED_TYPES
        .contains(&extension.as_str())
        .then(|| ImageFormat::from_extension(&extension))
        .flatten()
        .ok_or_else(|| ImageDecodeError::UnsupportedType(media_subtype.to_string()))?;

    let bytes = LENIENT_BASE64
        .decode(payload.trim())
        .map_err(|_| ImageDecodeError::InvalidBase64)?;

    let detected = image::guess_format(&bytes).map_err(|_| ImageDecodeError::NotAnImage)?;
    if detected != declared {
        return Err(ImageDecodeError::TypeMismatch(extension));
    }
    image::load_from_memory_with_format(&bytes, detected).map_err(|_| ImageDecodeError::NotAnImage)?;

    Ok(DecodedImage { bytes, extension })
}
