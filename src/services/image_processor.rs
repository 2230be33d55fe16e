// src/services/image_processor.rs
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use image::ImageFormat;
use std::io::Cursor;
use thiserror::Error;

use crate::models::UploadedImage;

pub const ACCEPTED_MIME_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];
pub const MAX_FILE_SIZE_BYTES: usize = 5 * 1024 * 1024;
/// Above this edge length the model output tends to lose detail.
pub const PROCESSING_EDGE_LIMIT_PX: u32 = 900;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntakeError {
    #[error("Invalid file type ({0}). Please use PNG, JPG, or WEBP.")]
    InvalidType(String),

    #[error("File is too large ({size} bytes). Maximum size is 5MB.")]
    TooLarge { size: usize },

    #[error("Could not read image: {0}")]
    Decode(String),
}

/// A file as handed over by the user, before validation.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub image: UploadedImage,
    /// Soft warning only; the hard limit is the byte size check.
    pub oversized_for_processing: bool,
}

#[derive(Debug, Default)]
pub struct ImageProcessor;

impl ImageProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, file: &ImageFile) -> Result<(), IntakeError> {
        if !ACCEPTED_MIME_TYPES.contains(&file.mime_type.as_str()) {
            return Err(IntakeError::InvalidType(file.mime_type.clone()));
        }

        if file.bytes.len() > MAX_FILE_SIZE_BYTES {
            return Err(IntakeError::TooLarge {
                size: file.bytes.len(),
            });
        }

        Ok(())
    }

    pub fn load(&self, file: &ImageFile) -> Result<LoadedImage, IntakeError> {
        self.validate(file)?;

        let (width, height) = self.dimensions(&file.bytes)?;

        Ok(LoadedImage {
            image: UploadedImage {
                data_url: data_url(&file.mime_type, &file.bytes),
                mime_type: file.mime_type.clone(),
                width_px: width,
                height_px: height,
            },
            oversized_for_processing: is_oversized(width, height),
        })
    }

    pub fn dimensions(&self, data: &[u8]) -> Result<(u32, u32), IntakeError> {
        image::io::Reader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| IntakeError::Decode(e.to_string()))?
            .into_dimensions()
            .map_err(|e| IntakeError::Decode(format!("Invalid image format: {}", e)))
    }
}

pub fn is_oversized(width: u32, height: u32) -> bool {
    width > PROCESSING_EDGE_LIMIT_PX || height > PROCESSING_EDGE_LIMIT_PX
}

/// Sniffs the MIME type from the leading bytes.
pub fn guess_mime_type(data: &[u8]) -> &'static str {
    match image::guess_format(data) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::Bmp) => "image/bmp",
        Ok(ImageFormat::Tiff) => "image/tiff",
        _ => "application/octet-stream",
    }
}

pub fn data_url(mime_type: &str, data: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_type,
        general_purpose::STANDARD.encode(data)
    )
}

/// Returns the payload after the first comma, or the input when there is no prefix.
pub fn strip_data_url_prefix(value: &str) -> &str {
    match value.split_once(',') {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => value,
    }
}

/// Splits a base64 data URL into its MIME type and decoded bytes.
pub fn decode_data_url(value: &str) -> Option<(String, Vec<u8>)> {
    let rest = value.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime_type = meta.strip_suffix(";base64")?;
    let bytes = general_purpose::STANDARD.decode(payload.trim()).ok()?;
    Some((mime_type.to_string(), bytes))
}
