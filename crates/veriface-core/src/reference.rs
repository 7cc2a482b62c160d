//! Reference image loading — the single fixed encoding every verification
//! decision is made against.

use crate::backend::{FaceEncoder, FaceLocator, LocatorError};
use crate::types::FaceEncoding;
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("reference image not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to decode reference image: {0}")]
    Undecodable(String),
    #[error(transparent)]
    Locator(#[from] LocatorError),
}

/// A loaded reference image with its face encoding, if one could be produced.
///
/// `encoding: None` means no face was detected (or its encoding failed) —
/// reported to the caller rather than treated as fatal.
#[derive(Debug)]
pub struct Reference {
    pub image: RgbImage,
    pub encoding: Option<FaceEncoding>,
}

/// Load the reference image and encode the face in it.
///
/// When several faces are present, only the first located face is encoded —
/// a deliberate simplification, not largest-face or best-confidence.
pub fn load_reference(
    path: &Path,
    locator: &mut dyn FaceLocator,
    encoder: &mut dyn FaceEncoder,
) -> Result<Reference, ReferenceError> {
    if !path.exists() {
        return Err(ReferenceError::NotFound(path.to_path_buf()));
    }

    let image = image::open(path)
        .map_err(|e| ReferenceError::Undecodable(e.to_string()))?
        .to_rgb8();

    let locations = locator.locate_faces(&image)?;
    let Some(first) = locations.first().copied() else {
        tracing::warn!(path = %path.display(), "no face found in the reference image");
        return Ok(Reference { image, encoding: None });
    };

    let encoding = match encoder.encode_faces(&image, &[first]).pop() {
        Some(Ok(enc)) => Some(enc),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "failed to encode reference face");
            None
        }
        None => None,
    };

    Ok(Reference { image, encoding })
}
