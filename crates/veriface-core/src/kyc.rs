//! KYC form verification: OCR the uploaded ID, cross-check user-entered
//! fields against the extracted text, and optionally face-match an ID crop
//! against a selfie.

use crate::backend::{FaceEncoder, FaceLocator, OcrError, TextExtractor};
use crate::types::{FaceEncoding, FaceLocation};
use image::RgbImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The three free-text form fields checked against the document.
#[derive(Debug, Clone)]
pub struct KycFields {
    pub name: String,
    pub dob: String,
    pub id_number: String,
}

pub const MAX_SCORE: u8 = 3;

#[derive(Error, Debug)]
pub enum KycError {
    #[error("could not read uploaded image: {0}")]
    UnreadableImage(String),
    #[error(transparent)]
    Ocr(#[from] OcrError),
    #[error("face match failed: {0}")]
    FaceMatch(String),
}

/// Outcome of a document check, serialized as the user-facing report.
#[derive(Debug, Clone, Serialize)]
pub struct KycReport {
    pub extracted_text: String,
    pub score: u8,
    pub passed: bool,
}

/// Score the fields against the extracted text: one point per field found as
/// a literal substring.
///
/// The name check is case-insensitive; dob and id stay case-sensitive — an
/// inherited asymmetry preserved deliberately. No whitespace or punctuation
/// normalization is applied to either side.
pub fn score(fields: &KycFields, extracted_text: &str) -> u8 {
    let mut total = 0;
    if extracted_text
        .to_lowercase()
        .contains(&fields.name.to_lowercase())
    {
        total += 1;
    }
    if extracted_text.contains(&fields.dob) {
        total += 1;
    }
    if extracted_text.contains(&fields.id_number) {
        total += 1;
    }
    total
}

/// Run the full document check: OCR the ID image, score the fields.
///
/// `passed` requires a full score — anything less surfaces as "some info
/// doesn't match".
pub fn check_document(
    id_image: &Path,
    fields: &KycFields,
    ocr: &dyn TextExtractor,
) -> Result<KycReport, KycError> {
    let extracted_text = ocr.extract_text(id_image)?;
    tracing::debug!(chars = extracted_text.len(), "extracted text from ID image");

    let score = score(fields, &extracted_text);
    Ok(KycReport {
        extracted_text,
        score,
        passed: score == MAX_SCORE,
    })
}

/// Result of the optional ID-face vs. selfie comparison.
#[derive(Debug, Clone, Serialize)]
pub struct Verified {
    pub verified: bool,
    pub distance: f32,
}

/// Stage an uploaded file into local temporary storage, returning the
/// staged path. Mirrors the upload surface: inputs are written to temp
/// files before being handed to the face-match call.
pub fn stage_upload(src: &Path, staged_name: &str) -> Result<PathBuf, KycError> {
    let dest = std::env::temp_dir().join(staged_name);
    std::fs::copy(src, &dest)
        .map_err(|e| KycError::UnreadableImage(format!("{}: {e}", src.display())))?;
    Ok(dest)
}

/// Compare the face in one image against the face in another.
///
/// Detection enforcement is disabled: when no face is cleanly located in an
/// input, the whole image is encoded instead, so the call degrades rather
/// than failing outright. Match semantics are the usual distance-vs-tolerance
/// decision.
pub fn match_faces(
    image_a: &Path,
    image_b: &Path,
    locator: &mut dyn FaceLocator,
    encoder: &mut dyn FaceEncoder,
    tolerance: f32,
) -> Result<Verified, KycError> {
    let a = encode_lenient(image_a, locator, encoder)?;
    let b = encode_lenient(image_b, locator, encoder)?;
    let distance = a.distance(&b);
    tracing::info!(distance, tolerance, "face match computed");
    Ok(Verified {
        verified: distance <= tolerance,
        distance,
    })
}

/// Encode the first face in the image, falling back to the whole image when
/// detection finds nothing (or fails).
fn encode_lenient(
    path: &Path,
    locator: &mut dyn FaceLocator,
    encoder: &mut dyn FaceEncoder,
) -> Result<FaceEncoding, KycError> {
    let image = image::open(path)
        .map_err(|e| KycError::UnreadableImage(format!("{}: {e}", path.display())))?
        .to_rgb8();

    let location = match locator.locate_faces(&image) {
        Ok(locations) if !locations.is_empty() => locations[0],
        Ok(_) => whole_image(&image),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "detection failed, using whole image");
            whole_image(&image)
        }
    };

    match encoder.encode_faces(&image, &[location]).pop() {
        Some(Ok(encoding)) => Ok(encoding),
        Some(Err(e)) => Err(KycError::FaceMatch(e.to_string())),
        None => Err(KycError::FaceMatch("encoder returned no result".into())),
    }
}

fn whole_image(image: &RgbImage) -> FaceLocation {
    FaceLocation {
        top: 0,
        right: image.width(),
        bottom: image.height(),
        left: 0,
    }
}
