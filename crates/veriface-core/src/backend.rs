//! Seams to the external collaborators: face location and encoding, OCR,
//! frame capture, and the interactive control surface.
//!
//! The verification loop and the KYC flow only ever talk to these traits, so
//! tests can substitute scripted implementations.

use crate::types::{FaceEncoding, FaceLocation};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("model file not found: {0}")]
    ModelNotFound(PathBuf),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("model file not found: {0}")]
    ModelNotFound(PathBuf),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face region is empty after clipping to the frame")]
    EmptyCrop,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("unreadable image: {0}")]
    UnreadableImage(String),
    #[error("OCR service failed: {0}")]
    ServiceFailed(String),
}

/// Failure reading the next frame from a capture source.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("capture failed: {0}")]
    Capture(String),
}

/// Locates face regions in an RGB image.
pub trait FaceLocator {
    fn locate_faces(&mut self, image: &RgbImage) -> Result<Vec<FaceLocation>, LocatorError>;
}

/// Produces one encoding per requested face region.
///
/// Returns a per-region result rather than failing the whole call: a frame
/// with one bad crop still yields encodings for the others.
pub trait FaceEncoder {
    fn encode_faces(
        &mut self,
        image: &RgbImage,
        locations: &[FaceLocation],
    ) -> Vec<Result<FaceEncoding, EncoderError>>;
}

/// Extracts text from an image on disk.
pub trait TextExtractor {
    fn extract_text(&self, image: &Path) -> Result<String, OcrError>;
}

/// Blocking source of RGB frames (a camera, or a scripted test double).
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<RgbImage, FrameError>;
}

/// Single-character commands read from the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Quit,
    Verify,
}

/// Display/input surface the loop presents frames to and polls keys from.
pub trait ControlSurface {
    /// Present the (possibly annotated) full-resolution frame.
    fn show(&mut self, frame: &RgbImage);

    /// Poll for a command, waiting at most `timeout`.
    fn poll_key(&mut self, timeout: Duration) -> Option<Key>;
}
