//! veriface-core — identity-verification demo engine.
//!
//! Face-match decision policy (threshold over encoding distances), the
//! frame-sampling verification loop, overlay rendering, reference loading,
//! and the KYC form-verification flow. Face location, encoding, and OCR are
//! external collaborators behind the traits in [`backend`], with ONNX and
//! Tesseract implementations in [`onnx`] and [`ocr`].

pub mod backend;
pub mod kyc;
pub mod matcher;
pub mod ocr;
pub mod onnx;
pub mod overlay;
pub mod reference;
pub mod sampler;
pub mod types;

pub use backend::{ControlSurface, FaceEncoder, FaceLocator, FrameSource, Key, TextExtractor};
pub use types::{FaceEncoding, FaceLocation, MatchResult};
