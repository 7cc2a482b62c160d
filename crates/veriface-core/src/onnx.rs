//! ONNX-backed face locator and encoder.
//!
//! The locator runs a single-stage RGB detector (UltraFace-style export with
//! `scores [1,N,2]` and normalized corner-form `boxes [1,N,4]` outputs). The
//! encoder crops each located face, resizes it to a canonical square, and
//! extracts a 128-dimensional L2-normalized encoding.

use crate::backend::{EncoderError, FaceEncoder, FaceLocator, LocatorError};
use crate::types::{FaceEncoding, FaceLocation};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const DETECT_INPUT_WIDTH: u32 = 320;
const DETECT_INPUT_HEIGHT: u32 = 240;
const DETECT_MEAN: f32 = 127.0;
const DETECT_SCALE: f32 = 128.0;
const DETECT_SCORE_THRESHOLD: f32 = 0.7;
const DETECT_NMS_IOU: f32 = 0.3;

const ENCODE_INPUT_SIZE: u32 = 112;
const ENCODE_MEAN: f32 = 127.5;
const ENCODE_STD: f32 = 127.5;
const ENCODING_DIM: usize = 128;

/// A detection before NMS, in original-image pixel coordinates.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: f32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

/// Single-stage ONNX face locator.
pub struct OnnxFaceLocator {
    session: Session,
    score_idx: usize,
    box_idx: usize,
}

impl OnnxFaceLocator {
    /// Load the detection model. Fails fast if the file is missing.
    pub fn load(model_path: &Path) -> Result<Self, LocatorError> {
        if !model_path.exists() {
            return Err(LocatorError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?names,
            "loaded face locator model"
        );

        let (score_idx, box_idx) = locator_output_indices(&names)?;

        Ok(Self { session, score_idx, box_idx })
    }
}

impl FaceLocator for OnnxFaceLocator {
    fn locate_faces(&mut self, image: &RgbImage) -> Result<Vec<FaceLocation>, LocatorError> {
        let (orig_w, orig_h) = (image.width(), image.height());
        if orig_w == 0 || orig_h == 0 {
            return Ok(Vec::new());
        }

        let resized = imageops::resize(image, DETECT_INPUT_WIDTH, DETECT_INPUT_HEIGHT, FilterType::Triangle);
        let input = rgb_tensor(&resized, DETECT_MEAN, DETECT_SCALE);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, scores) = outputs[self.score_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| LocatorError::InferenceFailed(format!("scores: {e}")))?;
        let (_, boxes) = outputs[self.box_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| LocatorError::InferenceFailed(format!("boxes: {e}")))?;

        // scores are [background, face] pairs; boxes are normalized corners.
        let num = scores.len() / 2;
        let mut candidates = Vec::new();
        for i in 0..num {
            let score = scores[i * 2 + 1];
            if score <= DETECT_SCORE_THRESHOLD {
                continue;
            }
            let off = i * 4;
            if off + 3 >= boxes.len() {
                break;
            }
            candidates.push(Candidate {
                score,
                x1: boxes[off] * orig_w as f32,
                y1: boxes[off + 1] * orig_h as f32,
                x2: boxes[off + 2] * orig_w as f32,
                y2: boxes[off + 3] * orig_h as f32,
            });
        }

        let kept = nms(candidates, DETECT_NMS_IOU);
        Ok(kept
            .into_iter()
            .filter_map(|c| clamp_to_frame(&c, orig_w, orig_h))
            .collect())
    }
}

/// ONNX face encoder producing 128-dim encodings from face crops.
pub struct OnnxFaceEncoder {
    session: Session,
}

impl OnnxFaceEncoder {
    /// Load the encoding model. Fails fast if the file is missing.
    pub fn load(model_path: &Path) -> Result<Self, EncoderError> {
        if !model_path.exists() {
            return Err(EncoderError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face encoder model"
        );
        Ok(Self { session })
    }

    fn encode_one(
        &mut self,
        image: &RgbImage,
        location: &FaceLocation,
    ) -> Result<FaceEncoding, EncoderError> {
        let x = location.left.min(image.width());
        let y = location.top.min(image.height());
        let w = location.right.min(image.width()).saturating_sub(x);
        let h = location.bottom.min(image.height()).saturating_sub(y);
        if w == 0 || h == 0 {
            return Err(EncoderError::EmptyCrop);
        }

        let crop = imageops::crop_imm(image, x, y, w, h).to_image();
        let resized = imageops::resize(&crop, ENCODE_INPUT_SIZE, ENCODE_INPUT_SIZE, FilterType::Triangle);
        let input = rgb_tensor(&resized, ENCODE_MEAN, ENCODE_STD);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EncoderError::InferenceFailed(format!("encoding extraction: {e}")))?;

        if raw.len() != ENCODING_DIM {
            return Err(EncoderError::InferenceFailed(format!(
                "expected {ENCODING_DIM}-dim encoding, got {}",
                raw.len()
            )));
        }

        Ok(FaceEncoding { values: l2_normalize(raw) })
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn encode_faces(
        &mut self,
        image: &RgbImage,
        locations: &[FaceLocation],
    ) -> Vec<Result<FaceEncoding, EncoderError>> {
        locations.iter().map(|loc| self.encode_one(image, loc)).collect()
    }
}

/// Resolve the (scores, boxes) output indices for the detection model.
///
/// Exports name the outputs "scores" / "boxes"; fall back to the
/// conventional positional ordering when the names differ. A model with
/// fewer than two outputs cannot be this detector and is rejected at load
/// time rather than panicking on the first inference.
fn locator_output_indices(names: &[String]) -> Result<(usize, usize), LocatorError> {
    if names.len() < 2 {
        return Err(LocatorError::InferenceFailed(format!(
            "detection model requires 2 outputs (scores, boxes), got {}",
            names.len()
        )));
    }
    let score_idx = names.iter().position(|n| n == "scores").unwrap_or(0);
    let box_idx = names.iter().position(|n| n == "boxes").unwrap_or(1);
    Ok((score_idx, box_idx))
}

/// Pack an RGB image into a NCHW float tensor, normalizing each channel
/// as `(pixel - mean) / scale`.
fn rgb_tensor(image: &RgbImage, mean: f32, scale: f32) -> Array4<f32> {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let mut tensor = Array4::<f32>::zeros((1, 3, h, w));
    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel.0[c] as f32 - mean) / scale;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}

/// Convert a candidate to an integer pixel rectangle, clipped to the frame.
/// Returns `None` when nothing of the box survives clipping.
fn clamp_to_frame(c: &Candidate, width: u32, height: u32) -> Option<FaceLocation> {
    let left = c.x1.max(0.0).min(width as f32) as u32;
    let top = c.y1.max(0.0).min(height as f32) as u32;
    let right = c.x2.max(0.0).min(width as f32) as u32;
    let bottom = c.y2.max(0.0).min(height as f32) as u32;
    if right <= left || bottom <= top {
        return None;
    }
    Some(FaceLocation { top, right, bottom, left })
}

/// Greedy NMS: keep the highest-scoring candidate, drop overlaps above the
/// IoU threshold, repeat.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Candidate> = Vec::new();
    for c in candidates {
        if keep.iter().all(|k| iou(k, &c) <= iou_threshold) {
            keep.push(c);
        }
    }
    keep
}

fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union = area_a + area_b - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn cand(score: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Candidate {
        Candidate { score, x1, y1, x2, y2 }
    }

    #[test]
    fn test_iou_identical() {
        let a = cand(1.0, 0.0, 0.0, 10.0, 10.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = cand(1.0, 0.0, 0.0, 10.0, 10.0);
        let b = cand(1.0, 20.0, 20.0, 30.0, 30.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = cand(1.0, 0.0, 0.0, 10.0, 10.0);
        let b = cand(1.0, 5.0, 0.0, 15.0, 10.0);
        // intersection 50, union 150
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_highest_drops_overlap() {
        let candidates = vec![
            cand(0.8, 2.0, 2.0, 102.0, 102.0),
            cand(0.9, 0.0, 0.0, 100.0, 100.0),
            cand(0.7, 200.0, 200.0, 250.0, 250.0),
        ];
        let kept = nms(candidates, 0.3);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].score - 0.9).abs() < 1e-6);
        assert!((kept[1].score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(Vec::new(), 0.3).is_empty());
    }

    #[test]
    fn test_clamp_to_frame_clips_and_rejects() {
        let inside = cand(0.9, 10.0, 20.0, 50.0, 60.0);
        let loc = clamp_to_frame(&inside, 100, 100).unwrap();
        assert_eq!(loc, FaceLocation { top: 20, right: 50, bottom: 60, left: 10 });

        let oversize = cand(0.9, -10.0, -10.0, 500.0, 500.0);
        let loc = clamp_to_frame(&oversize, 100, 80).unwrap();
        assert_eq!(loc, FaceLocation { top: 0, right: 100, bottom: 80, left: 0 });

        let outside = cand(0.9, 150.0, 150.0, 200.0, 200.0);
        assert!(clamp_to_frame(&outside, 100, 100).is_none());
    }

    #[test]
    fn test_locator_output_indices_named() {
        let names: Vec<String> = ["boxes", "scores"].iter().map(|s| s.to_string()).collect();
        assert_eq!(locator_output_indices(&names).unwrap(), (1, 0));
    }

    #[test]
    fn test_locator_output_indices_positional_fallback() {
        let names: Vec<String> = ["492", "493"].iter().map(|s| s.to_string()).collect();
        assert_eq!(locator_output_indices(&names).unwrap(), (0, 1));
    }

    #[test]
    fn test_locator_output_indices_rejects_single_output() {
        let names = vec!["embedding".to_string()];
        let err = locator_output_indices(&names).unwrap_err();
        assert!(matches!(err, LocatorError::InferenceFailed(_)));
    }

    #[test]
    fn test_rgb_tensor_shape_and_normalization() {
        let mut img = RgbImage::new(4, 2);
        img.put_pixel(0, 0, Rgb([127, 0, 255]));
        let t = rgb_tensor(&img, 127.0, 128.0);
        assert_eq!(t.shape(), &[1, 3, 2, 4]);
        assert!((t[[0, 0, 0, 0]] - 0.0).abs() < 1e-6);
        assert!((t[[0, 1, 0, 0]] - (-127.0 / 128.0)).abs() < 1e-6);
        assert!((t[[0, 2, 0, 0]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_unit_norm() {
        let v = l2_normalize(&[3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector_unchanged() {
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
