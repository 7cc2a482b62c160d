use serde::{Deserialize, Serialize};

/// Face encoding vector (128-dimensional identity features).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceEncoding {
    pub values: Vec<f32>,
}

impl FaceEncoding {
    /// Compute Euclidean distance to another encoding.
    ///
    /// Lower = more similar. Zips dimensions, so mismatched lengths compare
    /// only the common prefix rather than panicking.
    pub fn distance(&self, other: &FaceEncoding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Face rectangle as (top, right, bottom, left) pixel edges.
///
/// Produced by the locator in whatever coordinate space it was given a frame
/// in. When the frame was downscaled first, the location must be mapped back
/// with [`scaled`](Self::scaled) before touching the full-resolution frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceLocation {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceLocation {
    /// Map this location back to full-frame coordinates by multiplying every
    /// edge by `factor` (the downscale factor used during detection).
    pub fn scaled(&self, factor: u32) -> FaceLocation {
        FaceLocation {
            top: self.top * factor,
            right: self.right * factor,
            bottom: self.bottom * factor,
            left: self.left * factor,
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// Result of comparing one probe encoding against the reference.
///
/// `confidence` is a display heuristic, `(1 - distance) * 100`. It is kept
/// unclamped: a distance above 1.0 yields a negative confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub probe_index: usize,
    pub is_match: bool,
    pub distance: f32,
    pub confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_identical() {
        let a = FaceEncoding { values: vec![1.0, 2.0, 3.0] };
        assert!(a.distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_distance_unit_apart() {
        let a = FaceEncoding { values: vec![0.0, 0.0] };
        let b = FaceEncoding { values: vec![3.0, 4.0] };
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_symmetric() {
        let a = FaceEncoding { values: vec![0.1, 0.7, -0.2] };
        let b = FaceEncoding { values: vec![0.4, -0.1, 0.3] };
        assert!((a.distance(&b) - b.distance(&a)).abs() < 1e-6);
    }

    #[test]
    fn test_location_scaled() {
        let loc = FaceLocation { top: 10, right: 40, bottom: 30, left: 20 };
        let full = loc.scaled(4);
        assert_eq!(full, FaceLocation { top: 40, right: 160, bottom: 120, left: 80 });
    }

    #[test]
    fn test_location_dims() {
        let loc = FaceLocation { top: 5, right: 25, bottom: 35, left: 10 };
        assert_eq!(loc.width(), 15);
        assert_eq!(loc.height(), 30);
    }

    #[test]
    fn test_location_degenerate_dims_saturate() {
        let loc = FaceLocation { top: 20, right: 10, bottom: 10, left: 30 };
        assert_eq!(loc.width(), 0);
        assert_eq!(loc.height(), 0);
    }
}
