//! Frame sampler and verification loop.
//!
//! Tight synchronous poll loop: capture a frame, optionally service a pending
//! verification request, present the frame, poll keys. Detection and matching
//! run inline on the same thread, strictly in capture order. Every other
//! frame is process-worthy, bounding CPU cost; a pending request is only
//! serviced on a process-worthy frame (at most one extra frame of latency).

use crate::backend::{ControlSurface, FaceEncoder, FaceLocator, FrameError, FrameSource, Key};
use crate::matcher;
use crate::overlay;
use crate::types::{FaceEncoding, FaceLocation};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Key poll timeout per loop iteration.
const KEY_POLL_TIMEOUT: Duration = Duration::from_millis(1);

#[derive(Error, Debug)]
pub enum LoopError {
    #[error("camera became unavailable: {0}")]
    Device(#[from] FrameError),
}

/// Explicit loop configuration — no globals, no assumed constants.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Match tolerance threshold (lower is stricter).
    pub tolerance: f32,
    /// Linear downscale factor applied to frames before detection, threaded
    /// through to the overlay renderer for the inverse mapping.
    pub downscale: u32,
    /// When set, each attempt that finds faces saves the annotated frame here.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tolerance: matcher::DEFAULT_TOLERANCE,
            downscale: 4,
            snapshot_path: None,
        }
    }
}

/// Verification-request state. At most one outstanding request; requests are
/// never queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyState {
    Idle,
    Pending,
}

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopStats {
    pub frames: u64,
    pub attempts: u64,
    pub matches: u64,
}

/// The webcam verification loop, driven against a fixed reference encoding.
pub struct VerificationLoop<'a, S: FrameSource, C: ControlSurface> {
    config: LoopConfig,
    reference: &'a FaceEncoding,
    source: S,
    surface: C,
    locator: &'a mut dyn FaceLocator,
    encoder: &'a mut dyn FaceEncoder,
}

impl<'a, S: FrameSource, C: ControlSurface> VerificationLoop<'a, S, C> {
    pub fn new(
        config: LoopConfig,
        reference: &'a FaceEncoding,
        source: S,
        surface: C,
        locator: &'a mut dyn FaceLocator,
        encoder: &'a mut dyn FaceEncoder,
    ) -> Self {
        Self { config, reference, source, surface, locator, encoder }
    }

    /// Run until the quit key is seen or the frame source fails.
    ///
    /// Consumes the loop; the frame source (and with it the camera device)
    /// is dropped on every exit path, normal or erroring.
    pub fn run(mut self) -> Result<LoopStats, LoopError> {
        let mut state = VerifyState::Idle;
        let mut process_this_frame = true;
        let mut stats = LoopStats::default();

        loop {
            let mut frame = match self.source.next_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(error = %e, "could not read from camera, stopping");
                    return Err(LoopError::Device(e));
                }
            };
            stats.frames += 1;

            if process_this_frame && state == VerifyState::Pending {
                // One attempt per request. The state clears no matter what
                // happens inside the attempt, so a bad frame can never leave
                // the loop stuck in Pending.
                self.attempt(&mut frame, &mut stats);
                state = VerifyState::Idle;
            }
            process_this_frame = !process_this_frame;

            self.surface.show(&frame);

            match self.surface.poll_key(KEY_POLL_TIMEOUT) {
                Some(Key::Quit) => break,
                Some(Key::Verify) => state = VerifyState::Pending,
                None => {}
            }
        }

        tracing::info!(
            frames = stats.frames,
            attempts = stats.attempts,
            matches = stats.matches,
            "verification loop finished"
        );
        Ok(stats)
    }

    /// One verification attempt against the current frame.
    ///
    /// Internal failures are logged and degrade to "no result this frame";
    /// they never propagate.
    fn attempt(&mut self, frame: &mut RgbImage, stats: &mut LoopStats) {
        stats.attempts += 1;

        let downscale = self.config.downscale.max(1);
        let small = imageops::resize(
            frame,
            (frame.width() / downscale).max(1),
            (frame.height() / downscale).max(1),
            FilterType::Nearest,
        );

        let locations = match self.locator.locate_faces(&small) {
            Ok(locations) => locations,
            Err(e) => {
                tracing::warn!(error = %e, "face location failed for this frame");
                return;
            }
        };
        if locations.is_empty() {
            tracing::info!("no faces detected in the current frame");
            return;
        }

        // Per-face encoding results; failures are counted and excluded
        // rather than aborting the attempt.
        let mut probes: Vec<FaceEncoding> = Vec::new();
        let mut probe_locations: Vec<FaceLocation> = Vec::new();
        let mut encode_failures = 0usize;
        for (location, encoded) in locations
            .iter()
            .zip(self.encoder.encode_faces(&small, &locations))
        {
            match encoded {
                Ok(encoding) => {
                    probes.push(encoding);
                    probe_locations.push(*location);
                }
                Err(e) => {
                    encode_failures += 1;
                    tracing::warn!(error = %e, "failed to encode a face, skipping it");
                }
            }
        }
        if probes.is_empty() {
            tracing::info!(faces = locations.len(), encode_failures, "no usable encodings this frame");
            return;
        }

        let results = matcher::match_probes(self.reference, &probes, self.config.tolerance);
        if let Some(report) = matcher::select_report(&results) {
            if report.is_match {
                stats.matches += 1;
                tracing::info!(confidence = report.confidence, "match found");
            } else {
                tracing::info!(best_confidence = report.confidence, "no match found");
            }
        }

        let overlays: Vec<(FaceLocation, bool)> = probe_locations
            .iter()
            .zip(results.iter())
            .map(|(location, result)| (*location, result.is_match))
            .collect();
        overlay::draw_overlays(frame, &overlays, downscale);

        if let Some(path) = &self.config.snapshot_path {
            if let Err(e) = frame.save(path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to save snapshot");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{EncoderError, LocatorError};
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Frame source that hands out blank frames, optionally failing after a
    /// set number of reads, and records when it is dropped.
    struct ScriptSource {
        fail_after: Option<u64>,
        reads: u64,
        released: Rc<Cell<bool>>,
    }

    impl ScriptSource {
        fn new(fail_after: Option<u64>) -> (Self, Rc<Cell<bool>>) {
            let released = Rc::new(Cell::new(false));
            (
                Self { fail_after, reads: 0, released: released.clone() },
                released,
            )
        }
    }

    impl Drop for ScriptSource {
        fn drop(&mut self) {
            self.released.set(true);
        }
    }

    impl FrameSource for ScriptSource {
        fn next_frame(&mut self) -> Result<RgbImage, FrameError> {
            if let Some(limit) = self.fail_after {
                if self.reads >= limit {
                    return Err(FrameError::Capture("simulated read failure".into()));
                }
            }
            self.reads += 1;
            Ok(RgbImage::new(16, 16))
        }
    }

    /// Surface that replays a fixed key script, then quits.
    struct ScriptSurface {
        keys: VecDeque<Option<Key>>,
    }

    impl ScriptSurface {
        fn new(keys: &[Option<Key>]) -> Self {
            Self { keys: keys.iter().copied().collect() }
        }
    }

    impl ControlSurface for ScriptSurface {
        fn show(&mut self, _frame: &RgbImage) {}
        fn poll_key(&mut self, _timeout: Duration) -> Option<Key> {
            self.keys.pop_front().unwrap_or(Some(Key::Quit))
        }
    }

    struct StubLocator {
        result: fn() -> Result<Vec<FaceLocation>, LocatorError>,
        calls: u64,
    }

    impl FaceLocator for StubLocator {
        fn locate_faces(&mut self, _image: &RgbImage) -> Result<Vec<FaceLocation>, LocatorError> {
            self.calls += 1;
            (self.result)()
        }
    }

    struct StubEncoder {
        encoding: Option<FaceEncoding>,
    }

    impl FaceEncoder for StubEncoder {
        fn encode_faces(
            &mut self,
            _image: &RgbImage,
            locations: &[FaceLocation],
        ) -> Vec<Result<FaceEncoding, EncoderError>> {
            locations
                .iter()
                .map(|_| self.encoding.clone().ok_or(EncoderError::EmptyCrop))
                .collect()
        }
    }

    fn one_face() -> Result<Vec<FaceLocation>, LocatorError> {
        Ok(vec![FaceLocation { top: 0, right: 4, bottom: 4, left: 0 }])
    }

    fn no_faces() -> Result<Vec<FaceLocation>, LocatorError> {
        Ok(Vec::new())
    }

    fn locator_error() -> Result<Vec<FaceLocation>, LocatorError> {
        Err(LocatorError::InferenceFailed("simulated".into()))
    }

    fn reference() -> FaceEncoding {
        FaceEncoding { values: vec![0.0, 0.0] }
    }

    #[test]
    fn test_pending_clears_after_erroring_attempt() {
        let (source, released) = ScriptSource::new(None);
        // iter 1: verify pressed, iter 2: odd frame (not serviced),
        // iter 3: attempt runs and errors, iter 4: quit.
        let surface = ScriptSurface::new(&[Some(Key::Verify), None, None, Some(Key::Quit)]);
        let mut locator = StubLocator { result: locator_error, calls: 0 };
        let mut encoder = StubEncoder { encoding: None };
        let reference = reference();

        let stats = VerificationLoop::new(
            LoopConfig::default(),
            &reference,
            source,
            surface,
            &mut locator,
            &mut encoder,
        )
        .run()
        .unwrap();

        assert_eq!(stats.attempts, 1, "one attempt serviced the request");
        assert_eq!(stats.matches, 0);
        assert_eq!(locator.calls, 1, "attempt ran exactly once despite the error");
        assert!(released.get(), "camera released after normal quit");
    }

    #[test]
    fn test_request_only_serviced_on_process_worthy_frame() {
        let (source, _released) = ScriptSource::new(None);
        // Frames alternate worthy/unworthy. The request raised after frame 1
        // cannot run on frame 2 (unworthy) and is serviced on frame 3.
        let surface = ScriptSurface::new(&[Some(Key::Verify), None, None, Some(Key::Quit)]);
        let mut locator = StubLocator { result: no_faces, calls: 0 };
        let mut encoder = StubEncoder { encoding: None };
        let reference = reference();

        let stats = VerificationLoop::new(
            LoopConfig::default(),
            &reference,
            source,
            surface,
            &mut locator,
            &mut encoder,
        )
        .run()
        .unwrap();

        assert_eq!(stats.frames, 4);
        assert_eq!(stats.attempts, 1);
        assert_eq!(locator.calls, 1);
    }

    #[test]
    fn test_repeated_verify_presses_do_not_queue() {
        let (source, _released) = ScriptSource::new(None);
        // Two verify presses before the request is serviced: still one attempt.
        let surface = ScriptSurface::new(&[
            Some(Key::Verify),
            Some(Key::Verify),
            None,
            Some(Key::Quit),
        ]);
        let mut locator = StubLocator { result: no_faces, calls: 0 };
        let mut encoder = StubEncoder { encoding: None };
        let reference = reference();

        let stats = VerificationLoop::new(
            LoopConfig::default(),
            &reference,
            source,
            surface,
            &mut locator,
            &mut encoder,
        )
        .run()
        .unwrap();

        assert_eq!(stats.attempts, 1);
    }

    #[test]
    fn test_match_counted_and_overlay_drawn() {
        let (source, _released) = ScriptSource::new(None);
        let surface = ScriptSurface::new(&[Some(Key::Verify), None, None, Some(Key::Quit)]);
        let mut locator = StubLocator { result: one_face, calls: 0 };
        // Probe identical to the reference: distance 0, guaranteed match.
        let mut encoder = StubEncoder { encoding: Some(reference()) };
        let reference = reference();

        let stats = VerificationLoop::new(
            LoopConfig::default(),
            &reference,
            source,
            surface,
            &mut locator,
            &mut encoder,
        )
        .run()
        .unwrap();

        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.matches, 1);
    }

    #[test]
    fn test_encode_failure_degrades_to_no_result() {
        let (source, _released) = ScriptSource::new(None);
        let surface = ScriptSurface::new(&[Some(Key::Verify), None, None, Some(Key::Quit)]);
        let mut locator = StubLocator { result: one_face, calls: 0 };
        let mut encoder = StubEncoder { encoding: None };
        let reference = reference();

        let stats = VerificationLoop::new(
            LoopConfig::default(),
            &reference,
            source,
            surface,
            &mut locator,
            &mut encoder,
        )
        .run()
        .unwrap();

        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.matches, 0);
    }

    #[test]
    fn test_read_failure_exits_and_releases_camera() {
        let (source, released) = ScriptSource::new(Some(2));
        let surface = ScriptSurface::new(&[None, None, None, None]);
        let mut locator = StubLocator { result: no_faces, calls: 0 };
        let mut encoder = StubEncoder { encoding: None };
        let reference = reference();

        let result = VerificationLoop::new(
            LoopConfig::default(),
            &reference,
            source,
            surface,
            &mut locator,
            &mut encoder,
        )
        .run();

        assert!(matches!(result, Err(LoopError::Device(_))));
        assert!(released.get(), "camera released after a simulated read failure");
    }

    #[test]
    fn test_quit_is_the_only_exit_without_failure() {
        let (source, released) = ScriptSource::new(None);
        let surface = ScriptSurface::new(&[None, None, Some(Key::Quit)]);
        let mut locator = StubLocator { result: no_faces, calls: 0 };
        let mut encoder = StubEncoder { encoding: None };
        let reference = reference();

        let stats = VerificationLoop::new(
            LoopConfig::default(),
            &reference,
            source,
            surface,
            &mut locator,
            &mut encoder,
        )
        .run()
        .unwrap();

        assert_eq!(stats.frames, 3);
        assert_eq!(stats.attempts, 0);
        assert!(released.get());
    }
}
