//! Blink liveness capture.
//!
//! A session watches the mean eye aspect ratio (EAR) frame by frame and
//! captures exactly one "blinked" frame (first EAR below the closed
//! threshold) and one "unblinked" frame (first EAR above the open threshold
//! after that). The open threshold sits well above the closed one so that
//! an EAR hovering near a single boundary cannot fire both events.
//!
//! Per observation, in order:
//!
//! 1. anything other than exactly one face skips the frame;
//! 2. while the spectacle grace period runs, only the spectacle scorer is
//!    evaluated, so the caller can prompt the subject to remove them;
//! 3. otherwise the EAR drives the capture flags.
//!
//! Interactive sessions end after one capture cycle. Batch sessions reset
//! their flags and keep capturing cycles until the frames run out.
//!
//! All mutable state lives in [`BlinkSessionState`], owned by the caller
//! and passed to [`BlinkDetector::step`]; the detector itself is immutable.

use std::time::Instant;

use serde::Serialize;

use crate::config::{BlinkConfig, CaptureMode, ConfigError};
use crate::frame::Frame;
use crate::landmarks::{GeometryError, LandmarkSet};
use crate::provider::{LandmarkProvider, ProviderError};
use crate::spectacles::{SpectacleScore, SpectacleScorer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlinkPhase {
    /// Spectacle grace period; blink tracking is on hold.
    OpenWaiting,
    /// Waiting for the eyes to close.
    Capturing,
    /// Blinked frame captured, waiting for the eyes to reopen.
    BlinkedCaptured,
    /// Interactive cycle finished; the session accepts no more frames.
    Completed,
}

/// Mutable per-session state. Never shared between sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct BlinkSessionState {
    pub phase: BlinkPhase,
    pub blinking: bool,
    pub blinked_saved: bool,
    pub unblinked_saved: bool,
    pub spectacle_grace_deadline: Option<Instant>,
    pub cycles_completed: usize,
}

impl BlinkSessionState {
    pub fn new(config: &BlinkConfig, started_at: Instant) -> Self {
        let deadline = config.grace_period.map(|grace| started_at + grace);
        Self {
            phase: if deadline.is_some() {
                BlinkPhase::OpenWaiting
            } else {
                BlinkPhase::Capturing
            },
            blinking: false,
            blinked_saved: false,
            unblinked_saved: false,
            spectacle_grace_deadline: deadline,
            cycles_completed: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase == BlinkPhase::Completed
    }

    fn reset_cycle(&mut self) {
        self.blinking = false;
        self.blinked_saved = false;
        self.unblinked_saved = false;
        self.phase = BlinkPhase::Capturing;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    Blinked,
    Unblinked,
}

/// A frame selected as a reference capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CaptureEvent {
    pub kind: CaptureKind,
    /// Position of the originating frame in the session's frame sequence.
    pub frame_index: usize,
    /// The EAR that triggered the capture.
    pub ear: f32,
}

/// One frame as seen by the state machine.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub frame_index: usize,
    pub frame: &'a Frame,
    /// Every face the landmark provider found in `frame`.
    pub faces: &'a [LandmarkSet],
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    NoFace,
    MultipleFaces(usize),
    /// Grace period still running; spectacle evidence for the prompt.
    GracePeriod { spectacles: SpectacleScore },
    /// EAR could not be computed for this frame.
    Unevaluable(GeometryError),
    Tracking {
        ear: f32,
        event: Option<CaptureEvent>,
    },
    /// The session already finished its capture cycle.
    Completed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub frame_index: usize,
    /// Advisory: the frame is over-exposed and the subject should move.
    pub too_bright: bool,
    pub outcome: StepOutcome,
}

impl Step {
    pub fn event(&self) -> Option<&CaptureEvent> {
        match &self.outcome {
            StepOutcome::Tracking { event, .. } => event.as_ref(),
            _ => None,
        }
    }
}

/// Capture events of one batch run, in frame order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Classification {
    pub blinked: Vec<CaptureEvent>,
    pub unblinked: Vec<CaptureEvent>,
    pub frames_seen: usize,
    pub frames_skipped: usize,
}

impl Classification {
    fn record(&mut self, step: &Step) {
        self.frames_seen += 1;
        if !matches!(step.outcome, StepOutcome::Tracking { .. }) {
            self.frames_skipped += 1;
        }
        if let Some(event) = step.event() {
            match event.kind {
                CaptureKind::Blinked => self.blinked.push(*event),
                CaptureKind::Unblinked => self.unblinked.push(*event),
            }
        }
    }

    pub fn cycles(&self) -> usize {
        self.unblinked.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BlinkDetector {
    config: BlinkConfig,
    spectacles: SpectacleScorer,
}

impl BlinkDetector {
    pub fn new(config: BlinkConfig, spectacles: SpectacleScorer) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, spectacles })
    }

    pub fn config(&self) -> &BlinkConfig {
        &self.config
    }

    pub fn start_session(&self, now: Instant) -> BlinkSessionState {
        BlinkSessionState::new(&self.config, now)
    }

    /// Advance `state` by one observation.
    pub fn step(
        &self,
        state: &mut BlinkSessionState,
        obs: &Observation<'_>,
        now: Instant,
    ) -> Step {
        let skip = |outcome| Step {
            frame_index: obs.frame_index,
            too_bright: false,
            outcome,
        };

        if state.is_complete() {
            return skip(StepOutcome::Completed);
        }

        let landmarks = match obs.faces {
            [] => return skip(StepOutcome::NoFace),
            [face] => face,
            faces => {
                tracing::debug!(
                    frame = obs.frame_index,
                    faces = faces.len(),
                    "multiple faces, frame skipped"
                );
                return skip(StepOutcome::MultipleFaces(faces.len()));
            }
        };

        let brightness = obs.frame.mean_brightness();
        let too_bright = brightness > self.config.brightness_limit;
        if too_bright {
            tracing::debug!(frame = obs.frame_index, brightness, "frame over-exposed");
        }

        if state.phase == BlinkPhase::OpenWaiting {
            if let Some(spectacles) = self.grace_check(state, obs, landmarks, now) {
                return Step {
                    frame_index: obs.frame_index,
                    too_bright,
                    outcome: StepOutcome::GracePeriod { spectacles },
                };
            }
        }

        let ear = match landmarks.mean_ear() {
            Ok(ear) => ear,
            Err(e) => {
                if e.is_soft() {
                    tracing::debug!(frame = obs.frame_index, error = %e, "EAR unavailable");
                } else {
                    tracing::warn!(
                        frame = obs.frame_index,
                        error = %e,
                        "EAR unavailable: landmark set does not match the face mesh"
                    );
                }
                return Step {
                    frame_index: obs.frame_index,
                    too_bright,
                    outcome: StepOutcome::Unevaluable(e),
                };
            }
        };

        let event = self.advance(state, obs.frame_index, ear);

        Step {
            frame_index: obs.frame_index,
            too_bright,
            outcome: StepOutcome::Tracking { ear, event },
        }
    }

    /// Returns the spectacle score while the grace period holds, `None`
    /// once it has ended (moving the session on to capturing).
    fn grace_check(
        &self,
        state: &mut BlinkSessionState,
        obs: &Observation<'_>,
        landmarks: &LandmarkSet,
        now: Instant,
    ) -> Option<SpectacleScore> {
        let (spectacles, confirmed_clear) = match self.spectacles.evaluate(obs.frame, landmarks) {
            Ok(score) => (score, !score.detected),
            Err(e) => {
                tracing::debug!(
                    frame = obs.frame_index,
                    error = %e,
                    "spectacle check skipped during grace period"
                );
                (SpectacleScore::undetermined(), false)
            }
        };

        let expired = state.spectacle_grace_deadline.map_or(true, |deadline| now >= deadline);
        if expired || (self.config.end_grace_when_clear && confirmed_clear) {
            tracing::info!(
                frame = obs.frame_index,
                expired,
                confirmed_clear,
                "grace period over, capturing"
            );
            state.spectacle_grace_deadline = None;
            state.phase = BlinkPhase::Capturing;
            None
        } else {
            Some(spectacles)
        }
    }

    fn advance(
        &self,
        state: &mut BlinkSessionState,
        frame_index: usize,
        ear: f32,
    ) -> Option<CaptureEvent> {
        let mut event = None;

        if ear < self.config.closed_threshold && !state.blinking && !state.blinked_saved {
            state.blinking = true;
            state.blinked_saved = true;
            state.phase = BlinkPhase::BlinkedCaptured;
            tracing::info!(frame = frame_index, ear, "blinked frame captured");
            event = Some(CaptureEvent {
                kind: CaptureKind::Blinked,
                frame_index,
                ear,
            });
        } else if ear > self.config.open_threshold && state.blinking && !state.unblinked_saved {
            state.blinking = false;
            state.unblinked_saved = true;
            tracing::info!(frame = frame_index, ear, "unblinked frame captured");
            event = Some(CaptureEvent {
                kind: CaptureKind::Unblinked,
                frame_index,
                ear,
            });
        }

        if state.blinked_saved && state.unblinked_saved {
            state.cycles_completed += 1;
            match self.config.mode {
                CaptureMode::Interactive => {
                    state.phase = BlinkPhase::Completed;
                    tracing::info!(
                        cycles = state.cycles_completed,
                        "capture cycle complete, session finished"
                    );
                }
                CaptureMode::Batch => {
                    state.reset_cycle();
                    tracing::debug!(
                        cycles = state.cycles_completed,
                        "capture cycle complete, resetting"
                    );
                }
            }
        }

        event
    }

    /// Run a fresh session over pre-detected observations.
    pub fn classify<'a, I>(&self, observations: I) -> Classification
    where
        I: IntoIterator<Item = Observation<'a>>,
    {
        let mut state = self.start_session(Instant::now());
        let mut result = Classification::default();
        for obs in observations {
            let step = self.step(&mut state, &obs, Instant::now());
            result.record(&step);
            if state.is_complete() {
                break;
            }
        }
        result
    }

    /// Run a fresh session over raw frames, detecting landmarks with `provider`.
    ///
    /// A frame the provider fails on is skipped; an unavailable provider
    /// aborts the run.
    pub fn classify_frames<P>(
        &self,
        provider: &mut P,
        frames: &[Frame],
    ) -> Result<Classification, ProviderError>
    where
        P: LandmarkProvider + ?Sized,
    {
        let mut state = self.start_session(Instant::now());
        let mut result = Classification::default();

        for (frame_index, frame) in frames.iter().enumerate() {
            let faces = match provider.detect(frame) {
                Ok(faces) => faces,
                Err(e @ ProviderError::Unavailable(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        frame = frame_index,
                        error = %e,
                        "landmark detection failed, frame skipped"
                    );
                    result.frames_seen += 1;
                    result.frames_skipped += 1;
                    continue;
                }
            };
            let obs = Observation {
                frame_index,
                frame,
                faces: &faces,
            };
            let step = self.step(&mut state, &obs, Instant::now());
            result.record(&step);
            if state.is_complete() {
                break;
            }
        }

        tracing::info!(
            frames = frames.len(),
            blinked = result.blinked.len(),
            unblinked = result.unblinked.len(),
            "classification complete"
        );
        Ok(result)
    }
}

impl Default for BlinkDetector {
    fn default() -> Self {
        Self {
            config: BlinkConfig::default(),
            spectacles: SpectacleScorer::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{indices, Point};
    use std::collections::VecDeque;
    use std::time::Duration;

    fn face_with_ear(ear: f32) -> LandmarkSet {
        let mut points = vec![Point::new(0.5, 0.5); 468];
        for (eye, cx) in [(indices::LEFT_EYE, 0.375_f32), (indices::RIGHT_EYE, 0.625)] {
            let (w, gap) = (0.125_f32, ear * 0.125);
            let xs = [-w / 2.0, -w / 6.0, w / 6.0, w / 2.0, w / 6.0, -w / 6.0];
            let ys = [0.0, -gap / 2.0, -gap / 2.0, 0.0, gap / 2.0, gap / 2.0];
            for (k, &i) in eye.iter().enumerate() {
                points[i] = Point::new(cx + xs[k], 0.375 + ys[k]);
            }
        }
        LandmarkSet::new(points)
    }

    fn frame(level: u8) -> Frame {
        Frame::from_bgr(64, 48, vec![level; 64 * 48 * 3]).unwrap()
    }

    fn batch() -> BlinkDetector {
        BlinkDetector::new(BlinkConfig::batch(), SpectacleScorer::default()).unwrap()
    }

    fn interactive(end_grace_when_clear: bool) -> BlinkDetector {
        let config = BlinkConfig {
            end_grace_when_clear,
            ..BlinkConfig::interactive()
        };
        BlinkDetector::new(config, SpectacleScorer::default()).unwrap()
    }

    /// Classify a list of per-frame EARs, one face per frame.
    fn classify_ears(detector: &BlinkDetector, ears: &[f32]) -> Classification {
        let dark = frame(0);
        let faces: Vec<Vec<LandmarkSet>> = ears.iter().map(|&e| vec![face_with_ear(e)]).collect();
        let observations = faces
            .iter()
            .enumerate()
            .map(|(frame_index, faces)| Observation {
                frame_index,
                frame: &dark,
                faces,
            });
        detector.classify(observations)
    }

    fn indices_of(events: &[CaptureEvent]) -> Vec<usize> {
        events.iter().map(|e| e.frame_index).collect()
    }

    #[test]
    fn test_single_blink_sequence() {
        let ears = [0.40, 0.40, 0.40, 0.15, 0.15, 0.40, 0.40, 0.40];
        let result = classify_ears(&batch(), &ears);
        assert_eq!(indices_of(&result.blinked), vec![3]);
        assert_eq!(indices_of(&result.unblinked), vec![5]);
        assert!((result.blinked[0].ear - 0.15).abs() < 1e-5);
        assert!((result.unblinked[0].ear - 0.40).abs() < 1e-5);
        assert_eq!(result.frames_seen, 8);
        assert_eq!(result.frames_skipped, 0);
    }

    #[test]
    fn test_two_cycles_in_batch() {
        let ears = [0.40, 0.15, 0.10, 0.40, 0.40, 0.20, 0.42, 0.40];
        let result = classify_ears(&batch(), &ears);
        assert_eq!(indices_of(&result.blinked), vec![1, 5]);
        assert_eq!(indices_of(&result.unblinked), vec![3, 6]);
        assert_eq!(result.cycles(), 2);
    }

    #[test]
    fn test_at_most_one_event_of_each_kind_per_cycle() {
        let detector = batch();
        let mut state = detector.start_session(Instant::now());
        let dark = frame(0);
        let mut kinds = Vec::new();
        for (i, ear) in [0.2, 0.1, 0.2, 0.1, 0.3].into_iter().enumerate() {
            let faces = [face_with_ear(ear)];
            let obs = Observation {
                frame_index: i,
                frame: &dark,
                faces: &faces,
            };
            if let Some(event) = detector.step(&mut state, &obs, Instant::now()).event() {
                kinds.push(event.kind);
            }
        }
        assert_eq!(kinds, vec![CaptureKind::Blinked]);
        assert_eq!(state.phase, BlinkPhase::BlinkedCaptured);
        assert!(state.blinking && state.blinked_saved && !state.unblinked_saved);
    }

    #[test]
    fn test_hysteresis_band_does_not_reopen() {
        // 0.35 is above the closed threshold but below the open one.
        let ears = [0.15, 0.35, 0.35, 0.36, 0.38];
        let result = classify_ears(&batch(), &ears);
        assert_eq!(indices_of(&result.blinked), vec![0]);
        assert_eq!(indices_of(&result.unblinked), vec![4]);
    }

    #[test]
    fn test_open_pattern_does_not_transition() {
        let detector = batch();
        let mut state = detector.start_session(Instant::now());
        let dark = frame(0);
        let faces = [face_with_ear(0.35)];
        let obs = Observation {
            frame_index: 0,
            frame: &dark,
            faces: &faces,
        };
        let step = detector.step(&mut state, &obs, Instant::now());
        assert!(matches!(step.outcome, StepOutcome::Tracking { event: None, .. }));
        assert_eq!(state.phase, BlinkPhase::Capturing);
        assert!(!state.blinking);
    }

    #[test]
    fn test_face_count_gates_without_advancing() {
        let detector = batch();
        let mut state = detector.start_session(Instant::now());
        let before = state.clone();
        let dark = frame(0);
        let closed = face_with_ear(0.1);

        let none: [LandmarkSet; 0] = [];
        let obs = Observation {
            frame_index: 0,
            frame: &dark,
            faces: &none,
        };
        assert_eq!(detector.step(&mut state, &obs, Instant::now()).outcome, StepOutcome::NoFace);

        let two = [closed.clone(), closed];
        let obs = Observation {
            frame_index: 1,
            frame: &dark,
            faces: &two,
        };
        assert_eq!(
            detector.step(&mut state, &obs, Instant::now()).outcome,
            StepOutcome::MultipleFaces(2)
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_skipped_frames_counted_in_batch() {
        let dark = frame(0);
        let open = vec![face_with_ear(0.4)];
        let crowd = vec![face_with_ear(0.1), face_with_ear(0.1)];
        let per_frame = [open.clone(), Vec::new(), crowd, open];
        let observations = per_frame
            .iter()
            .enumerate()
            .map(|(frame_index, faces)| Observation {
                frame_index,
                frame: &dark,
                faces,
            });
        let result = batch().classify(observations);
        assert_eq!(result.frames_seen, 4);
        assert_eq!(result.frames_skipped, 2);
        assert!(result.blinked.is_empty());
    }

    #[test]
    fn test_degenerate_eye_is_unevaluable() {
        let detector = batch();
        let mut state = detector.start_session(Instant::now());
        let before = state.clone();
        let dark = frame(0);
        let faces = [LandmarkSet::new(vec![Point::new(0.5, 0.5); 468])];
        let obs = Observation {
            frame_index: 0,
            frame: &dark,
            faces: &faces,
        };
        let step = detector.step(&mut state, &obs, Instant::now());
        assert_eq!(step.outcome, StepOutcome::Unevaluable(GeometryError::DegenerateGeometry));
        assert_eq!(state, before);
    }

    #[test]
    fn test_interactive_session_completes_after_one_cycle() {
        let detector = interactive(false);
        let start = Instant::now();
        let mut state = detector.start_session(start);
        let after_grace = start + Duration::from_secs(6);
        let dark = frame(0);

        let mut events = Vec::new();
        for (i, ear) in [0.40, 0.10, 0.40, 0.10, 0.40].into_iter().enumerate() {
            let faces = [face_with_ear(ear)];
            let obs = Observation {
                frame_index: i,
                frame: &dark,
                faces: &faces,
            };
            let step = detector.step(&mut state, &obs, after_grace);
            if let Some(event) = step.event() {
                events.push((event.kind, event.frame_index));
            }
            if i >= 3 {
                assert_eq!(step.outcome, StepOutcome::Completed);
            }
        }

        assert_eq!(events, vec![(CaptureKind::Blinked, 1), (CaptureKind::Unblinked, 2)]);
        assert!(state.is_complete());
        assert_eq!(state.cycles_completed, 1);
    }

    #[test]
    fn test_interactive_reopen_threshold_is_higher() {
        // 0.38 reopens in batch mode (0.37) but not interactively (0.39).
        let detector = interactive(false);
        let start = Instant::now();
        let mut state = detector.start_session(start);
        let later = start + Duration::from_secs(10);
        let dark = frame(0);
        for (i, ear) in [0.10, 0.38].into_iter().enumerate() {
            let faces = [face_with_ear(ear)];
            let obs = Observation {
                frame_index: i,
                frame: &dark,
                faces: &faces,
            };
            detector.step(&mut state, &obs, later);
        }
        assert_eq!(state.phase, BlinkPhase::BlinkedCaptured);
        assert!(!state.unblinked_saved);
    }

    #[test]
    fn test_grace_period_holds_blink_logic() {
        let detector = interactive(false);
        let start = Instant::now();
        let mut state = detector.start_session(start);
        assert_eq!(state.phase, BlinkPhase::OpenWaiting);
        let dark = frame(0);
        let faces = [face_with_ear(0.1)];
        let obs = Observation {
            frame_index: 0,
            frame: &dark,
            faces: &faces,
        };

        let step = detector.step(&mut state, &obs, start + Duration::from_secs(2));
        assert!(matches!(step.outcome, StepOutcome::GracePeriod { .. }));
        assert!(!state.blinked_saved);

        // Deadline reached: the same frame is now tracked and captured.
        let step = detector.step(&mut state, &obs, start + Duration::from_secs(5));
        assert_eq!(step.event().map(|e| e.kind), Some(CaptureKind::Blinked));
        assert_eq!(state.spectacle_grace_deadline, None);
    }

    #[test]
    fn test_grace_period_ends_when_spectacles_cleared() {
        let detector = interactive(true);
        let start = Instant::now();
        let mut state = detector.start_session(start);
        let dark = frame(0);
        let faces = [face_with_ear(0.1)];
        let obs = Observation {
            frame_index: 0,
            frame: &dark,
            faces: &faces,
        };

        // A flat dark frame carries no spectacle evidence.
        let step = detector.step(&mut state, &obs, start);
        assert_eq!(step.event().map(|e| e.kind), Some(CaptureKind::Blinked));
    }

    #[test]
    fn test_unscorable_face_does_not_end_grace_early() {
        let detector = interactive(true);
        let start = Instant::now();
        let mut state = detector.start_session(start);
        let dark = frame(0);
        // Mesh shifted far outside the frame: crops fail, EAR is fine.
        let shifted: Vec<Point> = face_with_ear(0.1)
            .points()
            .iter()
            .map(|p| Point::new(p.x + 5.0, p.y + 5.0))
            .collect();
        let faces = [LandmarkSet::new(shifted)];
        let obs = Observation {
            frame_index: 0,
            frame: &dark,
            faces: &faces,
        };

        let step = detector.step(&mut state, &obs, start + Duration::from_secs(1));
        assert_eq!(
            step.outcome,
            StepOutcome::GracePeriod {
                spectacles: SpectacleScore::undetermined()
            }
        );
        assert_eq!(state.phase, BlinkPhase::OpenWaiting);
    }

    #[test]
    fn test_brightness_is_advisory() {
        let detector = batch();
        let mut state = detector.start_session(Instant::now());
        let white = frame(255);
        let faces = [face_with_ear(0.1)];
        let obs = Observation {
            frame_index: 0,
            frame: &white,
            faces: &faces,
        };
        let step = detector.step(&mut state, &obs, Instant::now());
        assert!(step.too_bright);
        assert!(step.event().is_some());
    }

    #[test]
    fn test_fresh_sessions_are_isolated() {
        let detector = batch();
        let first = classify_ears(&detector, &[0.1, 0.4]);
        let second = classify_ears(&detector, &[0.4, 0.1]);
        assert_eq!(indices_of(&first.blinked), vec![0]);
        assert_eq!(indices_of(&second.blinked), vec![1]);
        assert!(second.unblinked.is_empty());
    }

    struct ScriptedProvider {
        script: VecDeque<Result<Vec<LandmarkSet>, ProviderError>>,
    }

    impl LandmarkProvider for ScriptedProvider {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<LandmarkSet>, ProviderError> {
            self.script
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[test]
    fn test_classify_frames_skips_failed_detections() {
        let mut provider = ScriptedProvider {
            script: VecDeque::from(vec![
                Ok(vec![face_with_ear(0.4)]),
                Err(ProviderError::Inference("bad tensor".into())),
                Ok(vec![face_with_ear(0.1)]),
                Ok(vec![face_with_ear(0.4)]),
            ]),
        };
        let frames = vec![frame(0); 4];
        let result = batch().classify_frames(&mut provider, &frames).unwrap();
        assert_eq!(indices_of(&result.blinked), vec![2]);
        assert_eq!(indices_of(&result.unblinked), vec![3]);
        assert_eq!(result.frames_skipped, 1);
        assert_eq!(result.frames_seen, 4);
    }

    #[test]
    fn test_classify_frames_aborts_when_provider_unavailable() {
        let mut provider = ScriptedProvider {
            script: VecDeque::from(vec![Err(ProviderError::Unavailable("model missing".into()))]),
        };
        let result = batch().classify_frames(&mut provider, &[frame(0)]);
        assert!(matches!(result, Err(ProviderError::Unavailable(_))));
    }

    #[test]
    fn test_events_serialize_snake_case() {
        let event = CaptureEvent {
            kind: CaptureKind::Unblinked,
            frame_index: 7,
            ear: 0.4,
        };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["kind"], "unblinked");
        assert_eq!(json["frame_index"], 7);
    }
}
