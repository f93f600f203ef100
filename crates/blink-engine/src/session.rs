//! Interactive capture from a live frame source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use blink_core::{
    BlinkDetector, BlinkSessionState, CaptureEvent, CaptureKind, ConfigError, Frame,
    LandmarkProvider, Observation, ProviderError, SpectacleScorer, Step,
};

use crate::config::Config;

/// A camera or stream failure. Fatal to the session.
#[derive(Error, Debug)]
#[error("frame source failed: {0}")]
pub struct SourceError(pub String);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("landmark provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Supplies frames to an interactive session.
pub trait FrameSource {
    /// The next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;
}

/// Requests a running session to stop at the next frame boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEnd {
    Completed,
    Cancelled,
    SourceExhausted,
}

/// A captured reference frame together with the event that selected it.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub event: CaptureEvent,
    pub frame: Frame,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub end: SessionEnd,
    pub blinked: Option<CapturedFrame>,
    pub unblinked: Option<CapturedFrame>,
    pub frames_seen: usize,
}

impl SessionReport {
    pub fn is_complete(&self) -> bool {
        self.blinked.is_some() && self.unblinked.is_some()
    }
}

/// One interactive blink capture: a single cycle, then done.
pub struct InteractiveSession<S, P> {
    source: S,
    provider: P,
    detector: BlinkDetector,
    cancel: CancelHandle,
}

impl<S, P> InteractiveSession<S, P>
where
    S: FrameSource,
    P: LandmarkProvider,
{
    pub fn new(config: &Config, source: S, provider: P) -> Result<Self, SessionError> {
        let spectacles = SpectacleScorer::new(config.spectacle_config()?)?;
        let detector = BlinkDetector::new(config.interactive_config()?, spectacles)?;
        Ok(Self {
            source,
            provider,
            detector,
            cancel: CancelHandle::default(),
        })
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn run(self) -> Result<SessionReport, SessionError> {
        self.run_with(|_| {})
    }

    /// Run the session, handing every step to `on_step` so the caller can
    /// prompt about spectacles or lighting.
    pub fn run_with<F>(mut self, mut on_step: F) -> Result<SessionReport, SessionError>
    where
        F: FnMut(&Step),
    {
        let mut state: BlinkSessionState = self.detector.start_session(Instant::now());
        let mut report = SessionReport {
            end: SessionEnd::SourceExhausted,
            blinked: None,
            unblinked: None,
            frames_seen: 0,
        };

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(frames = report.frames_seen, "session cancelled");
                report.end = SessionEnd::Cancelled;
                break;
            }

            let Some(frame) = self.source.next_frame()? else {
                tracing::info!(frames = report.frames_seen, "frame source exhausted");
                break;
            };
            let frame_index = report.frames_seen;
            report.frames_seen += 1;

            let faces = match self.provider.detect(&frame) {
                Ok(faces) => faces,
                Err(e @ ProviderError::Unavailable(_)) => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(
                        frame = frame_index,
                        error = %e,
                        "landmark detection failed, frame skipped"
                    );
                    continue;
                }
            };

            let obs = Observation {
                frame_index,
                frame: &frame,
                faces: &faces,
            };
            let step = self.detector.step(&mut state, &obs, Instant::now());
            on_step(&step);

            if let Some(event) = step.event() {
                let captured = Some(CapturedFrame {
                    event: *event,
                    frame: frame.clone(),
                });
                match event.kind {
                    CaptureKind::Blinked => report.blinked = captured,
                    CaptureKind::Unblinked => report.unblinked = captured,
                }
            }

            if state.is_complete() {
                report.end = SessionEnd::Completed;
                break;
            }
        }

        Ok(report)
    }
}
