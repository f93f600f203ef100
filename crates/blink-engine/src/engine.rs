use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use blink_core::{
    BlinkDetector, Classification, ConfigError, Embedding, EncodedFrame, FaceEmbedder,
    FaceMatchEngine, Frame, GalleryEntry, LandmarkProvider, MatchResult, ProviderError,
    SpectacleScore, SpectacleScorer,
};

use crate::config::Config;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("landmark provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Result of classifying a batch of uploaded frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    /// Events carry indices into the uploaded sequence.
    pub classification: Classification,
    /// Upload indices of frames that failed to decode.
    pub undecodable: Vec<usize>,
}

impl BatchReport {
    /// Build a report from a classification over the decodable subset of an
    /// upload. `origin[i]` is the upload index of decoded frame `i`.
    pub fn from_decoded(
        mut classification: Classification,
        origin: &[usize],
        undecodable: Vec<usize>,
    ) -> Self {
        for event in classification
            .blinked
            .iter_mut()
            .chain(classification.unblinked.iter_mut())
        {
            event.frame_index = origin[event.frame_index];
        }
        classification.frames_seen += undecodable.len();
        classification.frames_skipped += undecodable.len();
        Self {
            classification,
            undecodable,
        }
    }
}

/// Messages sent from async callers to the engine thread.
enum EngineRequest {
    ClassifyBatch {
        frames: Vec<Frame>,
        reply: oneshot::Sender<Result<Classification, EngineError>>,
    },
    ClassifyEncoded {
        frames: Vec<EncodedFrame>,
        reply: oneshot::Sender<Result<BatchReport, EngineError>>,
    },
    CheckSpectacles {
        frame: Frame,
        reply: oneshot::Sender<Result<SpectacleScore, EngineError>>,
    },
    Identify {
        captured: Frame,
        gallery: Vec<GalleryEntry>,
        reply: oneshot::Sender<MatchResult>,
    },
    IdentifyEmbedding {
        probe: Embedding,
        gallery: Vec<GalleryEntry>,
        reply: oneshot::Sender<MatchResult>,
    },
    Compare {
        captured: Frame,
        reference: Frame,
        reply: oneshot::Sender<MatchResult>,
    },
    IdentifyEncoded {
        captured: EncodedFrame,
        gallery: Vec<GalleryEntry>,
        reply: oneshot::Sender<MatchResult>,
    },
    CompareEncoded {
        captured: EncodedFrame,
        reference: EncodedFrame,
        reply: oneshot::Sender<MatchResult>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Classify decoded frames with a fresh batch session.
    pub async fn classify_batch(
        &self,
        frames: Vec<Frame>,
    ) -> Result<Classification, EngineError> {
        self.request(|reply| EngineRequest::ClassifyBatch { frames, reply })
            .await?
    }

    /// Decode and classify uploaded frames. Undecodable frames are skipped.
    pub async fn classify_encoded(
        &self,
        frames: Vec<EncodedFrame>,
    ) -> Result<BatchReport, EngineError> {
        self.request(|reply| EngineRequest::ClassifyEncoded { frames, reply })
            .await?
    }

    /// Score spectacles on the single face in `frame`.
    ///
    /// Zero or several faces yield the not-detected zero score.
    pub async fn check_spectacles(&self, frame: Frame) -> Result<SpectacleScore, EngineError> {
        self.request(|reply| EngineRequest::CheckSpectacles { frame, reply })
            .await?
    }

    pub async fn identify(
        &self,
        captured: Frame,
        gallery: Vec<GalleryEntry>,
    ) -> Result<MatchResult, EngineError> {
        self.request(|reply| EngineRequest::Identify {
            captured,
            gallery,
            reply,
        })
        .await
    }

    pub async fn identify_embedding(
        &self,
        probe: Embedding,
        gallery: Vec<GalleryEntry>,
    ) -> Result<MatchResult, EngineError> {
        self.request(|reply| EngineRequest::IdentifyEmbedding {
            probe,
            gallery,
            reply,
        })
        .await
    }

    pub async fn compare(
        &self,
        captured: Frame,
        reference: Frame,
    ) -> Result<MatchResult, EngineError> {
        self.request(|reply| EngineRequest::Compare {
            captured,
            reference,
            reply,
        })
        .await
    }

    /// Identify an uploaded capture. A capture that fails to decode is a
    /// failed match; gallery photos that fail to decode are skipped.
    pub async fn identify_encoded(
        &self,
        captured: EncodedFrame,
        gallery: Vec<GalleryEntry>,
    ) -> Result<MatchResult, EngineError> {
        self.request(|reply| EngineRequest::IdentifyEncoded {
            captured,
            gallery,
            reply,
        })
        .await
    }

    pub async fn compare_encoded(
        &self,
        captured: EncodedFrame,
        reference: EncodedFrame,
    ) -> Result<MatchResult, EngineError> {
        self.request(|reply| EngineRequest::CompareEncoded {
            captured,
            reference,
            reply,
        })
        .await
    }
}

/// Models and decision logic owned by the engine thread.
struct Worker<P, E> {
    provider: P,
    embedder: E,
    detector: BlinkDetector,
    spectacles: SpectacleScorer,
    matcher: FaceMatchEngine,
}

impl<P, E> Worker<P, E>
where
    P: LandmarkProvider,
    E: FaceEmbedder,
{
    fn new(config: &Config, provider: P, embedder: E) -> Result<Self, EngineError> {
        let spectacles = SpectacleScorer::new(config.spectacle_config()?)?;
        Ok(Self {
            provider,
            embedder,
            detector: BlinkDetector::new(config.batch_config()?, spectacles)?,
            spectacles,
            matcher: FaceMatchEngine::new(config.match_config()?)?,
        })
    }

    fn handle(&mut self, request: EngineRequest) {
        match request {
            EngineRequest::ClassifyBatch { frames, reply } => {
                let _ = reply.send(self.classify_batch(&frames));
            }
            EngineRequest::ClassifyEncoded { frames, reply } => {
                let _ = reply.send(self.classify_encoded(&frames));
            }
            EngineRequest::CheckSpectacles { frame, reply } => {
                let _ = reply.send(self.check_spectacles(&frame));
            }
            EngineRequest::Identify {
                captured,
                gallery,
                reply,
            } => {
                let _ = reply.send(self.matcher.identify(&mut self.embedder, &captured, &gallery));
            }
            EngineRequest::IdentifyEmbedding {
                probe,
                gallery,
                reply,
            } => {
                let _ = reply.send(
                    self.matcher
                        .identify_embedding(&mut self.embedder, &probe, &gallery),
                );
            }
            EngineRequest::Compare {
                captured,
                reference,
                reply,
            } => {
                let _ = reply.send(self.matcher.compare(&mut self.embedder, &captured, &reference));
            }
            EngineRequest::IdentifyEncoded {
                captured,
                gallery,
                reply,
            } => {
                let _ = reply.send(
                    self.matcher
                        .identify_encoded(&mut self.embedder, &captured, &gallery),
                );
            }
            EngineRequest::CompareEncoded {
                captured,
                reference,
                reply,
            } => {
                let _ = reply.send(
                    self.matcher
                        .compare_encoded(&mut self.embedder, &captured, &reference),
                );
            }
        }
    }

    fn classify_batch(&mut self, frames: &[Frame]) -> Result<Classification, EngineError> {
        Ok(self.detector.classify_frames(&mut self.provider, frames)?)
    }

    fn classify_encoded(&mut self, encoded: &[EncodedFrame]) -> Result<BatchReport, EngineError> {
        let mut origin = Vec::with_capacity(encoded.len());
        let mut frames = Vec::with_capacity(encoded.len());
        let mut undecodable = Vec::new();

        for (index, payload) in encoded.iter().enumerate() {
            match payload.decode() {
                Ok(frame) => {
                    origin.push(index);
                    frames.push(frame);
                }
                Err(e) => {
                    tracing::warn!(frame = index, error = %e, "skipping undecodable frame");
                    undecodable.push(index);
                }
            }
        }

        let classification = self.classify_batch(&frames)?;
        Ok(BatchReport::from_decoded(classification, &origin, undecodable))
    }

    fn check_spectacles(&mut self, frame: &Frame) -> Result<SpectacleScore, EngineError> {
        let faces = self.provider.detect(frame)?;
        match faces.as_slice() {
            [face] => Ok(self.spectacles.score(frame, face)),
            _ => {
                tracing::debug!(faces = faces.len(), "spectacle check needs exactly one face");
                Ok(SpectacleScore::undetermined())
            }
        }
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Validates the configuration before the thread starts, then serves
/// requests until every [`EngineHandle`] has been dropped.
pub fn spawn_engine<P, E>(
    config: &Config,
    provider: P,
    embedder: E,
) -> Result<EngineHandle, EngineError>
where
    P: LandmarkProvider + Send + 'static,
    E: FaceEmbedder + Send + 'static,
{
    let mut worker = Worker::new(config, provider, embedder)?;
    tracing::info!(
        closed = worker.detector.config().closed_threshold,
        open = worker.detector.config().open_threshold,
        match_threshold = worker.matcher.threshold(),
        "engine configured"
    );

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("blink-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(request) = rx.blocking_recv() {
                worker.handle(request);
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}
