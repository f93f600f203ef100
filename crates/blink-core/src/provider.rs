//! Seams to the external models.
//!
//! The landmark model and the embedding model are owned by the caller and
//! passed into each call, so tests can drive the core with scripted stubs.

use thiserror::Error;

use crate::frame::Frame;
use crate::landmarks::LandmarkSet;
use crate::matcher::Embedding;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("landmark model unavailable: {0}")]
    Unavailable(String),
    #[error("landmark inference failed: {0}")]
    Inference(String),
}

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embedding model unavailable: {0}")]
    Unavailable(String),
    #[error("embedding inference failed: {0}")]
    Inference(String),
}

/// Produces one [`LandmarkSet`] per detected face.
pub trait LandmarkProvider {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<LandmarkSet>, ProviderError>;
}

/// Produces one [`Embedding`] per detected face.
pub trait FaceEmbedder {
    fn embed(&mut self, frame: &Frame) -> Result<Vec<Embedding>, EmbedError>;
}

impl<T: LandmarkProvider + ?Sized> LandmarkProvider for Box<T> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<LandmarkSet>, ProviderError> {
        (**self).detect(frame)
    }
}

impl<T: FaceEmbedder + ?Sized> FaceEmbedder for Box<T> {
    fn embed(&mut self, frame: &Frame) -> Result<Vec<Embedding>, EmbedError> {
        (**self).embed(frame)
    }
}
