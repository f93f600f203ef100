//! Runtime around `blink-core`.
//!
//! [`engine`] owns the landmark and embedding models on a dedicated thread
//! and serves batch requests through a cloneable async handle; [`session`]
//! drives one interactive capture from a live frame source.

pub mod config;
pub mod engine;
pub mod session;

pub use blink_core::EncodedFrame;
pub use config::Config;
pub use engine::{spawn_engine, BatchReport, EngineError, EngineHandle};
pub use session::{
    CancelHandle, CapturedFrame, FrameSource, InteractiveSession, SessionEnd, SessionError,
    SessionReport, SourceError,
};
