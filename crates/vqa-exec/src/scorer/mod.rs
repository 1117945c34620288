//! The scoring capability seen by a worker.
//!
//! A [`Scorer`] answers one `(video, label)` question at a time. Workers hold it by `&mut`,
//! so implementations may keep a model or a backend process between calls.
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod command;
pub use command::{CommandScorer, ScorerConfig};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    /// The backend answered, but refused this pair.
    #[error("{0}")]
    Rejected(String),
    /// The backend could not be reached or died.
    #[error("backend failure: {0}")]
    Backend(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The backend answered something that is not a score.
    #[error("protocol error: {0}")]
    Protocol(String),
}

#[async_trait]
pub trait Scorer: Send {
    fn name(&self) -> &str;

    async fn score(&mut self, video_ref: &str, label: &str) -> Result<f64, ScoreError>;

    /// Release backend resources. Called once the slice is done.
    async fn shutdown(&mut self) {}
}

/// In-process scorer backed by a closure.
pub struct FnScorer<F> {
    name: String,
    f: F,
}

impl<F> FnScorer<F>
where
    F: FnMut(&str, &str) -> Result<f64, ScoreError> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

#[async_trait]
impl<F> Scorer for FnScorer<F>
where
    F: FnMut(&str, &str) -> Result<f64, ScoreError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn score(&mut self, video_ref: &str, label: &str) -> Result<f64, ScoreError> {
        (self.f)(video_ref, label)
    }
}
