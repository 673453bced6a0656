//! Content generation: turns a content reference into notes plus a quiz.
//!
//! [`StudyGenerator`] is the production adapter. It prefers the fast path
//! (fetch the video transcript and prompt the model with it) and falls back to
//! asking the model to analyse the reference directly when no transcript is
//! available. Both paths are parsed into the same [`StudyMaterial`] contract.

mod gemini;
mod parse;
mod prompt;
mod transcript;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{NoteFormat, StudyMaterial};

pub use gemini::{GeminiClient, GeminiConfig, DEFAULT_GEMINI_BASE_URL, DEFAULT_MODEL};
pub use parse::parse_material;
pub use prompt::{direct_analysis_prompt, transcript_prompt};
pub use transcript::{video_id, TranscriptError, TranscriptSource, YoutubeTranscripts};

/// Why a generation attempt produced no material.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The provider refused the request for quota or rate-limit reasons.
    #[error("generation quota exhausted: {0}")]
    RateLimited(String),
    #[error("model returned malformed output: {0}")]
    MalformedOutput(String),
    #[error("model API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("request to model failed: {0}")]
    Transport(String),
    #[error("generation timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("generation task aborted: {0}")]
    Aborted(String),
    #[error("study plan has no content reference")]
    MissingContent,
}

impl GenerationError {
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Short machine-friendly label, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited(_) => "quota",
            Self::MalformedOutput(_) => "malformed_output",
            Self::Api { .. } => "api",
            Self::Transport(_) => "transport",
            Self::Timeout(_) => "timeout",
            Self::Aborted(_) => "aborted",
            Self::MissingContent => "missing_content",
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Produces study material for a content reference.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        content_reference: &str,
        note_format: NoteFormat,
    ) -> Result<StudyMaterial, GenerationError>;
}

/// A text-in, text-out model endpoint.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Transcript-first generator with a direct-analysis fallback.
pub struct StudyGenerator<M, T> {
    model: M,
    transcripts: T,
}

impl<M, T> StudyGenerator<M, T>
where
    M: LanguageModel,
    T: TranscriptSource,
{
    pub fn new(model: M, transcripts: T) -> Self {
        Self { model, transcripts }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    async fn build_prompt(&self, content_reference: &str, note_format: NoteFormat) -> String {
        match self.transcripts.fetch(content_reference).await {
            Ok(transcript) => {
                debug!(content_reference, chars = transcript.len(), "using transcript");
                transcript_prompt(&transcript, note_format)
            }
            Err(e) => {
                warn!(
                    content_reference,
                    error = %e,
                    "transcript unavailable, falling back to direct analysis"
                );
                direct_analysis_prompt(content_reference, note_format)
            }
        }
    }
}

#[async_trait]
impl<M, T> ContentGenerator for StudyGenerator<M, T>
where
    M: LanguageModel,
    T: TranscriptSource,
{
    async fn generate(
        &self,
        content_reference: &str,
        note_format: NoteFormat,
    ) -> Result<StudyMaterial, GenerationError> {
        let prompt = self.build_prompt(content_reference, note_format).await;
        let raw = self.model.complete(&prompt).await?;
        parse_material(&raw).inspect_err(|e| {
            warn!(
                content_reference,
                error = %e,
                raw_len = raw.len(),
                "could not parse model output"
            );
        })
    }
}
