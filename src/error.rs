use std::fmt::Display;

use thiserror::Error;
use tracing::warn;

use crate::gemini::GeminiError;

/// Fatal pipeline failures. Every variant renders as the single message
/// shown to the user for a failed run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("The product image could not be read: {0}")]
    InvalidImage(String),
    #[error("Could not analyze the product URL: {0}")]
    ProductInfo(#[source] GeminiError),
    #[error("Failed to generate ad copy: {0}")]
    CopyGeneration(#[source] GeminiError),
    #[error("The ad copy response was malformed: {0}")]
    MalformedCopy(String),
    #[error("Image generation failed for the {variation} variation: {source}")]
    ImageGeneration { variation: &'static str, source: GeminiError },
    #[error("No image was returned for the {variation} variation")]
    EmptyImageResult { variation: &'static str },
    #[error("Image generation failed for every style variation")]
    AllVariationsFailed,
    #[error("Video generation failed: {0}")]
    Video(#[source] GeminiError),
    #[error("Video generation finished without producing a video")]
    NoVideo,
    #[error("Failed to download the generated video: {0}")]
    VideoDownload(#[source] GeminiError),
    #[error("Video generation did not finish after {polls} status checks")]
    VideoTimedOut { polls: u32 },
    #[error("Generation was cancelled")]
    Cancelled,
}

/// Best-effort step: on failure log a warning and keep `original`.
///
/// Required steps do not go through here; they map their error into a
/// [`PipelineError`] and propagate it.
pub fn best_effort<T, E: Display>(step: &str, original: T, attempt: Result<T, E>) -> T {
    match attempt {
        Ok(value) => value,
        Err(e) => {
            warn!("⚠️ {} failed, keeping original: {}", step, e);
            original
        }
    }
}
