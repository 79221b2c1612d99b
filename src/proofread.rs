use std::sync::Arc;

use tracing::info;

use crate::error::best_effort;
use crate::gemini::{GeminiError, GenerativeService, TextRequest};
use crate::models::AdCopy;
use crate::prompts;

/// Best-effort spelling and grammar pass. Never fails: any problem keeps
/// the original input.
pub struct Proofreader {
    service: Arc<dyn GenerativeService>,
    model: String,
}

/// Remove one pair of wrapping quotes, if present.
fn strip_wrapping_quotes(text: &str) -> &str {
    let pairs = [('"', '"'), ('\'', '\''), ('“', '”')];
    for (open, close) in pairs {
        if let Some(inner) = text.strip_prefix(open).and_then(|t| t.strip_suffix(close)) {
            return inner;
        }
    }
    text
}

/// Strip a surrounding ```json fence the model sometimes adds.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

impl Proofreader {
    pub fn new(service: Arc<dyn GenerativeService>, model: impl Into<String>) -> Self {
        Self { service, model: model.into() }
    }

    pub async fn proofread_text(&self, text: &str, context: &str) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }
        let attempt = self.try_text(text, context).await;
        best_effort("Proofreading text", text.to_string(), attempt)
    }

    pub async fn proofread_copy(&self, copies: Vec<AdCopy>, context: &str) -> Vec<AdCopy> {
        if copies.is_empty() {
            return copies;
        }
        let attempt = self.try_copy(&copies, context).await;
        best_effort("Proofreading ad copy", copies, attempt)
    }

    async fn try_text(&self, text: &str, context: &str) -> Result<String, GeminiError> {
        let reply = self.service
            .generate_text(TextRequest {
                model: self.model.clone(),
                prompt: prompts::proofread_text(text, context),
                response_schema: None,
                url_context: false,
            })
            .await?;
        let corrected = strip_wrapping_quotes(reply.trim());
        if corrected.trim().is_empty() {
            return Err(GeminiError::Empty("proofreader returned no text".into()));
        }
        Ok(corrected.to_string())
    }

    async fn try_copy(&self, copies: &[AdCopy], context: &str) -> Result<Vec<AdCopy>, GeminiError> {
        let reply = self.service
            .generate_text(TextRequest {
                model: self.model.clone(),
                prompt: prompts::proofread_copy(copies, context),
                response_schema: Some(prompts::ad_copy_schema()),
                url_context: false,
            })
            .await?;
        let corrected: Vec<AdCopy> = serde_json::from_str(strip_code_fence(&reply))
            .map_err(|e| GeminiError::Parse(e.to_string()))?;
        if corrected.len() != copies.len() {
            return Err(GeminiError::Parse(format!("expected {} entries, got {}", copies.len(), corrected.len())));
        }

        info!("✍️ Proofread {} ad copy variants", corrected.len());
        Ok(corrected
            .into_iter()
            .zip(copies)
            .map(|(fixed, original)| AdCopy { cta: original.cta.clone(), ..fixed })
            .collect())
    }
}
