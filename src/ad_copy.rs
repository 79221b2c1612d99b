use std::sync::Arc;

use tracing::{info, warn};

use crate::error::PipelineError;
use crate::gemini::{GenerativeService, TextRequest};
use crate::models::AdCopy;
use crate::prompts;
use crate::proofread::strip_code_fence;

pub const COPY_VARIANTS: usize = 3;

pub struct CopyGenerator {
    service: Arc<dyn GenerativeService>,
    model: String,
}

/// Parse the schema-constrained reply. Unlike proofreading, a bad reply is fatal.
pub fn parse_ad_copy(reply: &str) -> Result<Vec<AdCopy>, PipelineError> {
    let mut copies: Vec<AdCopy> = serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| PipelineError::MalformedCopy(e.to_string()))?;

    if copies.len() < COPY_VARIANTS {
        return Err(PipelineError::MalformedCopy(format!("expected {COPY_VARIANTS} variants, got {}", copies.len())));
    }
    if copies.len() > COPY_VARIANTS {
        warn!("Model returned {} copy variants, keeping the first {}", copies.len(), COPY_VARIANTS);
        copies.truncate(COPY_VARIANTS);
    }
    if let Some(i) = copies.iter().position(|c| {
        c.headline.trim().is_empty() || c.primary_text.trim().is_empty() || c.cta.trim().is_empty()
    }) {
        return Err(PipelineError::MalformedCopy(format!("variant {} has an empty field", i + 1)));
    }
    Ok(copies)
}

impl CopyGenerator {
    pub fn new(service: Arc<dyn GenerativeService>, model: impl Into<String>) -> Self {
        Self { service, model: model.into() }
    }

    pub async fn generate(&self, product_info: &str) -> Result<Vec<AdCopy>, PipelineError> {
        let reply = self.service
            .generate_text(TextRequest {
                model: self.model.clone(),
                prompt: prompts::ad_copy(product_info),
                response_schema: Some(prompts::ad_copy_schema()),
                url_context: false,
            })
            .await
            .map_err(PipelineError::CopyGeneration)?;

        let copies = parse_ad_copy(&reply)?;
        info!("📝 Generated {} ad copy variants", copies.len());
        Ok(copies)
    }
}
