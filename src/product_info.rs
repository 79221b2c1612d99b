use std::sync::Arc;

use tracing::info;

use crate::error::PipelineError;
use crate::gemini::{GenerativeService, TextRequest};
use crate::models::UserInputs;
use crate::prompts;

/// Turns the user's description or product URL into the product text
/// every later step works from.
pub struct ProductInfoResolver {
    service: Arc<dyn GenerativeService>,
    model: String,
}

impl ProductInfoResolver {
    pub fn new(service: Arc<dyn GenerativeService>, model: impl Into<String>) -> Self {
        Self { service, model: model.into() }
    }

    pub async fn resolve(&self, inputs: &UserInputs) -> Result<String, PipelineError> {
        let Some(url) = inputs.product_url() else {
            return Ok(inputs.product_description.clone());
        };

        info!("🔎 Extracting product info from {}", url);
        let text = self.service
            .generate_text(TextRequest {
                model: self.model.clone(),
                prompt: prompts::product_from_url(url),
                response_schema: None,
                url_context: true,
            })
            .await
            .map_err(PipelineError::ProductInfo)?;
        Ok(text.trim().to_string())
    }
}
