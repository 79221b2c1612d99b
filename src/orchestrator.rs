//! Sequences one submission through the creative pipeline:
//! inputs → product info → copy → proofreading → assets → creatives.
//!
//! Each phase is reported to the caller as a [`PipelineState`]; the run
//! ends in `Done` with the full creative list or `Failed` with a single
//! message. Nothing partial is returned from a failed run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::ad_copy::CopyGenerator;
use crate::assembler::assemble;
use crate::assets::{CreativeAssetGenerator, PollPolicy};
use crate::cancel::CancelSignal;
use crate::config::{AppConfig, ModelConfig};
use crate::error::PipelineError;
use crate::gemini::GenerativeService;
use crate::media::MediaStore;
use crate::models::{AdCreative, UserInputs};
use crate::product_image;
use crate::product_info::ProductInfoResolver;
use crate::proofread::Proofreader;

pub const DEFAULT_DESCRIPTION: &str = "A versatile, high-quality everyday product";
pub const IMAGE_DESCRIPTION: &str = "The product shown in the provided image";
const DESCRIPTION_CONTEXT: &str = "Product description written by a marketer for an ad campaign";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    ResolvingInputs,
    ResolvingProductInfo,
    GeneratingCopy,
    ProofreadingCopy,
    GeneratingAssets,
    Assembling,
    Done { count: usize },
    Failed { message: String },
}

impl PipelineState {
    /// Progress text shown while a run is in flight.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Waiting to start",
            PipelineState::ResolvingInputs => "Preparing your inputs...",
            PipelineState::ResolvingProductInfo => "Analyzing product details...",
            PipelineState::GeneratingCopy => "Writing ad copy...",
            PipelineState::ProofreadingCopy => "Proofreading ad copy...",
            PipelineState::GeneratingAssets => "Generating visuals, this can take a few minutes...",
            PipelineState::Assembling => "Assembling creatives...",
            PipelineState::Done { .. } => "Done",
            PipelineState::Failed { .. } => "Generation failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done { .. } | PipelineState::Failed { .. })
    }
}

pub struct CreativePipeline {
    resolver: ProductInfoResolver,
    proofreader: Proofreader,
    copywriter: CopyGenerator,
    assets: CreativeAssetGenerator,
    max_image_dimension: u32,
}

fn ensure_active(cancel: &CancelSignal) -> Result<(), PipelineError> {
    if cancel.is_cancelled() { Err(PipelineError::Cancelled) } else { Ok(()) }
}

impl CreativePipeline {
    pub fn new(
        service: Arc<dyn GenerativeService>,
        models: ModelConfig,
        media: MediaStore,
        poll: PollPolicy,
        max_image_dimension: u32,
    ) -> Self {
        Self {
            resolver: ProductInfoResolver::new(service.clone(), models.text.clone()),
            proofreader: Proofreader::new(service.clone(), models.text.clone()),
            copywriter: CopyGenerator::new(service.clone(), models.text.clone()),
            assets: CreativeAssetGenerator::new(service, models, media, poll),
            max_image_dimension,
        }
    }

    pub fn from_config(service: Arc<dyn GenerativeService>, config: &AppConfig, media: MediaStore) -> Self {
        Self::new(service, config.models.clone(), media, config.video_poll, config.max_image_dimension)
    }

    /// Run one submission end to end, reporting every state to `observe`.
    pub async fn run<F>(&self, inputs: UserInputs, cancel: CancelSignal, observe: F) -> Result<Vec<AdCreative>, PipelineError>
    where
        F: Fn(&PipelineState) + Send + Sync,
    {
        let result = self.run_stages(inputs, &cancel, &observe).await;
        match &result {
            Ok(creatives) => {
                info!("🎉 Generated {} creatives", creatives.len());
                observe(&PipelineState::Done { count: creatives.len() });
            }
            Err(e) => {
                error!("❌ Creative generation failed: {}", e);
                observe(&PipelineState::Failed { message: e.to_string() });
            }
        }
        result
    }

    async fn run_stages(
        &self,
        inputs: UserInputs,
        cancel: &CancelSignal,
        observe: &(dyn Fn(&PipelineState) + Send + Sync),
    ) -> Result<Vec<AdCreative>, PipelineError> {
        observe(&PipelineState::ResolvingInputs);
        let mut inputs = self.prepare_inputs(inputs).await?;
        ensure_active(cancel)?;

        observe(&PipelineState::ResolvingProductInfo);
        let product_info = self.resolver.resolve(&inputs).await?;
        if let Some(hook) = inputs.hook_text().map(str::to_string) {
            inputs.hook_text = Some(self.proofreader.proofread_text(&hook, &product_info).await);
        }
        ensure_active(cancel)?;

        observe(&PipelineState::GeneratingCopy);
        let copies = self.copywriter.generate(&product_info).await?;
        ensure_active(cancel)?;

        observe(&PipelineState::ProofreadingCopy);
        let copies = self.proofreader.proofread_copy(copies, &product_info).await;
        ensure_active(cancel)?;

        observe(&PipelineState::GeneratingAssets);
        let assets = self.assets.generate(&inputs, &product_info, cancel).await?;
        ensure_active(cancel)?;

        observe(&PipelineState::Assembling);
        Ok(assemble(assets, &copies))
    }

    /// Normalize the photo, guarantee a non-empty description and
    /// proofread it when it is the product source.
    async fn prepare_inputs(&self, mut inputs: UserInputs) -> Result<UserInputs, PipelineError> {
        inputs.product_image = inputs
            .product_image
            .as_ref()
            .map(|image| product_image::normalize(image, self.max_image_dimension))
            .transpose()?;

        let description = inputs.product_description.trim();
        inputs.product_description = if description.is_empty() {
            let fallback = if inputs.product_image.is_some() { IMAGE_DESCRIPTION } else { DEFAULT_DESCRIPTION };
            info!("No product description supplied, using \"{}\"", fallback);
            fallback.to_string()
        } else if inputs.product_url().is_none() {
            self.proofreader.proofread_text(description, DESCRIPTION_CONTEXT).await
        } else {
            description.to_string()
        };
        Ok(inputs)
    }
}
