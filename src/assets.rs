use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::cancel::CancelSignal;
use crate::config::ModelConfig;
use crate::error::PipelineError;
use crate::gemini::{GenerativeService, ImagePayload, ImageRequest, OperationHandle, VideoRequest};
use crate::media::MediaStore;
use crate::models::{AssetRef, CreativeType, ProductImage, UserInputs};
use crate::prompts;

/// One fixed stylistic treatment of the product.
#[derive(Debug)]
pub struct StyleVariation {
    pub name: &'static str,
    pub label: &'static str,
    pub direction: &'static str,
}

pub static STYLE_VARIATIONS: [StyleVariation; 3] = [
    StyleVariation {
        name: "minimalist",
        label: "Minimalist",
        direction: "clean studio composition, soft even lighting, plain background with plenty of negative space",
    },
    StyleVariation {
        name: "lifestyle",
        label: "Lifestyle",
        direction: "the product in use by real people in a natural, everyday setting with warm light",
    },
    StyleVariation {
        name: "dynamic",
        label: "Dynamic",
        direction: "bold energetic composition with vivid colors, dramatic angles and a sense of motion",
    },
];

/// How long to wait on a long-running video job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self { interval: Duration::from_secs(10), max_polls: 60 }
    }
}

pub struct CreativeAssetGenerator {
    service: Arc<dyn GenerativeService>,
    models: ModelConfig,
    media: MediaStore,
    poll: PollPolicy,
}

fn image_asset(payload: ImagePayload) -> AssetRef {
    AssetRef::Image { mime_type: payload.mime_type, data_base64: payload.data }
}

impl CreativeAssetGenerator {
    pub fn new(service: Arc<dyn GenerativeService>, models: ModelConfig, media: MediaStore, poll: PollPolicy) -> Self {
        Self { service, models, media, poll }
    }

    pub async fn generate(
        &self,
        inputs: &UserInputs,
        product_info: &str,
        cancel: &CancelSignal,
    ) -> Result<Vec<AssetRef>, PipelineError> {
        match (inputs.creative_type, &inputs.product_image) {
            (CreativeType::Video, _) => Ok(vec![self.generate_video(inputs, product_info, cancel).await?]),
            (CreativeType::Image, Some(image)) => self.edit_images(inputs, image, product_info).await,
            (CreativeType::Image, None) => self.generate_images(inputs, product_info).await,
        }
    }

    // --- image editing: partial success is accepted ---

    async fn edit_images(&self, inputs: &UserInputs, image: &ProductImage, product_info: &str) -> Result<Vec<AssetRef>, PipelineError> {
        info!("🎨 Editing product image in {} styles", STYLE_VARIATIONS.len());
        let (a, b, c) = tokio::join!(
            self.edit_variation(&STYLE_VARIATIONS[0], inputs, image, product_info),
            self.edit_variation(&STYLE_VARIATIONS[1], inputs, image, product_info),
            self.edit_variation(&STYLE_VARIATIONS[2], inputs, image, product_info),
        );
        let images: Vec<AssetRef> = [a, b, c].into_iter().flatten().map(image_asset).collect();
        if images.is_empty() {
            return Err(PipelineError::AllVariationsFailed);
        }
        info!("✅ {} of {} style variations succeeded", images.len(), STYLE_VARIATIONS.len());
        Ok(images)
    }

    async fn edit_variation(
        &self,
        variation: &'static StyleVariation,
        inputs: &UserInputs,
        image: &ProductImage,
        product_info: &str,
    ) -> Option<ImagePayload> {
        let req = ImageRequest {
            model: self.models.image_edit.clone(),
            prompt: prompts::image_edit(variation, product_info, inputs.hook_text(), inputs.font_style()),
            input_image: Some(image.clone()),
            count: 1,
            aspect_ratio: None,
        };
        match self.service.generate_images(req).await {
            Ok(images) => {
                let first = images.into_iter().next();
                if first.is_none() {
                    warn!("⚠️ {} variation returned no image, dropping it", variation.name);
                }
                first
            }
            Err(e) => {
                warn!("⚠️ {} variation failed, dropping it: {}", variation.name, e);
                None
            }
        }
    }

    // --- text-to-image: every variation must succeed ---

    async fn generate_images(&self, inputs: &UserInputs, product_info: &str) -> Result<Vec<AssetRef>, PipelineError> {
        info!("🎨 Generating {} images at {}", STYLE_VARIATIONS.len(), inputs.format.aspect_ratio());
        let (a, b, c) = tokio::join!(
            self.generate_variation(&STYLE_VARIATIONS[0], inputs, product_info),
            self.generate_variation(&STYLE_VARIATIONS[1], inputs, product_info),
            self.generate_variation(&STYLE_VARIATIONS[2], inputs, product_info),
        );
        Ok(vec![image_asset(a?), image_asset(b?), image_asset(c?)])
    }

    async fn generate_variation(
        &self,
        variation: &'static StyleVariation,
        inputs: &UserInputs,
        product_info: &str,
    ) -> Result<ImagePayload, PipelineError> {
        let req = ImageRequest {
            model: self.models.image.clone(),
            prompt: prompts::image_generate(variation, product_info, inputs.hook_text(), inputs.font_style()),
            input_image: None,
            count: 1,
            aspect_ratio: Some(inputs.format.aspect_ratio().to_string()),
        };
        let images = self.service
            .generate_images(req)
            .await
            .map_err(|source| PipelineError::ImageGeneration { variation: variation.name, source })?;
        images
            .into_iter()
            .next()
            .ok_or(PipelineError::EmptyImageResult { variation: variation.name })
    }

    // --- video ---

    async fn generate_video(&self, inputs: &UserInputs, product_info: &str, cancel: &CancelSignal) -> Result<AssetRef, PipelineError> {
        let req = VideoRequest {
            model: self.models.video.clone(),
            prompt: prompts::video(product_info, inputs.product_image.is_some(), inputs.hook_text(), inputs.font_style()),
            input_image: inputs.product_image.clone(),
            aspect_ratio: inputs.format.video_aspect_ratio().to_string(),
        };
        let handle = self.service.start_video(req).await.map_err(PipelineError::Video)?;
        let uri = self.wait_for_video(&handle, cancel).await?;

        let video = self.service.fetch_video(&uri).await.map_err(PipelineError::VideoDownload)?;
        info!("🎬 Downloaded video ({} bytes)", video.bytes.len());
        let media_id = self.media.put(video.bytes, video.mime_type.clone());
        info!("💾 Stored video as {} ({} items in media store)", media_id, self.media.len());
        Ok(AssetRef::Video { mime_type: video.mime_type, media_id, url: MediaStore::url_for(&media_id) })
    }

    async fn wait_for_video(&self, handle: &OperationHandle, cancel: &CancelSignal) -> Result<String, PipelineError> {
        let mut cancel = cancel.clone();
        for attempt in 1..=self.poll.max_polls {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                _ = tokio::time::sleep(self.poll.interval) => {}
            }
            let status = self.service.poll_video(handle).await.map_err(PipelineError::Video)?;
            if status.done {
                info!("✅ Video operation {} finished after {} checks", handle.name, attempt);
                return status.video_uri.ok_or(PipelineError::NoVideo);
            }
            info!("⏳ Video not ready yet ({}/{})", attempt, self.poll.max_polls);
        }
        Err(PipelineError::VideoTimedOut { polls: self.poll.max_polls })
    }
}
