use chrono::Utc;
use uuid::Uuid;

use crate::assets::STYLE_VARIATIONS;
use crate::models::{AdCopy, AdCreative, AssetRef, CreativeType};

pub const VIDEO_LABEL: &str = "Video Ad";

/// Pair generated assets with ad copy.
///
/// A video asset yields a single creative with the first copy variant.
/// Images are labeled by position and take copy `index % copies.len()`,
/// so fewer copies than images are reused rather than rejected.
pub fn assemble(assets: Vec<AssetRef>, copies: &[AdCopy]) -> Vec<AdCreative> {
    if copies.is_empty() {
        return Vec::new();
    }

    if let Some(video) = assets.iter().find(|a| matches!(a, AssetRef::Video { .. })) {
        return vec![creative(video.clone(), CreativeType::Video, copies[0].clone(), VIDEO_LABEL.to_string())];
    }

    assets
        .into_iter()
        .enumerate()
        .map(|(i, asset)| {
            let label = STYLE_VARIATIONS[i % STYLE_VARIATIONS.len()].label.to_string();
            creative(asset, CreativeType::Image, copies[i % copies.len()].clone(), label)
        })
        .collect()
}

fn creative(asset: AssetRef, creative_type: CreativeType, copy: AdCopy, variation: String) -> AdCreative {
    AdCreative { id: Uuid::new_v4(), asset, creative_type, copy, variation, created_at: Utc::now() }
}
