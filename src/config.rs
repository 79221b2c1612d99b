use std::time::Duration;

use crate::assets::PollPolicy;
use crate::product_image::DEFAULT_MAX_DIMENSION;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Request bodies carry base64 product photos, so this sits well above axum's 2 MB default.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// How long finished runs and their stored media stay available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub ttl: Duration,
    pub max_runs: usize,
}

impl Default for Retention {
    fn default() -> Self {
        Self { ttl: Duration::from_secs(3600), max_runs: 200 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub text: String,
    pub image: String,
    pub image_edit: String,
    pub video: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            text: "gemini-2.5-flash".into(),
            image: "imagen-4.0-generate-001".into(),
            image_edit: "gemini-2.5-flash-image-preview".into(),
            video: "veo-3.0-generate-preview".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub api_base: String,
    pub port: u16,
    pub models: ModelConfig,
    pub video_poll: PollPolicy,
    pub max_image_dimension: u32,
    pub max_upload_bytes: usize,
    pub retention: Retention,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str, default: &str| get(key).filter(|v| !v.trim().is_empty()).unwrap_or_else(|| default.to_string());
        let defaults = ModelConfig::default();
        let policy = PollPolicy::default();
        let retention = Retention::default();

        Self {
            api_key: get("GEMINI_API_KEY").unwrap_or_default(),
            api_base: text("GEMINI_API_BASE", DEFAULT_API_BASE),
            port: get("PORT").and_then(|v| v.parse().ok()).unwrap_or(8080),
            models: ModelConfig {
                text: text("GEMINI_TEXT_MODEL", &defaults.text),
                image: text("GEMINI_IMAGE_MODEL", &defaults.image),
                image_edit: text("GEMINI_IMAGE_EDIT_MODEL", &defaults.image_edit),
                video: text("GEMINI_VIDEO_MODEL", &defaults.video),
            },
            video_poll: PollPolicy {
                interval: get("VIDEO_POLL_INTERVAL_SECS")
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(policy.interval),
                max_polls: get("VIDEO_MAX_POLLS").and_then(|v| v.parse().ok()).unwrap_or(policy.max_polls),
            },
            max_image_dimension: get("MAX_IMAGE_DIMENSION").and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_MAX_DIMENSION),
            max_upload_bytes: get("MAX_UPLOAD_BYTES").and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            retention: Retention {
                ttl: get("RUN_TTL_SECS")
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(retention.ttl),
                max_runs: get("MAX_RETAINED_RUNS").and_then(|v| v.parse().ok()).unwrap_or(retention.max_runs),
            },
        }
    }
}
