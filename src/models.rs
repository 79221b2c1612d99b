use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::orchestrator::PipelineState;

/// Aspect-ratio class of the requested creative.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CreativeFormat {
    #[default]
    Square,
    Horizontal,
    Vertical,
}

impl CreativeFormat {
    /// Aspect ratio sent with text-to-image requests.
    pub fn aspect_ratio(self) -> &'static str {
        match self {
            CreativeFormat::Square => "1:1",
            CreativeFormat::Horizontal => "16:9",
            CreativeFormat::Vertical => "9:16",
        }
    }

    /// Video models only render landscape or portrait.
    pub fn video_aspect_ratio(self) -> &'static str {
        match self {
            CreativeFormat::Vertical => "9:16",
            CreativeFormat::Square | CreativeFormat::Horizontal => "16:9",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CreativeType {
    #[default]
    Image,
    Video,
}

/// Uploaded product photo, base64 encoded. `data` may also be a `data:` URL.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProductImage {
    /// Optional; the type is sniffed from the bytes and this is only a fallback.
    #[serde(default)]
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct UserInputs {
    #[serde(default)]
    pub product_description: String,
    #[serde(default)]
    pub product_image: Option<ProductImage>,
    #[serde(default)]
    pub product_url: Option<String>,
    #[serde(default)]
    pub format: CreativeFormat,
    #[serde(default)]
    pub creative_type: CreativeType,
    #[serde(default)]
    pub hook_text: Option<String>,
    #[serde(default)]
    pub font_style: Option<String>, // e.g. "bold sans-serif", "handwritten"
}

impl UserInputs {
    pub fn product_url(&self) -> Option<&str> {
        non_blank(self.product_url.as_deref())
    }

    pub fn hook_text(&self) -> Option<&str> {
        non_blank(self.hook_text.as_deref())
    }

    pub fn font_style(&self) -> Option<&str> {
        non_blank(self.font_style.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdCopy {
    pub headline: String,
    pub primary_text: String,
    pub cta: String,
}

/// Where the bytes of a creative live.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AssetRef {
    Image { mime_type: String, data_base64: String },
    Video { mime_type: String, media_id: Uuid, url: String },
}

impl AssetRef {
    pub fn media_id(&self) -> Option<Uuid> {
        match self {
            AssetRef::Video { media_id, .. } => Some(*media_id),
            AssetRef::Image { .. } => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdCreative {
    pub id: Uuid,
    pub asset: AssetRef,
    #[serde(rename = "type")]
    pub creative_type: CreativeType,
    pub copy: AdCopy,
    pub variation: String,
    pub created_at: DateTime<Utc>,
}

/// A background generation tracked by the HTTP layer.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreativeRun {
    pub id: Uuid,
    pub state: PipelineState,
    pub status: String,
    pub creatives: Vec<AdCreative>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CreativeRun {
    pub fn new(id: Uuid) -> Self {
        let now = Utc::now();
        let state = PipelineState::Idle;
        Self { id, status: state.label().to_string(), state, creatives: Vec::new(), error: None, created_at: now, updated_at: now }
    }

    pub fn set_state(&mut self, state: PipelineState) {
        self.status = state.label().to_string();
        if let PipelineState::Failed { message } = &state {
            self.error = Some(message.clone());
        }
        self.state = state;
        self.updated_at = Utc::now();
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn aspect_ratio_follows_format() {
        assert_eq!(CreativeFormat::Square.aspect_ratio(), "1:1");
        assert_eq!(CreativeFormat::Horizontal.aspect_ratio(), "16:9");
        assert_eq!(CreativeFormat::Vertical.aspect_ratio(), "9:16");
    }

    #[test]
    fn video_aspect_ratio_falls_back_to_landscape() {
        assert_eq!(CreativeFormat::Square.video_aspect_ratio(), "16:9");
        assert_eq!(CreativeFormat::Vertical.video_aspect_ratio(), "9:16");
    }

    #[test]
    fn inputs_deserialize_with_defaults() {
        let inputs: UserInputs = serde_json::from_str(r#"{"product_description":"Reusable coffee cup"}"#).unwrap();
        assert_eq!(inputs.format, CreativeFormat::Square);
        assert_eq!(inputs.creative_type, CreativeType::Image);
        assert!(inputs.product_image.is_none());
        assert!(inputs.hook_text().is_none());
    }

    #[test]
    fn photo_mime_type_is_optional() {
        let inputs: UserInputs = serde_json::from_str(r#"{"product_image":{"data":"iVBORw0KGgo="}}"#).unwrap();
        let image = inputs.product_image.unwrap();
        assert_eq!(image.mime_type, "");
        assert_eq!(image.data, "iVBORw0KGgo=");
    }

    #[test]
    fn blank_optional_fields_are_ignored() {
        let inputs = UserInputs {
            product_url: Some("   ".into()),
            hook_text: Some(" Buy now ".into()),
            ..Default::default()
        };
        assert_eq!(inputs.product_url(), None);
        assert_eq!(inputs.hook_text(), Some("Buy now"));
    }

    #[test]
    fn ad_copy_uses_camel_case_on_the_wire() {
        let copy = AdCopy { headline: "H".into(), primary_text: "P".into(), cta: "C".into() };
        let value = serde_json::to_value(&copy).unwrap();
        assert_eq!(value, serde_json::json!({"headline": "H", "primaryText": "P", "cta": "C"}));
    }

    #[test]
    fn failed_run_records_error() {
        let mut run = CreativeRun::new(Uuid::new_v4());
        run.set_state(PipelineState::Failed { message: "boom".into() });
        assert!(run.is_finished());
        assert_eq!(run.error.as_deref(), Some("boom"));
    }
}
