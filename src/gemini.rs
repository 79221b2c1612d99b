use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use reqwest::Client;
use tracing::{debug, info, error};

use crate::models::ProductImage;

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")] Http(String),
    #[error("API error (status {status}): {message}")] Api { status: u16, message: String },
    #[error("Parse error: {0}")] Parse(String),
    #[error("Empty response: {0}")] Empty(String),
    #[error("Operation failed: {0}")] Operation(String),
}

#[derive(Debug, Clone)]
pub struct TextRequest {
    pub model: String,
    pub prompt: String,
    /// When set the model must answer with JSON matching this schema.
    pub response_schema: Option<Value>,
    /// Let the model fetch URLs mentioned in the prompt.
    pub url_context: bool,
}

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub input_image: Option<ProductImage>,
    pub count: u32,
    pub aspect_ratio: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone)]
pub struct VideoRequest {
    pub model: String,
    pub prompt: String,
    pub input_image: Option<ProductImage>,
    pub aspect_ratio: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VideoStatus {
    pub done: bool,
    pub video_uri: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FetchedVideo {
    pub bytes: Bytes,
    pub mime_type: String,
}

/// The capabilities the pipeline needs from a generative backend.
#[async_trait]
pub trait GenerativeService: Send + Sync {
    async fn generate_text(&self, req: TextRequest) -> Result<String, GeminiError>;
    /// Returns an empty list when the model answered without any image.
    async fn generate_images(&self, req: ImageRequest) -> Result<Vec<ImagePayload>, GeminiError>;
    async fn start_video(&self, req: VideoRequest) -> Result<OperationHandle, GeminiError>;
    async fn poll_video(&self, handle: &OperationHandle) -> Result<VideoStatus, GeminiError>;
    async fn fetch_video(&self, uri: &str) -> Result<FetchedVideo, GeminiError>;
}

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" || key == "bytesBase64Encoded" {
                    if let Value::String(s) = val {
                        if s.len() > 100 && s.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=' | b'-' | b'_')) {
                            *val = Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

fn text_body(req: &TextRequest) -> Value {
    let mut body = json!({
        "contents": [{
            "parts": [{"text": req.prompt}]
        }]
    });
    if req.url_context {
        body["tools"] = json!([{ "url_context": {} }]);
    }
    if let Some(schema) = &req.response_schema {
        body["generationConfig"] = json!({
            "responseMimeType": "application/json",
            "responseSchema": schema
        });
    }
    body
}

fn loggable(value: &Value) -> String {
    let mut copy = value.clone();
    truncate_base64_in_json(&mut copy);
    serde_json::to_string(&copy).unwrap_or_default()
}

/// Pull `error.message` out of a Google API error body when there is one.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn inline_image_part(image: &ProductImage) -> Value {
    json!({ "inlineData": { "mimeType": image.mime_type, "data": image.data } })
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}?key={}", self.base_url, model, method, self.api_key)
    }

    fn redact(&self, url: &str) -> String {
        if self.api_key.is_empty() { url.to_string() } else { url.replace(&self.api_key, "***") }
    }

    fn with_key(&self, uri: &str) -> String {
        let sep = if uri.contains('?') { '&' } else { '?' };
        format!("{uri}{sep}key={}", self.api_key)
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(&self, response: reqwest::Response) -> Result<T, GeminiError> {
        let status = response.status();
        let body = response.text().await.map_err(|e| GeminiError::Http(e.to_string()))?;
        if !status.is_success() {
            error!("❌ API Error response ({}): {}", status, body);
            return Err(GeminiError::Api { status: status.as_u16(), message: error_message(&body) });
        }
        if tracing::enabled!(tracing::Level::DEBUG) {
            match serde_json::from_str::<Value>(&body) {
                Ok(value) => debug!("📥 Response: {}", loggable(&value)),
                Err(_) => debug!("📥 Response (non-JSON, {} bytes)", body.len()),
            }
        }
        serde_json::from_str(&body).map_err(|e| GeminiError::Parse(e.to_string()))
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(&self, url: &str, body: &Value) -> Result<T, GeminiError> {
        info!("🔗 POST {}", self.redact(url));
        debug!("📤 Request body: {}", loggable(body));

        let response = self.client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string()))?;
        self.read_json(response).await
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, GeminiError> {
        debug!("🔗 GET {}", self.redact(url));
        let response = self.client
            .get(url)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string()))?;
        self.read_json(response).await
    }

    async fn edit_image(&self, req: &ImageRequest, image: &ProductImage) -> Result<Vec<ImagePayload>, GeminiError> {
        let body = json!({
            "contents": [{
                "parts": [inline_image_part(image), {"text": req.prompt}]
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE", "TEXT"],
                "candidateCount": req.count.max(1)
            }
        });
        let parsed: GeminiResponse = self.post_json(&self.model_url(&req.model, "generateContent"), &body).await?;
        Ok(extract_images(&parsed))
    }

    async fn imagen_generate(&self, req: &ImageRequest) -> Result<Vec<ImagePayload>, GeminiError> {
        let mut parameters = json!({ "sampleCount": req.count.max(1) });
        if let Some(ratio) = &req.aspect_ratio {
            parameters["aspectRatio"] = json!(ratio);
        }
        let body = json!({
            "instances": [{ "prompt": req.prompt }],
            "parameters": parameters
        });
        let parsed: PredictResponse = self.post_json(&self.model_url(&req.model, "predict"), &body).await?;
        Ok(parsed.predictions
            .into_iter()
            .filter_map(|p| p.bytes_base64_encoded.map(|data| ImagePayload {
                mime_type: p.mime_type.unwrap_or_else(|| "image/png".to_string()),
                data,
            }))
            .collect())
    }
}

#[async_trait]
impl GenerativeService for GeminiClient {
    async fn generate_text(&self, req: TextRequest) -> Result<String, GeminiError> {
        let body = text_body(&req);
        let parsed: GeminiResponse = self.post_json(&self.model_url(&req.model, "generateContent"), &body).await?;
        let text = extract_text(&parsed);
        if text.trim().is_empty() {
            return Err(GeminiError::Empty("no text content in response".into()));
        }
        Ok(text.trim().to_string())
    }

    async fn generate_images(&self, req: ImageRequest) -> Result<Vec<ImagePayload>, GeminiError> {
        let images = match &req.input_image {
            Some(image) => self.edit_image(&req, image).await?,
            None => self.imagen_generate(&req).await?,
        };
        info!("🖼️ {} returned {} image(s)", req.model, images.len());
        Ok(images)
    }

    async fn start_video(&self, req: VideoRequest) -> Result<OperationHandle, GeminiError> {
        let mut instance = json!({ "prompt": req.prompt });
        if let Some(image) = &req.input_image {
            instance["image"] = json!({ "bytesBase64Encoded": image.data, "mimeType": image.mime_type });
        }
        let body = json!({
            "instances": [instance],
            "parameters": { "aspectRatio": req.aspect_ratio }
        });
        let op: OperationResponse = self.post_json(&self.model_url(&req.model, "predictLongRunning"), &body).await?;
        info!("🎬 Video operation started: {}", op.name);
        Ok(OperationHandle { name: op.name })
    }

    async fn poll_video(&self, handle: &OperationHandle) -> Result<VideoStatus, GeminiError> {
        let url = format!("{}/{}?key={}", self.base_url, handle.name, self.api_key);
        let op: OperationResponse = self.get_json(&url).await?;
        if let Some(err) = op.error {
            return Err(GeminiError::Operation(format!("code {}: {}", err.code, err.message)));
        }
        let video_uri = op.response
            .and_then(|r| r.generate_video_response)
            .and_then(|r| r.generated_samples.into_iter().next())
            .map(|s| s.video.uri);
        Ok(VideoStatus { done: op.done, video_uri })
    }

    async fn fetch_video(&self, uri: &str) -> Result<FetchedVideo, GeminiError> {
        let url = self.with_key(uri);
        info!("⬇️ Downloading video from {}", self.redact(&url));
        let response = self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeminiError::Api { status: status.as_u16(), message: error_message(&body) });
        }
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("video/"))
            .unwrap_or("video/mp4")
            .to_string();
        let bytes = response.bytes().await.map_err(|e| GeminiError::Http(e.to_string()))?;
        if bytes.is_empty() {
            return Err(GeminiError::Empty("video download returned no bytes".into()));
        }
        Ok(FetchedVideo { bytes, mime_type })
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData
    },
    Text { text: String },
    Other(Value)
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    name: String,
    #[serde(default)]
    done: bool,
    response: Option<OperationResult>,
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResult {
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample { video: VideoFile }

#[derive(Debug, Deserialize)]
struct VideoFile { uri: String }

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

fn extract_text(resp: &GeminiResponse) -> String {
    resp.candidates
        .first()
        .map(|c| c.content.parts.iter()
            .filter_map(|p| match p { Part::Text { text } => Some(text.as_str()), _ => None })
            .collect::<Vec<_>>()
            .join(""))
        .unwrap_or_default()
}

fn extract_images(resp: &GeminiResponse) -> Vec<ImagePayload> {
    let mut images = Vec::new();
    for c in &resp.candidates {
        for p in &c.content.parts {
            if let Part::Inline { inline_data } = p {
                if inline_data.mime_type.starts_with("image/") {
                    images.push(ImagePayload { mime_type: inline_data.mime_type.clone(), data: inline_data.data.clone() });
                }
            }
        }
    }
    if images.is_empty() {
        info!("⚠️ No inline image data found in response structure");
    }
    images
}
