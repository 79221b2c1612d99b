//! Scripted in-process `GenerativeService` for tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::gemini::{
    FetchedVideo, GeminiError, GenerativeService, ImagePayload, ImageRequest, OperationHandle, TextRequest, VideoRequest,
    VideoStatus,
};
use crate::prompts;

type TextFn = dyn Fn(&TextRequest) -> Result<String, GeminiError> + Send + Sync;
type ImageFn = dyn Fn(&ImageRequest) -> Result<Vec<ImagePayload>, GeminiError> + Send + Sync;

pub const COPY_JSON: &str = r#"[
    {"headline": "Sip Smarter", "primaryText": "Keep drinks hot for hours. Ditch paper cups for good.", "cta": "Shop now"},
    {"headline": "Your Daily Cup, Upgraded", "primaryText": "Leak-proof and dishwasher safe. Built for busy mornings.", "cta": "Get yours"},
    {"headline": "Less Waste, More Coffee", "primaryText": "One cup replaces hundreds of disposables. Feel good every sip.", "cta": "Order today"}
]"#;

/// A real 4x4 PNG, for inputs that go through image normalization.
pub fn tiny_png_base64() -> String {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 4));
    let mut buf = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .expect("encode test png");
    STANDARD.encode(&buf)
}

pub fn png_payload() -> ImagePayload {
    ImagePayload { mime_type: "image/png".into(), data: "aW1hZ2U=".into() }
}

/// Default behavior: URL analysis returns a canned description, copy
/// generation returns [`COPY_JSON`], proofreading fails (so originals are
/// kept), every image request returns one PNG, and video finishes on the
/// first poll.
pub struct FakeService {
    text: Box<TextFn>,
    images: Box<ImageFn>,
    polls_until_done: u32,
    video_uri: Option<String>,
    fetch_fails: bool,
    polls: AtomicU32,
    pub text_calls: Mutex<Vec<TextRequest>>,
    pub image_calls: Mutex<Vec<ImageRequest>>,
    pub video_calls: Mutex<Vec<VideoRequest>>,
}

impl Default for FakeService {
    fn default() -> Self {
        Self {
            text: Box::new(default_text),
            images: Box::new(|_| Ok(vec![png_payload()])),
            polls_until_done: 1,
            video_uri: Some("https://files.test/video.mp4".into()),
            fetch_fails: false,
            polls: AtomicU32::new(0),
            text_calls: Mutex::new(Vec::new()),
            image_calls: Mutex::new(Vec::new()),
            video_calls: Mutex::new(Vec::new()),
        }
    }
}

fn default_text(req: &TextRequest) -> Result<String, GeminiError> {
    if req.prompt.starts_with(prompts::PROOFREAD_LEAD) {
        Err(GeminiError::Http("proofreader offline".into()))
    } else if req.prompt.starts_with(prompts::COPY_LEAD) {
        Ok(COPY_JSON.to_string())
    } else if req.prompt.starts_with(prompts::URL_LEAD) {
        Ok("EcoMug: a reusable mug that keeps coffee hot.".to_string())
    } else {
        Err(GeminiError::Parse(format!("unexpected prompt: {}", req.prompt)))
    }
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override text handling; unmatched prompts can defer to the defaults via [`FakeService::default_text`].
    pub fn with_text(mut self, f: impl Fn(&TextRequest) -> Result<String, GeminiError> + Send + Sync + 'static) -> Self {
        self.text = Box::new(f);
        self
    }

    pub fn with_images(
        mut self,
        f: impl Fn(&ImageRequest) -> Result<Vec<ImagePayload>, GeminiError> + Send + Sync + 'static,
    ) -> Self {
        self.images = Box::new(f);
        self
    }

    pub fn with_video(mut self, polls_until_done: u32, video_uri: Option<&str>) -> Self {
        self.polls_until_done = polls_until_done;
        self.video_uri = video_uri.map(str::to_string);
        self
    }

    pub fn with_failing_download(mut self) -> Self {
        self.fetch_fails = true;
        self
    }

    pub fn default_text(req: &TextRequest) -> Result<String, GeminiError> {
        default_text(req)
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl GenerativeService for FakeService {
    async fn generate_text(&self, req: TextRequest) -> Result<String, GeminiError> {
        let result = (self.text)(&req);
        self.text_calls.lock().push(req);
        result
    }

    async fn generate_images(&self, req: ImageRequest) -> Result<Vec<ImagePayload>, GeminiError> {
        let result = (self.images)(&req);
        self.image_calls.lock().push(req);
        result
    }

    async fn start_video(&self, req: VideoRequest) -> Result<OperationHandle, GeminiError> {
        self.video_calls.lock().push(req);
        Ok(OperationHandle { name: "operations/fake-video".into() })
    }

    async fn poll_video(&self, _handle: &OperationHandle) -> Result<VideoStatus, GeminiError> {
        let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        if n >= self.polls_until_done {
            Ok(VideoStatus { done: true, video_uri: self.video_uri.clone() })
        } else {
            Ok(VideoStatus::default())
        }
    }

    async fn fetch_video(&self, uri: &str) -> Result<FetchedVideo, GeminiError> {
        if self.fetch_fails {
            return Err(GeminiError::Api { status: 403, message: format!("forbidden: {uri}") });
        }
        Ok(FetchedVideo { bytes: Bytes::from_static(b"fake-mp4-bytes"), mime_type: "video/mp4".into() })
    }
}
