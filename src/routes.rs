use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::{collections::{HashMap, HashSet}, sync::Arc};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::{
    cancel::{cancel_pair, CancelHandle, CancelSignal},
    config::{Retention, DEFAULT_MAX_UPLOAD_BYTES},
    error::PipelineError,
    media::MediaStore,
    models::{AdCreative, CreativeRun, UserInputs},
    orchestrator::{CreativePipeline, PipelineState},
};

#[derive(Clone)]
pub struct AppState {
    pub runs: Arc<RwLock<HashMap<Uuid, CreativeRun>>>,
    pub cancels: Arc<RwLock<HashMap<Uuid, CancelHandle>>>,
    pub media: MediaStore,
    pub pipeline: Arc<CreativePipeline>,
    pub max_upload_bytes: usize,
    pub retention: Retention,
}

impl AppState {
    pub fn new(pipeline: CreativePipeline, media: MediaStore) -> Self {
        Self {
            runs: Arc::default(),
            cancels: Arc::default(),
            media,
            pipeline: Arc::new(pipeline),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            retention: Retention::default(),
        }
    }

    pub fn with_limits(mut self, max_upload_bytes: usize, retention: Retention) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self.retention = retention;
        self
    }

    /// Forget finished runs past their TTL, then the oldest finished runs
    /// beyond `max_runs`, releasing their videos. Media no remaining run
    /// points at is dropped once it is older than the TTL. Runs still in
    /// progress are never touched. Returns the number of runs evicted.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.retention.ttl;
        let is_stale = |at: DateTime<Utc>| (now - at).to_std().is_ok_and(|age| age > ttl);

        let mut runs = self.runs.write();
        let mut evicted: Vec<Uuid> = Vec::new();
        let mut kept: Vec<(DateTime<Utc>, Uuid)> = Vec::new();
        for run in runs.values().filter(|run| run.is_finished()) {
            if is_stale(run.updated_at) {
                evicted.push(run.id);
            } else {
                kept.push((run.updated_at, run.id));
            }
        }
        if kept.len() > self.retention.max_runs {
            kept.sort();
            let excess = kept.len() - self.retention.max_runs;
            evicted.extend(kept[..excess].iter().map(|(_, id)| *id));
        }

        let mut released = Vec::new();
        for id in &evicted {
            if let Some(run) = runs.remove(id) {
                released.extend(run.creatives.iter().filter_map(|c| c.asset.media_id()));
            }
        }
        let referenced: HashSet<Uuid> = runs
            .values()
            .flat_map(|run| run.creatives.iter().filter_map(|c| c.asset.media_id()))
            .collect();
        drop(runs);

        for id in &released {
            self.media.remove(id);
        }
        let orphans = self.media.prune(|id, media| !referenced.contains(id) && is_stale(media.stored_at));

        if !evicted.is_empty() || orphans > 0 {
            tracing::info!("🧹 Evicted {} run(s), {} video(s) and {} orphaned media item(s)", evicted.len(), released.len(), orphans);
        }
        evicted.len()
    }
}

/// JSON error body: `{"error": "..."}`.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            PipelineError::Cancelled => StatusCode::CONFLICT,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let max_upload_bytes = state.max_upload_bytes;
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/creatives", post(generate_creatives))
        .route("/api/runs", post(start_run))
        .route("/api/runs/:id", get(get_run))
        .route("/api/runs/:id/cancel", post(cancel_run))
        .route("/api/media/:id", get(get_media))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

/// Run the whole pipeline inside the request.
pub async fn generate_creatives(State(state): State<AppState>, Json(body): Json<UserInputs>) -> Result<Json<Vec<AdCreative>>, ApiError> {
    tracing::info!("🚀 Generating {:?} creatives ({:?})", body.creative_type, body.format);
    state.sweep(Utc::now());
    let creatives = state.pipeline
        .run(body, CancelSignal::never(), |s| tracing::info!("⏳ {}", s.label()))
        .await?;
    Ok(Json(creatives))
}

/// Start a background run and return immediately; poll `GET /api/runs/:id` for progress.
pub async fn start_run(State(state): State<AppState>, Json(body): Json<UserInputs>) -> (StatusCode, Json<CreativeRun>) {
    state.sweep(Utc::now());
    let id = Uuid::new_v4();
    let run = CreativeRun::new(id);
    let (handle, signal) = cancel_pair();
    state.runs.write().insert(id, run.clone());
    state.cancels.write().insert(id, handle);

    tracing::info!("🎯 Starting run {} ({:?})", id, body.creative_type);
    let task_state = state.clone();
    tokio::spawn(async move {
        let runs = task_state.runs.clone();
        let result = task_state.pipeline
            .run(body, signal, move |s| {
                // terminal states are written below together with the result
                if s.is_terminal() {
                    return;
                }
                if let Some(run) = runs.write().get_mut(&id) {
                    run.set_state(s.clone());
                }
            })
            .await;

        task_state.cancels.write().remove(&id);
        if let Some(run) = task_state.runs.write().get_mut(&id) {
            match result {
                Ok(creatives) => {
                    let count = creatives.len();
                    run.creatives = creatives;
                    run.set_state(PipelineState::Done { count });
                }
                Err(e) => run.set_state(PipelineState::Failed { message: e.to_string() }),
            }
        }
        tracing::info!("✅ Run {} finished", id);
    });

    (StatusCode::ACCEPTED, Json(run))
}

pub async fn get_run(Path(id): Path<Uuid>, State(state): State<AppState>) -> Response {
    if let Some(run) = state.runs.read().get(&id).cloned() { Json(run).into_response() } else { StatusCode::NOT_FOUND.into_response() }
}

pub async fn cancel_run(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let finished = state.runs
        .read()
        .get(&id)
        .map(CreativeRun::is_finished)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "unknown run"))?;
    if finished {
        return Err(ApiError::new(StatusCode::CONFLICT, "run already finished"));
    }
    if let Some(handle) = state.cancels.read().get(&id) {
        handle.cancel();
    }
    tracing::info!("🛑 Cancellation requested for run {}", id);
    Ok(StatusCode::ACCEPTED)
}

pub async fn get_media(Path(id): Path<Uuid>, State(state): State<AppState>) -> Response {
    match state.media.get(&id) {
        Some(media) => ([(header::CONTENT_TYPE, media.mime_type)], media.bytes).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::PollPolicy;
    use crate::config::ModelConfig;
    use crate::gemini::GeminiError;
    use crate::models::{AdCopy, AssetRef, CreativeType};
    use crate::testing::FakeService;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use bytes::Bytes;
    use base64::Engine;
    use image::{ImageFormat, Rgb, RgbImage};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state_with(fake: FakeService) -> AppState {
        state_with_polls(fake, 10)
    }

    fn state_with_polls(fake: FakeService, max_polls: u32) -> AppState {
        let media = MediaStore::default();
        let poll = PollPolicy { interval: Duration::from_millis(1), max_polls };
        let pipeline = CreativePipeline::new(Arc::new(fake), ModelConfig::default(), media.clone(), poll, 1024);
        AppState::new(pipeline, media)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn wait_until_finished(app: &Router, id: &str) -> CreativeRun {
        for _ in 0..200 {
            let response = app.clone().oneshot(Request::get(format!("/api/runs/{id}")).body(Body::empty()).unwrap()).await.unwrap();
            let run: CreativeRun = serde_json::from_value(body_json(response).await).unwrap();
            if run.is_finished() {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("run {id} did not finish");
    }

    #[tokio::test]
    async fn sync_generation_returns_creatives() {
        let app = router(state_with(FakeService::new()));
        let response = app
            .oneshot(post_json("/api/creatives", json!({"product_description": "Reusable coffee cup", "format": "square", "creative_type": "image"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let creatives = body.as_array().unwrap();
        assert_eq!(creatives.len(), 3);
        assert_eq!(creatives[0]["type"], "image");
        assert_eq!(creatives[0]["asset"]["kind"], "image");
        assert_eq!(creatives[0]["copy"]["primaryText"], "Keep drinks hot for hours. Ditch paper cups for good.");
    }

    #[tokio::test]
    async fn sync_failure_is_a_single_error_message() {
        let app = router(state_with(FakeService::new().with_images(|_| Err(GeminiError::Http("quota".into())))));
        let response = app
            .oneshot(post_json("/api/creatives", json!({"product_description": "Cup"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("quota"));
    }

    #[tokio::test]
    async fn bad_photo_is_a_client_error() {
        let app = router(state_with(FakeService::new()));
        let response = app
            .oneshot(post_json("/api/creatives", json!({"product_image": {"mime_type": "image/png", "data": "???"}})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn background_run_reaches_done() {
        let app = router(state_with(FakeService::new()));
        let response = app.clone().oneshot(post_json("/api/runs", json!({"product_description": "Cup"}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let started: CreativeRun = serde_json::from_value(body_json(response).await).unwrap();

        let run = wait_until_finished(&app, &started.id.to_string()).await;
        assert_eq!(run.state, PipelineState::Done { count: 3 });
        assert_eq!(run.status, "Done");
        assert_eq!(run.creatives.len(), 3);
        assert!(run.error.is_none());
    }

    #[tokio::test]
    async fn background_video_run_serves_media() {
        let state = state_with(FakeService::new().with_video(2, Some("https://files.test/v.mp4")));
        let app = router(state);
        let response = app.clone()
            .oneshot(post_json("/api/runs", json!({"product_description": "Cup", "creative_type": "video"})))
            .await
            .unwrap();
        let started: CreativeRun = serde_json::from_value(body_json(response).await).unwrap();
        let run = wait_until_finished(&app, &started.id.to_string()).await;

        assert_eq!(run.creatives.len(), 1);
        assert_eq!(run.creatives[0].creative_type, CreativeType::Video);
        let url = match &run.creatives[0].asset {
            crate::models::AssetRef::Video { url, .. } => url.clone(),
            other => panic!("unexpected asset {other:?}"),
        };

        let response = app.oneshot(Request::get(url).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"fake-mp4-bytes"));
    }

    #[tokio::test]
    async fn cancelled_run_reports_failure() {
        let state = state_with_polls(FakeService::new().with_video(u32::MAX, None), 10_000);
        let app = router(state);
        let response = app.clone()
            .oneshot(post_json("/api/runs", json!({"product_description": "Cup", "creative_type": "video"})))
            .await
            .unwrap();
        let started: CreativeRun = serde_json::from_value(body_json(response).await).unwrap();
        let id = started.id.to_string();

        let response = app.clone().oneshot(Request::post(format!("/api/runs/{id}/cancel")).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let run = wait_until_finished(&app, &id).await;
        assert_eq!(run.error.as_deref(), Some("Generation was cancelled"));
        assert!(run.creatives.is_empty());

        let response = app.oneshot(Request::post(format!("/api/runs/{id}/cancel")).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    /// A PNG of pseudo-random pixels, so compression cannot shrink it.
    fn noisy_png_base64(side: u32) -> String {
        let mut seed: u32 = 0x9e37_79b9;
        let img = RgbImage::from_fn(side, side, |_, _| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let [r, g, b, _] = seed.to_le_bytes();
            Rgb([r, g, b])
        });
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        base64::engine::general_purpose::STANDARD.encode(&buf)
    }

    #[tokio::test]
    async fn phone_sized_photo_is_accepted() {
        let photo = noisy_png_base64(900);
        assert!(photo.len() > 2 * 1024 * 1024, "photo is only {} bytes", photo.len());

        let app = router(state_with(FakeService::new()));
        let response = app
            .oneshot(post_json("/api/creatives", json!({
                "product_description": "Reusable coffee cup",
                "product_image": {"mime_type": "image/png", "data": photo},
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let creatives = body_json(response).await;
        assert_eq!(creatives.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn bodies_over_the_configured_limit_are_rejected() {
        let state = state_with(FakeService::new()).with_limits(1024, Retention::default());
        let app = router(state);
        let response = app
            .oneshot(post_json("/api/creatives", json!({"product_description": "x".repeat(4096)})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    fn finished_run(state: &AppState, finished_at: DateTime<Utc>, video: Option<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        let mut run = CreativeRun::new(id);
        if let Some(media_id) = video {
            run.creatives.push(AdCreative {
                id: Uuid::new_v4(),
                asset: AssetRef::Video { mime_type: "video/mp4".into(), media_id, url: MediaStore::url_for(&media_id) },
                creative_type: CreativeType::Video,
                copy: AdCopy { headline: "h".into(), primary_text: "p".into(), cta: "Shop Now".into() },
                variation: "Video Ad".into(),
                created_at: finished_at,
            });
        }
        run.set_state(PipelineState::Done { count: run.creatives.len() });
        run.updated_at = finished_at;
        state.runs.write().insert(id, run);
        id
    }

    #[test]
    fn sweep_drops_expired_runs_and_their_videos() {
        let retention = Retention { ttl: Duration::from_secs(60), max_runs: 100 };
        let state = state_with(FakeService::new()).with_limits(DEFAULT_MAX_UPLOAD_BYTES, retention);
        let now = Utc::now();
        let old_video = state.media.put(Bytes::from_static(b"old"), "video/mp4");
        let fresh_video = state.media.put(Bytes::from_static(b"new"), "video/mp4");

        let old = finished_run(&state, now - chrono::Duration::seconds(120), Some(old_video));
        let fresh = finished_run(&state, now - chrono::Duration::seconds(10), Some(fresh_video));
        let running = Uuid::new_v4();
        let mut in_progress = CreativeRun::new(running);
        in_progress.updated_at = now - chrono::Duration::seconds(600);
        state.runs.write().insert(running, in_progress);

        assert_eq!(state.sweep(now), 1);
        let runs = state.runs.read();
        assert!(!runs.contains_key(&old));
        assert!(runs.contains_key(&fresh));
        assert!(runs.contains_key(&running));
        assert!(state.media.get(&old_video).is_none());
        assert!(state.media.get(&fresh_video).is_some());
    }

    #[test]
    fn sweep_caps_the_number_of_finished_runs() {
        let retention = Retention { ttl: Duration::from_secs(3600), max_runs: 2 };
        let state = state_with(FakeService::new()).with_limits(DEFAULT_MAX_UPLOAD_BYTES, retention);
        let now = Utc::now();
        let ids: Vec<Uuid> = (0..4)
            .map(|age| finished_run(&state, now - chrono::Duration::seconds(40 - age * 10), None))
            .collect();

        assert_eq!(state.sweep(now), 2);
        let runs = state.runs.read();
        assert!(!runs.contains_key(&ids[0]));
        assert!(!runs.contains_key(&ids[1]));
        assert!(runs.contains_key(&ids[2]));
        assert!(runs.contains_key(&ids[3]));
    }

    #[test]
    fn sweep_only_prunes_unreferenced_media_past_the_ttl() {
        let retention = Retention { ttl: Duration::from_secs(60), max_runs: 100 };
        let state = state_with(FakeService::new()).with_limits(DEFAULT_MAX_UPLOAD_BYTES, retention);
        let orphan = state.media.put(Bytes::from_static(b"sync"), "video/mp4");
        let referenced = state.media.put(Bytes::from_static(b"run"), "video/mp4");
        finished_run(&state, Utc::now(), Some(referenced));

        assert_eq!(state.sweep(Utc::now()), 0);
        assert!(state.media.get(&orphan).is_some());

        let later = Utc::now() + chrono::Duration::seconds(61);
        state.runs.write().values_mut().for_each(|run| run.updated_at = later);
        state.sweep(later);
        assert!(state.media.get(&orphan).is_none());
        assert!(state.media.get(&referenced).is_some());
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let app = router(state_with(FakeService::new()));
        let id = Uuid::new_v4();
        for request in [
            Request::get(format!("/api/runs/{id}")).body(Body::empty()).unwrap(),
            Request::post(format!("/api/runs/{id}/cancel")).body(Body::empty()).unwrap(),
            Request::get(format!("/api/media/{id}")).body(Body::empty()).unwrap(),
        ] {
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }
}
