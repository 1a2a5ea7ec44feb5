//! Scene images for AMBIANCE directives.
//!
//! Image generation runs beside the turn pipeline. A request is spawned onto
//! the runtime, the turn finishes without waiting for it, and whatever
//! resolves updates the shared [`SceneBoard`]. Failures are logged and
//! otherwise ignored.

use crate::services::UsageRecorder;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Errors from scene image generation.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Image API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse image response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Image response contained no image")]
    NoImage,

    #[error("Scene imager unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for SceneError {
    fn from(e: reqwest::Error) -> Self {
        SceneError::Network(e.to_string())
    }
}

/// Turns a scene description into an image reference (a URL or data URL).
#[async_trait]
pub trait SceneImager: Send + Sync {
    async fn generate(&self, description: &str) -> Result<String, SceneError>;
}

/// The image prompt for a scene description.
pub fn scene_prompt(description: &str) -> String {
    format!(
        "Stunning, atmospheric, high-quality fantasy digital painting of a location. \
         Scene: {description}. \
         Style: Dramatic lighting, epic fantasy art, detailed, sense of scale and mood. \
         Important: No text, no watermarks, no user interface elements, no characters \
         unless specified in the scene description."
    )
}

// ============================================================================
// Scene Board
// ============================================================================

/// A resolved scene image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneImage {
    pub description: String,
    pub url: String,
}

#[derive(Debug, Default)]
struct BoardState {
    current: Option<SceneImage>,
    /// Id of the most recently issued request.
    issued: u64,
    /// Id of the request whose image is shown.
    shown: u64,
    in_flight: usize,
}

/// Session-scoped "current scene image" slot.
///
/// By default the last request to resolve wins, even if it was issued
/// before the image already shown. With `discard_stale` an image never
/// replaces one from a newer request.
#[derive(Debug, Clone, Default)]
pub struct SceneBoard {
    state: Arc<Mutex<BoardState>>,
    discard_stale: bool,
}

impl SceneBoard {
    pub fn new(discard_stale: bool) -> Self {
        Self {
            state: Arc::default(),
            discard_stale,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn current(&self) -> Option<SceneImage> {
        self.lock().current.clone()
    }

    /// True while any request is still running.
    pub fn is_generating(&self) -> bool {
        self.lock().in_flight > 0
    }

    fn issue(&self) -> u64 {
        let mut state = self.lock();
        state.issued += 1;
        state.in_flight += 1;
        state.issued
    }

    /// Record the outcome of request `id`. Returns true if the image is now
    /// shown.
    fn resolve(&self, id: u64, image: Option<SceneImage>) -> bool {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);

        let Some(image) = image else {
            return false;
        };
        if self.discard_stale && id < state.shown {
            debug!(id, shown = state.shown, "Discarding stale scene image");
            return false;
        }
        state.current = Some(image);
        state.shown = id;
        true
    }

    /// Spawn generation of a scene image. The handle resolves to whether
    /// the image ended up on the board; callers are free to drop it.
    pub fn request(
        &self,
        imager: Arc<dyn SceneImager>,
        usage: Arc<dyn UsageRecorder>,
        description: impl Into<String>,
    ) -> JoinHandle<bool> {
        let description = description.into();
        let id = self.issue();
        let board = self.clone();
        debug!(id, %description, "Scene image requested");

        tokio::spawn(async move {
            usage.record_call();
            match imager.generate(&description).await {
                Ok(url) => {
                    let shown = board.resolve(id, Some(SceneImage { description, url }));
                    if shown {
                        info!(id, "Scene image updated");
                    }
                    shown
                }
                Err(e) => {
                    warn!(id, error = %e, "Scene image generation failed");
                    board.resolve(id, None)
                }
            }
        })
    }
}

// ============================================================================
// HTTP Imager
// ============================================================================

const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
const DEFAULT_IMAGE_SIZE: &str = "1792x1024";
const IMAGE_TIMEOUT: Duration = Duration::from_secs(90);

/// Scene imager for an OpenAI-compatible `images/generations` endpoint.
#[derive(Clone)]
pub struct HttpSceneImager {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    size: String,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: String,
    n: u32,
    size: &'a str,
    response_format: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    b64_json: Option<String>,
    url: Option<String>,
}

impl HttpSceneImager {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(IMAGE_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: None,
            model: DEFAULT_IMAGE_MODEL.to_string(),
            size: DEFAULT_IMAGE_SIZE.to_string(),
        }
    }

    /// Build from `TAVERN_IMAGE_ENDPOINT` and `TAVERN_IMAGE_API_KEY`.
    /// Returns `None` when no endpoint is configured.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("TAVERN_IMAGE_ENDPOINT").ok()?;
        let mut imager = Self::new(endpoint);
        if let Ok(key) = std::env::var("TAVERN_IMAGE_API_KEY") {
            imager = imager.with_api_key(key);
        }
        Some(imager)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }
}

#[async_trait]
impl SceneImager for HttpSceneImager {
    async fn generate(&self, description: &str) -> Result<String, SceneError> {
        let body = ImageRequest {
            model: &self.model,
            prompt: scene_prompt(description),
            n: 1,
            size: &self.size,
            response_format: "b64_json",
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(SceneError::Api { status, message });
        }

        image_reference(&response.text().await?)
    }
}

/// Pull the first image out of an images API response body.
fn image_reference(body: &str) -> Result<String, SceneError> {
    let parsed: ImageResponse = serde_json::from_str(body)?;
    let first = parsed.data.into_iter().next().ok_or(SceneError::NoImage)?;
    match (first.b64_json, first.url) {
        (Some(b64), _) if !b64.is_empty() => Ok(format!("data:image/png;base64,{b64}")),
        (_, Some(url)) if !url.is_empty() => Ok(url),
        _ => Err(SceneError::NoImage),
    }
}
