//! Camera worker
//!
//! Event-driven: sleeps until the button worker signals a capture. The
//! camera peripheral and the audio path contend for the same hardware
//! resources, so the path is suspended for the whole capture sequence
//! and reinstated before returning to IDLE.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::audio::path::AudioDirection;
use crate::constants::PATH_SETTLE_MS;
use crate::context::AppContext;
use crate::error::CameraError;
use crate::protocol::{FaultKind, Notification, OutboundMessage};
use crate::state::ClientState;

/// Filename reported for captured frames.
pub const IMAGE_FILENAME: &str = "image.jpg";

/// The camera peripheral. Initialized per capture, torn down after.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn init(&self) -> Result<(), CameraError>;

    /// Capture one frame; returns the encoded image bytes.
    async fn capture(&self) -> Result<Vec<u8>, CameraError>;

    async fn deinit(&self);
}

/// One-shot frame upload to the server.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    /// POST the frame; returns the HTTP status code.
    async fn upload(&self, frame: &[u8]) -> Result<u16, CameraError>;
}

/// HTTP uploader posting frames to the server's image endpoint.
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpUploader {
    /// Derive the upload endpoint from the link URL: same host, HTTP
    /// scheme, `/image` path with the session id attached.
    pub fn new(link_url: &str, token: &str, session: &str) -> Self {
        let base = http_base(link_url);
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{base}/image?session={session}"),
            token: token.to_string(),
        }
    }
}

fn http_base(link_url: &str) -> String {
    let swapped = if let Some(rest) = link_url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = link_url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        link_url.to_string()
    };
    swapped.trim_end_matches("/ws").to_string()
}

#[async_trait]
impl ImageUploader for HttpUploader {
    async fn upload(&self, frame: &[u8]) -> Result<u16, CameraError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, self.token.as_str())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(frame.to_vec())
            .send()
            .await
            .map_err(|e| CameraError::UploadFailed(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

/// Camera worker loop. Runs until shutdown.
pub async fn run(
    ctx: Arc<AppContext>,
    camera: Option<Arc<dyn CameraDevice>>,
    uploader: Arc<dyn ImageUploader>,
) {
    tracing::info!(supported = camera.is_some(), "camera worker started");

    loop {
        // Timed wait so SHUTDOWN is observed even without a wake signal.
        if timeout(Duration::from_millis(200), ctx.camera_wake.notified())
            .await
            .is_err()
        {
            if ctx.state.is_shutdown() {
                break;
            }
            continue;
        }
        if ctx.state.is_shutdown() {
            break;
        }
        if ctx.state.snapshot() != ClientState::CameraCapture {
            continue; // stale wake
        }

        tracing::info!("starting camera capture sequence");

        // A racing transition back into RECORDING must be drained first.
        if ctx.state.snapshot() == ClientState::Recording {
            ctx.state.set(ClientState::Processing).await;
            sleep(Duration::from_millis(PATH_SETTLE_MS)).await;
        }

        // Hand the shared hardware over to the camera.
        if let Err(err) = ctx.audio.suspend().await {
            tracing::error!(%err, "failed to suspend audio path before capture");
        }
        sleep(Duration::from_millis(PATH_SETTLE_MS)).await;

        let Some(camera) = camera.as_ref() else {
            ctx.report_fault(FaultKind::CameraNotSupported, "no camera device attached")
                .await;
            finish(&ctx).await;
            continue;
        };

        if let Err(err) = camera.init().await {
            tracing::error!(%err, "camera init failed");
            ctx.report_fault(FaultKind::CameraInitFailed, &err.to_string())
                .await;
            finish(&ctx).await;
            continue;
        }

        let frame = match camera.capture().await {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(%err, "frame capture failed");
                ctx.report_fault(FaultKind::CameraCaptureFailed, &err.to_string())
                    .await;
                camera.deinit().await;
                finish(&ctx).await;
                continue;
            }
        };

        tracing::info!(size = frame.len(), "image captured");
        ctx.enqueue_outbound(OutboundMessage::Control(Notification::ImageCaptured {
            filename: IMAGE_FILENAME.to_string(),
            size: frame.len(),
        }))
        .await;

        match uploader.upload(&frame).await {
            Ok(200) => {
                tracing::info!("image uploaded");
                ctx.enqueue_outbound(OutboundMessage::Control(Notification::ImageReceived {
                    filename: IMAGE_FILENAME.to_string(),
                }))
                .await;
            }
            Ok(status) => tracing::error!(status, "image upload rejected"),
            Err(err) => tracing::error!(%err, "image upload failed"),
        }

        drop(frame);
        camera.deinit().await;
        sleep(Duration::from_millis(PATH_SETTLE_MS)).await;
        finish(&ctx).await;
        tracing::info!("camera capture sequence complete");
    }

    tracing::info!("camera worker stopped");
}

/// Reinstate the audio path and return to IDLE. The microphone direction
/// is the resting configuration.
async fn finish(ctx: &AppContext) {
    if let Err(err) = ctx.audio.configure(AudioDirection::Capture).await {
        tracing::warn!(%err, "failed to reinstate audio path after capture");
    }
    ctx.state.set(ClientState::Idle).await;
}
