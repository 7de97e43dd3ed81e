//! Edge voice device client
//!
//! Wires the control core to desktop collaborators: cpal audio in place
//! of the I2S bus, a console-driven virtual button in place of GPIO, and
//! a WebSocket link to the assistant server.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use edge_voice_client::{
    audio::{self, CpalAudioPath, SharedAudioPath},
    button::{self, ButtonInput, VirtualButton},
    camera::{self, CameraDevice, HttpUploader, ImageUploader},
    config::AppConfig,
    context::AppContext,
    discovery::{EndpointResolver, ProbeResolver},
    indicator::{self, StatusIndicator, TraceIndicator},
    link::{self, LinkTransport, WsTransport},
    state::ClientState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting edge voice client");

    let config = AppConfig::load()?;

    // Resolve the server endpoint: static configuration wins, otherwise
    // probe the local network for one.
    let endpoint = match &config.link.endpoint {
        Some(url) => url.clone(),
        None => {
            let resolver = ProbeResolver::new(
                config.discovery.candidates.clone(),
                config.discovery.port,
                Duration::from_millis(config.discovery.probe_timeout_ms),
                config.discovery.marker.clone(),
            );
            resolver.resolve().await?
        }
    };
    tracing::info!(%endpoint, "server endpoint resolved");

    let audio_path = SharedAudioPath::new(Box::new(CpalAudioPath::new(config.audio.sample_rate)));
    let (ctx, channels) = AppContext::new(config.clone(), audio_path, endpoint.clone());
    tracing::info!(session = ctx.session.id(), "session created");

    let (event_tx, event_rx) = mpsc::channel(32);
    let transport: Arc<dyn LinkTransport> = Arc::new(WsTransport::new(
        endpoint.clone(),
        config.link.auth_token.clone(),
        event_tx,
    ));

    let uploader: Arc<dyn ImageUploader> = Arc::new(HttpUploader::new(
        &endpoint,
        &config.link.auth_token,
        ctx.session.id(),
    ));
    // No camera peripheral on a development host; captures report
    // camera_not_supported until a device implementation is injected.
    let camera_device: Option<Arc<dyn CameraDevice>> = None;

    let button_input = Arc::new(VirtualButton::new());
    let indicator_out: Arc<dyn StatusIndicator> = Arc::new(TraceIndicator::new());

    // Spawn the worker set.
    tokio::spawn(audio::capture::run(ctx.clone()));
    tokio::spawn(audio::send::run(ctx.clone(), channels.send_rx));
    tokio::spawn(audio::playback::run(ctx.clone(), channels.playback_rx));
    tokio::spawn(link::dispatcher::run_writer(
        ctx.clone(),
        transport.clone(),
        channels.outbound_rx,
    ));
    tokio::spawn(link::dispatcher::run_dispatch(
        ctx.clone(),
        transport.clone(),
        event_rx,
    ));
    tokio::spawn(camera::run(ctx.clone(), camera_device, uploader));
    let button_dyn: Arc<dyn ButtonInput> = button_input.clone();
    tokio::spawn(button::run(ctx.clone(), button_dyn));
    tokio::spawn(indicator::run(ctx.clone(), indicator_out, channels.alert_rx));

    spawn_console_input(button_input);
    tracing::info!("workers running (enter = press, c = double press, q = long press)");

    // Initial connect; on failure fall into the same backoff loop the
    // dispatcher uses after a link loss.
    if let Err(err) = transport.connect().await {
        tracing::warn!(%err, "initial connect failed, retrying in background");
        let retry_ctx = ctx.clone();
        let retry_transport = transport.clone();
        tokio::spawn(async move {
            retry_ctx.state.set(ClientState::Stalled).await;
            link::dispatcher::reconnect(&retry_ctx, retry_transport.as_ref()).await;
        });
    }

    // Wait for shutdown: button long press or interrupt.
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, shutting down");
                if ctx.state.snapshot() == ClientState::Recording {
                    ctx.state.set(ClientState::Processing).await;
                }
                ctx.state.set(ClientState::Shutdown).await;
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if ctx.state.is_shutdown() {
                    break;
                }
            }
        }
    }

    // Give workers a moment to observe SHUTDOWN and release buffers.
    tokio::time::sleep(Duration::from_millis(500)).await;
    tracing::info!("client stopped");
    Ok(())
}

/// Console stand-in for the physical button.
fn spawn_console_input(button: Arc<VirtualButton>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            if stdin.read_line(&mut line).is_err() || line.is_empty() {
                break;
            }
            match line.trim() {
                "" => button.pulse_blocking(Duration::from_millis(80), 1, Duration::ZERO),
                "c" => button.pulse_blocking(
                    Duration::from_millis(80),
                    2,
                    Duration::from_millis(150),
                ),
                "q" => button.pulse_blocking(Duration::from_millis(1400), 1, Duration::ZERO),
                other => eprintln!("unknown input {other:?} (enter = press, c = double, q = quit)"),
            }
        }
    });
}
