//! Link dispatcher
//!
//! Two halves: the outbound writer, the single consumer of the message
//! queue (which guarantees at most one in-flight write on the link), and
//! the inbound dispatch loop, which routes decoded server messages to
//! state transitions or the playback queue and owns reconnection.

use std::cmp;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use crate::constants::{
    BACKOFF_INITIAL_SECS, BACKOFF_MAX_SECS, LINK_SEND_TIMEOUT_MS, QUEUE_POLL_MS,
};
use crate::context::AppContext;
use crate::indicator::Alert;
use crate::link::transport::{LinkEvent, LinkTransport};
use crate::pool::AudioChunk;
use crate::protocol::{Notification, OutboundMessage, ServerMessage};
use crate::state::ClientState;

/// Outbound writer loop. Sole consumer of the outbound queue; content is
/// dropped after the transmit attempt, success or not, which returns any
/// pooled buffer.
pub async fn run_writer(
    ctx: Arc<AppContext>,
    transport: Arc<dyn LinkTransport>,
    mut rx: mpsc::Receiver<OutboundMessage>,
) {
    tracing::info!("link writer started");
    let send_timeout = Duration::from_millis(LINK_SEND_TIMEOUT_MS);

    while !ctx.state.is_shutdown() {
        let msg = match timeout(Duration::from_secs(1), rx.recv()).await {
            Err(_) => continue,
            Ok(None) => break,
            Ok(Some(msg)) => msg,
        };

        match msg {
            OutboundMessage::Control(notice) => {
                if !transport.is_connected() {
                    tracing::warn!("link down, dropping control record");
                    continue;
                }
                let text = match render_control(&notice, ctx.session.id()) {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::error!(%err, "failed to serialize control record");
                        continue;
                    }
                };
                if let Err(err) = transport.send_text(&text, send_timeout).await {
                    tracing::error!(%err, "control record send failed");
                }
            }
            OutboundMessage::Binary(chunk) => {
                if !transport.is_connected() {
                    tracing::warn!(seq = chunk.seq(), "link down, dropping audio payload");
                    continue;
                }
                if let Err(err) = transport.send_binary(chunk.payload(), send_timeout).await {
                    tracing::error!(%err, seq = chunk.seq(), "audio payload send failed");
                }
            }
        }
    }

    tracing::info!("link writer stopped");
}

/// Serialize a control record, stamping the session id into it.
fn render_control(notice: &Notification, session: &str) -> serde_json::Result<String> {
    let mut value = serde_json::to_value(notice)?;
    if let Some(map) = value.as_object_mut() {
        map.insert(
            "session".to_string(),
            serde_json::Value::String(session.to_string()),
        );
    }
    serde_json::to_string(&value)
}

/// Inbound dispatch loop: consumes link events, drives state transitions
/// and feeds the playback queue. Runs until shutdown.
pub async fn run_dispatch(
    ctx: Arc<AppContext>,
    transport: Arc<dyn LinkTransport>,
    mut events: mpsc::Receiver<LinkEvent>,
) {
    tracing::info!("link dispatcher started");

    while !ctx.state.is_shutdown() {
        let event = match timeout(Duration::from_millis(QUEUE_POLL_MS), events.recv()).await {
            Err(_) => continue,
            Ok(None) => break,
            Ok(Some(event)) => event,
        };

        match event {
            LinkEvent::Connected => {
                ctx.session.set_connected(true);
                ctx.state.set(ClientState::Connected).await;
            }
            LinkEvent::Disconnected => {
                tracing::warn!("link lost");
                ctx.session.reset();
                if ctx.state.is_shutdown() {
                    break;
                }
                ctx.state.set(ClientState::Stalled).await;
                reconnect(&ctx, transport.as_ref()).await;
            }
            LinkEvent::Text(text) => handle_text(&ctx, &text).await,
            LinkEvent::Binary(data) => handle_binary(&ctx, &data).await,
        }
    }

    tracing::info!("link dispatcher stopped");
}

/// Reconnect with exponential backoff, capped at 60 s. Blocks only the
/// link task; other workers keep draining their queues and drop as
/// designed while the link is down.
pub async fn reconnect(ctx: &AppContext, transport: &dyn LinkTransport) {
    let mut delay = Duration::from_secs(BACKOFF_INITIAL_SECS);
    let cap = Duration::from_secs(BACKOFF_MAX_SECS);

    while !ctx.state.is_shutdown() && !transport.is_connected() {
        tracing::info!(delay_secs = delay.as_secs(), "reconnecting to server");

        // Sleep in one-second slices so shutdown is observed promptly.
        let mut remaining = delay;
        while !remaining.is_zero() && !ctx.state.is_shutdown() {
            let slice = cmp::min(remaining, Duration::from_secs(1));
            sleep(slice).await;
            remaining -= slice;
        }
        if ctx.state.is_shutdown() {
            return;
        }

        match transport.connect().await {
            Ok(()) => {
                // The Connected event drives the state transition.
                tracing::info!("link reconnected");
                return;
            }
            Err(err) => {
                tracing::warn!(%err, "reconnect attempt failed");
                delay = cmp::min(delay * 2, cap);
            }
        }
    }
}

async fn handle_text(ctx: &AppContext, text: &str) {
    let msg: ServerMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(err) => {
            tracing::warn!(%err, "malformed control frame, ignoring");
            return;
        }
    };

    match msg {
        ServerMessage::Ready => {
            tracing::info!("server ready");
            // The CONNECTED→IDLE transition emits client_on, which is
            // the handshake.
            ctx.session.set_handshake_complete(true);
            ctx.state.set(ClientState::Idle).await;
        }
        ServerMessage::Partial { text } => {
            tracing::info!(text = text.as_deref().unwrap_or(""), "partial transcript");
        }
        ServerMessage::Llm { text } => {
            tracing::info!(text = text.as_deref().unwrap_or(""), "assistant response");
        }
        ServerMessage::TtsReady => {
            let state = ctx.state.snapshot();
            if state == ClientState::Idle || state == ClientState::Processing {
                // Entering PLAYING emits ready_for_playback.
                ctx.state.set(ClientState::Playing).await;
            } else {
                ctx.send_reject().await;
            }
        }
        ServerMessage::TtsChunkMeta => {
            tracing::debug!("playback chunk metadata received");
        }
        ServerMessage::TtsDone => {
            tracing::info!("playback stream complete");
            // PLAYING→IDLE emits playback_complete.
            ctx.state.set(ClientState::Idle).await;
        }
        ServerMessage::ImageReceived { filename } => {
            tracing::info!(
                filename = filename.as_deref().unwrap_or(""),
                "image acknowledged by server"
            );
        }
        ServerMessage::RequestRerecord { reason } => {
            tracing::warn!(
                reason = reason.as_deref().unwrap_or("unknown"),
                "server requested re-record"
            );
            match ctx.state.snapshot() {
                ClientState::Idle => ctx.alert(Alert::Rerecord),
                ClientState::Processing => {
                    ctx.state.set(ClientState::Idle).await;
                    ctx.alert(Alert::Rerecord);
                }
                _ => ctx.send_reject().await,
            }
        }
        ServerMessage::OfferDownload { url } => {
            tracing::info!(url = url.as_deref().unwrap_or(""), "server offered download");
        }
        ServerMessage::StateSync {
            server_state,
            message,
        } => {
            tracing::info!(
                server_state = server_state.as_deref().unwrap_or("unknown"),
                message = message.as_deref().unwrap_or(""),
                "state sync from server"
            );
        }
        ServerMessage::RequestUserIntervention { message } => {
            tracing::warn!(
                message = message.as_deref().unwrap_or("unknown"),
                "server requires user intervention"
            );
            ctx.alert(Alert::UserIntervention);
        }
        ServerMessage::Ack { seq, reference } => {
            tracing::debug!(
                seq = seq.unwrap_or(0),
                reference = reference.as_deref().unwrap_or("unknown"),
                "ack received"
            );
        }
        ServerMessage::Unknown => {
            tracing::warn!("unrecognized control frame type, ignoring");
        }
    }
}

/// Binary frames are playback audio. Accepted only while PLAYING; copied
/// into a pool buffer and pushed (blocking) onto the playback queue.
async fn handle_binary(ctx: &AppContext, data: &[u8]) {
    if ctx.state.snapshot() != ClientState::Playing {
        tracing::warn!(len = data.len(), "binary frame outside playback, dropping");
        return;
    }
    if data.len() > ctx.pool.chunk_bytes() {
        tracing::error!(len = data.len(), "binary frame exceeds chunk size, dropping");
        return;
    }
    let Some(mut buf) = ctx.pool.acquire() else {
        tracing::error!("no free chunk for playback frame, dropping");
        return;
    };
    buf[..data.len()].copy_from_slice(data);

    // Playback chunks carry no sequence number.
    let chunk = AudioChunk::new(buf, data.len(), 0);
    // Blocking push: playback must not skip data.
    if ctx.playback_tx.send(chunk).await.is_err() {
        tracing::error!("playback queue closed");
    }
}
