//! Playback worker
//!
//! Drains the playback queue into the audio path. Writes carry no
//! timeout: playback must drain every chunk the server streamed, never
//! skip. The timed receive doubles as the idle wait, so the worker is
//! resident and ready the instant PLAYING re-enters.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::constants::QUEUE_POLL_MS;
use crate::context::AppContext;
use crate::pool::AudioChunk;
use crate::protocol::FaultKind;

/// Playback worker loop. Runs until shutdown.
pub async fn run(ctx: Arc<AppContext>, mut rx: mpsc::Receiver<AudioChunk>) {
    tracing::info!("playback worker started");

    while !ctx.state.is_shutdown() {
        match timeout(Duration::from_millis(QUEUE_POLL_MS), rx.recv()).await {
            Ok(Some(chunk)) => {
                if let Err(err) = ctx.audio.write_chunk(chunk.payload()).await {
                    tracing::error!(%err, "audio write failed");
                    ctx.report_fault(
                        FaultKind::PlaybackError,
                        "failed to write chunk to the audio path",
                    )
                    .await;
                }
                // The chunk drops back to the pool either way.
            }
            Ok(None) => break,
            Err(_) => {
                // Queue empty; loop around and re-check for shutdown.
            }
        }
    }

    tracing::info!("playback worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::path::AudioDirection;
    use crate::context::testing::test_context;
    use crate::protocol::{Notification, OutboundMessage};
    use crate::state::ClientState;

    #[tokio::test(start_paused = true)]
    async fn test_chunks_are_played_and_released() {
        let (ctx, channels) = test_context(2, 64);
        ctx.audio.configure(AudioDirection::Playback).await.unwrap();

        let worker = tokio::spawn(run(ctx.clone(), channels.playback_rx));

        let buf = ctx.pool.acquire().unwrap();
        ctx.playback_tx
            .send(AudioChunk::new(buf, 64, 0))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(ctx.pool.available(), ctx.pool.capacity());

        ctx.state.set(ClientState::Shutdown).await;
        worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_reports_and_releases() {
        let (ctx, channels) = test_context(2, 64);
        let mut outbound_rx = channels.outbound_rx;
        // Path left unconfigured: every write fails.

        let worker = tokio::spawn(run(ctx.clone(), channels.playback_rx));

        let buf = ctx.pool.acquire().unwrap();
        ctx.playback_tx
            .send(AudioChunk::new(buf, 64, 0))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut saw_fault = false;
        while let Ok(msg) = outbound_rx.try_recv() {
            if let OutboundMessage::Control(Notification::Error { error, .. }) = msg {
                saw_fault = error == FaultKind::PlaybackError;
            }
        }
        assert!(saw_fault);
        assert_eq!(ctx.pool.available(), ctx.pool.capacity());

        ctx.state.set(ClientState::Shutdown).await;
        worker.await.unwrap();
    }
}
