//! Send worker
//!
//! Drains the capture queue toward the link. Each chunk becomes a
//! metadata record followed by a binary payload on the outbound channel.
//! When the link stays unready the chunk is dropped: bounded memory
//! beats unbounded buffering, and the server re-requests on gaps.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use crate::constants::{
    LINK_READY_POLL_MS, LINK_READY_RETRIES, META_GAP_MS, QUEUE_POLL_MS, SEND_PACING_MS,
};
use crate::context::AppContext;
use crate::pool::AudioChunk;
use crate::protocol::{Notification, OutboundMessage};

/// Send worker loop. Runs until shutdown.
pub async fn run(ctx: Arc<AppContext>, mut rx: mpsc::Receiver<AudioChunk>) {
    tracing::info!("send worker started");

    while !ctx.state.is_shutdown() {
        let chunk = match timeout(Duration::from_millis(QUEUE_POLL_MS), rx.recv()).await {
            Err(_) => continue,
            Ok(None) => break,
            Ok(Some(chunk)) => chunk,
        };

        // Wait briefly for link readiness, then give up on this chunk.
        let mut retries = 0;
        while !ctx.session.is_connected() && retries < LINK_READY_RETRIES {
            sleep(Duration::from_millis(LINK_READY_POLL_MS)).await;
            retries += 1;
        }
        if !ctx.session.is_connected() {
            tracing::warn!(seq = chunk.seq(), "link not ready, dropping audio chunk");
            continue; // chunk drops back to the pool
        }

        let meta = Notification::AudioChunkMeta {
            seq: chunk.seq(),
            len: chunk.len(),
        };
        if !ctx.enqueue_outbound(OutboundMessage::Control(meta)).await {
            continue;
        }

        // Give the peer a moment to process the metadata record before
        // the payload lands.
        sleep(Duration::from_millis(META_GAP_MS)).await;

        if !ctx.enqueue_outbound(OutboundMessage::Binary(chunk)).await {
            continue;
        }

        // Pacing between chunks so the link is not saturated.
        sleep(Duration::from_millis(SEND_PACING_MS)).await;
    }

    tracing::info!("send worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::test_context;
    use crate::state::ClientState;

    #[tokio::test(start_paused = true)]
    async fn test_unready_link_drops_chunk_back_to_pool() {
        let (ctx, channels) = test_context(2, 64);
        let mut outbound_rx = channels.outbound_rx;

        let worker = tokio::spawn(run(ctx.clone(), channels.send_rx));

        let buf = ctx.pool.acquire().unwrap();
        ctx.send_tx
            .send(AudioChunk::new(buf, 64, 5))
            .await
            .unwrap();

        // Let the readiness wait (50 × 10 ms) expire.
        tokio::time::sleep(Duration::from_millis(800)).await;

        assert_eq!(ctx.pool.available(), ctx.pool.capacity());
        assert!(outbound_rx.try_recv().is_err());

        ctx.state.set(ClientState::Shutdown).await;
        worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_meta_precedes_payload() {
        let (ctx, channels) = test_context(2, 64);
        let mut outbound_rx = channels.outbound_rx;

        ctx.session.set_connected(true);
        let worker = tokio::spawn(run(ctx.clone(), channels.send_rx));

        let buf = ctx.pool.acquire().unwrap();
        ctx.send_tx
            .send(AudioChunk::new(buf, 64, 9))
            .await
            .unwrap();

        let first = outbound_rx.recv().await.unwrap();
        match first {
            OutboundMessage::Control(Notification::AudioChunkMeta { seq, len }) => {
                assert_eq!(seq, 9);
                assert_eq!(len, 64);
            }
            _ => panic!("expected metadata record first"),
        }

        let second = outbound_rx.recv().await.unwrap();
        match second {
            OutboundMessage::Binary(chunk) => assert_eq!(chunk.seq(), 9),
            _ => panic!("expected binary payload second"),
        }

        ctx.state.set(ClientState::Shutdown).await;
        worker.await.unwrap();
    }
}
