//! Capture worker
//!
//! Pulls fixed-size chunks off the audio path while the device is
//! RECORDING, stamps them with sequence numbers and forwards them to the
//! send queue. The push into the send queue is blocking on purpose:
//! when the link falls behind, capture stalls instead of corrupting or
//! silently dropping audio.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::constants::{IDLE_POLL_MS, QUEUE_POLL_MS};
use crate::context::AppContext;
use crate::error::AudioError;
use crate::pool::AudioChunk;
use crate::protocol::FaultKind;
use crate::state::ClientState;

/// Capture worker loop. Runs until shutdown.
pub async fn run(ctx: Arc<AppContext>) {
    tracing::info!("capture worker started");

    while !ctx.state.is_shutdown() {
        if ctx.state.snapshot() != ClientState::Recording {
            sleep(Duration::from_millis(IDLE_POLL_MS)).await;
            continue;
        }

        let Some(mut buf) = ctx.pool.acquire() else {
            tracing::error!("chunk pool exhausted during recording");
            ctx.report_fault(FaultKind::BufferOverflow, "free chunk pool exhausted")
                .await;
            ctx.state.set(ClientState::Processing).await;
            continue;
        };

        match ctx.audio.read_chunk(&mut buf).await {
            Ok(()) => {
                let len = buf.len();
                let chunk = AudioChunk::new(buf, len, ctx.next_seq());
                // Backpressure: a full send queue stalls capture here.
                if ctx.send_tx.send(chunk).await.is_err() {
                    tracing::error!("send queue closed, dropping chunk");
                }
            }
            Err(AudioError::NotConfigured) => {
                // The controller is mid-swing on the path; wait for the
                // capture direction to come up.
                drop(buf);
                sleep(Duration::from_millis(QUEUE_POLL_MS)).await;
            }
            Err(err) => {
                drop(buf);
                tracing::error!(%err, "audio read failed");
                ctx.report_fault(
                    FaultKind::I2sReadTimeout,
                    "failed to read a full chunk from the audio path",
                )
                .await;
                ctx.state.set(ClientState::Processing).await;
            }
        }
    }

    tracing::info!("capture worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::test_context;

    #[tokio::test(start_paused = true)]
    async fn test_chunks_carry_increasing_sequence_numbers() {
        let (ctx, mut channels) = test_context(4, 320);

        let worker = tokio::spawn(run(ctx.clone()));
        ctx.state.set(ClientState::Connected).await;
        ctx.state.set(ClientState::Idle).await;
        ctx.state.set(ClientState::Recording).await;

        let mut seqs = Vec::new();
        for _ in 0..3 {
            let chunk = channels.send_rx.recv().await.expect("capture output");
            assert_eq!(chunk.len(), 320);
            seqs.push(chunk.seq());
        }
        assert_eq!(seqs, vec![0, 1, 2]);

        ctx.state.set(ClientState::Shutdown).await;
        worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_exhaustion_reports_and_stops_recording() {
        let (ctx, mut channels) = test_context(2, 320);

        // Hold every buffer so the worker cannot acquire one.
        let _a = ctx.pool.acquire().unwrap();
        let _b = ctx.pool.acquire().unwrap();

        let worker = tokio::spawn(run(ctx.clone()));
        ctx.state.set(ClientState::Recording).await;

        // Wait for the worker to notice and fall back to PROCESSING.
        while ctx.state.snapshot() == ClientState::Recording {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(ctx.state.snapshot(), ClientState::Processing);

        // A buffer_overflow fault was reported.
        let mut saw_fault = false;
        while let Ok(msg) = channels.outbound_rx.try_recv() {
            if let crate::protocol::OutboundMessage::Control(crate::protocol::Notification::Error {
                error, ..
            }) = msg
            {
                saw_fault = error == FaultKind::BufferOverflow;
            }
        }
        assert!(saw_fault);

        ctx.state.set(ClientState::Shutdown).await;
        worker.await.unwrap();
    }
}
