//! Shared application context
//!
//! Everything the workers share lives here and is handed to each of them
//! at construction: the state controller, the chunk pool, the shared
//! audio path and the sending ends of every queue. No process-wide
//! globals.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

use crate::audio::path::SharedAudioPath;
use crate::config::AppConfig;
use crate::constants::{
    ALERT_QUEUE_DEPTH, OUTBOUND_PUSH_TIMEOUT_MS, OUTBOUND_QUEUE_DEPTH, PLAYBACK_QUEUE_DEPTH,
    SEND_QUEUE_DEPTH,
};
use crate::indicator::Alert;
use crate::link::session::LinkSession;
use crate::pool::{AudioChunk, ChunkPool};
use crate::protocol::{FaultKind, Notification, OutboundMessage};
use crate::state::StateController;

pub struct AppContext {
    pub config: AppConfig,
    pub session: LinkSession,
    pub state: StateController,
    pub pool: ChunkPool,
    pub audio: SharedAudioPath,
    pub outbound_tx: mpsc::Sender<OutboundMessage>,
    pub send_tx: mpsc::Sender<AudioChunk>,
    pub playback_tx: mpsc::Sender<AudioChunk>,
    pub alert_tx: mpsc::Sender<Alert>,
    pub camera_wake: Notify,
    next_seq: AtomicU32,
}

/// Receiving ends of the worker queues, consumed once at spawn time.
pub struct WorkerChannels {
    pub send_rx: mpsc::Receiver<AudioChunk>,
    pub playback_rx: mpsc::Receiver<AudioChunk>,
    pub outbound_rx: mpsc::Receiver<OutboundMessage>,
    pub alert_rx: mpsc::Receiver<Alert>,
}

impl AppContext {
    pub fn new(
        config: AppConfig,
        audio: SharedAudioPath,
        endpoint: String,
    ) -> (Arc<Self>, WorkerChannels) {
        let (send_tx, send_rx) = mpsc::channel(SEND_QUEUE_DEPTH);
        let (playback_tx, playback_rx) = mpsc::channel(PLAYBACK_QUEUE_DEPTH);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let (alert_tx, alert_rx) = mpsc::channel(ALERT_QUEUE_DEPTH);

        let pool = ChunkPool::new(config.pool.capacity(), config.audio.chunk_bytes);
        let state = StateController::new(outbound_tx.clone(), audio.clone());

        let ctx = Arc::new(Self {
            session: LinkSession::new(endpoint),
            state,
            pool,
            audio,
            outbound_tx,
            send_tx,
            playback_tx,
            alert_tx,
            camera_wake: Notify::new(),
            next_seq: AtomicU32::new(0),
            config,
        });

        (
            ctx,
            WorkerChannels {
                send_rx,
                playback_rx,
                outbound_rx,
                alert_rx,
            },
        )
    }

    /// Next capture sequence number. Wraps at the 32-bit boundary.
    pub fn next_seq(&self) -> u32 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Bounded push onto the outbound queue. A full queue is a failure:
    /// the message is dropped (releasing any pooled buffer it owns) and
    /// the caller is told, never blocked indefinitely.
    pub async fn enqueue_outbound(&self, msg: OutboundMessage) -> bool {
        match self
            .outbound_tx
            .send_timeout(msg, Duration::from_millis(OUTBOUND_PUSH_TIMEOUT_MS))
            .await
        {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!("outbound queue full, message dropped");
                false
            }
        }
    }

    /// Report a recoverable fault to the server.
    pub async fn report_fault(&self, kind: FaultKind, detail: &str) {
        let state = self.state.snapshot();
        self.enqueue_outbound(OutboundMessage::Control(Notification::fault(
            state, kind, detail,
        )))
        .await;
    }

    /// Queue a one-shot indicator alert. Best effort.
    pub fn alert(&self, alert: Alert) {
        let _ = self.alert_tx.try_send(alert);
    }

    /// Send a busy rejection for the current state, with visual feedback.
    pub async fn send_reject(&self) {
        let current = self.state.snapshot();
        self.enqueue_outbound(OutboundMessage::Control(Notification::reject(current)))
            .await;
        self.alert(Alert::Reject);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::audio::path::NullAudioPath;
    use crate::config::MemoryProfile;

    /// Context with a null audio path and a small pool, for worker tests.
    pub fn test_context(pool_capacity: usize, chunk_bytes: usize) -> (Arc<AppContext>, WorkerChannels) {
        let mut config = AppConfig::default();
        config.pool.capacity = Some(pool_capacity);
        config.pool.profile = MemoryProfile::Constrained;
        config.audio.chunk_bytes = chunk_bytes;

        let audio = SharedAudioPath::new(Box::new(NullAudioPath::new(config.audio.sample_rate)));
        AppContext::new(config, audio, "ws://127.0.0.1:8000/ws".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::testing::test_context;
    use crate::protocol::OutboundMessage;

    #[tokio::test]
    async fn test_sequence_numbers_are_monotonic() {
        let (ctx, _channels) = test_context(2, 64);
        let first = ctx.next_seq();
        let second = ctx.next_seq();
        let third = ctx.next_seq();
        assert_eq!((first, second, third), (0, 1, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outbound_push_is_bounded() {
        let (ctx, channels) = test_context(2, 64);

        // Fill the queue without a consumer.
        let mut accepted = 0;
        for _ in 0..crate::constants::OUTBOUND_QUEUE_DEPTH {
            if ctx
                .enqueue_outbound(OutboundMessage::Control(
                    crate::protocol::Notification::RecordingStopped,
                ))
                .await
            {
                accepted += 1;
            }
        }
        assert_eq!(accepted, crate::constants::OUTBOUND_QUEUE_DEPTH);

        // The next push times out instead of blocking forever.
        assert!(
            !ctx.enqueue_outbound(OutboundMessage::Control(
                crate::protocol::Notification::RecordingStopped,
            ))
            .await
        );

        drop(channels);
    }
}
