//! # Edge Voice Client
//!
//! Client-side control core for a voice/vision edge device: microphone
//! capture, speaker playback, camera snapshots and a bidirectional
//! streaming link to the assistant server, coordinated by one
//! authoritative state machine.
//!
//! ## Architecture Overview
//!
//! ```text
//!                 ┌────────────────────────────────────────────────┐
//!                 │                 State Controller               │
//!                 │   BOOTING → CONNECTED → IDLE ⇄ RECORDING …     │
//!                 └───────┬──────────────┬─────────────┬───────────┘
//!    snapshot reads       │              │             │ transition
//!                         ▼              ▼             ▼ notifications
//!  ┌──────────┐     ┌──────────┐   ┌──────────┐   ┌───────────────┐
//!  │  Button  │     │ Capture  │   │ Playback │   │   Outbound    │
//!  │  Worker  │     │  Worker  │   │  Worker  │   │ message queue │
//!  └────┬─────┘     └────┬─────┘   └────▲─────┘   └──────┬────────┘
//!       │ wake           │ chunks       │ chunks         │ single
//!       ▼                ▼              │                ▼ writer
//!  ┌──────────┐     ┌──────────┐   ┌────┴─────┐   ┌───────────────┐
//!  │  Camera  │     │   Send   │──▶│   Link   │◀──│  Link writer  │
//!  │  Worker  │     │  Worker  │   │ dispatch │   │  (wire I/O)   │
//!  └──────────┘     └──────────┘   └──────────┘   └───────────────┘
//!
//!  Shared resources: one half-duplex audio path (capture XOR playback),
//!  one fixed chunk pool, one outbound channel. Every queue is bounded.
//! ```

pub mod audio;
pub mod button;
pub mod camera;
pub mod config;
pub mod context;
pub mod discovery;
pub mod error;
pub mod indicator;
pub mod link;
pub mod pool;
pub mod protocol;
pub mod state;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Audio sample rate in Hz (mono PCM16)
    pub const SAMPLE_RATE: u32 = 16_000;

    /// Channel count (mono)
    pub const CHANNELS: u16 = 1;

    /// Samples per chunk (0.5 s at 16 kHz)
    pub const CHUNK_SAMPLES: usize = 8_000;

    /// Bytes per chunk (16-bit samples)
    pub const CHUNK_BYTES: usize = 16_000;

    /// Pool buffer count on a memory-rich device
    pub const POOL_COUNT_RICH: usize = 16;

    /// Pool buffer count on a memory-constrained device
    pub const POOL_COUNT_LEAN: usize = 4;

    /// Capture → send queue depth
    pub const SEND_QUEUE_DEPTH: usize = 32;

    /// Playback queue depth
    pub const PLAYBACK_QUEUE_DEPTH: usize = 16;

    /// Outbound link message queue depth
    pub const OUTBOUND_QUEUE_DEPTH: usize = 16;

    /// Indicator alert queue depth
    pub const ALERT_QUEUE_DEPTH: usize = 8;

    /// Button debounce window in milliseconds
    pub const DEBOUNCE_MS: u64 = 50;

    /// Window for recognizing a double press
    pub const DOUBLE_PRESS_WINDOW_MS: u64 = 300;

    /// Hold duration that triggers shutdown
    pub const LONG_PRESS_MS: u64 = 1_200;

    /// Button poll interval
    pub const BUTTON_POLL_MS: u64 = 10;

    /// Settle delay around audio path reconfiguration
    pub const PATH_SETTLE_MS: u64 = 50;

    /// Bounded wait for the audio path lock on the capture side
    pub const PATH_LOCK_TIMEOUT_MS: u64 = 100;

    /// Bounded wait for the audio path lock during reconfiguration
    pub const PATH_RECONFIG_TIMEOUT_MS: u64 = 5_000;

    /// Bounded wait for one full chunk read
    pub const CAPTURE_READ_TIMEOUT_MS: u64 = 1_000;

    /// Idle poll interval for workers with nothing to do
    pub const IDLE_POLL_MS: u64 = 10;

    /// Timed-receive interval on worker queues
    pub const QUEUE_POLL_MS: u64 = 100;

    /// Bounded push onto the outbound queue
    pub const OUTBOUND_PUSH_TIMEOUT_MS: u64 = 100;

    /// Wire transmit timeout per frame
    pub const LINK_SEND_TIMEOUT_MS: u64 = 5_000;

    /// Link readiness polls before a chunk is dropped
    pub const LINK_READY_RETRIES: u32 = 50;

    /// Interval between link readiness polls
    pub const LINK_READY_POLL_MS: u64 = 10;

    /// Gap between a chunk's metadata record and its binary payload
    pub const META_GAP_MS: u64 = 20;

    /// Pacing delay after each sent chunk (~5% overhead at 0.5 s chunks)
    pub const SEND_PACING_MS: u64 = 25;

    /// Bounded wait for the state lock; on timeout the transition is skipped
    pub const STATE_LOCK_TIMEOUT_MS: u64 = 1_000;

    /// Initial reconnect backoff
    pub const BACKOFF_INITIAL_SECS: u64 = 1;

    /// Reconnect backoff ceiling
    pub const BACKOFF_MAX_SECS: u64 = 60;
}
