//! Wire protocol records exchanged with the server
//!
//! Control records are JSON objects tagged by a `type` field. Audio
//! payloads travel as raw binary frames, each preceded by its
//! `audio_chunk_meta` record.

use serde::{Deserialize, Serialize};

use crate::pool::AudioChunk;
use crate::state::ClientState;

/// Outbound control records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Handshake: the device is up and ready for normal operation.
    ClientOn { version: String },
    RecordingStarted { ts: i64 },
    RecordingStopped,
    ReadyForPlayback,
    PlaybackComplete,
    /// Announces the binary payload that follows on the wire.
    AudioChunkMeta { seq: u32, len: usize },
    ImageCaptured { filename: String, size: usize },
    ImageReceived { filename: String },
    Error {
        state: String,
        error: FaultKind,
        detail: String,
    },
    Reject {
        reason: String,
        current_state: String,
    },
}

impl Notification {
    /// Build an `error` record for a recoverable fault.
    pub fn fault(state: ClientState, kind: FaultKind, detail: impl Into<String>) -> Self {
        Notification::Error {
            state: state.to_string(),
            error: kind,
            detail: detail.into(),
        }
    }

    /// Build a busy-rejection record for the current state.
    pub fn reject(current: ClientState) -> Self {
        Notification::Reject {
            reason: "busy".to_string(),
            current_state: current.to_string(),
        }
    }
}

/// Domain error tags carried in `error` records. The wire form is fixed
/// (the server dispatches on it); detail strings are free-form diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    BufferOverflow,
    I2sReadTimeout,
    CameraInitFailed,
    CameraCaptureFailed,
    PlaybackError,
    CameraNotSupported,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::BufferOverflow => "buffer_overflow",
            FaultKind::I2sReadTimeout => "i2s_read_timeout",
            FaultKind::CameraInitFailed => "camera_init_failed",
            FaultKind::CameraCaptureFailed => "camera_capture_failed",
            FaultKind::PlaybackError => "playback_error",
            FaultKind::CameraNotSupported => "camera_not_supported",
        }
    }
}

/// Inbound control records.
///
/// Unknown `type` tags decode to [`ServerMessage::Unknown`] so a newer
/// server never breaks the client; extra fields are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Ready,
    Partial { text: Option<String> },
    Llm { text: Option<String> },
    TtsReady,
    TtsChunkMeta,
    TtsDone,
    ImageReceived { filename: Option<String> },
    RequestRerecord { reason: Option<String> },
    OfferDownload { url: Option<String> },
    StateSync {
        server_state: Option<String>,
        message: Option<String>,
    },
    RequestUserIntervention { message: Option<String> },
    Ack {
        seq: Option<u64>,
        #[serde(rename = "ref")]
        reference: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// An item queued for the single link writer.
///
/// The producer relinquishes ownership on enqueue; the writer drops the
/// content after the transmit attempt, success or not, which returns any
/// pooled buffer.
pub enum OutboundMessage {
    /// Structured control record, sent as a text frame.
    Control(Notification),
    /// Raw audio payload, sent as a binary frame.
    Binary(AudioChunk),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_wire_form() {
        let json = serde_json::to_value(Notification::AudioChunkMeta { seq: 42, len: 16000 })
            .unwrap();
        assert_eq!(json["type"], "audio_chunk_meta");
        assert_eq!(json["seq"], 42);
        assert_eq!(json["len"], 16000);

        let json = serde_json::to_value(Notification::RecordingStopped).unwrap();
        assert_eq!(json["type"], "recording_stopped");
    }

    #[test]
    fn test_fault_record_wire_form() {
        let json = serde_json::to_value(Notification::fault(
            ClientState::Recording,
            FaultKind::I2sReadTimeout,
            "read returned 0 bytes",
        ))
        .unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["state"], "RECORDING");
        assert_eq!(json["error"], "i2s_read_timeout");
        assert_eq!(json["detail"], "read returned 0 bytes");
    }

    #[test]
    fn test_fault_tags_match_wire_strings() {
        for kind in [
            FaultKind::BufferOverflow,
            FaultKind::I2sReadTimeout,
            FaultKind::CameraInitFailed,
            FaultKind::CameraCaptureFailed,
            FaultKind::PlaybackError,
            FaultKind::CameraNotSupported,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }

    #[test]
    fn test_reject_record() {
        let json = serde_json::to_value(Notification::reject(ClientState::Playing)).unwrap();
        assert_eq!(json["type"], "reject");
        assert_eq!(json["reason"], "busy");
        assert_eq!(json["current_state"], "PLAYING");
    }

    #[test]
    fn test_inbound_decode() {
        let msg: ServerMessage = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(msg, ServerMessage::Ready);

        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"tts_ready","voice":"nova"}"#).unwrap();
        assert_eq!(msg, ServerMessage::TtsReady);

        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"ack","seq":3,"ref":"audio_chunk_meta"}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Ack {
                seq: Some(3),
                reference: Some("audio_chunk_meta".to_string()),
            }
        );
    }

    #[test]
    fn test_inbound_unknown_type() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"firmware_update","url":"x"}"#).unwrap();
        assert_eq!(msg, ServerMessage::Unknown);
    }

    #[test]
    fn test_inbound_malformed_is_error() {
        assert!(serde_json::from_str::<ServerMessage>("not json").is_err());
        assert!(serde_json::from_str::<ServerMessage>(r#"{"no_type":1}"#).is_err());
    }
}
