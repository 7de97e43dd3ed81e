//! Audio subsystem: the shared half-duplex path and its workers

pub mod capture;
pub mod cpal_path;
pub mod path;
pub mod playback;
pub mod send;

pub use cpal_path::CpalAudioPath;
pub use path::{AudioDirection, AudioPath, NullAudioPath, SharedAudioPath};
