//! Wrappers around external media tools
//!
//! - `audio` - text-to-speech via `piper`
//! - `assembly` - muxing video and audio via `ffmpeg`
//!
//! Both report failure as a plain value (zero duration, `false`) plus a
//! logged warning; callers decide on the fallback.

pub mod assembly;
pub mod audio;

pub use assembly::combine_video_audio;
pub use audio::{generate_speech, wav_duration};
