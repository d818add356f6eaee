//! Text-to-speech through the `piper` CLI
//!
//! `piper` reads text on stdin and writes a WAV file. Any failure (missing
//! binary, nonzero exit, no output) yields a zero duration and a warning.

use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

/// Default piper voice model
pub const DEFAULT_VOICE_MODEL: &str = "en_US-lessac-medium.onnx";

/// Synthesize `text` into `output` and return the audio length in seconds.
pub async fn generate_speech(text: &str, output: &Path, voice_model: &str) -> f64 {
    generate_speech_with("piper", text, output, voice_model).await
}

async fn generate_speech_with(program: &str, text: &str, output: &Path, voice_model: &str) -> f64 {
    let mut child = match Command::new(program)
        .arg("--model")
        .arg(voice_model)
        .arg("--output_file")
        .arg(output)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!(program, error = %e, "'piper' command not found. Please install Piper TTS.");
            return 0.0;
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(text.as_bytes()).await {
            warn!(error = %e, "Failed to send text to piper");
        }
        // Dropping stdin closes the pipe so piper sees EOF.
    }

    let result = match child.wait_with_output().await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "Piper execution failed");
            return 0.0;
        }
    };
    if !result.status.success() {
        warn!(
            status = %result.status,
            stderr = %String::from_utf8_lossy(&result.stderr),
            "Piper execution failed"
        );
        return 0.0;
    }

    if !output.exists() {
        warn!(path = %output.display(), "Piper did not create its output file");
        return 0.0;
    }

    match wav_duration(output) {
        Ok(duration) => {
            info!(path = %output.display(), duration_secs = duration, "Generated speech");
            duration
        }
        Err(e) => {
            warn!(path = %output.display(), error = %e, "Unreadable WAV output");
            0.0
        }
    }
}

/// Duration of a PCM WAV file in seconds (data frames / sample rate).
pub fn wav_duration(path: &Path) -> std::io::Result<f64> {
    let bytes = std::fs::read(path)?;
    parse_wav_duration(&bytes)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "not a PCM WAV file"))
}

fn parse_wav_duration(bytes: &[u8]) -> Option<f64> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }

    let mut block_align: Option<u16> = None;
    let mut sample_rate: Option<u32> = None;
    let mut offset = 12;

    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().ok()?) as usize;
        let body = offset + 8;

        match id {
            b"fmt " => {
                let fmt = bytes.get(body..body + 16)?;
                sample_rate = Some(u32::from_le_bytes(fmt[4..8].try_into().ok()?));
                block_align = Some(u16::from_le_bytes(fmt[12..14].try_into().ok()?));
            }
            b"data" => {
                let rate = sample_rate?;
                let align = block_align?;
                if rate == 0 || align == 0 {
                    return None;
                }
                // Streaming writers may leave a placeholder size; clamp to what's there.
                let available = bytes.len().saturating_sub(body).min(size);
                let frames = available / align as usize;
                return Some(frames as f64 / rate as f64);
            }
            _ => {}
        }

        // Chunks are word-aligned.
        offset = body + size + (size & 1);
    }

    None
}
