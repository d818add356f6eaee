//! Video + audio assembly through `ffmpeg`

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

/// Default merged output filename
pub const DEFAULT_OUTPUT: &str = "final_output.mp4";

/// Merge `video` and `audio` into `output`.
///
/// Without audio the video is renamed to `output`. Returns `false` when the
/// video is missing, ffmpeg is missing, or ffmpeg exits nonzero.
pub async fn combine_video_audio(video: &Path, audio: &Path, output: &Path) -> bool {
    combine_with("ffmpeg", video, audio, output).await
}

async fn combine_with(program: &str, video: &Path, audio: &Path, output: &Path) -> bool {
    if !video.exists() {
        warn!(video = %video.display(), "Video file not found");
        return false;
    }

    if !audio.exists() {
        warn!(audio = %audio.display(), "Audio file not found, returning video only");
        return match tokio::fs::rename(video, output).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to move video into place");
                false
            }
        };
    }

    let result = Command::new(program)
        .arg("-y")
        .arg("-i")
        .arg(video)
        .arg("-i")
        .arg(audio)
        .args(["-c:v", "copy", "-c:a", "aac", "-map", "0:v:0", "-map", "1:a:0"])
        .arg(output)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    match result {
        Ok(out) if out.status.success() => {
            info!(output = %output.display(), "Merged video and audio");
            true
        }
        Ok(out) => {
            warn!(
                status = %out.status,
                stderr = %String::from_utf8_lossy(&out.stderr),
                "FFmpeg failed"
            );
            false
        }
        Err(e) => {
            warn!(program, error = %e, "'ffmpeg' not found. Please install FFmpeg.");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_video_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ok = combine_video_audio(
            &dir.path().join("none.mp4"),
            &dir.path().join("none.wav"),
            &dir.path().join("out.mp4"),
        )
        .await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn test_missing_audio_renames_video() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        let output = dir.path().join(DEFAULT_OUTPUT);
        std::fs::write(&video, b"frames").unwrap();

        let ok = combine_video_audio(&video, &dir.path().join("none.wav"), &output).await;

        assert!(ok);
        assert!(!video.exists());
        assert_eq!(std::fs::read(&output).unwrap(), b"frames");
    }

    #[tokio::test]
    async fn test_missing_tool_fails() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        let audio = dir.path().join("voice.wav");
        std::fs::write(&video, b"v").unwrap();
        std::fs::write(&audio, b"a").unwrap();

        let ok = combine_with("zerostick-no-such-ffmpeg", &video, &audio, &dir.path().join("o.mp4")).await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        let audio = dir.path().join("voice.wav");
        std::fs::write(&video, b"v").unwrap();
        std::fs::write(&audio, b"a").unwrap();

        let ok = combine_with("false", &video, &audio, &dir.path().join("o.mp4")).await;
        assert!(!ok);
    }
}
