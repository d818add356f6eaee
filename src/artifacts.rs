//! Artifact discovery in a run's working directory
//!
//! Generated programs pick their own output filenames, so the produced media
//! is found after the fact: the most recently created file with the media
//! extension wins. Two runs sharing one directory would race here, which is
//! why the server holds a per-directory run lock around run + discovery.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Default media extension produced by generated programs
pub const DEFAULT_ARTIFACT_EXTENSION: &str = "mp4";

/// Most recently created file in `dir` whose extension matches `extension`.
///
/// Falls back to the modification time where the platform has no creation
/// time. Absence is `Ok(None)`, not an error.
pub fn latest_artifact(dir: &Path, extension: &str) -> std::io::Result<Option<PathBuf>> {
    let mut latest: Option<(SystemTime, PathBuf)> = None;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let matches = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if !matches {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let stamp = metadata
            .created()
            .or_else(|_| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let newer = match &latest {
            Some((best, _)) => stamp > *best,
            None => true,
        };
        if newer {
            latest = Some((stamp, path));
        }
    }

    Ok(latest.map(|(_, path)| path))
}

/// Public URL for an artifact served under `/videos/`
pub fn artifact_url(public_url: &str, artifact: &Path) -> Option<String> {
    let name = artifact.file_name()?.to_str()?;
    Some(format!("{}/videos/{}", public_url.trim_end_matches('/'), name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_dir_has_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(latest_artifact(dir.path(), "mp4").unwrap(), None);
    }

    #[test]
    fn test_ignores_other_extensions_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("agent_script.py"), "x").unwrap();
        std::fs::create_dir(dir.path().join("clips.mp4")).unwrap();
        assert_eq!(latest_artifact(dir.path(), "mp4").unwrap(), None);
    }

    #[test]
    fn test_picks_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.mp4"), "a").unwrap();
        std::thread::sleep(Duration::from_millis(50));
        std::fs::write(dir.path().join("new.mp4"), "b").unwrap();

        let found = latest_artifact(dir.path(), "mp4").unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "new.mp4");
    }

    #[test]
    fn test_missing_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(latest_artifact(&dir.path().join("nope"), "mp4").is_err());
    }

    #[test]
    fn test_artifact_url() {
        let url = artifact_url("http://localhost:8000/", Path::new("/work/wave.mp4"));
        assert_eq!(url.as_deref(), Some("http://localhost:8000/videos/wave.mp4"));
    }
}
