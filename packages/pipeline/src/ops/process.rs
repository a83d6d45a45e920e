//! Subprocess helpers.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use super::OperationError;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Only the tail of stderr is kept in errors; ffmpeg prints a banner first.
const STDERR_TAIL: usize = 2048;

/// Locations of the external programs.
///
/// Env vars:
/// - `FFMPEG_PATH` (default: `ffmpeg`)
/// - `FFPROBE_PATH` (default: `ffprobe`)
/// - `MAGICK_PATH` (default: `magick`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub magick: PathBuf,
}

impl Tools {
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let pick = |key: &str, fallback: &str| {
            get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(fallback))
        };
        Self {
            ffmpeg: pick("FFMPEG_PATH", "ffmpeg"),
            ffprobe: pick("FFPROBE_PATH", "ffprobe"),
            magick: pick("MAGICK_PATH", "magick"),
        }
    }
}

impl Default for Tools {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

/// Create a command that is killed if its future is dropped (stage timeout)
/// and never opens a console window on Windows.
pub(crate) fn command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    cmd.kill_on_drop(true).stdin(Stdio::null());
    #[cfg(windows)]
    {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// Run to completion and return stdout. A non-zero exit is an error that
/// carries the end of stderr.
pub(crate) async fn run(cmd: &mut Command) -> Result<String, OperationError> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    tracing::debug!("Running {:?}", cmd.as_std());

    let output = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| OperationError::Spawn {
            program: program.clone(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(OperationError::Failed {
            program,
            status: output.status.to_string(),
            stderr: tail(stderr.trim(), STDERR_TAIL).to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tools_fall_back_to_program_names() {
        let tools = Tools::from_lookup(|key| match key {
            "FFMPEG_PATH" => Some("/opt/ffmpeg/bin/ffmpeg".into()),
            "MAGICK_PATH" => Some("   ".into()),
            _ => None,
        });
        assert_eq!(tools.ffmpeg, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(tools.ffprobe, PathBuf::from("ffprobe"));
        assert_eq!(tools.magick, PathBuf::from("magick"));
    }

    #[test]
    fn tail_respects_char_boundaries() {
        assert_eq!(tail("short", 10), "short");
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("aé", 1), "");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let mut cmd = command("distort-test-no-such-program");
        let err = run(&mut cmd).await.unwrap_err();
        assert!(matches!(err, OperationError::Spawn { .. }));
    }
}
