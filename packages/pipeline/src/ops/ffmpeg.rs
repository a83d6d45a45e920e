//! ffmpeg / ffprobe operations.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::process::{command, run};
use super::{OperationError, Tools, ensure_parent};

/// Frame rate used when splitting a video into frames and back.
pub const FRAME_RATE: u32 = 24;

/// Audio filter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioDistortion {
    pub sample_rate: u32,
    /// Vibrato depth in `0.0..=1.0`; `0` disables the vibrato filter.
    pub vibrato: f64,
    /// Pitch multiplier; `1` disables the pitch filter.
    pub pitch: f64,
}

impl AudioDistortion {
    /// The `-filter:a` argument, or `None` when no filter applies.
    pub fn filter_chain(&self) -> Option<String> {
        let mut filters = Vec::new();
        if self.vibrato != 0.0 {
            filters.push(format!("vibrato=f=10:d={}", self.vibrato));
        }
        if self.pitch != 1.0 {
            let shifted = (f64::from(self.sample_rate) * self.pitch).round() as u64;
            filters.push(format!(
                "asetrate={},aresample={},atempo=1/{}",
                shifted, self.sample_rate, self.pitch
            ));
        }
        if filters.is_empty() {
            None
        } else {
            Some(filters.join(","))
        }
    }
}

/// Split `input` into `out_dir/1.jpg`, `out_dir/2.jpg`, ... at [`FRAME_RATE`].
pub async fn extract_frames(tools: &Tools, input: &Path, out_dir: &Path) -> Result<(), OperationError> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|e| OperationError::io(out_dir, e))?;

    let mut cmd = command(&tools.ffmpeg);
    cmd.arg("-y")
        .arg("-i")
        .arg(input)
        .args(["-r", &FRAME_RATE.to_string()])
        .arg(out_dir.join("%d.jpg"));
    run(&mut cmd).await?;
    Ok(())
}

/// Sample rate of the first audio stream.
pub async fn audio_sample_rate(tools: &Tools, path: &Path) -> Result<u32, OperationError> {
    let mut cmd = command(&tools.ffprobe);
    cmd.args([
        "-v",
        "error",
        "-select_streams",
        "a:0",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
        "-show_entries",
        "stream=sample_rate",
    ])
    .arg(path);
    let stdout = run(&mut cmd).await?;
    parse_sample_rate(&stdout).ok_or_else(|| OperationError::Parse {
        program: tools.ffprobe.to_string_lossy().into_owned(),
        what: "sample rate",
        output: stdout,
    })
}

fn parse_sample_rate(stdout: &str) -> Option<u32> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse::<u32>().ok())
        .filter(|rate| *rate > 0)
}

/// Re-encode an audio file through the distortion filters.
///
/// The codec follows the output extension: `.mp3` gets `libmp3lame`,
/// everything else `libopus`.
pub async fn distort_audio(
    tools: &Tools,
    input: &Path,
    output: &Path,
    distortion: &AudioDistortion,
) -> Result<(), OperationError> {
    ensure_parent(output).await?;

    let codec = match output.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("mp3") => "libmp3lame",
        _ => "libopus",
    };

    let mut cmd = command(&tools.ffmpeg);
    cmd.arg("-y").arg("-i").arg(input);
    if let Some(chain) = distortion.filter_chain() {
        cmd.args(["-filter:a", &chain]);
    }
    cmd.args(["-c:a", codec]).arg(output);
    run(&mut cmd).await?;
    Ok(())
}

/// Reassemble `frames_dir/%d.jpg` into a video.
///
/// With `audio`, the original's audio track is distorted and muxed in and
/// the output stops at the shorter stream. Without it the output is silent.
pub async fn combine_frames(
    tools: &Tools,
    frames_dir: &Path,
    original: &Path,
    output: &Path,
    audio: Option<&AudioDistortion>,
) -> Result<(), OperationError> {
    ensure_parent(output).await?;

    let mut cmd = command(&tools.ffmpeg);
    cmd.arg("-y")
        .args(["-framerate", &FRAME_RATE.to_string()])
        .args(["-start_number", "1"])
        .arg("-i")
        .arg(frames_dir.join("%d.jpg"));

    match audio {
        Some(distortion) => {
            cmd.arg("-i").arg(original).args(["-map", "0:v:0", "-map", "1:a:0?"]);
            if let Some(chain) = distortion.filter_chain() {
                cmd.args(["-filter:a", &chain]);
            }
            cmd.args(["-c:a", "libopus", "-b:a", "192k", "-shortest"]);
        }
        None => {
            cmd.arg("-an");
        }
    }

    cmd.args([
        "-c:v", "libx264", "-crf", "18", "-preset", "slow", "-pix_fmt", "yuv420p",
    ])
    .arg(output);
    run(&mut cmd).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_chain_combines_vibrato_and_pitch() {
        let distortion = AudioDistortion {
            sample_rate: 48_000,
            vibrato: 0.7,
            pitch: 1.25,
        };
        assert_eq!(
            distortion.filter_chain().as_deref(),
            Some("vibrato=f=10:d=0.7,asetrate=60000,aresample=48000,atempo=1/1.25")
        );
    }

    #[test]
    fn neutral_parameters_disable_filters() {
        let pitch_only = AudioDistortion {
            sample_rate: 44_100,
            vibrato: 0.0,
            pitch: 1.25,
        };
        assert_eq!(
            pitch_only.filter_chain().as_deref(),
            Some("asetrate=55125,aresample=44100,atempo=1/1.25")
        );

        let neutral = AudioDistortion {
            sample_rate: 44_100,
            vibrato: 0.0,
            pitch: 1.0,
        };
        assert_eq!(neutral.filter_chain(), None);
    }

    #[test]
    fn sample_rate_parsing() {
        assert_eq!(parse_sample_rate("48000\n"), Some(48_000));
        assert_eq!(parse_sample_rate("\n 44100 \n"), Some(44_100));
        assert_eq!(parse_sample_rate(""), None);
        assert_eq!(parse_sample_rate("N/A"), None);
        assert_eq!(parse_sample_rate("0"), None);
    }
}
