//! Stage lists for each supported media kind.
//!
//! | kind | stages |
//! |------|--------|
//! | voice, audio | download, verify, distort, deliver |
//! | sticker, photo | download, verify, distort, deliver |
//! | video, video note, animation | download, extract, verify, distort, combine, deliver |

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use distort_core::JobId;
use serde::{Deserialize, Serialize};

use crate::error::StageError;
use crate::job::{Job, JobBuilder};
use crate::ops::download::fetch;
use crate::ops::ffmpeg::{self, AudioDistortion};
use crate::ops::{MediaSource, OperationError, Tools, magick};
use crate::stage::{Stage, StageContext, StageFuture, StageStep};

/// Pitch multiplier applied to every audio track.
pub const AUDIO_PITCH: f64 = 1.25;

/// Vibrato depth applied to every audio track.
pub const AUDIO_VIBRATO: f64 = 0.7;

/// Liquid-rescale percentage for still images.
pub const IMAGE_RESCALE: f64 = 50.0;

/// Inputs above this size are refused before or while downloading.
pub const MAX_INPUT_BYTES: u64 = 512 * 1024 * 1024;

const INPUT: &str = "input";
const OUTPUT: &str = "output";
const FRAMES: &str = "frames";
const DISTORTED: &str = "distorted";
const SAMPLE_RATE: &str = "sample_rate";
const DIMENSIONS: &str = "dimensions";

/// The kinds of media a job can distort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaKind {
    Voice,
    Audio,
    Sticker,
    Photo,
    Video,
    VideoNote,
    Animation,
}

impl MediaKind {
    pub const ALL: [MediaKind; 7] = [
        MediaKind::Voice,
        MediaKind::Audio,
        MediaKind::Sticker,
        MediaKind::Photo,
        MediaKind::Video,
        MediaKind::VideoNote,
        MediaKind::Animation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Voice => "voice",
            MediaKind::Audio => "audio",
            MediaKind::Sticker => "sticker",
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::VideoNote => "video-note",
            MediaKind::Animation => "animation",
        }
    }

    /// Guess the kind from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "ogg" | "oga" | "opus" => Some(MediaKind::Voice),
            "mp3" => Some(MediaKind::Audio),
            "webp" => Some(MediaKind::Sticker),
            "jpg" | "jpeg" | "png" => Some(MediaKind::Photo),
            "mp4" | "mov" | "m4v" => Some(MediaKind::Video),
            "gif" => Some(MediaKind::Animation),
            _ => None,
        }
    }

    /// Extension of the workspace input and output files.
    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Voice => "ogg",
            MediaKind::Audio => "mp3",
            MediaKind::Sticker => "webp",
            MediaKind::Photo => "jpeg",
            MediaKind::Video | MediaKind::VideoNote | MediaKind::Animation => "mp4",
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, MediaKind::Voice | MediaKind::Audio)
    }

    pub fn is_image(&self) -> bool {
        matches!(self, MediaKind::Sticker | MediaKind::Photo)
    }

    /// Whether the reassembled video keeps a (distorted) audio track.
    pub fn keeps_audio(&self) -> bool {
        matches!(self, MediaKind::Video | MediaKind::VideoNote)
    }

    fn combine_status(&self) -> &'static str {
        match self {
            MediaKind::VideoNote => "Creating a video note...",
            MediaKind::Animation => "Creating an animation...",
            _ => "Creating a video...",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown media kind name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown media kind '{0}' (expected one of: voice, audio, sticker, photo, video, video-note, animation)")]
pub struct UnknownMediaKind(pub String);

impl FromStr for MediaKind {
    type Err = UnknownMediaKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        MediaKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownMediaKind(s.to_string()))
    }
}

/// Rescale percentage for frame `index` of `total`: 90% on the first frame,
/// falling linearly to 40% on the last.
pub fn frame_rescale(index: usize, total: usize) -> f64 {
    if total <= 1 {
        return 90.0;
    }
    let progress = index as f64 / (total - 1) as f64;
    40.0 + 50.0 * (1.0 - progress)
}

/// External programs and the HTTP client the stages use.
#[derive(Debug, Clone, Default)]
pub struct Toolkit {
    pub tools: Tools,
    pub client: reqwest::Client,
}

impl Toolkit {
    pub fn new(tools: Tools, client: reqwest::Client) -> Self {
        Self { tools, client }
    }
}

/// A finished output waiting to be handed back to the submitter.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub job_id: JobId,
    pub kind: MediaKind,
    pub source: MediaSource,
    /// Output inside the job workspace. Gone once the job finishes.
    pub output: PathBuf,
}

impl DeliveryRequest {
    /// `<stem> (distorted).<ext>`, or `distorted.<ext>` for nameless sources.
    pub fn file_name(&self) -> String {
        let ext = self.kind.extension();
        let stem = self.source.file_name().and_then(|name| {
            Path::new(&name)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        });
        match stem {
            Some(stem) if !stem.is_empty() => format!("{} (distorted).{}", stem, ext),
            _ => format!("distorted.{}", ext),
        }
    }
}

/// Hands the output of the last stage to whoever submitted the job.
pub trait Delivery: Send + Sync + 'static {
    fn deliver(&self, request: DeliveryRequest) -> StageFuture;
}

/// Copies outputs into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryDelivery {
    dir: PathBuf,
}

impl DirectoryDelivery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Delivery for DirectoryDelivery {
    fn deliver(&self, request: DeliveryRequest) -> StageFuture {
        let dest = self.dir.join(request.file_name());
        let dir = self.dir.clone();
        Box::pin(async move {
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::copy(&request.output, &dest).await?;
            tracing::info!(job = %request.job_id, "Saved {}", dest.display());
            Ok(())
        })
    }
}

/// Build a job for `source`, labelled with its file name.
pub fn job(
    kind: MediaKind,
    source: MediaSource,
    toolkit: Arc<Toolkit>,
    delivery: Arc<dyn Delivery>,
) -> JobBuilder {
    let label = source.file_name().unwrap_or_else(|| source.to_string());
    Job::builder(label).stages(stages(kind, source, toolkit, delivery))
}

/// The stage list for one media kind.
pub fn stages(
    kind: MediaKind,
    source: MediaSource,
    toolkit: Arc<Toolkit>,
    delivery: Arc<dyn Delivery>,
) -> Vec<Stage> {
    let mut stages = vec![download(kind, source.clone(), toolkit.clone())];

    if kind.is_audio() {
        stages.push(verify_audio(toolkit.clone()));
        stages.push(distort_audio(kind, toolkit));
    } else if kind.is_image() {
        stages.push(verify_image(toolkit.clone()));
        stages.push(distort_image(kind, toolkit));
    } else {
        stages.push(extract_frames(toolkit.clone()));
        stages.push(verify_frames(kind, toolkit.clone()));
        let frames = DistortFrames {
            toolkit: toolkit.clone(),
        };
        stages.push(Stage::new("distort", frames).with_status("Distorting frames..."));
        stages.push(combine(kind, toolkit));
    }

    stages.push(deliver(kind, source, delivery));
    stages
}

fn download(kind: MediaKind, source: MediaSource, toolkit: Arc<Toolkit>) -> Stage {
    Stage::from_fn("download", move |ctx: StageContext| {
        let source = source.clone();
        let toolkit = toolkit.clone();
        async move {
            let input = ctx.file(&format!("input.{}", kind.extension()));
            fetch(&toolkit.client, &source, &input, MAX_INPUT_BYTES).await?;
            ctx.put_path(INPUT, input).await;
            Ok(())
        }
    })
    .with_status("Downloading...")
}

fn verify_audio(toolkit: Arc<Toolkit>) -> Stage {
    Stage::from_fn("verify", move |ctx: StageContext| {
        let toolkit = toolkit.clone();
        async move {
            let input = ctx.path(INPUT).await?;
            let sample_rate = ffmpeg::audio_sample_rate(&toolkit.tools, &input).await?;
            ctx.put_value(SAMPLE_RATE, &sample_rate).await
        }
    })
    .with_status("Verifying...")
}

fn distort_audio(kind: MediaKind, toolkit: Arc<Toolkit>) -> Stage {
    Stage::from_fn("distort", move |ctx: StageContext| {
        let toolkit = toolkit.clone();
        async move {
            let input = ctx.path(INPUT).await?;
            let sample_rate: u32 = ctx.value(SAMPLE_RATE).await?;
            let output = ctx.file(&format!("output.{}", kind.extension()));
            ffmpeg::distort_audio(&toolkit.tools, &input, &output, &audio_distortion(sample_rate)).await?;
            ctx.put_path(OUTPUT, output).await;
            Ok(())
        }
    })
    .with_status("Distorting...")
}

fn verify_image(toolkit: Arc<Toolkit>) -> Stage {
    Stage::from_fn("verify", move |ctx: StageContext| {
        let toolkit = toolkit.clone();
        async move {
            let input = ctx.path(INPUT).await?;
            let dimensions = magick::image_dimensions(&toolkit.tools, &input).await?;
            ctx.put_value(DIMENSIONS, &dimensions).await
        }
    })
    .with_status("Verifying...")
}

fn distort_image(kind: MediaKind, toolkit: Arc<Toolkit>) -> Stage {
    Stage::from_fn("distort", move |ctx: StageContext| {
        let toolkit = toolkit.clone();
        async move {
            let input = ctx.path(INPUT).await?;
            let dimensions: (u32, u32) = ctx.value(DIMENSIONS).await?;
            let output = ctx.file(&format!("output.{}", kind.extension()));
            magick::distort_image(&toolkit.tools, &input, &output, IMAGE_RESCALE, dimensions).await?;
            ctx.put_path(OUTPUT, output).await;
            Ok(())
        }
    })
    .with_status("Distorting...")
}

fn extract_frames(toolkit: Arc<Toolkit>) -> Stage {
    Stage::from_fn("extract", move |ctx: StageContext| {
        let toolkit = toolkit.clone();
        async move {
            let input = ctx.path(INPUT).await?;
            let frames = ctx.subdir("original").await?;
            ffmpeg::extract_frames(&toolkit.tools, &input, &frames).await?;
            ctx.put_path(FRAMES, frames).await;
            Ok(())
        }
    })
    .with_status("Extracting frames...")
}

fn verify_frames(kind: MediaKind, toolkit: Arc<Toolkit>) -> Stage {
    Stage::from_fn("verify", move |ctx: StageContext| {
        let toolkit = toolkit.clone();
        async move {
            let frames_dir = ctx.path(FRAMES).await?;
            let frames = sorted_frames(&frames_dir).await?;
            let (_, first) = frames
                .first()
                .ok_or_else(|| StageError::other("no frames were extracted"))?;
            let dimensions = magick::image_dimensions(&toolkit.tools, first).await?;
            ctx.put_value(DIMENSIONS, &dimensions).await?;

            if kind.keeps_audio() {
                let input = ctx.path(INPUT).await?;
                let sample_rate = match ffmpeg::audio_sample_rate(&toolkit.tools, &input).await {
                    Ok(rate) => Some(rate),
                    // ffprobe prints nothing for a video without an audio stream.
                    Err(OperationError::Parse { .. }) => None,
                    Err(e) => return Err(e.into()),
                };
                ctx.put_value(SAMPLE_RATE, &sample_rate).await?;
            }
            Ok(())
        }
    })
    .with_status("Verifying...")
}

/// Liquid-rescales every extracted frame, reporting throttled progress.
struct DistortFrames {
    toolkit: Arc<Toolkit>,
}

impl StageStep for DistortFrames {
    fn run(&self, ctx: StageContext) -> StageFuture {
        let toolkit = self.toolkit.clone();
        Box::pin(async move {
            let frames_dir = ctx.path(FRAMES).await?;
            let dimensions: (u32, u32) = ctx.value(DIMENSIONS).await?;
            let distorted = ctx.subdir(DISTORTED).await?;

            let frames = sorted_frames(&frames_dir).await?;
            if frames.is_empty() {
                return Err(StageError::other("no frames were extracted"));
            }

            let total = frames.len();
            for (index, (number, frame)) in frames.iter().enumerate() {
                ctx.progress()
                    .report(&format!("Distorting frames ({}%)", index * 100 / total));
                let output = distorted.join(format!("{}.jpg", number));
                magick::distort_image(
                    &toolkit.tools,
                    frame,
                    &output,
                    frame_rescale(index, total),
                    dimensions,
                )
                .await?;
            }

            tracing::debug!(job = %ctx.job_id(), "Distorted {} frames", total);
            ctx.put_path(DISTORTED, distorted).await;
            Ok(())
        })
    }
}

fn combine(kind: MediaKind, toolkit: Arc<Toolkit>) -> Stage {
    Stage::from_fn("combine", move |ctx: StageContext| {
        let toolkit = toolkit.clone();
        async move {
            let input = ctx.path(INPUT).await?;
            let distorted = ctx.path(DISTORTED).await?;
            let audio = if kind.keeps_audio() {
                let sample_rate: Option<u32> = ctx.value(SAMPLE_RATE).await?;
                sample_rate.map(audio_distortion)
            } else {
                None
            };
            let output = ctx.file(&format!("output.{}", kind.extension()));
            ffmpeg::combine_frames(&toolkit.tools, &distorted, &input, &output, audio.as_ref())
                .await?;
            ctx.put_path(OUTPUT, output).await;
            Ok(())
        }
    })
    .with_status(kind.combine_status())
}

fn deliver(kind: MediaKind, source: MediaSource, delivery: Arc<dyn Delivery>) -> Stage {
    Stage::from_fn("deliver", move |ctx: StageContext| {
        let source = source.clone();
        let delivery = delivery.clone();
        async move {
            let output = ctx.path(OUTPUT).await?;
            delivery
                .deliver(DeliveryRequest {
                    job_id: ctx.job_id(),
                    kind,
                    source,
                    output,
                })
                .await
        }
    })
    .with_status("Sending...")
}

fn audio_distortion(sample_rate: u32) -> AudioDistortion {
    AudioDistortion {
        sample_rate,
        vibrato: AUDIO_VIBRATO,
        pitch: AUDIO_PITCH,
    }
}

/// Numbered frames (`1.jpg`, `2.jpg`, ...) in `dir`, in sequence order.
/// Files without a numeric stem are skipped.
pub async fn sorted_frames(dir: &Path) -> Result<Vec<(u64, PathBuf)>, StageError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut frames = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let number = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<u64>().ok());
        if let Some(number) = number {
            frames.push((number, path));
        }
    }
    frames.sort_by_key(|(number, _)| *number);
    Ok(frames)
}
