use std::path::PathBuf;

use clap::Parser;
use pipeline::recipe::MediaKind;

/// Distort voice messages, audio, stickers, photos, videos and animations.
///
/// Sources run one at a time in the order given. Outputs are written to
/// `--out` as `<name> (distorted).<ext>`.
#[derive(Debug, Parser)]
#[command(name = "distort", version)]
pub struct Args {
    /// Files or http(s) URLs to distort.
    #[arg(required = true, value_name = "SOURCE")]
    pub sources: Vec<String>,

    /// Media kind for every source. Inferred from the file extension when omitted.
    #[arg(short, long)]
    pub kind: Option<MediaKind>,

    /// Directory the distorted files are written to.
    #[arg(short, long, default_value = ".")]
    pub out: PathBuf,

    /// Maximum number of jobs waiting behind the running one.
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Scratch directory for per-job workspaces.
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Per-stage timeout in seconds (0 disables).
    #[arg(long, value_name = "SECS")]
    pub stage_timeout: Option<u64>,

    /// Enable debug logging.
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors.
    #[arg(short, long)]
    pub quiet: bool,
}
