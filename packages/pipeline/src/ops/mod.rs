//! External transform operations.
//!
//! Each operation converts one media artifact into another by shelling out
//! to `ffmpeg`, `ffprobe` or ImageMagick, or by fetching a file. They know
//! nothing about jobs or stages; recipes wire them into stages.

pub mod download;
pub mod ffmpeg;
pub mod magick;
mod process;

use std::io;
use std::path::{Path, PathBuf};

pub use download::MediaSource;
pub use process::Tools;

/// Operation errors.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("could not parse {what} from {program} output {output:?}")]
    Parse {
        program: String,
        what: &'static str,
        output: String,
    },

    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("download failed with status {status} ({url})")]
    HttpStatus { status: u16, url: String },

    #[error("input is at least {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl OperationError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Make sure the parent directory of an output path exists.
pub(crate) async fn ensure_parent(path: &Path) -> Result<(), OperationError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| OperationError::io(parent, e))?;
    }
    Ok(())
}
