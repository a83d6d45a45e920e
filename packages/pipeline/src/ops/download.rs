//! Fetching the submitted file into the workspace.

use std::fmt;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use super::{OperationError, ensure_parent};

/// Where a submitted file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    Url(String),
    Path(PathBuf),
}

impl MediaSource {
    /// `http://` and `https://` strings are URLs, anything else a local path.
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(trimmed.to_string())
        } else {
            Self::Path(PathBuf::from(trimmed))
        }
    }

    /// File name part, used for labels and output names.
    pub fn file_name(&self) -> Option<String> {
        match self {
            MediaSource::Url(url) => url
                .split(['?', '#'])
                .next()
                .and_then(|u| u.rsplit('/').next())
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            MediaSource::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
        }
    }

    /// Lower-cased extension, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name()?;
        Path::new(&name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaSource::Url(url) => write!(f, "{}", url),
            MediaSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Copy or download `source` to `dest`, refusing anything over `limit` bytes.
///
/// Sizes known up front (local metadata, `Content-Length`) are checked
/// before any byte is written. A stream without a length is cut off as soon
/// as it passes the limit.
pub async fn fetch(
    client: &reqwest::Client,
    source: &MediaSource,
    dest: &Path,
    limit: u64,
) -> Result<u64, OperationError> {
    ensure_parent(dest).await?;
    match source {
        MediaSource::Path(path) => copy(path, dest, limit).await,
        MediaSource::Url(url) => download(client, url, dest, limit).await,
    }
}

async fn copy(path: &Path, dest: &Path, limit: u64) -> Result<u64, OperationError> {
    let size = tokio::fs::metadata(path)
        .await
        .map_err(|e| OperationError::io(path, e))?
        .len();
    if size > limit {
        return Err(OperationError::TooLarge { size, limit });
    }
    tokio::fs::copy(path, dest)
        .await
        .map_err(|e| OperationError::io(path, e))
}

async fn download(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    limit: u64,
) -> Result<u64, OperationError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(OperationError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    if let Some(size) = response.content_length().filter(|size| *size > limit) {
        return Err(OperationError::TooLarge { size, limit });
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| OperationError::io(dest, e))?;
    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        written += chunk.len() as u64;
        if written > limit {
            return Err(OperationError::TooLarge {
                size: written,
                limit,
            });
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| OperationError::io(dest, e))?;
    }
    file.flush().await.map_err(|e| OperationError::io(dest, e))?;

    tracing::debug!("Downloaded {} bytes from {} to {:?}", written, url, dest);
    Ok(written)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[test]
    fn parse_distinguishes_urls_and_paths() {
        assert_eq!(
            MediaSource::parse("https://cdn.example.org/files/clip.MP4?token=1"),
            MediaSource::Url("https://cdn.example.org/files/clip.MP4?token=1".into())
        );
        assert_eq!(
            MediaSource::parse(" ./voice.ogg "),
            MediaSource::Path(PathBuf::from("./voice.ogg"))
        );
    }

    #[test]
    fn names_and_extensions() {
        let url = MediaSource::parse("https://cdn.example.org/files/clip.MP4?token=1");
        assert_eq!(url.file_name().as_deref(), Some("clip.MP4"));
        assert_eq!(url.extension().as_deref(), Some("mp4"));

        let bare = MediaSource::parse("https://cdn.example.org/");
        assert_eq!(bare.file_name(), None);

        let path = MediaSource::parse("/tmp/sticker.webp");
        assert_eq!(path.extension().as_deref(), Some("webp"));
    }

    #[tokio::test]
    async fn fetch_copies_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.ogg");
        tokio::fs::write(&src, b"OggS").await.unwrap();

        let dest = dir.path().join("job").join("input.ogg");
        let client = reqwest::Client::new();
        let copied = fetch(&client, &MediaSource::Path(src), &dest, 4)
            .await
            .unwrap();

        assert_eq!(copied, 4);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"OggS");
    }

    #[tokio::test]
    async fn fetch_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let client = reqwest::Client::new();
        let err = fetch(
            &client,
            &MediaSource::Path(dir.path().join("absent.mp4")),
            &dir.path().join("input.mp4"),
            1024,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OperationError::Io { .. }));
    }

    #[tokio::test]
    async fn fetch_refuses_oversized_local_files_before_copying() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("huge.mp4");
        tokio::fs::write(&src, vec![0u8; 17]).await.unwrap();

        let dest = dir.path().join("job").join("input.mp4");
        let client = reqwest::Client::new();
        let err = fetch(&client, &MediaSource::Path(src), &dest, 16)
            .await
            .unwrap_err();

        assert!(matches!(err, OperationError::TooLarge { size: 17, limit: 16 }));
        assert!(!dest.exists());
    }
}
