//! Readable audio sources feeding the pacer

use crate::error::Result;
use bytes::Bytes;
use std::io::Cursor;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt};

/// An owned, readable stream of encoded audio bytes
pub type AudioSource = Box<dyn AsyncRead + Send + Unpin>;

/// Open a file on disk as an audio source
pub async fn open_file(path: &Path) -> Result<AudioSource> {
    let file = tokio::fs::File::open(path).await?;
    Ok(Box::new(file))
}

/// Put `buffered` back in front of `source`
///
/// Used when a paused pacer hands its source back: the bytes it had already
/// pulled but not yet emitted must be read first so nothing is lost.
pub fn prepend(buffered: Bytes, source: AudioSource) -> AudioSource {
    if buffered.is_empty() {
        source
    } else {
        Box::new(Cursor::new(buffered).chain(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prepend_reads_buffered_bytes_first() {
        let tail: AudioSource = Box::new(Cursor::new(b"world".to_vec()));
        let mut source = prepend(Bytes::from_static(b"hello "), tail);

        let mut out = Vec::new();
        source.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello world");
    }

    #[tokio::test]
    async fn test_open_missing_file_is_io_error() {
        let result = open_file(Path::new("/nonexistent/onair/song.mp3")).await;
        assert!(matches!(result, Err(crate::Error::Io(_))));
    }
}
