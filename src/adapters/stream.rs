//! Streaming request and response bodies to disk.

use axum::BoxError;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio_util::io::StreamReader;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("body exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Writes `stream` to a new file at `path` and returns the number of bytes
/// written. With a `limit`, reading stops one byte past it and the call
/// fails with [`StreamError::TooLarge`].
pub async fn stream_to_file<S, E>(
    path: &Path,
    stream: S,
    limit: Option<u64>,
) -> Result<u64, StreamError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    let body_with_io_error = stream.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
    let body_reader = StreamReader::new(body_with_io_error);
    futures::pin_mut!(body_reader);

    let mut file = BufWriter::new(File::create(path).await?);
    let written = match limit {
        Some(limit) => {
            let mut limited = body_reader.take(limit.saturating_add(1));
            let written = tokio::io::copy(&mut limited, &mut file).await?;
            if written > limit {
                return Err(StreamError::TooLarge { limit });
            }
            written
        }
        None => tokio::io::copy(&mut body_reader, &mut file).await?,
    };
    file.flush().await?;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, io::Error>> {
        futures::stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_exact_limit_is_accepted() {
        let file = NamedTempFile::new().unwrap();
        let written = stream_to_file(file.path(), chunks(&[b"12345", b"67890"]), Some(10))
            .await
            .unwrap();
        assert_eq!(written, 10);
        assert_eq!(std::fs::read(file.path()).unwrap(), b"1234567890");
    }

    #[tokio::test]
    async fn test_one_byte_over_is_rejected() {
        let file = NamedTempFile::new().unwrap();
        let err = stream_to_file(file.path(), chunks(&[b"12345", b"678901"]), Some(10))
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::TooLarge { limit: 10 }));
    }

    #[tokio::test]
    async fn test_stream_errors_surface_as_io() {
        let file = NamedTempFile::new().unwrap();
        let broken = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let err = stream_to_file(file.path(), broken, None).await.unwrap_err();
        assert!(matches!(err, StreamError::Io(_)));
    }
}
