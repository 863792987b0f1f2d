use super::{ContentHash, HashingWriter};
use bytes::Bytes;
use digest::Digest;
use std::{
    io::Error,
    path::{Path, PathBuf},
    pin::Pin,
    task::{Context, Poll},
};
use tokio::io::AsyncWrite;

impl<W: AsyncWrite + Unpin> AsyncWrite for HashingWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, Error>> {
        let this = self.get_mut();
        match Pin::new(&mut this.writer).poll_write(cx, buf) {
            Poll::Ready(Ok(bytes)) => {
                this.hasher.update(&buf[..bytes]);
                Poll::Ready(Ok(bytes))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Pin::new(&mut self.get_mut().writer).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Pin::new(&mut self.get_mut().writer).poll_shutdown(cx)
    }
}

/// Runs a blocking hashing job on the blocking thread pool. Panics are
/// propagated to the caller, cancellation of the runtime surfaces as an
/// [`std::io::ErrorKind::Interrupted`] error.
async fn run_blocking<T, F>(f: F) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(_) => Err(Error::new(
            std::io::ErrorKind::Interrupted,
            "hashing task was cancelled",
        )),
    }
}

/// Computes the content address of a file without blocking the async
/// runtime.
pub async fn compute_file_digest_async(path: impl AsRef<Path>) -> Result<ContentHash, Error> {
    let path: PathBuf = path.as_ref().to_path_buf();
    run_blocking(move || super::compute_file_digest(path)).await
}

/// Async counterpart of [`super::read_and_hash`].
pub async fn read_and_hash_async(path: impl AsRef<Path>) -> Result<(Bytes, ContentHash), Error> {
    let path: PathBuf = path.as_ref().to_path_buf();
    run_blocking(move || super::read_and_hash(path)).await
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_async_hashing_writer() {
        let mut writer = HashingWriter::new(Vec::<u8>::new());
        writer.write_all(b"hello").await.unwrap();
        writer.flush().await.unwrap();
        let (inner, hash) = writer.finalize();
        assert_eq!(inner, b"hello");
        assert_eq!(hash.to_string(), "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
    }

    #[tokio::test]
    async fn test_file_digest_async() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("hello.txt");
        tokio::fs::write(&path, "hello").await.unwrap();

        let hash = compute_file_digest_async(&path).await.unwrap();
        let (bytes, same) = read_and_hash_async(&path).await.unwrap();
        assert_eq!(hash, same);
        assert_eq!(bytes.as_ref(), b"hello");
    }
}
