#![deny(missing_docs)]

//! Content addressing for datasets.
//!
//! Every blob a dataset consists of is identified by the SHA-1 digest of its
//! bytes, rendered as 40 lowercase hexadecimal characters. This crate provides
//! the [`ContentHash`] type that carries such an address together with a
//! handful of functions to compute it from different sources.
//!
//! # Examples
//!
//! ```no_run
//! use datapack_digest::{compute_bytes_digest, compute_file_digest};
//!
//! let hash = compute_bytes_digest("hello");
//! assert_eq!(hash.to_string(), "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
//!
//! let file_hash = compute_file_digest("somefile.txt").unwrap();
//! println!("file hash: {file_hash}");
//! ```
//!
//! # Available functions
//!
//! - [`compute_bytes_digest`]: Computes the address of an in-memory buffer.
//! - [`compute_file_digest`]: Computes the address of a file on disk.
//! - [`read_and_hash`]: Reads a file into memory and computes the address of
//!   exactly the bytes that were read.
//! - [`HashingWriter`] and [`HashingReader`]: wrap a writer or reader and
//!   compute the address of the bytes that pass through them.
//!
//! With the `tokio` feature enabled, [`HashingWriter`] also implements
//! [`::tokio::io::AsyncWrite`] and the `*_async` variants run the hashing on
//! the blocking thread pool.

mod hash;

#[cfg(feature = "tokio")]
mod tokio;

#[cfg(feature = "tokio")]
pub use crate::tokio::{compute_file_digest_async, read_and_hash_async};

pub use hash::{ContentHash, InvalidContentHashError, InvalidContentHashKind};
pub use sha1::Sha1;

use bytes::Bytes;
use digest::{Digest, Output};
use std::{
    fs::File,
    io::{Read, Write},
    path::Path,
};

/// A type alias for the raw output of a SHA-1 hash.
pub type Sha1Hash = Output<Sha1>;

/// Compute the content address of the file at the specified location.
///
/// Any read error aborts the computation, a partially read file never
/// produces a hash.
pub fn compute_file_digest(path: impl AsRef<Path>) -> Result<ContentHash, std::io::Error> {
    let mut file = File::open(path)?;

    let mut hasher = Sha1::default();
    std::io::copy(&mut file, &mut hasher)?;

    Ok(ContentHash::from(hasher.finalize()))
}

/// Compute the content address of the specified bytes.
pub fn compute_bytes_digest(bytes: impl AsRef<[u8]>) -> ContentHash {
    let mut hasher = Sha1::default();
    hasher.update(bytes);
    ContentHash::from(hasher.finalize())
}

/// Reads the whole file at `path` into memory and hashes the same bytes in a
/// single pass over one open file handle.
///
/// The returned buffer is exactly the content the hash was computed over, so
/// a caller that transfers the buffer afterwards transfers what was verified,
/// even if the file changes on disk in the meantime.
pub fn read_and_hash(path: impl AsRef<Path>) -> Result<(Bytes, ContentHash), std::io::Error> {
    let file = File::open(path)?;
    let capacity = file
        .metadata()
        .map(|m| usize::try_from(m.len()).unwrap_or(0))
        .unwrap_or(0);

    let mut reader = HashingReader::new(file);
    let mut buffer = Vec::with_capacity(capacity);
    reader.read_to_end(&mut buffer)?;

    let (_, hash) = reader.finalize();
    Ok((Bytes::from(buffer), hash))
}

/// Parses a hex string into a raw SHA-1 digest. Returns `None` if the string
/// is not exactly 40 hexadecimal characters.
pub fn parse_digest_from_hex(str: &str) -> Option<Sha1Hash> {
    let mut hash = Sha1Hash::default();
    match hex::decode_to_slice(str, &mut hash) {
        Ok(_) => Some(hash),
        Err(_) => None,
    }
}

/// A [`Write`] implementation that forwards all bytes to an inner writer and
/// hashes them on the fly. Call [`HashingWriter::finalize`] to retrieve both
/// the inner writer and the content address of everything written.
pub struct HashingWriter<W> {
    writer: W,
    hasher: Sha1,
}

impl<W> HashingWriter<W> {
    /// Constructs a new instance from a writer and a new (empty) hasher.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            hasher: Sha1::default(),
        }
    }

    /// Consumes this instance and returns the inner writer and the content
    /// address of all bytes written to this instance.
    pub fn finalize(self) -> (W, ContentHash) {
        (self.writer, ContentHash::from(self.hasher.finalize()))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let bytes = self.writer.write(buf)?;
        self.hasher.update(&buf[..bytes]);
        Ok(bytes)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// A [`Read`] implementation that hashes every byte read from an inner
/// reader. Call [`HashingReader::finalize`] to retrieve both the inner reader
/// and the content address of everything read.
pub struct HashingReader<R> {
    reader: R,
    hasher: Sha1,
}

impl<R> HashingReader<R> {
    /// Constructs a new instance from a reader and a new (empty) hasher.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            hasher: Sha1::default(),
        }
    }

    /// Consumes this instance and returns the inner reader and the content
    /// address of all bytes read from this instance.
    pub fn finalize(self) -> (R, ContentHash) {
        (self.reader, ContentHash::from(self.hasher.finalize()))
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let bytes_read = self.reader.read(buf)?;
        self.hasher.update(&buf[..bytes_read]);
        Ok(bytes_read)
    }
}
