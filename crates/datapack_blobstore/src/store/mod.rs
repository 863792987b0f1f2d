//! [`crate::BlobStore`] implementations.

pub mod fs;
pub mod http;
pub mod memory;
pub mod s3;

/// Store keys start with a `/`; paths below a root or base URL must not.
fn relative_key(key: &str) -> &str {
    key.trim_start_matches('/')
}
