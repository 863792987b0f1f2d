//! Where credentials for the index and the blob stores are looked up
use anyhow::Result;

use self::authentication::Authentication;

pub mod authentication;
pub mod backends;
pub mod storage;

/// A source of credentials
pub trait StorageBackend: std::fmt::Debug {
    /// Retrieve the authentication information for the given host
    fn get(&self, host: &str) -> Result<Option<Authentication>>;
}
