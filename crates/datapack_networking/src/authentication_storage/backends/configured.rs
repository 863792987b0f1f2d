//! Credentials given in the configuration file.
use std::collections::HashMap;

use anyhow::Result;

use crate::{authentication_storage::StorageBackend, Authentication};

/// A fixed set of credentials keyed by host. Credentials from the
/// configuration file end up here; they are never written back.
#[derive(Debug, Default, Clone)]
pub struct ConfiguredCredentials {
    hosts: HashMap<String, Authentication>,
}

impl ConfiguredCredentials {
    /// Returns a copy that authenticates `host` with `authentication`.
    pub fn with(mut self, host: impl Into<String>, authentication: Authentication) -> Self {
        self.hosts.insert(host.into(), authentication);
        self
    }
}

impl FromIterator<(String, Authentication)> for ConfiguredCredentials {
    fn from_iter<T: IntoIterator<Item = (String, Authentication)>>(iter: T) -> Self {
        Self {
            hosts: iter.into_iter().collect(),
        }
    }
}

impl StorageBackend for ConfiguredCredentials {
    fn get(&self, host: &str) -> Result<Option<Authentication>> {
        Ok(self.hosts.get(host).cloned())
    }
}
