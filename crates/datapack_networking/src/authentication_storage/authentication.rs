//! Authentication methods understood by the index and the blob stores
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The different authentication methods that are supported
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Authentication {
    /// A bearer token is sent as a header of the form
    /// `Authorization: Bearer {TOKEN}`
    BearerToken(String),
    /// A user and token pair sent as HTTP basic auth
    BasicHTTP {
        /// The username to use for basic auth
        username: String,
        /// The password (or token) to use for basic auth
        password: String,
    },
    /// S3 credentials, used by the S3 blob store rather than sent as a header
    S3Credentials {
        /// The access key ID to use for S3 authentication
        access_key_id: String,
        /// The secret access key to use for S3 authentication
        secret_access_key: String,
        /// The session token to use for S3 authentication
        session_token: Option<String>,
    },
}

// Secrets must never end up in logs.
impl std::fmt::Debug for Authentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Authentication::BearerToken(_) => f.write_str("BearerToken(********)"),
            Authentication::BasicHTTP { username, .. } => f
                .debug_struct("BasicHTTP")
                .field("username", username)
                .field("password", &"********")
                .finish(),
            Authentication::S3Credentials { access_key_id, .. } => f
                .debug_struct("S3Credentials")
                .field("access_key_id", access_key_id)
                .finish_non_exhaustive(),
        }
    }
}

/// An error that can occur when parsing an authentication string
#[derive(Debug, thiserror::Error)]
pub enum AuthenticationParseError {
    /// The stored value is not a serialized [`Authentication`]
    #[error("invalid authentication token")]
    InvalidToken,
}

impl FromStr for Authentication {
    type Err = AuthenticationParseError;

    /// Parse an authentication string into an Authentication struct
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s).map_err(|_err| AuthenticationParseError::InvalidToken)
    }
}

impl Authentication {
    /// Builds the credentials configured for the index: basic auth when a
    /// user is known, a bearer token otherwise.
    pub fn from_user_and_token(user: Option<&str>, token: &str) -> Self {
        match user {
            Some(user) => Authentication::BasicHTTP {
                username: user.to_string(),
                password: token.to_string(),
            },
            None => Authentication::BearerToken(token.to_string()),
        }
    }

    /// Get the scheme of the authentication method
    pub fn method(&self) -> &str {
        match self {
            Authentication::BearerToken(_) => "BearerToken",
            Authentication::BasicHTTP { .. } => "BasicHTTP",
            Authentication::S3Credentials { .. } => "S3",
        }
    }
}
