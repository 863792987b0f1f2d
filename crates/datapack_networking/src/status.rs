//! Classification of HTTP responses and failures.
//!
//! Status codes 200-399 are a success, 401 and 403 mean the credentials were
//! missing or rejected, any other 4xx means the object does not exist (or the
//! request was wrong) and everything else is a server failure. Failing to
//! get a response at all is a transport failure, which is reported
//! separately so "connection refused" is never confused with "not found".

use reqwest::{Response, StatusCode};
use thiserror::Error;
use url::Url;

/// The outcome class of an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 200-399
    Success,
    /// 401 and 403
    Unauthorized,
    /// Any other 4xx
    NotFound,
    /// Everything else
    ServerError,
}

impl StatusClass {
    /// Classifies a status code.
    pub fn of(status: StatusCode) -> Self {
        match status.as_u16() {
            200..=399 => StatusClass::Success,
            401 | 403 => StatusClass::Unauthorized,
            400..=499 => StatusClass::NotFound,
            _ => StatusClass::ServerError,
        }
    }
}

/// A failed HTTP request.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The server does not have the requested object.
    #[error("{url} not found (HTTP {status})")]
    NotFound {
        /// The requested URL
        url: Url,
        /// The status the server responded with
        status: StatusCode,
    },

    /// The credentials were missing or rejected.
    #[error("access to {url} denied (HTTP {status}), check the configured user and token")]
    Unauthorized {
        /// The requested URL
        url: Url,
        /// The status the server responded with
        status: StatusCode,
    },

    /// The server failed to handle the request.
    #[error("server error for {url} (HTTP {status})")]
    Server {
        /// The requested URL
        url: Url,
        /// The status the server responded with
        status: StatusCode,
    },

    /// No response was received.
    #[error("{} {url}", transport_message(.source))]
    Transport {
        /// The requested URL
        url: Url,
        /// The underlying error
        #[source]
        source: reqwest_middleware::Error,
    },
}

fn transport_message(err: &reqwest_middleware::Error) -> &'static str {
    match err {
        reqwest_middleware::Error::Reqwest(e) if e.is_connect() => {
            "could not connect (connection refused or host unreachable) to"
        }
        reqwest_middleware::Error::Reqwest(e) if e.is_timeout() => "timed out talking to",
        _ => "request failed for",
    }
}

impl HttpError {
    /// Wraps an error that occurred before a response was received.
    pub fn transport(url: Url, source: reqwest_middleware::Error) -> Self {
        HttpError::Transport { url, source }
    }

    /// Returns true if the server does not have the requested object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, HttpError::NotFound { .. })
    }

    /// Returns true if no connection could be established.
    pub fn is_connect(&self) -> bool {
        matches!(
            self,
            HttpError::Transport {
                source: reqwest_middleware::Error::Reqwest(e),
                ..
            } if e.is_connect()
        )
    }
}

/// Turns a response into an error unless its status is a success.
pub fn check_response(response: Response) -> Result<Response, HttpError> {
    let status = response.status();
    let url = response.url().clone();
    match StatusClass::of(status) {
        StatusClass::Success => Ok(response),
        StatusClass::Unauthorized => Err(HttpError::Unauthorized { url, status }),
        StatusClass::NotFound => Err(HttpError::NotFound { url, status }),
        StatusClass::ServerError => Err(HttpError::Server { url, status }),
    }
}
