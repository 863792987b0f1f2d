#![deny(missing_docs)]

//! Networking utilities for datapack, specifically authenticating requests
//! against the dataset index and blob stores and classifying their
//! responses.
pub use authentication_middleware::AuthenticationMiddleware;

pub use authentication_storage::{authentication::Authentication, storage::AuthenticationStorage};

pub use status::{check_response, HttpError, StatusClass};

pub mod authentication_middleware;
pub mod authentication_storage;
pub mod retry_policies;
pub mod status;
