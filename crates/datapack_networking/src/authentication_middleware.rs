//! `reqwest` middleware that authenticates requests with data from the `AuthenticationStorage`
use crate::{Authentication, AuthenticationStorage};
use async_trait::async_trait;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};

/// `reqwest` middleware to authenticate requests
#[derive(Clone, Debug, Default)]
pub struct AuthenticationMiddleware {
    auth_storage: AuthenticationStorage,
}

#[async_trait]
impl Middleware for AuthenticationMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        // If an `Authorization` header is already present, don't authenticate
        if req.headers().get(reqwest::header::AUTHORIZATION).is_some() {
            return next.run(req, extensions).await;
        }

        match self.auth_storage.get_by_url(req.url()) {
            Err(e) => {
                tracing::warn!("failed to look up credentials for {}: {e}", req.url());
                next.run(req, extensions).await
            }
            Ok(auth) => {
                let req = Self::authenticate_request(req, &auth)?;
                next.run(req, extensions).await
            }
        }
    }
}

impl AuthenticationMiddleware {
    /// Create a new authentication middleware with the given authentication storage
    pub fn new(auth_storage: AuthenticationStorage) -> Self {
        Self { auth_storage }
    }

    /// Authenticate the given request with the given authentication information
    fn authenticate_request(
        mut req: Request,
        auth: &Option<Authentication>,
    ) -> reqwest_middleware::Result<Request> {
        let header = match auth {
            Some(Authentication::BearerToken(token)) => format!("Bearer {token}"),
            Some(Authentication::BasicHTTP { username, password }) => {
                let basic_auth = BASE64_STANDARD.encode(format!("{username}:{password}"));
                format!("Basic {basic_auth}")
            }
            // S3 requests are signed by the S3 client itself.
            Some(Authentication::S3Credentials { .. }) | None => return Ok(req),
        };

        let mut header_value = reqwest::header::HeaderValue::from_str(&header)
            .map_err(reqwest_middleware::Error::middleware)?;
        header_value.set_sensitive(true);
        req.headers_mut()
            .insert(reqwest::header::AUTHORIZATION, header_value);
        Ok(req)
    }
}
