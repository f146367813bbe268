//! Request pipeline: credential injection and failure classification.
//!
//! Every outbound call goes through [`ApiClient`]: the stored token is
//! attached as a bearer credential, the response is classified into exactly
//! one [`ApiError`], and a superseded session runs its local cleanup before
//! the failure propagates to the caller. The pipeline never silently
//! swallows a failure; it only logs diagnostics.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::config::ClientConfig;
use crate::error::{ApiError, CODE_ALREADY_LOGGED_IN, CODE_TOKEN_MISMATCH, ErrorBody};
use crate::session::SessionSignals;

/// HTTP client for the storefront backend.
///
/// Cheaply cloneable; all components share one connection pool and one set
/// of session signals.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    /// Backend base URL without the `/api` prefix, no trailing slash.
    base: String,
    signals: Arc<SessionSignals>,
}

impl ApiClient {
    /// Create a pipeline over the shared session signals.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] if the underlying HTTP client cannot be
    /// built.
    pub fn new(config: &ClientConfig, signals: Arc<SessionSignals>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        let base = config.base_url.as_str().trim_end_matches('/').to_string();

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base,
                signals,
            }),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api{path}", self.inner.base)
    }

    /// Issue a request and classify the outcome, returning the raw body text
    /// of a success response.
    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<String, ApiError> {
        let url = self.endpoint(path);
        let mut request = self.inner.client.request(method.clone(), &url);

        if let Some(token) = self.inner.signals.store().get() {
            request = request.bearer_auth(token.expose());
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        // Transport failures classify here, before any status handling.
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            debug!(%method, path, %status, "request succeeded");
            return Ok(text);
        }

        let body = ErrorBody::from_text(&text);
        let classified = classify(status, &body);

        if matches!(classified, ApiError::SessionSuperseded) {
            // The local cleanup must land before the caller observes the
            // failure: clear credential, demote to anonymous, redirect to
            // login with the session-expired indicator.
            error!(%method, path, "session superseded by a newer login, forcing local logout");
            self.inner.signals.invalidate(true);
        } else {
            error!(
                %method,
                path,
                %status,
                code = ?body.code,
                message = ?body.message,
                "request failed"
            );
        }

        Err(classified)
    }

    /// `GET` returning a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`].
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let text = self.dispatch(Method::GET, path, None).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// `POST` with a JSON body, returning a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`].
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        let text = self.dispatch(Method::POST, path, Some(body)).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// `POST` with a JSON body, ignoring the response payload.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`].
    pub async fn post_unit<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), ApiError> {
        let body = serde_json::to_value(body)?;
        self.dispatch(Method::POST, path, Some(body)).await?;
        Ok(())
    }

    /// `POST` without a request body, ignoring the response payload.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`].
    pub async fn post_empty(&self, path: &str) -> Result<(), ApiError> {
        self.dispatch(Method::POST, path, None).await?;
        Ok(())
    }

    /// `PUT` with a JSON body, ignoring the response payload.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`].
    pub async fn put_unit<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), ApiError> {
        let body = serde_json::to_value(body)?;
        self.dispatch(Method::PUT, path, Some(body)).await?;
        Ok(())
    }

    /// `DELETE`, ignoring the response payload.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`].
    pub async fn delete_unit(&self, path: &str) -> Result<(), ApiError> {
        self.dispatch(Method::DELETE, path, None).await?;
        Ok(())
    }
}

/// Priority-ordered response classification; first match wins.
///
/// Transport failures never reach this function - they classify at the send
/// boundary as [`ApiError::Network`].
fn classify(status: StatusCode, body: &ErrorBody) -> ApiError {
    let code = body.code.as_deref();
    match status {
        StatusCode::UNAUTHORIZED if code == Some(CODE_TOKEN_MISMATCH) => {
            ApiError::SessionSuperseded
        }
        StatusCode::UNAUTHORIZED => ApiError::Unauthenticated,
        StatusCode::FORBIDDEN if code == Some(CODE_ALREADY_LOGGED_IN) => {
            ApiError::ConcurrentSessionConflict
        }
        _ => ApiError::RequestFailed {
            status,
            message: body.message.clone().unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use url::Url;

    fn error_body(code: Option<&str>, message: Option<&str>) -> ErrorBody {
        ErrorBody {
            code: code.map(String::from),
            message: message.map(String::from),
        }
    }

    #[test]
    fn test_classify_token_mismatch_as_superseded() {
        let classified = classify(
            StatusCode::UNAUTHORIZED,
            &error_body(Some("TOKEN_MISMATCH"), Some("superseded")),
        );
        assert!(matches!(classified, ApiError::SessionSuperseded));
    }

    #[test]
    fn test_classify_plain_401_as_unauthenticated() {
        let classified = classify(StatusCode::UNAUTHORIZED, &error_body(None, None));
        assert!(matches!(classified, ApiError::Unauthenticated));

        // An unrelated code on a 401 is still just unauthenticated.
        let classified = classify(
            StatusCode::UNAUTHORIZED,
            &error_body(Some("BAD_TOKEN"), None),
        );
        assert!(matches!(classified, ApiError::Unauthenticated));
    }

    #[test]
    fn test_classify_already_logged_in_conflict() {
        let classified = classify(
            StatusCode::FORBIDDEN,
            &error_body(Some("ALREADY_LOGGED_IN"), None),
        );
        assert!(matches!(classified, ApiError::ConcurrentSessionConflict));
    }

    #[test]
    fn test_classify_plain_403_as_request_failed() {
        let classified = classify(StatusCode::FORBIDDEN, &error_body(None, Some("forbidden")));
        match classified {
            ApiError::RequestFailed { status, message } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(message, "forbidden");
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn test_classify_falls_back_to_canonical_reason() {
        let classified = classify(StatusCode::INTERNAL_SERVER_ERROR, &error_body(None, None));
        match classified {
            ApiError::RequestFailed { status, message } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(message, "Internal Server Error");
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn test_endpoint_joins_api_prefix() {
        let config =
            ClientConfig::new(Url::parse("http://localhost:4000/").expect("valid url"));
        let signals = SessionSignals::new(Arc::new(MemoryCredentialStore::new()));
        let api = ApiClient::new(&config, signals).expect("build client");
        assert_eq!(api.endpoint("/users/me"), "http://localhost:4000/api/users/me");
    }
}
