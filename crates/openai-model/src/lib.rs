//! A model provider for OpenAI-compatible chat completion APIs.
//!
//! Requests are streamed over server-sent events. Connection failures,
//! rate limits and server errors are retried with exponential backoff
//! until the configured retry duration runs out.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use backoff::ExponentialBackoffBuilder;
use mime::Mime;
use reqwest::{Client, Response, StatusCode, header};
use sidekick_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest,
};

pub use config::{OpenAIConfig, OpenAIConfigBuilder};
use io::{Chunks, Sse};
use proto::{ChatCompletionRequest, ErrorBody};
pub use response::OpenAIResponse;

/// Error type for [`OpenAIProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// OpenAI-compatible model provider.
#[derive(Clone, Debug)]
pub struct OpenAIProvider {
    client: Client,
    config: Arc<OpenAIConfig>,
}

impl OpenAIProvider {
    /// Creates a new `OpenAIProvider` with the given configuration.
    #[inline]
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    /// Returns the configuration of this provider.
    #[inline]
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }
}

impl ModelProvider for OpenAIProvider {
    type Error = Error;
    type Response = OpenAIResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let openai_req = Arc::new(proto::create_request(req, &self.config));
        let client = self.client.clone();
        let config = Arc::clone(&self.config);
        let backoff = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(config.max_retry_duration))
            .build();

        async move {
            let resp = backoff::future::retry(backoff, || {
                send_once(client.clone(), config.clone(), openai_req.clone())
            })
            .await?;

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_valid_content_type = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.subtype().as_str() == "event-stream")
                .unwrap_or(false);
            if !is_valid_content_type {
                return Err(Error::new(
                    format!("unexpected content type: {content_type:?}"),
                    ErrorKind::Other,
                ));
            }

            // Here we got a successful response.
            let chunks = Chunks::from_response(resp);
            let sse = Sse::new(chunks);
            Ok(OpenAIResponse::from_sse(sse))
        }
    }
}

async fn send_once(
    client: Client,
    config: Arc<OpenAIConfig>,
    openai_req: Arc<ChatCompletionRequest>,
) -> Result<Response, backoff::Error<Error>> {
    let resp = client
        .post(format!("{}/chat/completions", config.base_url))
        .header(header::AUTHORIZATION, format!("Bearer {}", config.api_key))
        .header(header::ACCEPT, "text/event-stream")
        .json(openai_req.as_ref())
        .send()
        .await
        .map_err(|err| {
            warn!("failed to reach the model provider: {err}");
            backoff::Error::transient(Error::new(
                format!("{err}"),
                ErrorKind::Unavailable,
            ))
        })?;

    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(body) => format!("{status}: {}", body.error.message),
        Err(_) => format!("{status}: {body}"),
    };
    warn!("model provider returned an error: {message}");

    let err = Error::new(message, classify_status(status));
    if is_transient(status) {
        Err(backoff::Error::transient(err))
    } else {
        Err(backoff::Error::permanent(err))
    }
}

fn classify_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimitExceeded,
        s if s.is_server_error() => ErrorKind::Unavailable,
        _ => ErrorKind::Other,
    }
}

#[inline]
fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            ErrorKind::RateLimitExceeded
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY),
            ErrorKind::Unavailable
        );
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), ErrorKind::Other);

        assert!(is_transient(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_transient(StatusCode::BAD_REQUEST));
    }
}
