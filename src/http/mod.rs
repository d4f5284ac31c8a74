#[cfg(test)]
mod tests;

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, warn};

const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);
const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Request error: {0}")]
    Request(String),
    #[error("Failed to encode request: {0}")]
    Encode(String),
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl HttpError {
    #[inline]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Whether a request may be sent again after a retryable failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// Idempotent call: retried on transport errors, 429 and 5xx
    Idempotent,
    /// Issued exactly once
    Never,
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Post,
}

/// Blocking JSON client with bounded exponential-backoff retries
#[derive(Debug, Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
    retry_attempts: u32,
    backoff: Duration,
    headers: Vec<(String, String)>,
}

impl HttpClient {
    #[inline]
    pub fn new(timeout: Duration, retry_attempts: u32) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            retry_attempts: retry_attempts.max(1),
            backoff: DEFAULT_BACKOFF,
            headers: Vec::new(),
        }
    }

    /// Adds a header sent with every request.
    #[inline]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Base delay before the first retry; doubled for each further attempt.
    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[inline]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    #[inline]
    pub fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, HttpError> {
        let body = self.execute(Method::Get, url, None, Retry::Idempotent)?;
        decode(&body)
    }

    #[inline]
    pub fn post_json<B, T>(&self, url: &str, body: &B, retry: Retry) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request_json =
            serde_json::to_string(body).map_err(|e| HttpError::Encode(e.to_string()))?;
        let response = self.execute(Method::Post, url, Some(&request_json), retry)?;
        decode(&response)
    }

    fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<&str>,
        retry: Retry,
    ) -> Result<String, HttpError> {
        let attempts = match retry {
            Retry::Idempotent => self.retry_attempts,
            Retry::Never => 1,
        };
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!("HTTP {:?} {} attempt {}/{}", method, url, attempt, attempts);

            let error = match self.send_once(method, url, body) {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => error,
            };

            let should_retry = match &error {
                HttpError::Status { status, .. } if *status >= 500 || *status == 429 => {
                    warn!(
                        "Server error (status {}), attempt {}/{}",
                        status, attempt, attempts
                    );
                    true
                }
                HttpError::Status { status, .. } => {
                    warn!("Client error (status {}), not retrying", status);
                    false
                }
                HttpError::Transport(message) => {
                    warn!(
                        "Transport error: {}, attempt {}/{}",
                        message, attempt, attempts
                    );
                    true
                }
                HttpError::Request(_) | HttpError::Encode(_) | HttpError::Decode(_) => false,
            };

            if !should_retry {
                return Err(error);
            }

            last_error = Some(error);

            if attempt < attempts {
                let delay = self.backoff * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1);
                debug!("Waiting {:?} before retry", delay);
                std::thread::sleep(delay);
            }
        }

        error!("All {} attempts failed for request to {}", attempts, url);
        Err(last_error.unwrap_or_else(|| HttpError::Transport("request failed".to_string())))
    }

    fn send_once(&self, method: Method, url: &str, body: Option<&str>) -> Result<String, HttpError> {
        let result = match method {
            Method::Get => {
                let mut request = self.agent.get(url);
                for (name, value) in &self.headers {
                    request = request.header(name.as_str(), value.as_str());
                }
                request.call()
            }
            Method::Post => {
                let mut request = self
                    .agent
                    .post(url)
                    .header("Content-Type", "application/json");
                for (name, value) in &self.headers {
                    request = request.header(name.as_str(), value.as_str());
                }
                request.send(body.unwrap_or("{}"))
            }
        };

        let mut response = result.map_err(transport_error)?;
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(transport_error)?;

        if (200..300).contains(&status) {
            Ok(text)
        } else {
            Err(HttpError::Status {
                status,
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            })
        }
    }
}

fn transport_error(error: ureq::Error) -> HttpError {
    match &error {
        ureq::Error::StatusCode(status) => HttpError::Status {
            status: *status,
            body: String::new(),
        },
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => HttpError::Transport(error.to_string()),
        other => HttpError::Request(other.to_string()),
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, HttpError> {
    serde_json::from_str(body).map_err(|e| HttpError::Decode(e.to_string()))
}

/// Appends `path` to `base`, keeping any path prefix already on the base URL.
#[inline]
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
