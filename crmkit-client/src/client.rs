use crmkit_core::{ApiError, ErrorEnvelope, Request, Response};
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::ApiConfig;

/// The engine: one shared HTTP client plus configuration.
///
/// Cheap to share by reference; all per-call state (cursors, work queues)
/// is owned by the individual pagination streams.
#[derive(Debug)]
pub struct Client {
    http: reqwest::Client,
    config: ApiConfig,
}

impl Client {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| ApiError::Transport {
                method: String::new(),
                message: format!("failed to build HTTP client: {error}"),
                retryable: false,
            })?;
        Ok(Client { http, config })
    }

    /// Build the engine around an externally owned HTTP client, sharing its
    /// connection pool with the rest of the process.
    pub fn with_http_client(http: reqwest::Client, config: ApiConfig) -> Self {
        Client { http, config }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Call a method with retries and return just the `result` value.
    pub async fn call(&self, request: &Request) -> Result<Value, ApiError> {
        Ok(self.call_response(request).await?.result)
    }

    /// Call a method with retries and return the full response envelope.
    pub async fn call_response(&self, request: &Request) -> Result<Response, ApiError> {
        self.config
            .retry_policy()
            .run(|| self.call_once(request))
            .await
    }

    /// One attempt: POST, then classify the body and status.
    pub(crate) async fn call_once(&self, request: &Request) -> Result<Response, ApiError> {
        let url = format!("{}{}", self.config.webhook_url, request.method);
        debug!(method = %request.method, "calling");

        let http_response = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request.parameters)
            .send()
            .await
            .map_err(|error| self.transport_error(&request.method, error))?;

        let status = http_response.status();
        let body = http_response
            .text()
            .await
            .map_err(|error| self.transport_error(&request.method, error))?;
        trace!(method = %request.method, status = status.as_u16(), %body, "response");

        // Some failures carry an error envelope with a 2xx status, and some
        // error rewrites carry an unreadable body with a failure status:
        // probe the error shape first and swallow parse failures here.
        let parsed: Option<Value> = serde_json::from_str(&body).ok();
        if let Some(value) = &parsed {
            if let Ok(envelope) = serde_json::from_value::<ErrorEnvelope>(value.clone()) {
                return Err(self.api_error(&envelope));
            }
        }

        if !status.is_success() {
            return Err(ApiError::Status {
                method: request.method.clone(),
                status: status.as_u16(),
                retryable: self.config.retry_statuses.contains(&status.as_u16()),
            });
        }

        match parsed {
            Some(value) => serde_json::from_value(value).map_err(|error| ApiError::Decode {
                method: request.method.clone(),
                message: error.to_string(),
            }),
            None => Err(ApiError::Decode {
                method: request.method.clone(),
                message: "response body is not valid JSON".into(),
            }),
        }
    }

    /// Classify an error envelope against the configured retryable codes.
    /// Used for direct responses and batch `result_error` slots alike.
    pub(crate) fn api_error(&self, envelope: &ErrorEnvelope) -> ApiError {
        ApiError::Api {
            code: envelope.error.clone(),
            description: envelope.error_description.clone().unwrap_or_default(),
            retryable: self.config.retry_errors.contains(&envelope.error),
        }
    }

    fn transport_error(&self, method: &str, error: reqwest::Error) -> ApiError {
        // Connection resets, timeouts and mid-body drops are transient;
        // anything else (TLS setup, invalid URL) is not worth repeating.
        let retryable = error.is_connect() || error.is_timeout() || error.is_body();
        ApiError::Transport {
            method: method.to_string(),
            message: error.to_string(),
            retryable,
        }
    }
}
