//! Typed HTTP client for a running code execution server.

use code_exec::{EngineState, ExecuteRequest, ExecutionResult, Language};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub use code_exec;

/// State of one engine as reported by the server
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EngineStatus {
    pub language: Language,
    pub state: EngineState,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone)]
pub struct RuntimeClient {
    base_url: String,
    http_client: Client,
}

impl RuntimeClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        let http_client = Client::builder().timeout(Duration::from_secs(90)).build()?;
        Ok(Self::with_client(base_url, http_client))
    }

    pub fn with_client(base_url: impl Into<String>, http_client: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        }
    }

    /// Submit code for execution. Logical failures of the code come back as
    /// an unsuccessful [`ExecutionResult`], rejected requests as [`Error::Rejected`].
    pub async fn execute(&self, request: &ExecuteRequest) -> Result<ExecutionResult, Error> {
        debug!(language = %request.language, "Submitting code to {}", self.base_url);
        let response = self
            .http_client
            .post(format!("{}/execute", self.base_url))
            .json(request)
            .send()
            .await?;

        Ok(check(response).await?.json::<ExecutionResult>().await?)
    }

    pub async fn health(&self) -> Result<bool, Error> {
        let response = self
            .http_client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    pub async fn engines(&self) -> Result<Vec<EngineStatus>, Error> {
        let response = self
            .http_client
            .get(format!("{}/engines", self.base_url))
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }

    /// Ask the server to re-create a failed engine.
    pub async fn reset_engine(&self, language: Language) -> Result<EngineStatus, Error> {
        let response = self
            .http_client
            .post(format!("{}/engines/{}/reset", self.base_url, language))
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }
}

async fn check(response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    };
    Err(Error::Rejected { status, message })
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: StatusCode, message: String },
}
