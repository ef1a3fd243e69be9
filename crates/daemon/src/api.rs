// SPDX-License-Identifier: MIT

//! Direct game-API calls that need the page session's cookies.
//!
//! The page bridge hands over the cookies; the daemon replays them on a
//! POST the page itself cannot make (the farm-list endpoints reject
//! requests without the right headers). The `X-Version` header value is
//! an opaque pass-through chosen by the caller or config.

use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

const API_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api answered {status}: {body}")]
    Status { status: u16, body: String },
}

pub struct FarmListApi {
    client: reqwest::Client,
}

impl FarmListApi {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// POST `body` to `url` with the session cookies and optional
    /// X-Version header, returning the JSON response.
    pub async fn post(
        &self,
        url: &str,
        body: Value,
        cookies: &HashMap<String, String>,
        version: Option<&str>,
    ) -> Result<Value, ApiError> {
        let cookie_header = cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");

        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&body);
        if !cookie_header.is_empty() {
            request = request.header(reqwest::header::COOKIE, cookie_header);
        }
        if let Some(version) = version {
            request = request.header("X-Version", version);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status: status.as_u16(), body });
        }
        Ok(response.json().await?)
    }
}

impl Default for FarmListApi {
    fn default() -> Self {
        Self::new()
    }
}
