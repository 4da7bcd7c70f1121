// WikiVoice - Wiki Voice Line Downloader for Desktop
// Copyright (C) 2025 WikiVoice Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! HTTP client for the wiki API and file downloads
//!
//! This module wraps `reqwest::Client` with the behaviour every other layer
//! relies on:
//!
//! - A browser-like header set. The User-Agent is picked from a small pool
//!   once per process, so all requests of a run present the same identity.
//! - A cookie store kept for the process lifetime. The target wiki uses
//!   session cookies for rate limiting; discarding them between requests
//!   gets a client throttled much earlier.
//! - A throttle interceptor: HTTP 429, 503 and 403 are retried with
//!   `retry_base_delay * attempt + random(0..retry_jitter)` up to
//!   `max_retries` times, after which the last failure is returned.
//! - Connect timeout 30s, request timeout 60s by default.
//!
//! The adapter knows nothing about MediaWiki. Query building and pagination
//! live in [`crate::api::query`].

use std::time::Duration;

use lazy_static::lazy_static;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, REFERER, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Result, WikiVoiceError};

/// Browser identities the client picks from at startup
const USER_AGENT_POOL: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:126.0) Gecko/20100101 Firefox/126.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
];

/// Default connect timeout
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default per-request timeout (covers the response body)
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Default number of retries after a throttle response
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff base per attempt
const DEFAULT_RETRY_BASE_MS: u64 = 2000;

/// Default random jitter added to every backoff sleep
const DEFAULT_RETRY_JITTER_MS: u64 = 500;

lazy_static! {
    /// User-Agent for this process, chosen once at first use
    static ref PROCESS_USER_AGENT: &'static str = {
        let idx = rand::thread_rng().gen_range(0..USER_AGENT_POOL.len());
        USER_AGENT_POOL[idx]
    };
}

/// Configuration for [`WikiClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Full API endpoint, e.g. `https://wiki.example.org/api.php`
    pub endpoint: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Retries after the initial attempt on 429/503/403
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_jitter: Duration,
    /// Overrides the pooled User-Agent when set
    pub user_agent: Option<String>,
    pub enable_cookies: bool,
}

impl ClientConfig {
    pub fn new<S: Into<String>>(endpoint: S) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
            retry_jitter: Duration::from_millis(DEFAULT_RETRY_JITTER_MS),
            user_agent: None,
            enable_cookies: true,
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn retry_jitter(mut self, jitter: Duration) -> Self {
        self.retry_jitter = jitter;
        self
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn enable_cookies(mut self, enable: bool) -> Self {
        self.enable_cookies = enable;
        self
    }
}

/// HTTP adapter shared by the query layer, the download engine and the
/// image cache
#[derive(Debug, Clone)]
pub struct WikiClient {
    client: Client,
    config: ClientConfig,
}

impl WikiClient {
    /// Build a client from configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(WikiVoiceError::invalid_input("API endpoint must not be empty"));
        }

        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| PROCESS_USER_AGENT.to_string());

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&user_agent)
                .map_err(|e| WikiVoiceError::invalid_input(format!("invalid user agent: {}", e)))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7"),
        );
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        if let Ok(referer) = HeaderValue::from_str(&config.endpoint) {
            headers.insert(REFERER, referer);
        }

        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .default_headers(headers);

        if config.enable_cookies {
            builder = builder.cookie_store(true);
        }

        let client = builder.build()?;

        Ok(Self { client, config })
    }

    /// The configured API endpoint
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Perform a GET against an absolute URL with throttle retries
    ///
    /// Returns the response on any 2xx status. Throttle statuses are retried
    /// per the adapter policy; every other non-2xx status fails immediately.
    pub async fn get_response(&self, url: &str) -> Result<Response> {
        let mut attempt: u32 = 0;

        loop {
            let response = self.client.get(url).send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }

            if is_throttle_status(status) && attempt < self.config.max_retries {
                attempt += 1;
                let delay = self.backoff_delay(attempt);
                debug!(url, status = status.as_u16(), attempt, ?delay, "throttled, backing off");
                sleep(delay).await;
                continue;
            }

            if is_throttle_status(status) {
                warn!(url, status = status.as_u16(), "throttle retries exhausted");
            }
            return Err(WikiVoiceError::UnexpectedStatusCode {
                status_code: status.as_u16(),
                url: url.to_string(),
            });
        }
    }

    /// GET the API endpoint with the given query parameters, returning the
    /// raw body text
    pub async fn get_api_text(&self, params: &[(&str, String)]) -> Result<String> {
        let mut attempt: u32 = 0;

        loop {
            let response = self
                .client
                .get(&self.config.endpoint)
                .query(params)
                .send()
                .await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response.text().await?);
            }

            if is_throttle_status(status) && attempt < self.config.max_retries {
                attempt += 1;
                let delay = self.backoff_delay(attempt);
                debug!(status = status.as_u16(), attempt, ?delay, "API throttled, backing off");
                sleep(delay).await;
                continue;
            }

            return Err(WikiVoiceError::api_failed(
                format!("API returned status {}", status),
                Some(status.as_u16()),
                Some(self.config.endpoint.clone()),
            ));
        }
    }

    /// GET the API endpoint and decode the body as JSON
    ///
    /// A body starting with `<` is an HTML page served in place of the API
    /// response (WAF interception) and is reported as [`WikiVoiceError::Blocked`]
    /// without attempting a JSON decode.
    pub async fn get_api_json(&self, params: &[(&str, String)]) -> Result<serde_json::Value> {
        let body = self.get_api_text(params).await?;

        if body.trim_start().starts_with('<') {
            return Err(WikiVoiceError::Blocked {
                endpoint: self.config.endpoint.clone(),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            let snippet: String = body.chars().take(200).collect();
            WikiVoiceError::InvalidApiResponse {
                message: format!("JSON decode failed: {}", e),
                response_body: Some(snippet),
            }
        })
    }

    /// Fetch an absolute URL fully into memory (avatar/image lookups)
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get_response(url).await?;
        Ok(response.bytes().await?.to_vec())
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.retry_base_delay * attempt;
        let jitter_ms = self.config.retry_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }
}

fn is_throttle_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE | StatusCode::FORBIDDEN
    )
}
