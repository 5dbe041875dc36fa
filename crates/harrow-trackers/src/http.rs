//! Shared HTTP plumbing for tracker plugins.
//!
//! Every plugin funnels its requests through one [`ApiTransport`]: a
//! reqwest client with the 15-second call timeout, a single-slot
//! per-second rate limiter, and the degraded flag that short-circuits
//! the plugin after a transport failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{TrackerError, TrackerResult};
use crate::limiter::RateLimiter;

const API_TIMEOUT: Duration = Duration::from_secs(15);
const USER_AGENT: &str = concat!("harrow/", env!("CARGO_PKG_VERSION"));

pub(crate) struct ApiTransport {
    client: reqwest::Client,
    limiter: RateLimiter,
    degraded: AtomicBool,
}

impl ApiTransport {
    pub(crate) fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            limiter: RateLimiter::per_second(),
            degraded: AtomicBool::new(false),
        }
    }

    /// Whether a transport failure was observed earlier in the run.
    pub(crate) fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_degraded(&self, operation: &'static str) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(operation, "tracker API degraded; skipping further calls this run");
        }
    }

    /// GET a JSON document. `ok_statuses` lists the HTTP statuses whose
    /// bodies are still decodable API answers (e.g. RED replies 400 for
    /// an unknown hash).
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: &str,
        headers: HeaderMap,
        ok_statuses: &[u16],
    ) -> TrackerResult<T> {
        if self.is_degraded() {
            return Err(TrackerError::Degraded);
        }
        self.limiter.acquire().await;

        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|source| {
                self.mark_degraded(operation);
                TrackerError::Request { operation, source }
            })?;

        self.decode(operation, response, ok_statuses).await
    }

    /// POST a JSON payload and decode a JSON answer.
    pub(crate) async fn post_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: &str,
        headers: HeaderMap,
        payload: &impl Serialize,
    ) -> TrackerResult<T> {
        if self.is_degraded() {
            return Err(TrackerError::Degraded);
        }
        self.limiter.acquire().await;

        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(payload)
            .send()
            .await
            .map_err(|source| {
                self.mark_degraded(operation);
                TrackerError::Request { operation, source }
            })?;

        self.decode(operation, response, &[200]).await
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        response: reqwest::Response,
        ok_statuses: &[u16],
    ) -> TrackerResult<T> {
        let status = response.status().as_u16();
        if !ok_statuses.contains(&status) {
            if response.status().is_server_error() {
                self.mark_degraded(operation);
            }
            return Err(TrackerError::Status { operation, status });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| TrackerError::Decode { operation, source })
    }
}

pub(crate) fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Content-Type", "application/json".parse().expect("static header"));
    headers.insert("Accept", "application/json".parse().expect("static header"));
    headers
}
