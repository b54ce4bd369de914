use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::error::{PipelineError, Result};

// ─── RateLimitedClient ────────────────────────────────────────────────────────

/// Thin reqwest wrapper that spaces requests out per host. It never retries
/// on its own; the strategy driver decides what is worth repeating.
pub struct RateLimitedClient {
    client: reqwest::Client,
    min_interval: Duration,
    hosts: Mutex<HashMap<String, Arc<Mutex<Option<Instant>>>>>,
}

/// Raw download result. Non-success statuses come back as data rather than
/// errors so the caller can classify them.
#[derive(Debug)]
pub struct FetchedPayload {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RateLimitedClient {
    pub fn new(min_interval: Duration, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            min_interval,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Independent hosts proceed in parallel; requests to one host are held
    /// to the configured minimum spacing.
    async fn wait_for_host(&self, host: &str) {
        if self.min_interval.is_zero() {
            return;
        }
        let gate = {
            let mut hosts = self.hosts.lock().await;
            hosts.entry(host.to_string()).or_default().clone()
        };
        let mut last = gate.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        let resp = self.send(self.client.get(url)).await?;
        resp.text().await.map_err(PipelineError::Http)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let text = self.get_text(url).await?;
        serde_json::from_str(&text).map_err(|e| PipelineError::Parse(e.to_string()))
    }

    pub async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<R> {
        let resp = self.send(self.client.post(url).json(body)).await?;
        let text = resp.text().await.map_err(PipelineError::Http)?;
        serde_json::from_str(&text).map_err(|e| PipelineError::Parse(e.to_string()))
    }

    /// Binary download with caller-chosen headers and timeout. Status codes
    /// are returned, not classified.
    pub async fn fetch_bytes(
        &self,
        url: &str,
        headers: HeaderMap,
        timeout: Duration,
    ) -> Result<FetchedPayload> {
        self.wait_for_host(&host_of(url)).await;
        let resp = self
            .client
            .get(url)
            .headers(headers)
            .timeout(timeout)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase());
        let body = resp.bytes().await?.to_vec();
        Ok(FetchedPayload {
            status,
            content_type,
            body,
        })
    }

    /// Success statuses only; everything else maps to a typed error.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let request = request.build().map_err(PipelineError::Http)?;
        let host = request
            .url()
            .host_str()
            .map(|h| h.to_ascii_lowercase())
            .unwrap_or_default();
        self.wait_for_host(&host).await;

        let resp = self.client.execute(request).await?;
        let status = resp.status();
        if status == 429 {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(PipelineError::RateLimit(host, retry_after));
        }
        if !status.is_success() {
            return Err(PipelineError::Api {
                host,
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }
}

fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn test_client() -> RateLimitedClient {
        RateLimitedClient::new(Duration::from_secs(0), "litharvest-test/0.1")
    }

    #[tokio::test]
    async fn get_json_parses_success_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/works/1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"ok"}"#)
            .create_async()
            .await;

        let value: Value = test_client()
            .get_json(&format!("{}/works/1", server.url()))
            .await
            .unwrap();
        assert_eq!(value["status"], "ok");
    }

    #[tokio::test]
    async fn rate_limit_surfaces_retry_after() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/limited")
            .with_status(429)
            .with_header("retry-after", "7")
            .create_async()
            .await;

        let err = test_client()
            .get_text(&format!("{}/limited", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::RateLimit(_, 7)));
    }

    #[tokio::test]
    async fn non_success_status_becomes_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/broken")
            .with_status(503)
            .create_async()
            .await;

        let err = test_client()
            .get_text(&format!("{}/broken", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn fetch_bytes_reports_status_without_erroring() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/gone.pdf")
            .with_status(404)
            .with_body("missing")
            .create_async()
            .await;

        let payload = test_client()
            .fetch_bytes(
                &format!("{}/gone.pdf", server.url()),
                HeaderMap::new(),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(payload.status, 404);
        assert_eq!(payload.body, b"missing");
    }
}
