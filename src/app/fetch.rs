use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::config::DelayRange;
use super::error::FetchError;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Source of raw page bodies. One call is one GET; implementations never retry.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Builds the shared HTTP client, routed through `proxy` when given.
/// Timeouts are applied per request so one client serves page fetches and probes.
pub fn build_client(proxy: Option<&Url>) -> Result<reqwest::Client, FetchError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(20))
        .pool_max_idle_per_host(8);
    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy.as_str())
            .map_err(|err| FetchError::Client(format!("proxy {proxy}: {err}")))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|err| FetchError::Client(err.to_string()))
}

pub fn jittered_delay(range: DelayRange) -> Duration {
    if range.max <= range.min {
        return range.min;
    }
    let min_ms = u64::try_from(range.min.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(range.max.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}

pub struct ProxyFetcher {
    client: reqwest::Client,
    delay: DelayRange,
    timeout: Duration,
}

impl ProxyFetcher {
    pub fn new(client: reqwest::Client, delay: DelayRange, timeout: Duration) -> Self {
        Self {
            client,
            delay,
            timeout,
        }
    }
}

#[async_trait]
impl PageFetcher for ProxyFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let delay = jittered_delay(self.delay);
        if !delay.is_zero() {
            debug!(
                url = %url,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "delaying request"
            );
            tokio::time::sleep(delay).await;
        }

        let response = self.client.get(url).timeout(self.timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        let body = response.bytes().await?;
        Ok(body.to_vec())
    }
}

#[derive(Debug, Deserialize)]
struct IpEcho {
    origin: String,
}

pub async fn probe_exit_ip(
    client: &reqwest::Client,
    probe_url: &str,
    timeout: Duration,
) -> Result<String, FetchError> {
    let response = client.get(probe_url).timeout(timeout).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }
    let body = response.text().await?;
    serde_json::from_str::<IpEcho>(&body)
        .map(|echo| echo.origin)
        .map_err(|err| FetchError::InvalidBody(err.to_string()))
}
