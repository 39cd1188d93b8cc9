//! Endpoint Probing and Ranking
//!
//! Periodically probes each configured endpoint with an `eth_chainId`
//! request, measuring latency and reading the `x-ratelimit-remaining`
//! header when the provider exposes one. Healthy endpoints order before
//! degraded ones, then by latency ascending, then by remaining rate
//! limit descending. A probe timeout marks the endpoint degraded but
//! still usable behind healthy ones.

use futures::StreamExt;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Rate-limit header emitted by most commercial RPC providers.
const RATE_LIMIT_HEADER: &str = "x-ratelimit-remaining";

/// Probe result for one endpoint.
#[derive(Debug, Clone)]
pub struct EndpointHealth {
    pub url: String,
    pub latency: Option<Duration>,
    pub rate_limit_remaining: Option<u64>,
    /// Set when the probe timed out or errored
    pub degraded: bool,
}

/// Probe all endpoints with bounded concurrency.
pub async fn probe_endpoints(
    http: &reqwest::Client,
    urls: &[String],
    timeout: Duration,
    concurrency: usize,
) -> Vec<EndpointHealth> {
    futures::stream::iter(urls.iter().cloned())
        .map(|url| probe_one(http, url, timeout))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}

async fn probe_one(http: &reqwest::Client, url: String, timeout: Duration) -> EndpointHealth {
    let body = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_chainId",
        "params": [],
    });

    let started = Instant::now();
    let outcome = http
        .post(&url)
        .json(&body)
        .timeout(timeout)
        .send()
        .await;

    match outcome {
        Ok(response) => {
            let latency = started.elapsed();
            let rate_limit_remaining = response
                .headers()
                .get(RATE_LIMIT_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let ok = response.status().is_success();
            if !ok {
                warn!("endpoint probe got HTTP {} from {}", response.status(), url);
            } else {
                debug!(
                    "endpoint probe: {} latency={:?} rate_limit={:?}",
                    url, latency, rate_limit_remaining
                );
            }
            EndpointHealth {
                url,
                latency: Some(latency),
                rate_limit_remaining,
                degraded: !ok,
            }
        }
        Err(e) => {
            warn!("endpoint probe failed for {}: {}", url, e);
            EndpointHealth {
                url,
                latency: None,
                rate_limit_remaining: None,
                degraded: true,
            }
        }
    }
}

/// Order endpoints by health, then latency, then rate-limit headroom.
pub fn rank_endpoints(mut healths: Vec<EndpointHealth>) -> Vec<EndpointHealth> {
    healths.sort_by(|a, b| {
        a.degraded
            .cmp(&b.degraded)
            .then_with(|| {
                let la = a.latency.unwrap_or(Duration::MAX);
                let lb = b.latency.unwrap_or(Duration::MAX);
                la.cmp(&lb)
            })
            .then_with(|| {
                let ra = a.rate_limit_remaining.unwrap_or(0);
                let rb = b.rate_limit_remaining.unwrap_or(0);
                rb.cmp(&ra)
            })
    });
    healths
}
