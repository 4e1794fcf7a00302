// ABOUTME: Light fetch backend: one browser-mimicking HTTP GET with no JavaScript execution.
// ABOUTME: Applies SSRF guards, the per-host throttle, a body size cap and charset decoding.

use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use rand::seq::IndexedRandom;
use reqwest::header::USER_AGENT;

use crate::backend::net::{
    decode_body, ensure_public, is_private_redirect, parse_target, redirect_policy,
    MAX_CONTENT_LENGTH,
};
use crate::backend::throttle::HostThrottle;
use crate::backend::{Availability, Document, FetchBackend};
use crate::error::ScrapeError;
use crate::options::{LightOptions, DEFAULT_USER_AGENTS};

const OP: &str = "LightFetch";

/// Plain HTTP backend.
pub struct LightBackend {
    client: reqwest::Client,
    opts: LightOptions,
    throttle: HostThrottle,
}

impl LightBackend {
    /// Creates the backend. No cookie jar is kept between requests.
    pub fn new(opts: LightOptions) -> Self {
        let client = opts.http_client.clone().unwrap_or_else(|| {
            reqwest::Client::builder()
                .redirect(redirect_policy(opts.allow_private_networks))
                .timeout(opts.timeout)
                .gzip(true)
                .brotli(true)
                .deflate(true)
                .build()
                .expect("failed to build HTTP client")
        });
        let throttle = HostThrottle::new(opts.throttle.clone());

        Self {
            client,
            opts,
            throttle,
        }
    }

    /// The per-host throttle shared by every fetch through this backend.
    pub fn throttle(&self) -> &HostThrottle {
        &self.throttle
    }

    fn pick_user_agent(&self) -> String {
        self.opts
            .user_agents
            .choose(&mut rand::rng())
            .cloned()
            .unwrap_or_else(|| DEFAULT_USER_AGENTS[0].to_string())
    }
}

#[async_trait]
impl FetchBackend for LightBackend {
    fn name(&self) -> &'static str {
        "light"
    }

    async fn availability(&self) -> Availability {
        Availability::up()
    }

    fn prune_idle(&self) -> usize {
        self.throttle.prune_idle()
    }

    async fn fetch(&self, url: &str) -> Result<Document, ScrapeError> {
        let target = parse_target(url, OP)?;
        if !self.opts.allow_private_networks {
            ensure_public(&target, url, OP).await?;
        }
        let host = target.host_str().unwrap_or_default().to_string();

        let mut permit = self.throttle.acquire(&host).await;

        let mut request = self
            .client
            .get(target.as_str())
            .header(USER_AGENT, self.pick_user_agent());
        for (key, value) in &self.opts.headers {
            request = request.header(key, value);
        }

        tracing::debug!(url, "light fetch");
        let response = request.send().await.map_err(|e| {
            if is_private_redirect(&e) {
                ScrapeError::ssrf(url, OP, Some(anyhow::anyhow!("redirect to a private address")))
            } else {
                ScrapeError::fetch(url, OP, Some(anyhow::anyhow!("request failed: {}", e)))
            }
        })?;

        let status = response.status().as_u16();
        permit.record_status(status);

        if !self.opts.allow_private_networks {
            ensure_public(response.url(), url, OP).await?;
        }

        if !(200..300).contains(&status) {
            return Err(ScrapeError::fetch(
                url,
                OP,
                Some(anyhow::anyhow!("HTTP status {}", status)),
            ));
        }

        if let Some(len) = response.content_length() {
            if len as usize > MAX_CONTENT_LENGTH {
                return Err(ScrapeError::fetch(
                    url,
                    OP,
                    Some(anyhow::anyhow!("content too large")),
                ));
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_lowercase());

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                ScrapeError::fetch(url, OP, Some(anyhow::anyhow!("failed to read body: {}", e)))
            })?;
            if body.len() + chunk.len() > MAX_CONTENT_LENGTH {
                return Err(ScrapeError::fetch(
                    url,
                    OP,
                    Some(anyhow::anyhow!("content too large")),
                ));
            }
            body.extend_from_slice(&chunk);
        }
        drop(permit);

        Ok(Document {
            url: url.to_string(),
            final_url,
            status,
            html: decode_body(&body, content_type.as_deref()),
        })
    }
}
