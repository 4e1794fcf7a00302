// ABOUTME: Configuration for the orchestrator, both fetch backends and the politeness throttle.
// ABOUTME: OrchestratorBuilder provides a fluent API for constructing Orchestrator instances.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::FetchBackend;
use crate::cache::CacheStore;
use crate::classifier::BlockPolicy;
use crate::extractors::custom::SiteProfileRegistry;
use crate::orchestrator::Orchestrator;

/// Desktop browser user agents rotated by the light backend.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

/// Headers a browser sends on a top-level navigation arriving from a search engine.
fn default_browser_headers() -> HashMap<String, String> {
    [
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.9"),
        ("Cache-Control", "max-age=0"),
        ("Upgrade-Insecure-Requests", "1"),
        ("Referer", "https://www.google.com/"),
        ("Sec-Fetch-Dest", "document"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-Site", "cross-site"),
        ("Sec-Fetch-User", "?1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Per-host politeness settings for the light backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleConfig {
    /// Minimum delay between two requests to the same host.
    pub base_delay: Duration,
    /// Randomization applied to every wait, as a fraction of the delay (0.5 = ±50%).
    pub jitter: f64,
    /// Delay multiplier applied on HTTP 429/503.
    pub backoff_multiplier: f64,
    /// Upper bound for a backed-off delay.
    pub max_delay: Duration,
    /// Delay multiplier applied on each success while backed off.
    pub recovery_multiplier: f64,
    /// Hosts with no request for this long are forgotten, unless backing off.
    pub idle_expiry: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            jitter: 0.5,
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            recovery_multiplier: 0.5,
            idle_expiry: Duration::from_secs(600),
        }
    }
}

impl ThrottleConfig {
    /// No delay and no jitter. Useful for tests and local targets.
    pub fn disabled() -> Self {
        Self {
            base_delay: Duration::ZERO,
            jitter: 0.0,
            ..Self::default()
        }
    }

    /// Replaces out-of-range factors with usable ones.
    ///
    /// Jitter is clamped to `[0, 1]`, NaN becomes 0. A backoff multiplier below
    /// 1 or a recovery multiplier outside `(0, 1]` falls back to the default.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        self.jitter = if self.jitter.is_finite() {
            self.jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            self.backoff_multiplier = defaults.backoff_multiplier;
        }
        if !(self.recovery_multiplier > 0.0 && self.recovery_multiplier <= 1.0) {
            self.recovery_multiplier = defaults.recovery_multiplier;
        }
        self
    }
}

/// Settings for the plain HTTP backend.
#[derive(Debug, Clone)]
pub struct LightOptions {
    pub timeout: Duration,
    pub user_agents: Vec<String>,
    pub headers: HashMap<String, String>,
    pub allow_private_networks: bool,
    pub http_client: Option<reqwest::Client>,
    pub throttle: ThrottleConfig,
}

impl Default for LightOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            headers: default_browser_headers(),
            allow_private_networks: false,
            http_client: None,
            throttle: ThrottleConfig::default(),
        }
    }
}

/// Settings for the headless browser backend.
#[derive(Debug, Clone)]
pub struct HeavyOptions {
    /// When false the backend reports itself unavailable and never launches.
    pub enabled: bool,
    pub headless: bool,
    /// Explicit browser binary; otherwise PATH and well-known install paths are searched.
    pub chrome_executable: Option<PathBuf>,
    pub extra_args: Vec<String>,
    /// Let the browser load private-network targets.
    pub allow_private_networks: bool,
    pub user_agent: String,
    pub navigation_timeout: Duration,
    /// Navigation attempts on navigation timeout.
    pub max_navigation_attempts: u32,
    /// Post-load settle time is drawn uniformly from this range.
    pub settle_min: Duration,
    pub settle_max: Duration,
}

impl Default for HeavyOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            headless: true,
            chrome_executable: None,
            extra_args: Vec::new(),
            allow_private_networks: false,
            user_agent: DEFAULT_USER_AGENTS[0].to_string(),
            navigation_timeout: Duration::from_secs(45),
            max_navigation_attempts: 3,
            settle_min: Duration::from_millis(2000),
            settle_max: Duration::from_millis(3000),
        }
    }
}

/// Configuration options for the orchestrator.
#[derive(Debug, Clone)]
pub struct Options {
    /// Wall-clock budget for one job's whole pipeline.
    pub pipeline_timeout: Duration,
    /// Default wait for synchronous scrapes.
    pub sync_wait: Duration,
    /// Cached records younger than this are served without fetching.
    pub freshness_window: Duration,
    /// Terminal jobs older than this are pruned from the registry.
    pub job_retention: Duration,
    pub light: LightOptions,
    pub heavy: HeavyOptions,
    pub policy: Option<BlockPolicy>,
    pub profiles: Option<SiteProfileRegistry>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            pipeline_timeout: Duration::from_secs(60),
            sync_wait: Duration::from_secs(30),
            freshness_window: Duration::from_secs(6 * 60 * 60),
            job_retention: Duration::from_secs(60 * 60),
            light: LightOptions::default(),
            heavy: HeavyOptions::default(),
            policy: None,
            profiles: None,
        }
    }
}

/// Builder for constructing Orchestrator instances with custom configuration.
#[derive(Clone, Default)]
pub struct OrchestratorBuilder {
    pub(crate) opts: Options,
    pub(crate) light: Option<Arc<dyn FetchBackend>>,
    pub(crate) heavy: Option<Arc<dyn FetchBackend>>,
    pub(crate) cache: Option<Arc<dyn CacheStore>>,
}

impl OrchestratorBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pipeline wall-clock timeout.
    pub fn pipeline_timeout(mut self, timeout: Duration) -> Self {
        self.opts.pipeline_timeout = timeout;
        self
    }

    /// Set the default synchronous wait.
    pub fn sync_wait(mut self, wait: Duration) -> Self {
        self.opts.sync_wait = wait;
        self
    }

    /// Set the cache freshness window.
    pub fn freshness_window(mut self, window: Duration) -> Self {
        self.opts.freshness_window = window;
        self
    }

    /// Set how long terminal jobs stay queryable.
    pub fn job_retention(mut self, retention: Duration) -> Self {
        self.opts.job_retention = retention;
        self
    }

    /// Allow or disallow requests to private networks from both backends.
    pub fn allow_private_networks(mut self, allow: bool) -> Self {
        self.opts.light.allow_private_networks = allow;
        self.opts.heavy.allow_private_networks = allow;
        self
    }

    /// Replace the rotated user-agent list.
    pub fn user_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.opts.light.user_agents = agents.into_iter().map(Into::into).collect();
        self
    }

    /// Add or override a light-backend request header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.light.headers.insert(key.into(), value.into());
        self
    }

    /// Set the light-backend request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.opts.light.timeout = timeout;
        self
    }

    /// Set the per-host throttle.
    pub fn throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.opts.light.throttle = throttle;
        self
    }

    /// Use a custom HTTP client for the light backend.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.opts.light.http_client = Some(client);
        self
    }

    /// Replace the heavy-backend settings.
    pub fn heavy_options(mut self, heavy: HeavyOptions) -> Self {
        self.opts.heavy = heavy;
        self
    }

    /// Enable or disable the heavy backend.
    pub fn heavy_enabled(mut self, enabled: bool) -> Self {
        self.opts.heavy.enabled = enabled;
        self
    }

    /// Point the heavy backend at a specific browser binary.
    pub fn chrome_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.opts.heavy.chrome_executable = Some(path.into());
        self
    }

    /// Set a custom block policy.
    pub fn policy(mut self, policy: BlockPolicy) -> Self {
        self.opts.policy = Some(policy);
        self
    }

    /// Set a custom site-profile table.
    pub fn profiles(mut self, profiles: SiteProfileRegistry) -> Self {
        self.opts.profiles = Some(profiles);
        self
    }

    /// Use a custom light backend instead of the HTTP one.
    pub fn light_backend(mut self, backend: Arc<dyn FetchBackend>) -> Self {
        self.light = Some(backend);
        self
    }

    /// Use a custom heavy backend instead of the browser one.
    pub fn heavy_backend(mut self, backend: Arc<dyn FetchBackend>) -> Self {
        self.heavy = Some(backend);
        self
    }

    /// Use a custom cache store instead of the in-memory one.
    pub fn cache_store(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the Orchestrator with the configured options.
    pub fn build(self) -> Orchestrator {
        Orchestrator::from_builder(self)
    }
}
