// ABOUTME: The extraction-fallback orchestrator: job lifecycle, backend escalation and timeouts.
// ABOUTME: Light fetch first (browser first for policy-listed hosts), the other backend only when blocked or unusable.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::net::parse_target;
use crate::backend::{Availability, Document, FetchBackend, HeavyBackend, LightBackend};
use crate::cache::{CacheEntry, CacheStore, MemoryCache};
use crate::classifier::{BlockPolicy, BlockReason};
use crate::error::{ErrorCode, ScrapeError};
use crate::extractors::chain::ExtractorChain;
use crate::extractors::loader::load_builtin_profiles;
use crate::jobs::{Job, JobRegistry, JobStatus};
use crate::options::{Options, OrchestratorBuilder};
use crate::record::{ExtractionMethod, ProductRecord};

/// Service name reported by health checks.
pub const SERVICE_NAME: &str = "wist-scraper";

/// A request to scrape one product URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_id: Option<String>,
}

impl ScrapeRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            requester_id: None,
        }
    }

    pub fn requester(mut self, requester_id: impl Into<String>) -> Self {
        self.requester_id = Some(requester_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendsHealth {
    pub light: Availability,
    pub heavy: Availability,
}

/// Liveness plus per-backend availability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub service: &'static str,
    pub backends: BackendsHealth,
}

/// Terminal failure of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Failure {
    code: ErrorCode,
    message: String,
}

impl Failure {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Drives scrape jobs through cache, light fetch, classification and heavy fallback.
///
/// Cloning is cheap; clones share backends, cache and job registry.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    opts: Options,
    light: Arc<dyn FetchBackend>,
    heavy: Arc<dyn FetchBackend>,
    cache: Arc<dyn CacheStore>,
    chain: ExtractorChain,
    policy: BlockPolicy,
    jobs: JobRegistry,
}

impl Orchestrator {
    /// Create a new OrchestratorBuilder.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub(crate) fn from_builder(builder: OrchestratorBuilder) -> Self {
        let OrchestratorBuilder {
            mut opts,
            light,
            heavy,
            cache,
        } = builder;

        let profiles = opts.profiles.take().unwrap_or_else(load_builtin_profiles);
        let policy = opts
            .policy
            .take()
            .unwrap_or_else(BlockPolicy::builtin)
            .with_site_names(profiles.site_names());

        let light = light.unwrap_or_else(|| {
            Arc::new(LightBackend::new(opts.light.clone())) as Arc<dyn FetchBackend>
        });
        let heavy = heavy.unwrap_or_else(|| {
            Arc::new(HeavyBackend::new(opts.heavy.clone())) as Arc<dyn FetchBackend>
        });
        let cache = cache.unwrap_or_else(|| {
            Arc::new(MemoryCache::new(opts.freshness_window)) as Arc<dyn CacheStore>
        });

        Self {
            inner: Arc::new(Inner {
                opts,
                light,
                heavy,
                cache,
                chain: ExtractorChain::new(profiles),
                policy,
                jobs: JobRegistry::new(),
            }),
        }
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.inner.jobs
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.inner.cache
    }

    /// Starts a job and returns its initial state without waiting for the pipeline.
    ///
    /// A fresh cache entry completes the job immediately with
    /// `extractionMethod: cache` and no backend call.
    pub async fn submit(&self, request: ScrapeRequest) -> Result<Job, ScrapeError> {
        parse_target(&request.url, "Submit")?;
        let url = request.url.trim().to_string();

        let job = Job::new(url.clone(), request.requester_id);
        let id = self.inner.jobs.insert(job.clone());

        if let Some(entry) = self.inner.cache.get(&url).await {
            info!(job_id = %id, url = %url, "cache hit");
            let record = ProductRecord {
                source_url: url.clone(),
                ..entry.record.tagged(ExtractionMethod::Cache)
            };
            self.inner.jobs.complete(&id, record);
            return Ok(self.inner.jobs.get(&id).unwrap_or(job));
        }

        info!(job_id = %id, url = %url, "job submitted");
        tokio::spawn(run_job(Arc::clone(&self.inner), id, url));
        Ok(job)
    }

    /// Non-blocking poll.
    pub fn get_job(&self, id: &Uuid) -> Option<Job> {
        self.inner.jobs.get(id)
    }

    /// Waits for a job to finish, returning it unchanged if `max_wait` elapses first.
    pub async fn await_job(&self, id: &Uuid, max_wait: Duration) -> Result<Job, ScrapeError> {
        self.inner
            .jobs
            .wait(id, max_wait)
            .await
            .ok_or_else(|| ScrapeError::job_not_found(id.to_string(), "AwaitJob"))
    }

    /// Submits and waits up to `wait` (the configured sync wait when `None`).
    ///
    /// Running out of time yields a `Timeout` error while the job keeps going in
    /// the background. A failed job yields its own error code and message.
    pub async fn scrape_sync(
        &self,
        request: ScrapeRequest,
        wait: Option<Duration>,
    ) -> Result<ProductRecord, ScrapeError> {
        let wait = wait.unwrap_or(self.inner.opts.sync_wait);
        let url = request.url.clone();
        let job = self.submit(request).await?;
        let job = if job.is_terminal() {
            job
        } else {
            self.await_job(&job.id, wait).await?
        };

        match job.status {
            JobStatus::Completed => job.result.ok_or_else(|| {
                ScrapeError::no_usable_data(
                    &url,
                    "ScrapeSync",
                    Some(anyhow::anyhow!("job completed without a result")),
                )
            }),
            JobStatus::Failed => Err(ScrapeError::with_code(
                job.error_code.unwrap_or(ErrorCode::FetchFailure),
                &url,
                "ScrapeJob",
                job.error.map(anyhow::Error::msg),
            )),
            JobStatus::Processing => Err(ScrapeError::sync_wait_elapsed(&url, wait)),
        }
    }

    pub async fn health(&self) -> HealthReport {
        let (light, heavy) = tokio::join!(
            self.inner.light.availability(),
            self.inner.heavy.availability()
        );
        HealthReport {
            status: "healthy",
            service: SERVICE_NAME,
            backends: BackendsHealth { light, heavy },
        }
    }

    /// Drops expired jobs, stale cache entries and idle per-host throttle state.
    pub async fn prune(&self) -> (usize, usize) {
        let jobs = self.inner.jobs.prune(self.inner.opts.job_retention);
        let entries = self.inner.cache.purge_expired().await;
        let hosts = self.inner.light.prune_idle() + self.inner.heavy.prune_idle();
        if jobs > 0 || entries > 0 || hosts > 0 {
            debug!(jobs, entries, hosts, "pruned expired state");
        }
        (jobs, entries)
    }
}

/// Runs one job's pipeline under the wall-clock budget and records the outcome.
///
/// On timeout the pipeline future, and with it any in-flight fetch, is dropped
/// before the job is marked failed.
async fn run_job(inner: Arc<Inner>, id: Uuid, url: String) {
    let outcome =
        tokio::time::timeout(inner.opts.pipeline_timeout, inner.run_pipeline(&url)).await;

    match outcome {
        Ok(Ok(record)) => {
            inner.cache.put(CacheEntry::new(&url, record.clone())).await;
            info!(
                job_id = %id,
                url = %url,
                method = %record.extraction_method,
                "job completed"
            );
            inner.jobs.complete(&id, record);
        }
        Ok(Err(failure)) => {
            warn!(job_id = %id, url = %url, error = %failure, "job failed");
            inner.jobs.fail(&id, failure.code, failure.message);
        }
        Err(_) => {
            warn!(
                job_id = %id,
                url = %url,
                timeout_secs = inner.opts.pipeline_timeout.as_secs(),
                "job timed out"
            );
            inner.jobs.fail(&id, ErrorCode::Timeout, "timeout");
        }
    }
}

/// Result of one backend attempt.
enum Attempt {
    Accepted(ProductRecord),
    Rejected(BlockReason, Document),
    Failed(ScrapeError),
}

impl Inner {
    fn backend(&self, method: ExtractionMethod) -> &Arc<dyn FetchBackend> {
        match method {
            ExtractionMethod::Heavy => &self.heavy,
            _ => &self.light,
        }
    }

    /// Hosts the policy routes to the browser go heavy first, but only while a browser is available.
    async fn route(&self, url: &str) -> (ExtractionMethod, ExtractionMethod) {
        let browser_first = parse_target(url, "Route")
            .ok()
            .and_then(|u| u.host_str().map(|h| self.policy.prefers_browser(h)))
            .unwrap_or(false);

        if browser_first && self.heavy.availability().await.available {
            (ExtractionMethod::Heavy, ExtractionMethod::Light)
        } else {
            (ExtractionMethod::Light, ExtractionMethod::Heavy)
        }
    }

    async fn attempt(&self, url: &str, method: ExtractionMethod) -> Attempt {
        match self.backend(method).fetch(url).await {
            Ok(doc) => match self.accept(&doc, url, method) {
                Ok(record) => Attempt::Accepted(record),
                Err(reason) => Attempt::Rejected(reason, doc),
            },
            Err(e) => Attempt::Failed(e),
        }
    }

    /// One attempt per backend at most, in the order [`Inner::route`] picks.
    async fn run_pipeline(&self, url: &str) -> Result<ProductRecord, Failure> {
        let (first, second) = self.route(url).await;
        let mut rejected = Vec::new();

        let cause = match self.attempt(url, first).await {
            Attempt::Accepted(record) => return Ok(record),
            Attempt::Failed(e) if e.is_ssrf() || e.is_invalid_request() => {
                return Err(Failure::new(e.code, e.detail()));
            }
            Attempt::Failed(e) => e.detail(),
            Attempt::Rejected(reason, doc) => {
                rejected.push((first, doc));
                reason.to_string()
            }
        };
        warn!(
            url,
            cause = %cause,
            from = %first,
            to = %second,
            "attempt rejected, falling back"
        );

        let reason = match self.attempt(url, second).await {
            Attempt::Accepted(record) => return Ok(record),
            Attempt::Failed(e) if e.is_ssrf() || e.is_invalid_request() => {
                return Err(Failure::new(e.code, e.detail()));
            }
            Attempt::Failed(e) if e.is_backend_unavailable() => {
                return Err(Failure::new(
                    ErrorCode::BackendUnavailable,
                    format!("{} backend unavailable: {}", second, e.detail()),
                ));
            }
            Attempt::Failed(e) => {
                return Err(Failure::new(
                    e.code,
                    format!("{} backend failed: {}", second, e.detail()),
                ));
            }
            Attempt::Rejected(reason, doc) => {
                rejected.push((second, doc));
                reason
            }
        };

        if let Some(record) = self.salvage(url, &rejected) {
            return Ok(record);
        }

        let code = if reason == BlockReason::Empty {
            ErrorCode::NoUsableData
        } else {
            ErrorCode::BlockedContent
        };
        Err(Failure::new(code, format!("blocked by both backends ({})", reason)))
    }

    /// Extracts and classifies a document; a clean usable record or the block reason.
    fn accept(
        &self,
        doc: &Document,
        url: &str,
        method: ExtractionMethod,
    ) -> Result<ProductRecord, BlockReason> {
        let candidate = self
            .chain
            .extract(&doc.html, &doc.final_url)
            .map(|record| ProductRecord {
                source_url: url.to_string(),
                extraction_method: method,
                ..record
            });

        let verdict = self.policy.classify_page(candidate.as_ref(), &doc.html);
        match (candidate, verdict.reason) {
            (Some(record), None) => Ok(record),
            (_, reason) => {
                let reason = reason.unwrap_or(BlockReason::Empty);
                debug!(url, %method, %reason, "candidate rejected");
                Err(reason)
            }
        }
    }

    /// Last resort once every attempt was blocked: the Open Graph tags of a rejected page,
    /// newest first, if they describe a product the record-only rules accept.
    fn salvage(
        &self,
        url: &str,
        rejected: &[(ExtractionMethod, Document)],
    ) -> Option<ProductRecord> {
        if !self.policy.salvage_open_graph {
            return None;
        }
        rejected.iter().rev().find_map(|(method, doc)| {
            let record = self.chain.salvage(&doc.html, &doc.final_url)?;
            if self.policy.classify(Some(&record)).is_blocked {
                return None;
            }
            info!(url, %method, "salvaged open graph data from blocked page");
            Some(ProductRecord {
                source_url: url.to_string(),
                extraction_method: *method,
                ..record
            })
        })
    }
}
