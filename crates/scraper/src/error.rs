// ABOUTME: Error types for the scraper including the ErrorCode taxonomy and ScrapeError struct.
// ABOUTME: Provides categorized errors with convenience constructors and boolean helpers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error codes representing the categories of scrape failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed request, rejected before a job exists.
    InvalidRequest,
    /// Target resolves to a private network address.
    Ssrf,
    /// Backend not installed or not configured.
    BackendUnavailable,
    /// Transport-level failure from a backend.
    FetchFailure,
    /// Classifier judged the page an anti-bot trap.
    BlockedContent,
    /// Extractor chain produced no title.
    NoUsableData,
    /// Wall-clock budget exceeded.
    Timeout,
    /// Unknown job identifier.
    JobNotFound,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::InvalidRequest => "invalid request",
            ErrorCode::Ssrf => "SSRF blocked",
            ErrorCode::BackendUnavailable => "backend unavailable",
            ErrorCode::FetchFailure => "fetch failure",
            ErrorCode::BlockedContent => "blocked content",
            ErrorCode::NoUsableData => "no usable data",
            ErrorCode::Timeout => "timeout",
            ErrorCode::JobNotFound => "job not found",
        };
        write!(f, "{}", s)
    }
}

const SYNC_WAIT_OP: &str = "ScrapeSync";

/// The main error type for scrape operations.
#[derive(Debug, thiserror::Error)]
pub struct ScrapeError {
    pub code: ErrorCode,
    pub url: String,
    pub op: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl fmt::Display for ScrapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wist: {} {}: {}", self.op, self.url, self.code)?;
        if let Some(ref src) = self.source {
            write!(f, ": {}", src)?;
        }
        Ok(())
    }
}

impl ScrapeError {
    /// Create an error with an explicit code.
    pub fn with_code(
        code: ErrorCode,
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self {
            code,
            url: url.into(),
            op: op.into(),
            source,
        }
    }

    /// Create an InvalidRequest error.
    pub fn invalid_request(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::InvalidRequest, url, op, source)
    }

    /// Create an SSRF error.
    pub fn ssrf(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Ssrf, url, op, source)
    }

    /// Create a BackendUnavailable error.
    pub fn backend_unavailable(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::BackendUnavailable, url, op, source)
    }

    /// Create a FetchFailure error.
    pub fn fetch(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::FetchFailure, url, op, source)
    }

    /// Create a NoUsableData error.
    pub fn no_usable_data(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::NoUsableData, url, op, source)
    }

    /// Create a Timeout error.
    pub fn timeout(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Timeout, url, op, source)
    }

    /// Create a JobNotFound error. The job id takes the url slot.
    /// The caller's wait ran out while the job is still running.
    pub fn sync_wait_elapsed(url: impl Into<String>, wait: std::time::Duration) -> Self {
        Self::with_code(
            ErrorCode::Timeout,
            url,
            SYNC_WAIT_OP,
            Some(anyhow::anyhow!("no result within {}s", wait.as_secs())),
        )
    }

    pub fn job_not_found(job_id: impl Into<String>, op: impl Into<String>) -> Self {
        Self::with_code(ErrorCode::JobNotFound, job_id, op, None)
    }

    /// Human-readable cause without the `wist: <op> <url>` prefix.
    pub fn detail(&self) -> String {
        match self.source {
            Some(ref src) => src.to_string(),
            None => self.code.to_string(),
        }
    }

    pub fn is_invalid_request(&self) -> bool {
        self.code == ErrorCode::InvalidRequest
    }

    pub fn is_ssrf(&self) -> bool {
        self.code == ErrorCode::Ssrf
    }

    pub fn is_backend_unavailable(&self) -> bool {
        self.code == ErrorCode::BackendUnavailable
    }

    pub fn is_fetch(&self) -> bool {
        self.code == ErrorCode::FetchFailure
    }

    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::Timeout
    }

    pub fn is_job_not_found(&self) -> bool {
        self.code == ErrorCode::JobNotFound
    }

    /// True only for [`ScrapeError::sync_wait_elapsed`]; a job that itself timed out is not one.
    pub fn is_sync_timeout(&self) -> bool {
        self.code == ErrorCode::Timeout && self.op == SYNC_WAIT_OP
    }
}
