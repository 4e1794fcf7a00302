// ABOUTME: Fetch backend abstraction shared by the plain HTTP and headless browser implementations.
// ABOUTME: Defines the FetchBackend trait, the fetched Document, and backend availability reporting.

pub mod heavy;
pub mod light;
pub mod net;
mod stealth;
pub mod throttle;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ScrapeError;

pub use heavy::HeavyBackend;
pub use light::LightBackend;
pub use throttle::HostThrottle;

/// A fetched page.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// URL that was requested.
    pub url: String,
    /// URL after redirects; relative links resolve against this.
    pub final_url: String,
    pub status: u16,
    pub html: String,
}

/// Whether a backend can currently serve fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Availability {
    pub fn up() -> Self {
        Self {
            available: true,
            detail: None,
        }
    }

    pub fn up_with(detail: impl Into<String>) -> Self {
        Self {
            available: true,
            detail: Some(detail.into()),
        }
    }

    pub fn down(detail: impl Into<String>) -> Self {
        Self {
            available: false,
            detail: Some(detail.into()),
        }
    }
}

/// One way of turning a URL into a document.
///
/// Implementations own their concurrency limits. Dropping the future returned
/// by `fetch` must release every resource it holds.
#[async_trait]
pub trait FetchBackend: Send + Sync {
    /// Short name used in logs and health output.
    fn name(&self) -> &'static str;

    async fn availability(&self) -> Availability;

    async fn fetch(&self, url: &str) -> Result<Document, ScrapeError>;

    /// Drops per-host state nobody has used for a while. Returns how many entries went.
    fn prune_idle(&self) -> usize {
        0
    }
}
