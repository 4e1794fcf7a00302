// ABOUTME: Main library entry point for the Wist product scraper.
// ABOUTME: Re-exports the public API: Orchestrator, OrchestratorBuilder, ProductRecord, Job, ScrapeError, ErrorCode.

//! Wist - structured product data from e-commerce pages that resist automation.
//!
//! A cheap HTTP fetch is tried first. When the result looks like an anti-bot
//! page, or nothing usable comes back, the URL is rendered once more in a
//! headless browser before the job is declared failed. Retailers the block
//! policy lists as script-heavy take the opposite route, browser first.
//!
//! # Example
//!
//! ```no_run
//! use wist_scraper::{Orchestrator, ScrapeError, ScrapeRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ScrapeError> {
//!     let orchestrator = Orchestrator::builder().build();
//!     let record = orchestrator
//!         .scrape_sync(ScrapeRequest::new("https://www.example.com/p/123"), None)
//!         .await?;
//!     println!("{:?} {:?}", record.title, record.price);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod classifier;
pub mod error;
pub mod extractors;
pub mod jobs;
pub mod options;
pub mod orchestrator;
pub mod record;
pub mod server;

pub use crate::backend::{Availability, Document, FetchBackend, HeavyBackend, LightBackend};
pub use crate::cache::{normalize_url, CacheEntry, CacheStore, MemoryCache};
pub use crate::classifier::{BlockPolicy, BlockReason, BlockVerdict};
pub use crate::error::{ErrorCode, ScrapeError};
pub use crate::extractors::chain::ExtractorChain;
pub use crate::extractors::custom::{FieldExtractor, SelectorSpec, SiteProfile, SiteProfileRegistry};
pub use crate::extractors::loader::{load_builtin_profiles, load_profiles_file};
pub use crate::jobs::{Job, JobRegistry, JobStatus};
pub use crate::options::{HeavyOptions, LightOptions, Options, OrchestratorBuilder, ThrottleConfig};
pub use crate::orchestrator::{HealthReport, Orchestrator, ScrapeRequest};
pub use crate::record::{ExtractionMethod, ProductRecord};
