// ABOUTME: Product extraction adapters and the supporting selector, price and profile machinery.
// ABOUTME: The chain module ties JSON-LD, site profiles and generic heuristics into one pass.

//! Product extraction.
//!
//! Submodules:
//! - `chain`: adapter trait and the priority-ordered merge.
//! - `structured`: schema.org JSON-LD.
//! - `custom` / `loader`: data-driven site profiles.
//! - `generic`: Open Graph, microdata and markup heuristics.
//! - `select` / `compiled`: selector evaluation with a shared selector cache.
//! - `price`: price and currency normalization.
//! - `fields`: post-processing helpers.

pub mod chain;
pub mod compiled;
pub mod custom;
pub mod fields;
pub mod generic;
pub mod loader;
pub mod price;
pub mod select;
pub mod structured;
