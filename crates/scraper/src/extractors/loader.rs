// ABOUTME: Loads site-profile tables from the embedded JSON data or a user-supplied file.
// ABOUTME: Warms the selector cache with every profile selector once the table is built.

use std::path::Path;

use anyhow::Context;

use crate::extractors::compiled::precompile_selectors;
use crate::extractors::custom::{SiteProfile, SiteProfileRegistry};

/// Embedded JSON containing the built-in retailer profiles.
const BUILTIN_PROFILES_JSON: &str = include_str!("../../data/site_profiles.json");

/// Loads the built-in profile table.
///
/// # Panics
///
/// Panics if the embedded JSON is malformed. The table ships with the crate
/// and is covered by tests.
pub fn load_builtin_profiles() -> SiteProfileRegistry {
    parse_profiles(BUILTIN_PROFILES_JSON).expect("failed to parse builtin site profiles")
}

/// Parses a JSON array of profiles into a registry.
pub fn parse_profiles(json: &str) -> Result<SiteProfileRegistry, serde_json::Error> {
    let profiles: Vec<SiteProfile> = serde_json::from_str(json)?;

    let mut registry = SiteProfileRegistry::new();
    for profile in profiles {
        registry.register(profile);
    }
    precompile_selectors(registry.css_selectors());
    Ok(registry)
}

/// Reads a profile table from disk, replacing the built-in one.
pub fn load_profiles_file(path: impl AsRef<Path>) -> anyhow::Result<SiteProfileRegistry> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading site profiles from {}", path.display()))?;
    let registry = parse_profiles(&json)
        .with_context(|| format!("parsing site profiles from {}", path.display()))?;
    tracing::info!(path = %path.display(), domains = registry.len(), "loaded site profiles");
    Ok(registry)
}
