// ABOUTME: Process-wide cache of parsed CSS selectors keyed by their source string.
// ABOUTME: Site profiles and generic heuristics share it so each selector is parsed once.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use scraper::Selector;

/// Invalid selectors are cached as `None` so a bad profile entry is parsed only once.
///
/// Keys come from the built-in heuristics and loaded site profiles, never from
/// fetched pages, so the map only grows with configuration.
static SELECTOR_CACHE: Lazy<RwLock<HashMap<String, Option<Selector>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Returns the parsed selector for `css`, or `None` when it does not parse.
pub fn get_or_compile(css: &str) -> Option<Selector> {
    {
        let cache = SELECTOR_CACHE.read().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = cache.get(css) {
            return cached.clone();
        }
    }

    let compiled = Selector::parse(css).ok();
    if compiled.is_none() {
        tracing::debug!(selector = css, "ignoring unparseable selector");
    }
    let mut cache = SELECTOR_CACHE.write().unwrap_or_else(|e| e.into_inner());
    cache
        .entry(css.to_string())
        .or_insert(compiled)
        .clone()
}

/// Warms the cache with a batch of selectors, typically every selector in a
/// freshly loaded site-profile table.
pub fn precompile_selectors<I, S>(selectors: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut cache = SELECTOR_CACHE.write().unwrap_or_else(|e| e.into_inner());
    for css in selectors {
        let css = css.as_ref();
        if !cache.contains_key(css) {
            cache.insert(css.to_string(), Selector::parse(css).ok());
        }
    }
}
