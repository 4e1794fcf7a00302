// ABOUTME: Block classifier deciding whether an extracted record is a genuine product page or an anti-bot trap.
// ABOUTME: All title lists, thresholds and rule order come from a serde-loadable BlockPolicy.

//! Soft-block detection.
//!
//! Retailers often answer automated traffic with a 200 page whose title is a
//! generic landing or captcha page. The classifier looks at the extracted
//! record and, through [`BlockPolicy::classify_page`], at the head of the raw
//! document. It never looks at the HTTP status and is pure: the same inputs
//! and policy always give the same verdict.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::record::ProductRecord;

const BUILTIN_POLICY_JSON: &str = include_str!("../data/block_policy.json");

/// A configurable check, evaluated in policy order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockRule {
    SoftBlockTitle,
    CaptchaKeyword,
    HtmlMarker,
    BareSitename,
    MissingPriceGenericTitle,
}

/// Why a record was judged blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    Empty,
    SoftBlockTitle,
    CaptchaKeyword,
    HtmlMarker,
    MissingPriceGenericTitle,
    BareSitename,
}

impl From<BlockRule> for BlockReason {
    fn from(rule: BlockRule) -> Self {
        match rule {
            BlockRule::SoftBlockTitle => BlockReason::SoftBlockTitle,
            BlockRule::CaptchaKeyword => BlockReason::CaptchaKeyword,
            BlockRule::HtmlMarker => BlockReason::HtmlMarker,
            BlockRule::BareSitename => BlockReason::BareSitename,
            BlockRule::MissingPriceGenericTitle => BlockReason::MissingPriceGenericTitle,
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlockReason::Empty => "empty",
            BlockReason::SoftBlockTitle => "soft_block_title",
            BlockReason::CaptchaKeyword => "captcha_keyword",
            BlockReason::HtmlMarker => "html_marker",
            BlockReason::MissingPriceGenericTitle => "missing_price_generic_title",
            BlockReason::BareSitename => "bare_sitename",
        };
        write!(f, "{}", s)
    }
}

/// Classifier output. `reason` is set iff `is_blocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockVerdict {
    pub is_blocked: bool,
    pub reason: Option<BlockReason>,
}

impl BlockVerdict {
    pub fn clean() -> Self {
        Self {
            is_blocked: false,
            reason: None,
        }
    }

    pub fn blocked(reason: BlockReason) -> Self {
        Self {
            is_blocked: true,
            reason: Some(reason),
        }
    }
}

/// Policy data driving the classifier.
///
/// Title lists are matched lower-cased against the trimmed, lower-cased title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockPolicy {
    /// Titles that are blocked when the title equals or contains them.
    #[serde(default)]
    pub soft_block_titles: Vec<String>,
    /// Substrings that mark a captcha or robot-check page.
    #[serde(default)]
    pub captcha_keywords: Vec<String>,
    /// Bare store names a landing page uses as its title.
    #[serde(default)]
    pub site_names: Vec<String>,
    /// Substrings of the raw document head that mark an interstitial.
    #[serde(default)]
    pub html_markers: Vec<String>,
    /// How many leading chars of the document the marker rule scans.
    #[serde(default = "default_html_sample_chars")]
    pub html_sample_chars: usize,
    /// Hosts rendered in the browser first. An entry matches any whole host label.
    #[serde(default)]
    pub browser_first_sites: Vec<String>,
    /// Try the page's Open Graph tags when every backend returned a blocked page.
    #[serde(default = "default_salvage_open_graph")]
    pub salvage_open_graph: bool,
    /// Titles shorter than this (in chars) count as generic when no price is present.
    #[serde(default = "default_min_title_len")]
    pub min_title_len: usize,
    /// Rule evaluation order; the absent-record check always runs first.
    #[serde(default = "default_rule_order")]
    pub rule_order: Vec<BlockRule>,
}

fn default_min_title_len() -> usize {
    10
}

fn default_html_sample_chars() -> usize {
    2000
}

fn default_salvage_open_graph() -> bool {
    true
}

fn default_rule_order() -> Vec<BlockRule> {
    vec![
        BlockRule::SoftBlockTitle,
        BlockRule::CaptchaKeyword,
        BlockRule::HtmlMarker,
        BlockRule::BareSitename,
        BlockRule::MissingPriceGenericTitle,
    ]
}

impl Default for BlockPolicy {
    fn default() -> Self {
        Self::builtin()
    }
}

impl BlockPolicy {
    /// The policy shipped with the crate.
    ///
    /// # Panics
    ///
    /// Panics if the embedded JSON is malformed. It is covered by tests.
    pub fn builtin() -> Self {
        Self::from_json(BUILTIN_POLICY_JSON).expect("failed to parse builtin block policy")
    }

    /// Parses a policy from JSON. List entries are lower-cased.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut policy: BlockPolicy = serde_json::from_str(json)?;
        for list in [
            &mut policy.soft_block_titles,
            &mut policy.captcha_keywords,
            &mut policy.site_names,
            &mut policy.html_markers,
            &mut policy.browser_first_sites,
        ] {
            for entry in list.iter_mut() {
                *entry = entry.trim().to_lowercase();
            }
            list.retain(|e| !e.is_empty());
        }
        Ok(policy)
    }

    /// Reads a policy file from disk.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading block policy from {}", path.display()))?;
        Self::from_json(&json)
            .with_context(|| format!("parsing block policy from {}", path.display()))
    }

    /// Adds site names, typically taken from the loaded site profiles.
    pub fn with_site_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref().trim().to_lowercase();
            if !name.is_empty() && !self.site_names.contains(&name) {
                self.site_names.push(name);
            }
        }
        self
    }

    /// Classifies a candidate record. `None` means the extractor chain found nothing.
    ///
    /// The HTML marker rule is skipped since there is no document to scan.
    pub fn classify(&self, record: Option<&ProductRecord>) -> BlockVerdict {
        self.evaluate(record, None)
    }

    /// Classifies a candidate record together with the document it came from.
    pub fn classify_page(&self, record: Option<&ProductRecord>, html: &str) -> BlockVerdict {
        self.evaluate(record, Some(html))
    }

    /// Whether pages on `host` should be rendered in the browser before trying a plain fetch.
    pub fn prefers_browser(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_lowercase();
        host.split('.')
            .any(|label| self.browser_first_sites.iter().any(|s| s == label))
    }

    fn evaluate(&self, record: Option<&ProductRecord>, html: Option<&str>) -> BlockVerdict {
        let record = match record {
            Some(r) => r,
            None => return BlockVerdict::blocked(BlockReason::Empty),
        };

        let title = record
            .title
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .unwrap_or_default();

        for rule in &self.rule_order {
            let hit = match rule {
                BlockRule::SoftBlockTitle => self.is_soft_block_title(&title),
                BlockRule::CaptchaKeyword => self.has_captcha_keyword(&title),
                BlockRule::HtmlMarker => html.is_some_and(|h| self.has_html_marker(h)),
                BlockRule::BareSitename => {
                    self.is_site_name(&title) && record.price.is_none() && !record.has_image()
                }
                BlockRule::MissingPriceGenericTitle => {
                    !record.has_price() && self.is_generic_title(&title)
                }
            };
            if hit {
                return BlockVerdict::blocked((*rule).into());
            }
        }
        BlockVerdict::clean()
    }

    fn is_soft_block_title(&self, title: &str) -> bool {
        !title.is_empty() && self.soft_block_titles.iter().any(|s| title.contains(s.as_str()))
    }

    fn has_captcha_keyword(&self, title: &str) -> bool {
        self.captcha_keywords.iter().any(|k| title.contains(k.as_str()))
    }

    fn has_html_marker(&self, html: &str) -> bool {
        if self.html_markers.is_empty() {
            return false;
        }
        let sample: String = html.chars().take(self.html_sample_chars).collect();
        let sample = sample.to_lowercase();
        self.html_markers.iter().any(|m| sample.contains(m.as_str()))
    }

    fn is_site_name(&self, title: &str) -> bool {
        self.site_names.iter().any(|n| n == title)
    }

    fn is_generic_title(&self, title: &str) -> bool {
        title.is_empty() || title.chars().count() < self.min_title_len || self.is_site_name(title)
    }
}

/// Classifies with the given policy.
pub fn classify(policy: &BlockPolicy, record: Option<&ProductRecord>) -> BlockVerdict {
    policy.classify(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    fn record(title: &str) -> ProductRecord {
        ProductRecord {
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    fn priced(title: &str) -> ProductRecord {
        ProductRecord {
            price: Some(Decimal::new(1999, 2)),
            price_raw: Some("$19.99".to_string()),
            ..record(title)
        }
    }

    #[test]
    fn absent_record_is_empty() {
        let verdict = BlockPolicy::builtin().classify(None);
        assert_eq!(verdict, BlockVerdict::blocked(BlockReason::Empty));
    }

    #[test]
    fn amazon_landing_title_is_soft_block() {
        let verdict = BlockPolicy::builtin().classify(Some(&priced("Amazon.com: Online Shopping")));
        assert_eq!(verdict.reason, Some(BlockReason::SoftBlockTitle));
    }

    #[test]
    fn product_with_price_is_clean() {
        let verdict = BlockPolicy::builtin().classify(Some(&priced("Wireless Mouse")));
        assert_eq!(verdict, BlockVerdict::clean());
    }

    #[test]
    fn amazon_product_title_is_not_soft_block() {
        let title = "Amazon.com: Logitech M185 Wireless Mouse : Electronics";
        let verdict = BlockPolicy::builtin().classify(Some(&priced(title)));
        assert!(!verdict.is_blocked);
    }

    #[test]
    fn bare_site_name_without_price_or_image() {
        let verdict = BlockPolicy::builtin().classify(Some(&record("Target")));
        assert_eq!(verdict.reason, Some(BlockReason::BareSitename));
    }

    #[test]
    fn bare_site_name_with_image_falls_to_missing_price() {
        let rec = ProductRecord {
            image: Some("https://img.test/logo.png".to_string()),
            ..record("  Best Buy ")
        };
        let verdict = BlockPolicy::builtin().classify(Some(&rec));
        assert_eq!(verdict.reason, Some(BlockReason::MissingPriceGenericTitle));
    }

    #[test]
    fn captcha_keyword_in_title() {
        let verdict = BlockPolicy::builtin().classify(Some(&priced("Please complete the CAPTCHA")));
        assert_eq!(verdict.reason, Some(BlockReason::CaptchaKeyword));
    }

    #[test]
    fn short_title_without_price_is_generic() {
        let verdict = BlockPolicy::builtin().classify(Some(&record("Lamp")));
        assert_eq!(verdict.reason, Some(BlockReason::MissingPriceGenericTitle));
    }

    #[test]
    fn long_title_without_price_is_clean() {
        let verdict = BlockPolicy::builtin().classify(Some(&record("Hand-thrown Stoneware Vase")));
        assert!(!verdict.is_blocked);
    }

    #[test]
    fn rule_order_is_policy_data() {
        let mut policy = BlockPolicy::builtin();
        policy.rule_order = vec![
            BlockRule::MissingPriceGenericTitle,
            BlockRule::BareSitename,
        ];
        let verdict = policy.classify(Some(&record("Target")));
        assert_eq!(verdict.reason, Some(BlockReason::MissingPriceGenericTitle));
    }

    #[test]
    fn from_json_lowercases_and_defaults() {
        let policy = BlockPolicy::from_json(r#"{"site_names": [" ACME "]}"#).unwrap();
        assert_eq!(policy.site_names, vec!["acme".to_string()]);
        assert_eq!(policy.min_title_len, 10);
        assert_eq!(policy.rule_order.len(), 5);
        assert_eq!(policy.html_sample_chars, 2000);
        assert!(policy.salvage_open_graph);
        assert!(policy.soft_block_titles.is_empty());
        assert!(policy.browser_first_sites.is_empty());
    }

    #[test]
    fn with_site_names_extends_without_duplicates() {
        let policy = BlockPolicy::from_json("{}")
            .unwrap()
            .with_site_names(["Etsy", "etsy", "Shop Co"]);
        assert_eq!(policy.site_names, vec!["etsy".to_string(), "shop co".to_string()]);
    }

    #[test]
    fn verdict_serializes_camel_case() {
        let json = serde_json::to_value(BlockVerdict::blocked(BlockReason::BareSitename)).unwrap();
        assert_eq!(json["isBlocked"], true);
        assert_eq!(json["reason"], "bare_sitename");
    }

    #[test]
    fn html_marker_in_document_head_blocks() {
        let html = "<html><head><title>Wireless Mouse</title></head>\
                    <body><p>We detected Unusual Traffic from your network.</p></body></html>";
        let verdict = BlockPolicy::builtin().classify_page(Some(&priced("Wireless Mouse")), html);
        assert_eq!(verdict.reason, Some(BlockReason::HtmlMarker));
    }

    #[test]
    fn html_marker_beyond_sample_is_ignored() {
        let mut policy = BlockPolicy::builtin();
        policy.html_sample_chars = 64;
        let html = format!(
            "<html><head><title>Wireless Mouse</title></head><body>{}access denied</body></html>",
            "x".repeat(200)
        );
        let verdict = policy.classify_page(Some(&priced("Wireless Mouse")), &html);
        assert_eq!(verdict, BlockVerdict::clean());
    }

    #[test]
    fn robots_meta_is_not_a_marker() {
        let html = r#"<html><head><meta name="robots" content="index,follow">
            <title>Wireless Mouse</title></head></html>"#;
        let verdict = BlockPolicy::builtin().classify_page(Some(&priced("Wireless Mouse")), html);
        assert!(!verdict.is_blocked);
    }

    #[test]
    fn record_only_classify_skips_html_rule() {
        let policy = BlockPolicy::builtin();
        let rec = priced("Wireless Mouse");
        let html = "<html><head><title>Wireless Mouse</title></head><body>Access Denied</body></html>";
        assert_eq!(policy.classify(Some(&rec)), BlockVerdict::clean());
        assert_eq!(
            policy.classify_page(Some(&rec), html).reason,
            Some(BlockReason::HtmlMarker)
        );
    }

    #[test]
    fn html_marker_rule_respects_order() {
        let html = "<html><head><title>Robot Check</title></head><body>captcha</body></html>";
        let verdict = BlockPolicy::builtin().classify_page(Some(&record("Robot Check")), html);
        assert_eq!(verdict.reason, Some(BlockReason::CaptchaKeyword));
    }

    #[test]
    fn browser_first_matches_whole_labels() {
        let policy = BlockPolicy::builtin();
        assert!(policy.prefers_browser("www.amazon.com"));
        assert!(policy.prefers_browser("WWW.BESTBUY.COM."));
        assert!(policy.prefers_browser("www.ebay.co.uk"));
        assert!(!policy.prefers_browser("www.etsy.com"));
        assert!(!policy.prefers_browser("targetedmarketing.example"));
    }

    #[test]
    fn classify_is_deterministic() {
        let policy = BlockPolicy::builtin();
        let rec = record("Robot Check");
        assert_eq!(classify(&policy, Some(&rec)), classify(&policy, Some(&rec)));
    }
}
