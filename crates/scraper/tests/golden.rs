// ABOUTME: Golden tests running saved retailer pages through the extractor chain and block classifier.
// ABOUTME: Each HTML snapshot has a JSON fixture with the expected fields and verdict.

use std::fs;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use wist_scraper::{load_builtin_profiles, BlockPolicy, ExtractorChain};

/// Expected extraction outcome for one snapshot.
#[derive(Debug, Deserialize)]
struct ExpectedOutput {
    url: String,
    blocked: bool,
    reason: Option<String>,
    title: Option<String>,
    price: Option<String>,
    currency: Option<String>,
    image: Option<String>,
    domain: Option<String>,
    description_prefix: Option<String>,
}

fn load_fixture(name: &str) -> ExpectedOutput {
    let path = format!(
        "{}/tests/fixtures/{}.json",
        env!("CARGO_MANIFEST_DIR"),
        name
    );
    let content = fs::read_to_string(&path).expect(&format!("Failed to read fixture: {}", path));
    serde_json::from_str(&content).expect(&format!("Failed to parse fixture: {}", path))
}

fn load_html_fixture(name: &str) -> String {
    let path = format!(
        "{}/tests/fixtures/html/{}.html",
        env!("CARGO_MANIFEST_DIR"),
        name
    );
    fs::read_to_string(&path).expect(&format!("Failed to read HTML fixture: {}", path))
}

fn run_golden_test(fixture_name: &str) {
    let expected = load_fixture(fixture_name);
    let html = load_html_fixture(fixture_name);

    let profiles = load_builtin_profiles();
    let policy = BlockPolicy::builtin().with_site_names(profiles.site_names());
    let chain = ExtractorChain::new(profiles);

    let record = chain.extract(&html, &expected.url);
    let verdict = policy.classify_page(record.as_ref(), &html);

    assert_eq!(
        verdict.is_blocked, expected.blocked,
        "[{}] verdict mismatch: {:?}",
        fixture_name, verdict
    );
    assert_eq!(
        verdict.reason.map(|r| r.to_string()),
        expected.reason,
        "[{}] reason mismatch",
        fixture_name
    );

    let record = record.unwrap_or_else(|| panic!("[{}] no usable record", fixture_name));
    assert_eq!(record.title, expected.title, "[{}] title mismatch", fixture_name);
    assert_eq!(
        record.price,
        expected.price.as_deref().map(|p| Decimal::from_str(p).unwrap()),
        "[{}] price mismatch",
        fixture_name
    );
    assert_eq!(record.currency, expected.currency, "[{}] currency mismatch", fixture_name);
    assert_eq!(record.image, expected.image, "[{}] image mismatch", fixture_name);
    assert_eq!(record.domain, expected.domain, "[{}] domain mismatch", fixture_name);

    if let Some(prefix) = expected.description_prefix {
        let description = record.description.unwrap_or_default();
        assert!(
            description.starts_with(&prefix),
            "[{}] description {:?} does not start with {:?}",
            fixture_name,
            description,
            prefix
        );
    }
}

#[test]
fn golden_amazon_product() {
    run_golden_test("amazon_product");
}

#[test]
fn golden_amazon_captcha() {
    run_golden_test("amazon_captcha");
}

#[test]
fn golden_etsy_listing() {
    run_golden_test("etsy_listing");
}

#[test]
fn golden_target_landing() {
    run_golden_test("target_landing");
}

#[test]
fn golden_walmart_challenge() {
    run_golden_test("walmart_challenge");
}

#[test]
fn golden_microdata_shop() {
    run_golden_test("microdata_shop");
}
