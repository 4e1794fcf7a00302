// ABOUTME: Integration tests for the wist CLI binary.
// ABOUTME: Runs one-shot scrapes against a local mock shop with the browser backend disabled.

use assert_cmd::assert::OutputAssertExt;
use assert_cmd::cargo::CommandCargoExt;
use httpmock::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

const PRODUCT_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<title>Walnut Desk Lamp | Lumen</title>
<meta property="og:title" content="Walnut Desk Lamp">
<meta property="og:image" content="/img/lamp.jpg">
<meta property="product:price:amount" content="49.99">
<meta property="product:price:currency" content="USD">
</head>
<body><h1>Walnut Desk Lamp</h1></body>
</html>"#;

const CAPTCHA_HTML: &str =
    "<html><head><title>Robot Check</title></head><body>Type the characters you see</body></html>";

fn wist_cmd() -> Command {
    let mut cmd = Command::cargo_bin("wist").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn scrape_prints_record_as_json() {
    let server = MockServer::start();
    let page = server.mock(|when, then| {
        when.method(GET).path("/p/lamp");
        then.status(200)
            .header("content-type", "text/html; charset=utf-8")
            .body(PRODUCT_HTML);
    });

    let output = wist_cmd()
        .arg("scrape")
        .arg("--no-heavy")
        .arg("--allow-private-networks")
        .arg("--json")
        .arg(server.url("/p/lamp"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    page.assert();

    let record: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(record["title"], "Walnut Desk Lamp");
    assert_eq!(record["currency"], "USD");
    assert_eq!(record["extractionMethod"], "light");
    assert_eq!(record["sourceUrl"], server.url("/p/lamp"));
}

#[test]
fn scrape_summary_line_without_json() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/p/lamp");
        then.status(200)
            .header("content-type", "text/html; charset=utf-8")
            .body(PRODUCT_HTML);
    });

    wist_cmd()
        .env("WIST_NO_HEAVY", "true")
        .env("WIST_ALLOW_PRIVATE_NETWORKS", "true")
        .arg("scrape")
        .arg(server.url("/p/lamp"))
        .assert()
        .success()
        .stdout(predicate::str::contains("light\tWalnut Desk Lamp\t49.99 USD"))
        .stderr(predicate::str::contains("scraped"));
}

#[test]
fn blocked_page_without_browser_fails() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/p/blocked");
        then.status(200)
            .header("content-type", "text/html; charset=utf-8")
            .body(CAPTCHA_HTML);
    });

    wist_cmd()
        .arg("scrape")
        .arg("--no-heavy")
        .arg("--allow-private-networks")
        .arg(server.url("/p/blocked"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "heavy backend unavailable: heavy backend disabled",
        ));
}

#[test]
fn private_address_is_refused_by_default() {
    let server = MockServer::start();
    let page = server.mock(|when, then| {
        when.method(GET).path("/p/lamp");
        then.status(200).body(PRODUCT_HTML);
    });

    wist_cmd()
        .arg("scrape")
        .arg("--no-heavy")
        .arg(server.url("/p/lamp"))
        .assert()
        .code(1);

    page.assert_hits(0);
}

#[test]
fn invalid_policy_file_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let policy_path = temp_dir.path().join("policy.json");
    fs::write(&policy_path, "{ not json").unwrap();

    wist_cmd()
        .arg("scrape")
        .arg("--policy")
        .arg(&policy_path)
        .arg("https://shop.test/p/1")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("loading block policy"));
}

#[test]
fn scrape_requires_a_url() {
    wist_cmd().arg("scrape").assert().failure();
}
