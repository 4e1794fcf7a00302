// ABOUTME: JSON-LD structured data adapter for schema.org Product, IndividualProduct and Offer nodes.
// ABOUTME: Walks arrays, @graph and nested holders, then normalizes offers, images and prices.

use scraper::Html;
use serde_json::Value;

use crate::extractors::compiled::get_or_compile;
use crate::extractors::price::{detect_currency, parse_price};
use crate::record::ProductRecord;

const PRODUCT_TYPES: &[&str] = &["Product", "IndividualProduct"];
const OFFER_TYPES: &[&str] = &["Offer", "AggregateOffer"];

/// Extracts a partial record from the first usable JSON-LD product node.
///
/// Scripts that fail to parse are skipped. A product node wins over a bare
/// offer node anywhere in the same script.
pub fn extract_json_ld(doc: &Html) -> Option<ProductRecord> {
    let selector = get_or_compile("script[type='application/ld+json']")?;
    for script in doc.select(&selector) {
        let text = script.text().collect::<String>();
        let value = match serde_json::from_str::<Value>(text.trim()) {
            Ok(v) => v,
            Err(err) => {
                tracing::debug!(error = %err, "skipping malformed JSON-LD block");
                continue;
            }
        };

        let node = find_typed(&value, PRODUCT_TYPES).or_else(|| find_typed(&value, OFFER_TYPES));
        if let Some(record) = node.map(normalize_node) {
            if record.title.is_some() || record.has_price() {
                return Some(record);
            }
        }
    }
    None
}

fn find_typed<'a>(value: &'a Value, types: &[&str]) -> Option<&'a Value> {
    match value {
        Value::Object(map) => {
            if map
                .get("@type")
                .map_or(false, |t| types.iter().any(|expected| matches_type(t, expected)))
            {
                return Some(value);
            }
            for key in ["@graph", "mainEntity", "mainEntityOfPage", "itemListElement", "item"] {
                if let Some(found) = map.get(key).and_then(|v| find_typed(v, types)) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(arr) => arr.iter().find_map(|v| find_typed(v, types)),
        _ => None,
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => {
            let local = s.rsplit('/').next().unwrap_or(s);
            local.eq_ignore_ascii_case(expected)
        }
        Value::Array(arr) => arr.iter().any(|v| matches_type(v, expected)),
        _ => false,
    }
}

fn normalize_node(node: &Value) -> ProductRecord {
    let is_offer = node
        .get("@type")
        .map_or(false, |t| OFFER_TYPES.iter().any(|e| matches_type(t, e)));

    let title = string_field(node, "name")
        .or_else(|| string_field(node, "title"))
        .or_else(|| node.get("itemOffered").and_then(|item| string_field(item, "name")));

    let offer = if is_offer {
        Some(node)
    } else {
        match node.get("offers") {
            Some(Value::Array(arr)) => arr.first(),
            Some(obj @ Value::Object(_)) => Some(obj),
            _ => None,
        }
    };

    let raw_price = offer
        .and_then(offer_price)
        .or_else(|| node.get("price").and_then(scalar_text));

    let currency = offer
        .and_then(|o| string_field(o, "priceCurrency"))
        .or_else(|| {
            offer
                .and_then(|o| o.get("priceSpecification"))
                .and_then(|spec| string_field(spec, "priceCurrency"))
        })
        .or_else(|| string_field(node, "priceCurrency"))
        .or_else(|| raw_price.as_deref().and_then(detect_currency));

    ProductRecord {
        title,
        price: raw_price.as_deref().and_then(parse_price),
        price_raw: raw_price,
        currency,
        image: node.get("image").and_then(image_url),
        description: string_field(node, "description"),
        ..Default::default()
    }
}

fn offer_price(offer: &Value) -> Option<String> {
    ["price", "lowPrice"]
        .iter()
        .find_map(|key| offer.get(*key).and_then(scalar_text))
        .or_else(|| {
            offer
                .get("priceSpecification")
                .and_then(|spec| match spec {
                    Value::Array(arr) => arr.first(),
                    other => Some(other),
                })
                .and_then(|spec| spec.get("price"))
                .and_then(scalar_text)
        })
}

fn image_url(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(arr) => arr.iter().find_map(image_url),
        Value::Object(map) => map
            .get("url")
            .or_else(|| map.get("contentUrl"))
            .and_then(image_url),
        _ => None,
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
