//! HTML parsing: link extraction, CSS selection, text flattening.
//!
//! Parsing is fully synchronous; no document survives across an await.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::url::normalize_one;
use crate::error::{Result, StewardError};
use crate::payload::{ActionOutput, Payload, opt_str, require_str};

#[derive(Debug, Serialize, Deserialize)]
struct Link {
    text: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    url: String,
    #[serde(default)]
    #[allow(dead_code)]
    status_code: i64,
    #[serde(default)]
    content: String,
}

pub fn handle(operation: &str, payload: &Payload) -> Result<ActionOutput> {
    match operation {
        "links" => links(payload),
        "links_bulk" => links_bulk(payload),
        "select_all" => select_all(payload),
        "inner_text" => inner_text(payload),
        other => Err(StewardError::Other(format!(
            "unknown html operation: {other}"
        ))),
    }
}

fn links(payload: &Payload) -> Result<ActionOutput> {
    let html = require_str(payload, "html")?;
    let base = opt_str(payload, "base_url").unwrap_or_default();
    let found = extract_links(html, base);
    Ok(output(json!({"links_json": serde_json::to_string(&found)?})))
}

/// Extracts links from a batch of fetched pages, skipping error placeholders
/// produced by `web.batch_request`.
fn links_bulk(payload: &Payload) -> Result<ActionOutput> {
    let pages_json = require_str(payload, "pages_json")?;
    let base_override = opt_str(payload, "base_url").unwrap_or_default();

    let pages: Vec<Page> = serde_json::from_str(pages_json).map_err(|e| {
        StewardError::Other(format!(
            "pages_json must be array of {{url,status_code,content}}: {e}"
        ))
    })?;

    let mut found = Vec::new();
    for page in &pages {
        if page.content.trim().is_empty() || page.content.starts_with("ERROR:") {
            continue;
        }
        let base = if base_override.is_empty() {
            &page.url
        } else {
            base_override
        };
        found.extend(extract_links(&page.content, base));
    }

    Ok(output(json!({"links_json": serde_json::to_string(&found)?})))
}

fn select_all(payload: &Payload) -> Result<ActionOutput> {
    let html = require_str(payload, "html")?;
    let selector_src = require_str(payload, "selector")?;

    let selector = Selector::parse(selector_src)
        .map_err(|e| StewardError::Other(format!("invalid selector '{selector_src}': {e}")))?;
    let doc = Html::parse_document(html);
    let items: Vec<String> = doc.select(&selector).map(|el| el.html()).collect();

    Ok(output(json!({"items_json": serde_json::to_string(&items)?})))
}

fn inner_text(payload: &Payload) -> Result<ActionOutput> {
    let html = require_str(payload, "html")?;
    let doc = Html::parse_document(html);
    let text = doc
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(output(json!({"text": collapsed})))
}

fn extract_links(html: &str, base: &str) -> Vec<Link> {
    let selector = Selector::parse("a[href]").expect("anchor selector");
    let doc = Html::parse_document(html);
    doc.select(&selector)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            let text = el.text().collect::<Vec<_>>().join(" ");
            Some(Link {
                text: text.trim().to_string(),
                url: normalize_one(base, href),
            })
        })
        .collect()
}

fn output(value: Value) -> ActionOutput {
    value.as_object().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    const PAGE: &str = r#"
        <html><body>
          <h1>Directory</h1>
          <a href="/people/ada">Ada</a>
          <a href="https://example.org/absolute">Absolute</a>
          <p class="bio">First bio</p>
          <p class="bio">Second bio</p>
        </body></html>"#;

    #[test]
    fn test_links_resolves_relative_hrefs() {
        let out = handle(
            "links",
            &payload(json!({"html": PAGE, "base_url": "https://example.com"})),
        )
        .unwrap();
        let links: Vec<Link> =
            serde_json::from_str(out.get("links_json").unwrap().as_str().unwrap()).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].text, "Ada");
        assert_eq!(links[0].url, "https://example.com/people/ada");
        assert_eq!(links[1].url, "https://example.org/absolute");
    }

    #[test]
    fn test_links_bulk_skips_error_pages() {
        let pages = json!([
            {"url": "https://example.com/1", "status_code": 200, "content": PAGE},
            {"url": "https://example.com/2", "status_code": 0, "content": "ERROR: timeout"},
            {"url": "https://example.com/3", "status_code": 200, "content": ""}
        ]);
        let out = handle(
            "links_bulk",
            &payload(json!({"pages_json": pages.to_string()})),
        )
        .unwrap();
        let links: Vec<Link> =
            serde_json::from_str(out.get("links_json").unwrap().as_str().unwrap()).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].url, "https://example.com/people/ada");
    }

    #[test]
    fn test_select_all_returns_outer_html_strings() {
        let out = handle(
            "select_all",
            &payload(json!({"html": PAGE, "selector": "p.bio"})),
        )
        .unwrap();
        let items: Vec<String> =
            serde_json::from_str(out.get("items_json").unwrap().as_str().unwrap()).unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[0].contains("First bio"));
        assert!(items[0].starts_with("<p"));
    }

    #[test]
    fn test_inner_text_flattens_markup() {
        let out = handle("inner_text", &payload(json!({"html": PAGE}))).unwrap();
        let text = out.get("text").unwrap().as_str().unwrap();
        assert!(text.contains("Directory"));
        assert!(text.contains("First bio"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let err = handle(
            "select_all",
            &payload(json!({"html": PAGE, "selector": "p[["})),
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid selector"));
    }
}
