//! Outbound HTTP: single request and bounded batch fetch.

use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Serialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StewardError};
use crate::payload::{ActionOutput, Payload, opt_i64, opt_str, require_str};

const DEFAULT_BATCH_CONCURRENCY: usize = 5;

#[derive(Debug, Serialize)]
struct FetchedPage {
    url: String,
    status_code: u16,
    content: String,
}

pub async fn handle(
    http: &Client,
    cancel: &CancellationToken,
    operation: &str,
    payload: &Payload,
) -> Result<ActionOutput> {
    match operation {
        "request" => request(http, cancel, payload).await,
        "batch_request" => batch_request(http, cancel, payload).await,
        other => Err(StewardError::Other(format!(
            "unknown web operation: {other}"
        ))),
    }
}

async fn request(http: &Client, cancel: &CancellationToken, payload: &Payload) -> Result<ActionOutput> {
    let url = require_str(payload, "url")?;
    let method = opt_str(payload, "method").filter(|m| !m.is_empty()).unwrap_or("GET");
    let mut builder = http.request(
        method
            .parse()
            .map_err(|_| StewardError::Other(format!("invalid HTTP method '{method}'")))?,
        url,
    );
    if let Some(headers) = payload.get("headers").and_then(Value::as_object) {
        for (name, value) in headers {
            if let Some(v) = value.as_str() {
                builder = builder.header(name.as_str(), v);
            }
        }
    }

    let page = tokio::select! {
        _ = cancel.cancelled() => return Err(StewardError::Cancelled),
        sent = builder.send() => {
            let response = sent?;
            let status = response.status().as_u16();
            let content = response.text().await?;
            FetchedPage { url: url.to_string(), status_code: status, content }
        }
    };

    Ok(json!({
        "url": page.url,
        "status_code": page.status_code,
        "content": page.content,
    })
    .as_object()
    .cloned()
    .unwrap_or_default())
}

/// Fetches every URL with a small worker pool. Individual fetch errors are
/// embedded as `ERROR: …` content rather than failing the batch.
async fn batch_request(
    http: &Client,
    cancel: &CancellationToken,
    payload: &Payload,
) -> Result<ActionOutput> {
    let urls_json = require_str(payload, "urls_json")?;
    let urls: Vec<String> = serde_json::from_str(urls_json)
        .map_err(|e| StewardError::Other(format!("urls_json must be JSON array of strings: {e}")))?;
    let concurrency = opt_i64(payload, "concurrency")
        .filter(|&c| c > 0)
        .map(|c| c as usize)
        .unwrap_or(DEFAULT_BATCH_CONCURRENCY);

    let fetches = stream::iter(urls.into_iter().map(|url| {
        let http = http.clone();
        async move {
            match http.get(&url).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let content = response.text().await.unwrap_or_default();
                    FetchedPage { url, status_code: status, content }
                }
                Err(e) => FetchedPage {
                    url,
                    status_code: 0,
                    content: format!("ERROR: {e}"),
                },
            }
        }
    }))
    .buffer_unordered(concurrency)
    .collect::<Vec<_>>();

    let pages = tokio::select! {
        _ = cancel.cancelled() => return Err(StewardError::Cancelled),
        pages = fetches => pages,
    };

    Ok(json!({"responses_json": serde_json::to_string(&pages)?})
        .as_object()
        .cloned()
        .unwrap_or_default())
}
