//! Deterministic handlers for exercising the executor: timed sleeps,
//! scripted failures, and a sleep that returns output.

use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Result, StewardError};
use crate::payload::{ActionOutput, Payload, opt_i64, require_i64};

pub async fn handle(
    cancel: &CancellationToken,
    operation: &str,
    payload: &Payload,
) -> Result<Option<ActionOutput>> {
    match operation {
        "sleep" => {
            let ms = require_i64(payload, "duration_ms")?.max(0) as u64;
            sleep_or_cancel(cancel, ms).await?;
            Ok(None)
        }
        "fail" => {
            let ms = opt_i64(payload, "duration_ms").unwrap_or(0).max(0) as u64;
            if ms > 0 {
                sleep_or_cancel(cancel, ms).await?;
            }
            let message = payload
                .get("message")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .unwrap_or("test.fail triggered");
            Err(StewardError::Other(message.to_string()))
        }
        "sleep_with_return" => {
            let ms = require_i64(payload, "duration_ms")?.max(0) as u64;
            match sleep_or_cancel(cancel, ms).await {
                Ok(()) => Ok(Some(
                    json!({"status": "ok", "result": Uuid::new_v4().to_string()})
                        .as_object()
                        .cloned()
                        .unwrap_or_default(),
                )),
                Err(e) => Err(e),
            }
        }
        other => Err(StewardError::Other(format!(
            "unknown test operation: {other}"
        ))),
    }
}

async fn sleep_or_cancel(cancel: &CancellationToken, ms: u64) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(StewardError::Cancelled),
        _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_sleep_completes() {
        let token = CancellationToken::new();
        let out = handle(&token, "sleep", &payload(json!({"duration_ms": 1})))
            .await
            .unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_sleep_observes_cancellation() {
        let token = CancellationToken::new();
        let child = token.child_token();
        let task = tokio::spawn(async move {
            handle(&child, "sleep", &payload(json!({"duration_ms": 5000}))).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, StewardError::Cancelled));
    }

    #[tokio::test]
    async fn test_fail_uses_message() {
        let token = CancellationToken::new();
        let err = handle(&token, "fail", &payload(json!({"message": "boom"})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_sleep_with_return_produces_output() {
        let token = CancellationToken::new();
        let out = handle(
            &token,
            "sleep_with_return",
            &payload(json!({"duration_ms": 1})),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(out.get("status").unwrap(), "ok");
        assert!(out.get("result").unwrap().as_str().is_some());
    }
}
