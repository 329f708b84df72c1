//! Uniform dispatch contract for action handlers.
//!
//! A handler is called with a cancel signal, the operation name (the suffix
//! after the category dot) and the fully resolved payload, and returns an
//! output mapping or an error. Purely data-in/data-out; handlers must honor
//! the cancel signal.

mod flow;
mod html;
mod list;
mod llm;
mod system;
mod test;
mod url;
mod web;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Result, StewardError};
use crate::llm::LlmClient;
use crate::payload::{ActionOutput, Payload};
use crate::plan::ActionRegistry;

/// Client timeout for all outbound page fetches.
const WEB_CLIENT_TIMEOUT: Duration = Duration::from_secs(15);

pub struct HandlerRegistry {
    registry: Arc<ActionRegistry>,
    llm: Arc<dyn LlmClient>,
    http: reqwest::Client,
    foreach_concurrency: usize,
}

impl HandlerRegistry {
    pub fn new(
        registry: Arc<ActionRegistry>,
        llm: Arc<dyn LlmClient>,
        foreach_concurrency: usize,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(WEB_CLIENT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            registry,
            llm,
            http,
            foreach_concurrency: foreach_concurrency.max(1),
        }
    }

    pub async fn dispatch(
        &self,
        cancel: &CancellationToken,
        action: &str,
        payload: Payload,
    ) -> Result<Option<ActionOutput>> {
        let (category, operation) = split_action(action)?;
        if category == "flow" {
            if cancel.is_cancelled() {
                return Err(StewardError::Cancelled);
            }
            return flow::handle(self, cancel, operation, &payload).await.map(Some);
        }
        self.dispatch_leaf(cancel, action, payload).await
    }

    /// Dispatches every category except `flow`; `flow.foreach` templates go
    /// through here, which is what makes nested flow actions an error.
    pub(crate) async fn dispatch_leaf(
        &self,
        cancel: &CancellationToken,
        action: &str,
        payload: Payload,
    ) -> Result<Option<ActionOutput>> {
        let (category, operation) = split_action(action)?;

        if cancel.is_cancelled() {
            return Err(StewardError::Cancelled);
        }

        match category {
            "system" => system::handle(cancel, operation, &payload).await,
            "web" => web::handle(&self.http, cancel, operation, &payload)
                .await
                .map(Some),
            "html" => html::handle(operation, &payload).map(Some),
            "list" => list::handle(operation, &payload).map(Some),
            "url" => url::handle(operation, &payload).map(Some),
            "llm" => llm::handle(self.llm.as_ref(), cancel, operation, &payload)
                .await
                .map(Some),
            "test" => test::handle(cancel, operation, &payload).await,
            "flow" => Err(StewardError::ForeachShape(
                "nesting flow actions is not supported".into(),
            )),
            "intent" if operation == "unknown" => Ok(None),
            other => Err(StewardError::Other(format!(
                "unknown action category: {other}"
            ))),
        }
    }

    pub(crate) fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub(crate) fn foreach_concurrency(&self) -> usize {
        self.foreach_concurrency
    }
}

fn split_action(action: &str) -> Result<(&str, &str)> {
    action.split_once('.').ok_or_else(|| {
        StewardError::Other(format!(
            "invalid action name '{action}'; expected category.operation"
        ))
    })
}
