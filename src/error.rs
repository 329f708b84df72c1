use thiserror::Error;

#[derive(Error, Debug)]
pub enum StewardError {
    #[error("action '{0}' is not defined in the registry")]
    UnknownAction(String),

    #[error("action '{action}' is missing required payload key: '{key}'")]
    MissingPayloadKey { action: String, key: String },

    #[error("flow.foreach: {0}")]
    ForeachShape(String),

    #[error("{0}")]
    Validation(String),

    #[error("plan generation failed: {0}")]
    Generation(String),

    #[error("intent analysis failed: {0}")]
    Intent(String),

    #[error("action '{action}' ({id}) failed: {cause}")]
    ActionFailure {
        action: String,
        id: String,
        cause: String,
    },

    #[error("action '{action}' ({id}) timed out after {timeout_ms} ms")]
    ActionTimeout {
        action: String,
        id: String,
        timeout_ms: u64,
    },

    #[error("panic in action {action}: {detail}")]
    PanicRecovered { action: String, detail: String },

    #[error("mission cancelled")]
    Cancelled,

    #[error("user rejected the proposed plan")]
    ApprovalRejected,

    #[error("plan approval timed out")]
    ApprovalTimeout,

    #[error("follow-up plan redefines action id '{0}' which already holds results")]
    ReplanDuplicateId(String),

    #[error("no mission is currently running")]
    NoRunningMission,

    #[error("mission {0} is not the currently running mission")]
    MissionNotRunning(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("llm error: {0}")]
    Llm(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl StewardError {
    /// True for errors that end a mission as CANCELLED rather than FAILED.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::ApprovalRejected | Self::ApprovalTimeout
        )
    }

    /// Only execution-time failures feed the mission retry loop.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ActionFailure { .. } | Self::ActionTimeout { .. } | Self::PanicRecovered { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StewardError>;
