/// Why a well-formed webhook payload was dropped without being relayed.
///
/// These are not failures: the webhook caller still gets a 200 with
/// `ignored: <reason>` in the body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IgnoreReason {
    #[error("no message object")]
    NoMessageObject,
    #[error("empty message.text")]
    EmptyMessageText,
    #[error("no valid from")]
    NoValidFrom,
    #[error("group detected")]
    GroupDetected,
    #[error("invalid format")]
    InvalidFormat,
}

impl IgnoreReason {
    /// Short classification string for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoMessageObject => "no message object",
            Self::EmptyMessageText => "empty message.text",
            Self::NoValidFrom => "no valid from",
            Self::GroupDetected => "group detected",
            Self::InvalidFormat => "invalid format",
        }
    }
}

/// Every way a webhook call can end without a broadcast.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("ignored: {0}")]
    Ignored(IgnoreReason),
    #[error("failed to serialize filtered body: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl WebhookError {
    /// HTTP status code the webhook caller receives.
    pub fn status(&self) -> u16 {
        match self {
            Self::MethodNotAllowed => 405,
            Self::InvalidJson(_) => 400,
            Self::Ignored(_) => 200,
            Self::Serialize(_) => 500,
        }
    }

    /// Plain-text response body. Parser details stay in the logs.
    pub fn body(&self) -> String {
        match self {
            Self::MethodNotAllowed => "method not allowed".into(),
            Self::InvalidJson(_) => "invalid JSON".into(),
            Self::Ignored(reason) => format!("ignored: {reason}"),
            Self::Serialize(_) => "failed to serialize filtered body".into(),
        }
    }
}

impl From<IgnoreReason> for WebhookError {
    fn from(reason: IgnoreReason) -> Self {
        Self::Ignored(reason)
    }
}
