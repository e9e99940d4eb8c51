use thiserror::Error;

/// Failure classes for assistant operations. The presentation layer keys
/// its messaging off these: a missing key aborts before any request, API
/// and network failures carry a displayable message, and parse failures
/// mean the model returned something other than the requested JSON.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("no API key configured; set one in the AI settings first")]
    MissingApiKey,

    /// The endpoint answered with a non-2xx status. Carries the message
    /// extracted from the error body, or the HTTP status when none was
    /// present.
    #[error("{0}")]
    Api(String),

    /// The request never produced a response: connection failure or
    /// timeout.
    #[error("network error: {0}")]
    Network(String),

    /// The model's output could not be parsed as the requested JSON.
    #[error("could not parse model output: {0}")]
    Parse(#[from] serde_json::Error),
}
