//! Error types for the intake bot.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Chat transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("File reference {file_id} could not be resolved: {reason}")]
    FileUnavailable { file_id: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Conversational agent errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },
}

/// Document-data-extraction service errors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Extraction request failed: {0}")]
    RequestFailed(String),

    #[error("Extraction service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed extraction response: {0}")]
    Malformed(String),

    #[error("No recognized {kind} fields in extraction response")]
    UnrecognizedFields { kind: String },

    #[error("Unknown document kind: {0}")]
    UnknownKind(String),

    #[error("Session is at step {step}, not accepting a {kind} upload")]
    NotAwaiting { kind: String, step: String },
}

/// Deliverable rendering and dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliverableError {
    #[error("Missing {0} data, cannot render deliverable")]
    MissingDocument(String),

    #[error("Rendering failed: {0}")]
    Render(String),
}

/// Failure inside a step handler. Caught by the router, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Deliverable error: {0}")]
    Deliverable(#[from] DeliverableError),

    #[error("Step {step} has no {what}")]
    Misrouted { step: String, what: String },
}
