use thiserror::Error;

#[derive(Debug, Error)]
pub enum RctError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("required file not found: {0}")]
    MissingFile(String),

    #[error("container runtime did not become ready after {attempts} attempts")]
    RuntimeUnavailable { attempts: u32 },

    #[error("failed to launch {app}: {reason}")]
    LaunchFailed { app: String, reason: String },

    #[error("token refresh failed, reauthentication required: {0}")]
    ReauthRequired(String),

    #[error("remote API error ({status}): {message}")]
    RemoteApi { status: u16, message: String },

    #[error("remote response missing field: {0}")]
    MalformedResponse(String),

    #[error("local control plane unreachable at {endpoint}: {reason}")]
    ControlUnreachable { endpoint: String, reason: String },

    #[error("local control request {request} failed: {reason}")]
    Control { request: String, reason: String },

    #[error("transmission did not become active after start")]
    TransmissionNotActive,

    #[error("scheduler command failed: {0}")]
    Scheduler(String),

    #[error("invalid trigger descriptor {path}: {reason}")]
    InvalidDescriptor { path: String, reason: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RctError {
    /// True when the component that raised this error has already sent its
    /// own alert, so callers must not send another one.
    pub fn already_alerted(&self) -> bool {
        matches!(
            self,
            RctError::RuntimeUnavailable { .. }
                | RctError::LaunchFailed { .. }
                | RctError::ReauthRequired(_)
        )
    }

    pub(crate) fn control(request: &str, reason: impl Into<String>) -> Self {
        RctError::Control {
            request: request.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RctError>;
