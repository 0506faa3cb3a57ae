use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Failure classes for one collection run. The kind decides both how the
/// failure is reported and the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientErrorKind {
    /// Missing or malformed catalog/output configuration. Raised before any
    /// network I/O.
    Config,
    /// Authentication endpoint refused or returned a malformed response.
    /// Fatal for the whole process.
    Auth,
    /// The caller supplied unusable arguments (missing tenant id, bad int).
    Caller,
    /// A business endpoint failed: transport error or non-2xx status.
    Call,
    /// Persisting a response failed. Logged and swallowed by the dispatcher.
    Sink,
    Internal,
}

#[derive(Debug, Clone, Error, Serialize)]
#[error("{message}")]
pub struct ClientError {
    pub kind: ClientErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ClientError {
    pub fn new(kind: ClientErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            hint: None,
            details: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Config, "CONFIG", message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Auth, "AUTH_FAILED", message)
    }

    pub fn caller(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Caller, "BAD_ARGUMENT", message)
    }

    pub fn call_failed(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Call, "CALL_FAILED", message)
    }

    pub fn sink(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Sink, "SINK_FAILED", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Internal, "INTERNAL", message)
    }

    /// Process exit code for a run that ends with this error. Authentication
    /// failures are distinguished so schedulers can tell credential rot from
    /// endpoint trouble.
    pub fn exit_code(&self) -> i32 {
        match self.kind {
            ClientErrorKind::Auth => crate::constants::exit::AUTH_FAILURE,
            _ => crate::constants::exit::FAILURE,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::internal(err.to_string())
    }
}
