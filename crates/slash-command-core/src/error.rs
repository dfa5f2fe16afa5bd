//! Per-request failures and their HTTP mapping.

use http::{Method, StatusCode};
use thiserror::Error;

use crate::payload::FormError;
use crate::publisher::PublishError;
use crate::resolve::ResolveError;
use crate::signing::SignatureError;

/// Which stage of request handling rejected the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transport,
    Auth,
    Resolution,
    Validation,
    Publish,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Transport => "transport",
            ErrorClass::Auth => "auth",
            ErrorClass::Resolution => "resolution",
            ErrorClass::Validation => "validation",
            ErrorClass::Publish => "publish",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("method {0} is not accepted")]
    MethodNotAllowed(Method),
    #[error("form body could not be parsed: {0}")]
    Form(#[from] FormError),
    #[error(transparent)]
    Resolution(#[from] ResolveError),
    #[error("signature check failed for '{command}' in team '{team_domain}': {source}")]
    Auth {
        team_domain: String,
        command: String,
        #[source]
        source: SignatureError,
    },
    #[error("text field missing for '{command}' in team '{team_domain}'")]
    MissingText { team_domain: String, command: String },
    #[error("payload could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("publish to '{routing_key}' timed out after {timeout_ms}ms")]
    PublishTimeout { routing_key: String, timeout_ms: u64 },
}

impl ProxyError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProxyError::MethodNotAllowed(_) | ProxyError::Form(_) => ErrorClass::Transport,
            ProxyError::Resolution(_) => ErrorClass::Resolution,
            ProxyError::Auth { .. } => ErrorClass::Auth,
            ProxyError::MissingText { .. } => ErrorClass::Validation,
            ProxyError::Encode(_) | ProxyError::Publish(_) | ProxyError::PublishTimeout { .. } => {
                ErrorClass::Publish
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::Form(_) => StatusCode::BAD_REQUEST,
            ProxyError::Resolution(_) => StatusCode::NOT_FOUND,
            ProxyError::Auth { .. } => StatusCode::UNAUTHORIZED,
            ProxyError::MissingText { .. } => StatusCode::BAD_REQUEST,
            ProxyError::Encode(_) | ProxyError::Publish(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::PublishTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Client-facing body. Never says which signature check failed.
    pub fn public_message(&self) -> &'static str {
        match self {
            ProxyError::MethodNotAllowed(_) => "Method not allowed",
            ProxyError::Form(_) => "Request body is not a valid form",
            ProxyError::Resolution(_) => "Command is not registered",
            ProxyError::Auth { .. } => "Request could not be authenticated",
            ProxyError::MissingText { .. } => "Command text is required",
            ProxyError::Encode(_) | ProxyError::Publish(_) => "Command could not be forwarded",
            ProxyError::PublishTimeout { .. } => "Timed out forwarding command",
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Publish
    }
}
