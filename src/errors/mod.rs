use thiserror::Error;

/// Typed error hierarchy for the messaging core.
///
/// Use at module boundaries (store calls, token verification, config
/// validation, sync lifecycle). Internal/leaf functions can continue using
/// `anyhow::Result` — the `Internal` variant allows seamless conversion via
/// the `?` operator.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// No session token, or a token that failed verification. Recovered by
    /// re-authenticating; never fatal.
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("token verification failed: {0}")]
    Verification(String),

    /// Network failure or a non-2xx response from the backend. Surfaced as
    /// panel-local error text, never crashes other panels.
    #[error("transport error: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl MessagingError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = match status {
            Some(code) => format!("{} (status {})", message, code),
            None => message,
        };
        Self::Transport { status, message }
    }

    /// Whether this error means the caller should be treated as logged out.
    /// Verification failures collapse into the same recovery path as a
    /// missing token.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::Verification(_))
    }
}

impl From<reqwest::Error> for MessagingError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        Self::transport(status, err.to_string())
    }
}

#[cfg(test)]
mod tests;
