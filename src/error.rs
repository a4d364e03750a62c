//! Closed error taxonomy for the gateway.
//!
//! Every error a caller can observe from [`crate::gateway::Gateway`] is one of
//! the variants below — there is no open-ended "other" bucket. Transport-level
//! errors from a provider adaptor (`reqwest::Error`, timeouts) are reclassified
//! into [`Error::Transient`] or [`Error::PermanentProvider`] at the adaptor
//! boundary using the same status-code table the retry wrapper consults, so
//! nothing downstream ever has to pattern-match on a raw `reqwest::Error`.

use thiserror::Error;

/// The gateway's complete set of observable failures.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// `request.model` does not name a configured [`crate::types::ModelConfig`].
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// The request itself is malformed (e.g. an empty message list).
    #[error("validation error: {0}")]
    Validation(String),

    /// The rate limiter could not admit the request and no finite wait would help.
    #[error("rate limit exceeded for model {model}: {reason}")]
    RateLimited { model: String, reason: String },

    /// Classified-transient provider failure (429, 5xx, connection/timeout).
    /// Hidden from the caller by the retry wrapper until retries are exhausted.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Classified-permanent provider failure (4xx other than 429, invalid
    /// tool schema, malformed provider response, etc).
    #[error("permanent provider error: {0}")]
    PermanentProvider(String),

    /// The gateway was stopped, or the caller's own handle was cancelled,
    /// while this request was in flight.
    #[error("request cancelled")]
    Cancelled,

    /// Malformed `ModelConfig` / configuration mapping.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    #[must_use]
    pub fn unknown_model(model: impl Into<String>) -> Self {
        Self::UnknownModel(model.into())
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    #[must_use]
    pub fn rate_limited(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RateLimited {
            model: model.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    #[must_use]
    pub fn permanent_provider(message: impl Into<String>) -> Self {
        Self::PermanentProvider(message.into())
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Short, stable identifier for this error kind, used in `error` fields of
    /// the JSONL audit logs and for matching in tests.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnknownModel(_) => "unknown_model",
            Self::Validation(_) => "validation",
            Self::RateLimited { .. } => "rate_limited",
            Self::Transient(_) => "transient",
            Self::PermanentProvider(_) => "permanent_provider",
            Self::Cancelled => "cancelled",
            Self::Config(_) => "config",
        }
    }

    /// Classifies an HTTP status code from a provider response into the
    /// gateway's taxonomy, per the retry table in §4.3 of the design.
    #[must_use]
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        if status == 429 || (500..600).contains(&status) {
            Self::Transient(format!("http {status}: {body}"))
        } else {
            Self::PermanentProvider(format!("http {status}: {body}"))
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            return Self::Transient(err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        }
        Self::Transient(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::Transient(format!("timed out: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_429_and_5xx_as_transient() {
        assert!(matches!(Error::from_status(429, ""), Error::Transient(_)));
        assert!(matches!(Error::from_status(500, ""), Error::Transient(_)));
        assert!(matches!(Error::from_status(503, ""), Error::Transient(_)));
    }

    #[test]
    fn classifies_other_4xx_as_permanent() {
        assert!(matches!(
            Error::from_status(400, ""),
            Error::PermanentProvider(_)
        ));
        assert!(matches!(
            Error::from_status(404, ""),
            Error::PermanentProvider(_)
        ));
    }
}
