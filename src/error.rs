use std::fmt;
use thiserror::Error;

/// Where a configuration or validation error was found.
///
/// Rendered after the message as `(field: ..., details: ..., origin: ...)`,
/// skipping whatever is unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Dotted path of the offending field, e.g. `request.prompt` or `batch.max_batch_size`.
    pub field_path: Option<String>,
    /// Expected range, offending value, file name.
    pub details: Option<String>,
    /// Component that raised the error, e.g. `config_loader`.
    pub origin: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    fn is_empty(&self) -> bool {
        self.field_path.is_none() && self.details.is_none() && self.origin.is_none()
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        let labelled = [
            ("field", &self.field_path),
            ("details", &self.details),
            ("origin", &self.origin),
        ];
        let parts: Vec<String> = labelled
            .iter()
            .filter_map(|(label, value)| value.as_ref().map(|v| format!("{label}: {v}")))
            .collect();
        write!(f, " ({})", parts.join(", "))
    }
}

/// Unified error type for the gateway.
///
/// Upstream failures are opaque: whatever the inference collaborator returned is
/// kept as the `source` of [`Error::Upstream`] once the retry budget is spent.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{context}")]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    /// The request was malformed; it was never sent upstream.
    #[error("Invalid request: {message}{context}")]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Upstream call failed after {attempts} attempt(s): {source}")]
    Upstream {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("Dispatcher closed before the queued request completed")]
    DispatcherClosed,

    /// Executing a queued request panicked. Other entries of its batch are unaffected.
    #[error("Queued request panicked: {message}")]
    Panicked { message: String },

    /// A cache backend failed. The response cache treats this as a miss.
    #[error("Cache backend `{backend}` failed: {message}")]
    Cache { backend: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn cache(backend: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::Cache {
            backend: backend.into(),
            message: msg.into(),
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Validation { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }

    /// Number of upstream attempts made before this error surfaced, if it came from the upstream.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Error::Upstream { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = Error::validation_with_context(
            "prompt must not be empty",
            ErrorContext::new()
                .with_field_path("request.prompt")
                .with_origin("request_validator"),
        );
        assert_eq!(
            err.to_string(),
            "Invalid request: prompt must not be empty (field: request.prompt, origin: request_validator)"
        );
    }

    #[test]
    fn test_empty_context_renders_nothing() {
        let err = Error::configuration_with_context("bad file", ErrorContext::new());
        assert_eq!(err.to_string(), "Configuration error: bad file");
    }

    #[test]
    fn test_upstream_keeps_source() {
        let err = Error::Upstream {
            attempts: 3,
            source: anyhow::anyhow!("503 service unavailable"),
        };
        assert_eq!(err.attempts(), Some(3));
        assert!(err.to_string().contains("503 service unavailable"));
        assert!(err.context().is_none());
    }

    #[test]
    fn test_cache_error_names_backend() {
        let err = Error::cache("memory", "lock poisoned");
        assert_eq!(err.to_string(), "Cache backend `memory` failed: lock poisoned");
    }
}
