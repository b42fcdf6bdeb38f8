//! Structured error types for descriptor resolution.

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Lookup errors
    NotFound,

    // Descriptor content errors
    ParseError,
    MissingEnvVar,
    PolicyViolation,

    // Caller errors
    ConfigurationError,

    // Internal errors
    IoError,
}

/// Errors raised while resolving the effective configuration.
///
/// Every variant aborts the resolution; no partial result is returned.
#[derive(Debug, thiserror::Error)]
pub enum PinfError {
    /// No descriptor could be located from the starting path.
    #[error("No `{filename}` found for path '{}'", start.display())]
    NotFound { filename: String, start: PathBuf },

    /// An `extends` entry did not resolve to any descriptor.
    #[error("Descriptor '{id}' referenced by `extends` not found (while parsing '{}')", descriptor.display())]
    ExtendsNotFound { id: String, descriptor: PathBuf },

    /// The descriptor is not well-formed JSON after substitution.
    #[error("{message} (while parsing '{}')", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    /// A `$NAME` token has no value in strict mode.
    #[error("The '{name}' environment variable must be set! (while parsing '{}')", path.display())]
    MissingEnvVar { name: String, path: PathBuf },

    /// A descriptor did something its location does not permit.
    #[error("{reason} (while parsing '{}')", path.display())]
    Policy { path: PathBuf, reason: String },

    /// An accessor was called with arguments the identity cannot satisfy.
    #[error("{0}")]
    Configuration(String),

    #[error("Failed to access '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PinfError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PinfError::NotFound { .. } | PinfError::ExtendsNotFound { .. } => ErrorCode::NotFound,
            PinfError::Parse { .. } => ErrorCode::ParseError,
            PinfError::MissingEnvVar { .. } => ErrorCode::MissingEnvVar,
            PinfError::Policy { .. } => ErrorCode::PolicyViolation,
            PinfError::Configuration(_) => ErrorCode::ConfigurationError,
            PinfError::Io { .. } => ErrorCode::IoError,
        }
    }

    // Convenience constructors

    pub fn configuration(message: impl Into<String>) -> Self {
        PinfError::Configuration(message.into())
    }

    pub fn policy(path: &Path, reason: impl Into<String>) -> Self {
        PinfError::Policy {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        PinfError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Build a parse error from a `serde_json` failure, quoting the offending line.
    pub fn parse(path: &Path, text: &str, err: &serde_json::Error) -> Self {
        let line = err.line();
        let column = err.column();
        let excerpt = line
            .checked_sub(1)
            .and_then(|index| text.lines().nth(index))
            .map(str::trim)
            .filter(|excerpt| !excerpt.is_empty());
        let message = match excerpt {
            Some(excerpt) => format!("{err}: near `{excerpt}`"),
            None => err.to_string(),
        };
        PinfError::Parse {
            path: path.to_path_buf(),
            line,
            column,
            message,
        }
    }
}

/// Result type for resolution operations.
pub type PinfResult<T> = std::result::Result<T, PinfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_quotes_offending_line() {
        let text = "{\n  \"a\": 1\n  \"b\": 2\n}";
        let err = serde_json::from_str::<serde_json::Value>(text).unwrap_err();
        let parsed = PinfError::parse(Path::new("/tmp/package.json"), text, &err);

        match &parsed {
            PinfError::Parse { line, message, .. } => {
                assert_eq!(*line, 3);
                assert!(message.contains("\"b\": 2"), "message was: {message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(parsed.to_string().contains("/tmp/package.json"));
        assert_eq!(parsed.code(), ErrorCode::ParseError);
    }

    #[test]
    fn test_missing_env_var_names_variable() {
        let err = PinfError::MissingEnvVar {
            name: "UNDEFINED_VAR".into(),
            path: PathBuf::from("/tmp/program.json"),
        };
        assert!(err.to_string().contains("'UNDEFINED_VAR'"));
        assert_eq!(err.code(), ErrorCode::MissingEnvVar);
    }

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::PolicyViolation).unwrap();
        assert_eq!(json, "\"POLICY_VIOLATION\"");
    }
}
