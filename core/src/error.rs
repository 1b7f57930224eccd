use thiserror::Error;

/// Machine-readable error codes shared between the builder engine and the
/// tool surface. Agents branch on these, not on message text.
pub mod codes {
    pub const NOT_FOUND: &str = "not_found";
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const UNKNOWN_NODE: &str = "unknown_node";
    pub const CONFLICT: &str = "conflict";
    pub const SERIALIZATION_FAILED: &str = "serialization_failed";
}

/// Errors raised by the definition builder. Every failed operation leaves the
/// session's graph exactly as it was before the call.
#[derive(Error, Debug, Clone)]
pub enum BuilderError {
    #[error("Session '{0}' not found")]
    SessionNotFound(String),

    #[error("{message}")]
    Validation {
        message: String,
        /// Which input field caused the error, when attributable
        field: Option<String>,
    },

    #[error("{context} references unknown node '{name}'")]
    UnknownNode { context: String, name: String },

    #[error("A {category} named '{name}' already exists in this definition")]
    Conflict { category: &'static str, name: String },

    #[error("Definition is invalid: {}", .errors.join("; "))]
    Serialization { errors: Vec<String> },
}

impl BuilderError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// The stable machine code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => codes::NOT_FOUND,
            Self::Validation { .. } => codes::VALIDATION_FAILED,
            Self::UnknownNode { .. } => codes::UNKNOWN_NODE,
            Self::Conflict { .. } => codes::CONFLICT,
            Self::Serialization { .. } => codes::SERIALIZATION_FAILED,
        }
    }

    /// The input field this error is attributable to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => field.as_deref(),
            Self::SessionNotFound(_) => Some("session_id"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            BuilderError::SessionNotFound("abc".into()).code(),
            "not_found"
        );
        assert_eq!(BuilderError::validation("bad").code(), "validation_failed");
        assert_eq!(
            BuilderError::UnknownNode {
                context: "Stream 'S'".into(),
                name: "missing".into()
            }
            .code(),
            "unknown_node"
        );
        assert_eq!(
            BuilderError::Conflict {
                category: "source",
                name: "S1".into()
            }
            .code(),
            "conflict"
        );
        assert_eq!(
            BuilderError::Serialization { errors: vec![] }.code(),
            "serialization_failed"
        );
    }

    #[test]
    fn serialization_error_joins_validator_errors() {
        let err = BuilderError::Serialization {
            errors: vec![
                "At least one source is required".to_string(),
                "Stream 'S' references unknown node 'X'".to_string(),
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("Definition is invalid: "));
        assert!(text.contains("At least one source is required"));
        assert!(text.contains("unknown node 'X'"));
    }

    #[test]
    fn validation_error_carries_field() {
        let err = BuilderError::validation_field("'name' must not be empty", "name");
        assert_eq!(err.field(), Some("name"));
        assert_eq!(err.to_string(), "'name' must not be empty");
    }
}
