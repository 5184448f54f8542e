use thiserror::Error;

/// Top-level error type for the Evidex system.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for EvidexError` so that the `?` operator works
/// across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EvidexError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for EvidexError {
    fn from(err: toml::de::Error) -> Self {
        EvidexError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for EvidexError {
    fn from(err: toml::ser::Error) -> Self {
        EvidexError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for EvidexError {
    fn from(err: serde_json::Error) -> Self {
        EvidexError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Evidex operations.
pub type Result<T> = std::result::Result<T, EvidexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EvidexError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(EvidexError, &str)> = vec![
            (
                EvidexError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                EvidexError::Settings("unreadable".to_string()),
                "Settings error: unreadable",
            ),
            (
                EvidexError::Validation("empty name".to_string()),
                "Validation error: empty name",
            ),
            (
                EvidexError::Storage("disk full".to_string()),
                "Storage error: disk full",
            ),
            (
                EvidexError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let evidex_err: EvidexError = io_err.into();
        assert!(matches!(evidex_err, EvidexError::Io(_)));
        assert!(evidex_err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let evidex_err: EvidexError = err.unwrap_err().into();
        assert!(matches!(evidex_err, EvidexError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let evidex_err: EvidexError = err.unwrap_err().into();
        assert!(matches!(evidex_err, EvidexError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
