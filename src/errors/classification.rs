use super::types::BlindsightError;

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub retryable: bool,
}

impl BlindsightError {
    /// Classify this error to determine its type and whether it can be retried.
    ///
    /// Only transport faults are retried. Everything else either reflects a
    /// caller mistake or local state that another attempt will not fix.
    pub fn classify(&self) -> ErrorClassification {
        let (error_type, retryable) = match self {
            BlindsightError::Network(_) => ("NetworkError", true),
            BlindsightError::Timeout(_) => ("TimeoutError", true),

            BlindsightError::Config(_) => ("ConfigError", false),
            BlindsightError::InvalidTarget(_) => ("InvalidTargetError", false),
            BlindsightError::Io(_) => ("IoError", false),
            BlindsightError::Json(_) => ("JsonError", false),
            BlindsightError::Yaml(_) => ("YamlError", false),
            BlindsightError::Csv(_) => ("CsvError", false),
            BlindsightError::Database(_) => ("DatabaseError", false),
            BlindsightError::Session(_) => ("SessionError", false),
            BlindsightError::Prompt(_) => ("PromptError", false),
            BlindsightError::Cancelled(_) => ("CancelledError", false),
            BlindsightError::NotInjectable(_) => ("NotInjectableError", false),
            BlindsightError::Internal(_) => ("InternalError", false),
        };
        ErrorClassification { error_type, retryable }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BlindsightError::Cancelled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_retryable() {
        let err = BlindsightError::Network("connection reset".into());
        let class = err.classify();
        assert!(class.retryable);
        assert_eq!(class.error_type, "NetworkError");
    }

    #[test]
    fn test_timeout_retryable() {
        let err = BlindsightError::Timeout("timed out".into());
        assert!(err.classify().retryable);
    }

    #[test]
    fn test_config_error_not_retryable() {
        let err = BlindsightError::Config("invalid config".into());
        let class = err.classify();
        assert!(!class.retryable);
        assert_eq!(class.error_type, "ConfigError");
    }

    #[test]
    fn test_database_not_retryable() {
        let err = BlindsightError::Database("locked".into());
        assert!(!err.classify().retryable);
    }

    #[test]
    fn test_cancelled_detection() {
        assert!(BlindsightError::Cancelled("stop".into()).is_cancelled());
        assert!(!BlindsightError::Internal("x".into()).is_cancelled());
    }
}
