use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlindsightError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Not injectable: {0}")]
    NotInjectable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for BlindsightError {
    fn from(e: rusqlite::Error) -> Self {
        BlindsightError::Database(e.to_string())
    }
}
