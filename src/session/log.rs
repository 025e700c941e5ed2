use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;

use crate::errors::BlindsightError;

/// Human-readable record of every value fetched for a target.
#[derive(Debug, Clone)]
pub struct SessionLog {
    path: PathBuf,
}

impl SessionLog {
    pub fn new(session_dir: &Path) -> Self {
        Self { path: session_dir.join("log") }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(&self, key: &str, value: &str) -> Result<(), BlindsightError> {
        let line = format!("[{}] {}: {}\n", Utc::now().format("%H:%M:%S"), key, value);
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}
