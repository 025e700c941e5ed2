pub mod dump;
pub mod fingerprint;
pub mod log;
pub mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::errors::BlindsightError;
use crate::extractor::ProgressSink;
use crate::http::RequestModel;
use crate::models::ExtractionResult;

pub use dump::write_table_csv;
pub use fingerprint::{fingerprint, target_fingerprint};
pub use log::SessionLog;
pub use store::{Session, SessionStore};

/// `<output_dir>/<host>/<first 12 hex digits of the target fingerprint>`
pub fn session_dir(config: &EngineConfig, request: &RequestModel) -> PathBuf {
    let fp = target_fingerprint(request);
    config.output_dir.join(request.host()).join(&fp[..12])
}

/// Opens the store inside a session directory.
pub fn open_store(dir: &Path) -> Result<SessionStore, BlindsightError> {
    SessionStore::open(&dir.join("session.sqlite"))
}

/// The store bound to one confirmed point.
#[derive(Clone)]
pub struct SessionHandle {
    store: Arc<SessionStore>,
    fingerprint: String,
}

impl SessionHandle {
    pub fn new(store: Arc<SessionStore>, fingerprint: String) -> Self {
        Self { store, fingerprint }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn progress(&self, key: &str) -> Result<Option<ExtractionResult>, BlindsightError> {
        self.store.progress(&self.fingerprint, key)
    }
}

impl ProgressSink for SessionHandle {
    fn checkpoint(&self, key: &str, result: &ExtractionResult) -> Result<(), BlindsightError> {
        self.store.append_progress(&self.fingerprint, key, result)
    }
}
