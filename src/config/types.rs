use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dialect::Backend;
use crate::errors::RetryConfig;
use crate::http::Location;
use crate::models::{Charset, Technique, TechniqueSet};

/// Immutable engine configuration, built once per run and shared by reference.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 1 = GET/POST, 2 = +COOKIE, 3 = +HEADER
    pub level: u8,
    pub techniques: TechniqueSet,
    pub technique_priority: Vec<Technique>,
    /// Seconds before a request is abandoned.
    pub timeout: u64,
    /// Seconds between retried attempts.
    pub delay: f64,
    /// Seconds the time oracle asks the backend to sleep.
    pub timesec: u64,
    pub retries: u32,
    pub dbms: Option<Backend>,
    pub code: Option<u16>,
    pub string: Option<String>,
    pub not_string: Option<String>,
    pub start: usize,
    pub stop: Option<usize>,
    /// Alphabet searched first for dumped cell values.
    pub charset: Charset,
    /// Value single lookups are checked against instead of extracted.
    pub expect: Option<String>,
    /// Re-ask a stored vector before trusting it on resume.
    pub verify_resumed: bool,
    pub text_only: bool,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub test_parameter: Option<Vec<String>>,
    pub skip_urlencoding: bool,
    pub threads: usize,
    pub batch: bool,
    pub flush_session: bool,
    pub output_dir: PathBuf,
    pub dynamicity_threshold: f64,
    pub similarity_threshold: f64,
    pub time_safety_factor: f64,
    pub confirmation_pairs: usize,
    pub verify_tls: bool,
    pub user_agent: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            level: 1,
            techniques: TechniqueSet::all(),
            technique_priority: vec![Technique::Boolean, Technique::Time, Technique::Error],
            timeout: 30,
            delay: 0.0,
            timesec: 5,
            retries: 3,
            dbms: None,
            code: None,
            string: None,
            not_string: None,
            start: 0,
            stop: None,
            charset: Charset::Printable,
            expect: None,
            verify_resumed: false,
            text_only: false,
            prefix: None,
            suffix: None,
            test_parameter: None,
            skip_urlencoding: false,
            threads: 1,
            batch: false,
            flush_session: false,
            output_dir: PathBuf::from("./sessions"),
            dynamicity_threshold: 0.98,
            similarity_threshold: 0.95,
            time_safety_factor: 0.8,
            confirmation_pairs: 2,
            verify_tls: false,
            user_agent: None,
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay.max(0.0))
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retries,
            delay: self.delay(),
        }
    }

    pub fn technique_order(&self) -> Vec<Technique> {
        self.techniques.ordered(&self.technique_priority)
    }

    /// Whether `location` is tested at the configured level.
    pub fn level_allows(&self, location: Location) -> bool {
        location.level() <= self.level
    }

    /// Whether `name` passes the user allow-list.
    pub fn parameter_allowed(&self, name: &str) -> bool {
        self.test_parameter
            .as_ref()
            .map_or(true, |list| list.iter().any(|p| p == name))
    }

    pub fn has_discriminator(&self) -> bool {
        self.code.is_some() || self.string.is_some() || self.not_string.is_some()
    }
}
