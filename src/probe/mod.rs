pub mod fingerprints;

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::dialect::Backend;
use crate::errors::{with_retry, BlindsightError};
use crate::http::{baseline, substitute, HttpResponse, InjectionPoint, RequestModel, Transport};
use crate::models::BaselineSummary;
use crate::utils::similarity::{similarity_ratio, text_only};

pub use fingerprints::detect_backend;

/// Appended to the original value to provoke a syntax error.
const SYNTAX_BREAK: &str = "'\")(";

/// What the probe learned about a target.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub baseline: HttpResponse,
    pub is_dynamic: bool,
    /// Similarity of the two baseline samples.
    pub similarity: f64,
    pub possible_backend: Option<Backend>,
    pub mean_latency: Duration,
}

impl ProbeOutcome {
    pub fn summary(&self) -> BaselineSummary {
        BaselineSummary {
            status: self.baseline.status,
            length: self.baseline.body.len(),
            elapsed_ms: self.mean_latency.as_millis() as u64,
            is_dynamic: self.is_dynamic,
        }
    }
}

pub struct ConnectionProbe<'a> {
    transport: &'a dyn Transport,
    config: &'a EngineConfig,
}

impl<'a> ConnectionProbe<'a> {
    pub fn new(transport: &'a dyn Transport, config: &'a EngineConfig) -> Self {
        Self { transport, config }
    }

    /// Classify the page and look for engine error text. A point, when given,
    /// receives a syntax-breaking value; failure of that request is not fatal.
    pub async fn probe(
        &self,
        request: &RequestModel,
        point: Option<&InjectionPoint>,
    ) -> Result<ProbeOutcome, BlindsightError> {
        let prepared = baseline(request);
        let retry = self.config.retry_config();

        let first = with_retry("baseline", &retry, || self.transport.send(&prepared)).await?;
        let second = with_retry("baseline", &retry, || self.transport.send(&prepared)).await?;

        let similarity = if self.config.text_only {
            similarity_ratio(&text_only(&first.body), &text_only(&second.body))
        } else {
            similarity_ratio(&first.body, &second.body)
        };
        let is_dynamic = first.status != second.status || similarity < self.config.dynamicity_threshold;
        let mean_latency = (first.elapsed + second.elapsed) / 2;

        let mut possible_backend = detect_backend(&first.body).or_else(|| detect_backend(&second.body));

        if possible_backend.is_none() {
            if let Some(point) = point {
                let payload = format!("{}{}", point.original_value, SYNTAX_BREAK);
                let broken = substitute(request, point, &payload, !self.config.skip_urlencoding)?;
                match self.transport.send(&broken).await {
                    Ok(response) => possible_backend = detect_backend(&response.body),
                    Err(e) => warn!(parameter = %point.name, error = %e, "Syntax-breaking probe failed"),
                }
            }
        }

        if is_dynamic {
            info!(similarity, "Target page content is dynamic");
        } else {
            debug!(similarity, "Target page content is stable");
        }
        if let Some(backend) = possible_backend {
            info!(backend = %backend, "Heuristic test shows the back-end DBMS could be {}", backend);
        }

        Ok(ProbeOutcome {
            baseline: first,
            is_dynamic,
            similarity,
            possible_backend,
            mean_latency,
        })
    }
}
