pub mod boolean;
pub mod comparison;
pub mod error;
pub mod time;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::EngineConfig;
use crate::errors::{with_retry, BlindsightError};
use crate::http::{substitute, HttpResponse, InjectionPoint, RequestModel, Transport};
use crate::models::{BaselineSummary, Comparison, OracleVerdict, Technique, Vector};
use crate::payloads::{render, RenderParams};

pub use boolean::BooleanOracle;
pub use comparison::{PageComparator, References};
pub use error::ErrorOracle;
pub use time::{time_threshold, TimeOracle};

/// Answers one yes/no question about backend data per call.
///
/// Implementations hold conversational state (calibrated reference pages,
/// thresholds) and are not shared between workers.
#[async_trait]
pub trait Oracle: Send {
    fn technique(&self) -> Technique;

    /// Evaluate `condition`, a SQL predicate, through the injection point.
    /// Network failures yield INCONCLUSIVE, never an error.
    async fn ask(&mut self, condition: &str) -> OracleVerdict;

    /// How TRUE is told from FALSE, as it should be persisted.
    fn comparison(&self) -> Comparison;
}

/// Everything an oracle needs to put a payload on the wire.
#[derive(Clone)]
pub struct OracleContext {
    pub transport: Arc<dyn Transport>,
    pub request: Arc<RequestModel>,
    pub point: InjectionPoint,
    pub config: Arc<EngineConfig>,
}

impl OracleContext {
    pub fn new(
        transport: Arc<dyn Transport>,
        request: Arc<RequestModel>,
        point: InjectionPoint,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self { transport, request, point, config }
    }

    /// Render `template` around `inference` for this point.
    pub fn payload(&self, template: &str, inference: &str) -> String {
        let original = if self.point.is_custom_marker { "" } else { self.point.original_value.as_str() };
        let params = RenderParams {
            original,
            prefix: self.config.prefix.as_deref(),
            suffix: self.config.suffix.as_deref(),
            sleep_time: self.config.timesec,
        };
        render(template, inference, &params)
    }

    /// Substitute and send, retrying transient faults.
    pub async fn send(&self, payload: &str) -> Result<HttpResponse, BlindsightError> {
        let prepared = substitute(&self.request, &self.point, payload, !self.config.skip_urlencoding)?;
        with_retry("oracle query", &self.config.retry_config(), || self.transport.send(&prepared)).await
    }
}

/// Build the oracle that drives a confirmed vector.
pub fn build_oracle(ctx: OracleContext, vector: &Vector, baseline: &BaselineSummary) -> Box<dyn Oracle> {
    match &vector.comparison {
        Comparison::Boolean { match_string, not_match_string, code, text_only } => {
            let comparator = PageComparator {
                code: *code,
                string: match_string.clone(),
                not_string: not_match_string.clone(),
                text_only: *text_only,
                threshold: ctx.config.similarity_threshold,
                is_dynamic: baseline.is_dynamic,
            };
            Box::new(BooleanOracle::new(ctx, vector.template.clone(), comparator))
        }
        Comparison::Time { threshold_ms, .. } => Box::new(TimeOracle::new(
            ctx,
            vector.template.clone(),
            Duration::from_millis(*threshold_ms),
        )),
        Comparison::Error { signature } => Box::new(ErrorOracle::new(ctx, vector.template.clone(), signature)),
    }
}

/// A fresh oracle for an unconfirmed template.
pub fn candidate_oracle(
    ctx: OracleContext,
    technique: Technique,
    template: String,
    signature: Option<&str>,
    baseline: &BaselineSummary,
) -> Box<dyn Oracle> {
    match technique {
        Technique::Boolean => {
            let comparator = PageComparator::from_config(&ctx.config, baseline.is_dynamic);
            Box::new(BooleanOracle::new(ctx, template, comparator))
        }
        Technique::Time => {
            let threshold = time_threshold(&ctx.config, Duration::from_millis(baseline.elapsed_ms));
            Box::new(TimeOracle::new(ctx, template, threshold))
        }
        Technique::Error => Box::new(ErrorOracle::new(ctx, template, signature.unwrap_or_default())),
    }
}

/// Ask until a decisive answer or `attempts` INCONCLUSIVE answers in a row.
pub async fn settle(oracle: &mut dyn Oracle, condition: &str, attempts: u32) -> OracleVerdict {
    let mut verdict = oracle.ask(condition).await;
    for _ in 1..attempts.max(1) {
        if !verdict.is_inconclusive() {
            break;
        }
        verdict = oracle.ask(condition).await;
    }
    verdict
}
