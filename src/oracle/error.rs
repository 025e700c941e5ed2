use async_trait::async_trait;
use regex::Regex;
use tracing::trace;

use super::{Oracle, OracleContext};
use crate::models::{Comparison, OracleVerdict, Outcome, Technique};

/// TRUE when the response carries the error a true predicate provokes.
pub struct ErrorOracle {
    ctx: OracleContext,
    template: String,
    signature: String,
    pattern: Option<Regex>,
}

impl ErrorOracle {
    pub fn new(ctx: OracleContext, template: String, signature: &str) -> Self {
        let pattern = if signature.is_empty() {
            None
        } else {
            Regex::new(&format!("(?i){}", regex::escape(signature))).ok()
        };
        Self { ctx, template, signature: signature.to_string(), pattern }
    }
}

#[async_trait]
impl Oracle for ErrorOracle {
    fn technique(&self) -> Technique {
        Technique::Error
    }

    async fn ask(&mut self, condition: &str) -> OracleVerdict {
        let Some(pattern) = &self.pattern else {
            return OracleVerdict::inconclusive("no error signature for this template");
        };
        let payload = self.ctx.payload(&self.template, condition);
        let response = match self.ctx.send(&payload).await {
            Ok(response) => response,
            Err(e) => return OracleVerdict::inconclusive(e.to_string()),
        };

        let found = pattern.find(&response.body);
        let outcome = Outcome::from_bool(found.is_some());
        trace!(condition, outcome = %outcome, "Error oracle answer");
        let evidence = found.map_or_else(|| format!("HTTP {} without signature", response.status), |m| m.as_str().to_string());
        OracleVerdict::new(outcome, response.elapsed, evidence)
    }

    fn comparison(&self) -> Comparison {
        Comparison::Error { signature: self.signature.clone() }
    }
}
