use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, trace};

use super::comparison::{PageComparator, References};
use super::{Oracle, OracleContext};
use crate::models::{Comparison, OracleVerdict, Outcome, Technique};
use crate::utils::similarity::derive_match_string;

/// Compares each response with calibrated true/false reference pages, or
/// with explicit discriminators when those are known.
pub struct BooleanOracle {
    ctx: OracleContext,
    template: String,
    comparator: PageComparator,
    refs: Option<References>,
    /// `comparator.string` was derived during calibration, not supplied.
    derived: bool,
}

impl BooleanOracle {
    pub fn new(ctx: OracleContext, template: String, comparator: PageComparator) -> Self {
        Self { ctx, template, comparator, refs: None, derived: false }
    }

    /// Fetch fresh reference pages through a random tautology and contradiction.
    async fn calibrate(&mut self) -> Result<(), String> {
        let (a, b) = {
            let mut rng = rand::thread_rng();
            let a: u32 = rng.gen_range(1000..10000);
            (a, a + rng.gen_range(1..1000))
        };
        let true_payload = self.ctx.payload(&self.template, &format!("{}={}", a, a));
        let false_payload = self.ctx.payload(&self.template, &format!("{}={}", a, b));

        let true_page = self.ctx.send(&true_payload).await.map_err(|e| e.to_string())?;
        let false_page = self.ctx.send(&false_payload).await.map_err(|e| e.to_string())?;
        let refs = References { true_page, false_page };

        if !self.comparator.distinguishable(&refs) {
            return Err("true and false responses are indistinguishable".into());
        }
        if let Some(found) = derive_match_string(&refs.true_page.body, &refs.false_page.body) {
            debug!(match_string = %found, "Derived match string from reference pages");
            self.comparator.string = Some(found);
            self.derived = true;
        }
        self.refs = Some(refs);
        Ok(())
    }

    fn reset(&mut self) {
        self.refs = None;
        if self.derived {
            self.comparator.string = None;
            self.derived = false;
        }
    }
}

#[async_trait]
impl Oracle for BooleanOracle {
    fn technique(&self) -> Technique {
        Technique::Boolean
    }

    async fn ask(&mut self, condition: &str) -> OracleVerdict {
        if !self.comparator.has_discriminator() && self.refs.is_none() {
            if let Err(reason) = self.calibrate().await {
                self.reset();
                return OracleVerdict::inconclusive(reason);
            }
        }

        let payload = self.ctx.payload(&self.template, condition);
        let response = match self.ctx.send(&payload).await {
            Ok(response) => response,
            Err(e) => return OracleVerdict::inconclusive(e.to_string()),
        };

        let outcome = match (self.comparator.by_discriminator(&response), &self.refs) {
            (Some(outcome), _) => outcome,
            (None, Some(refs)) => self.comparator.by_reference(&response, refs),
            (None, None) => Outcome::Inconclusive,
        };
        trace!(condition, outcome = %outcome, status = response.status, "Boolean oracle answer");

        if outcome == Outcome::Inconclusive {
            self.reset();
        }
        OracleVerdict::new(
            outcome,
            response.elapsed,
            format!("HTTP {} ({} bytes)", response.status, response.body.len()),
        )
    }

    fn comparison(&self) -> Comparison {
        Comparison::Boolean {
            match_string: self.comparator.string.clone(),
            not_match_string: self.comparator.not_string.clone(),
            code: self.comparator.code,
            text_only: self.comparator.text_only,
        }
    }
}
