use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::ConfirmationState;
use crate::dialect::Backend;
use crate::errors::BlindsightError;
use crate::models::{BaselineSummary, Outcome, Technique, Vector, VectorSet};
use crate::oracle::{build_oracle, candidate_oracle, settle, Oracle, OracleContext};
use crate::payloads::{instantiate, PayloadCatalog};
use crate::pipeline::decision::{Decider, Question};
use crate::pipeline::events::EngineEvent;

/// Result of driving the state machine for one point.
#[derive(Debug, Clone)]
pub struct Confirmation {
    pub state: ConfirmationState,
    pub vectors: VectorSet,
    pub backend: Option<Backend>,
}

/// Drives candidate templates against fresh oracles until one holds.
pub struct TechniqueSelector<'a> {
    ctx: OracleContext,
    catalog: &'a PayloadCatalog,
    decider: &'a dyn Decider,
    baseline: BaselineSummary,
    possible_backend: Option<Backend>,
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedSender<EngineEvent>>,
}

impl<'a> TechniqueSelector<'a> {
    pub fn new(
        ctx: OracleContext,
        catalog: &'a PayloadCatalog,
        decider: &'a dyn Decider,
        baseline: BaselineSummary,
        possible_backend: Option<Backend>,
    ) -> Self {
        Self {
            ctx,
            catalog,
            decider,
            baseline,
            possible_backend,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_event_channel(mut self, tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(event);
        }
    }

    pub async fn confirm(&self) -> Result<Confirmation, BlindsightError> {
        let config = self.ctx.config.clone();
        let parameter = self.ctx.point.name.clone();
        let mut state = ConfirmationState::Untested;
        let mut vectors = VectorSet::default();

        let hint = config.dbms.or(self.possible_backend);
        let restrict = match (config.dbms, self.possible_backend) {
            (Some(forced), _) => Some(forced),
            (None, Some(likely)) if self.decider.confirm(&Question::SkipOtherBackends { backend: likely }) => {
                Some(likely)
            }
            _ => None,
        };
        let mut backend = config.dbms;

        for technique in config.technique_order() {
            if technique == Technique::Error && hint.is_none() {
                debug!(parameter = %parameter, "Skipping error-based tests without a backend hint");
                continue;
            }
            if !state.is_terminal() {
                state.begin(technique)?;
            }
            self.emit(EngineEvent::TechniqueTrying { parameter: parameter.clone(), technique });

            for template in self.catalog.candidates(technique, restrict) {
                if self.cancel.is_cancelled() {
                    return Err(BlindsightError::Cancelled("confirmation interrupted".into()));
                }
                debug!(parameter = %parameter, title = %template.title, "Testing payload");

                let instantiated = instantiate(&template.template);
                let mut oracle = candidate_oracle(
                    self.ctx.clone(),
                    technique,
                    instantiated.clone(),
                    template.signature.as_deref(),
                    &self.baseline,
                );
                if !self.verify(oracle.as_mut()).await? {
                    continue;
                }

                let vector = Vector {
                    technique,
                    title: template.title.clone(),
                    template: instantiated,
                    comparison: oracle.comparison(),
                    backend: template.backend,
                };
                info!(
                    parameter = %parameter,
                    technique = %technique,
                    "{} parameter '{}' appears to be '{}' injectable",
                    self.ctx.point.location, parameter, vector.title
                );
                self.emit(EngineEvent::VectorConfirmed {
                    parameter: parameter.clone(),
                    technique,
                    title: vector.title.clone(),
                });
                backend = backend.or(vector.backend);
                vectors.insert(vector.clone());
                if !state.is_terminal() {
                    state.confirm(vector)?;
                }
                break;
            }

            if !vectors.is_empty()
                && !self.decider.confirm(&Question::ContinueOtherTechniques { parameter: parameter.clone() })
            {
                break;
            }
        }

        if vectors.is_empty() {
            state.exhaust()?;
            warn!(parameter = %parameter, "{} parameter '{}' does not seem to be injectable", self.ctx.point.location, parameter);
            return Ok(Confirmation { state, vectors, backend: None });
        }

        if backend.is_none() {
            backend = self.fingerprint(&vectors).await;
        }
        if let Some(found) = backend {
            if let Some(boolean) = vectors.boolean.as_mut() {
                boolean.backend.get_or_insert(found);
            }
        }
        Ok(Confirmation { state, vectors, backend })
    }

    /// `confirmation_pairs` random tautology/contradiction pairs must all
    /// answer TRUE then FALSE.
    async fn verify(&self, oracle: &mut dyn Oracle) -> Result<bool, BlindsightError> {
        let attempts = self.ctx.config.retries + 1;
        for _ in 0..self.ctx.config.confirmation_pairs {
            if self.cancel.is_cancelled() {
                return Err(BlindsightError::Cancelled("confirmation interrupted".into()));
            }
            let (a, b) = {
                let mut rng = rand::thread_rng();
                let a: u32 = rng.gen_range(1000..10000);
                (a, a + rng.gen_range(1..1000))
            };
            let yes = settle(oracle, &format!("{}={}", a, a), attempts).await;
            if yes.outcome != Outcome::True {
                debug!(outcome = %yes.outcome, evidence = %yes.evidence, "Tautology did not answer TRUE");
                return Ok(false);
            }
            let no = settle(oracle, &format!("{}={}", a, b), attempts).await;
            if no.outcome != Outcome::False {
                debug!(outcome = %no.outcome, evidence = %no.evidence, "Contradiction did not answer FALSE");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Ask engine-specific tautologies through the fastest confirmed vector.
    async fn fingerprint(&self, vectors: &VectorSet) -> Option<Backend> {
        let vector = vectors.boolean.as_ref().or(vectors.error.as_ref()).or(vectors.time.as_ref())?;
        let mut oracle = build_oracle(self.ctx.clone(), vector, &self.baseline);
        let attempts = self.ctx.config.retries + 1;

        let mut order: Vec<Backend> = Backend::ALL.to_vec();
        if let Some(likely) = self.possible_backend {
            order.retain(|b| *b != likely);
            order.insert(0, likely);
        }
        for candidate in order {
            if self.cancel.is_cancelled() {
                return None;
            }
            let verdict = settle(oracle.as_mut(), candidate.fingerprint_predicate(), attempts).await;
            if verdict.outcome == Outcome::True {
                info!(backend = %candidate, "the back-end DBMS is {}", candidate);
                return Some(candidate);
            }
        }
        debug!("Back-end DBMS could not be fingerprinted");
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::EngineConfig;
    use crate::http::transport::testing::{query_param, FnTransport};
    use crate::http::{discover, HttpResponse, PreparedRequest, RequestModel, Transport};
    use crate::pipeline::decision::BatchDecider;

    /// Numeric `id` that evaluates `1 AND (a=b)` and MySQL's connection id.
    fn mysql_like(req: &PreparedRequest) -> Result<HttpResponse, BlindsightError> {
        let id = query_param(req, "id").unwrap_or_default();
        let truth = match id.strip_prefix("1 AND (").and_then(|s| s.strip_suffix(')')) {
            Some("CONNECTION_ID()=CONNECTION_ID()") => true,
            Some(cond) => cond.split_once('=').is_some_and(|(l, r)| l.parse::<u32>().is_ok() && l == r),
            None => id == "1",
        };
        Ok(HttpResponse::new(200, if truth { "<p>Welcome back</p>" } else { "<p>Nothing here</p>" }))
    }

    fn context(transport: Arc<dyn Transport>, config: EngineConfig) -> OracleContext {
        let request = RequestModel::get("http://target.local/?id=1");
        let point = discover(&request).unwrap().points.remove(0);
        OracleContext::new(transport, Arc::new(request), point, Arc::new(config))
    }

    #[tokio::test]
    async fn test_confirms_boolean_and_fingerprints() {
        let transport = Arc::new(FnTransport::new(mysql_like));
        let ctx = context(transport, EngineConfig::default());
        let catalog = PayloadCatalog::builtin();
        let decider = BatchDecider;

        let confirmation = TechniqueSelector::new(ctx, &catalog, &decider, BaselineSummary::default(), None)
            .confirm()
            .await
            .unwrap();
        assert!(matches!(confirmation.state, ConfirmationState::Confirmed(_)));
        assert!(confirmation.vectors.boolean.is_some());
        assert!(confirmation.vectors.time.is_none());
        assert_eq!(confirmation.backend, Some(Backend::Mysql));
    }

    #[tokio::test]
    async fn test_flat_target_is_exhausted() {
        let transport = Arc::new(FnTransport::new(|_| Ok(HttpResponse::new(200, "static"))));
        let config = EngineConfig { retries: 0, ..Default::default() };
        let ctx = context(transport, config);
        let catalog = PayloadCatalog::builtin();
        let decider = BatchDecider;

        let confirmation = TechniqueSelector::new(ctx, &catalog, &decider, BaselineSummary::default(), None)
            .confirm()
            .await
            .unwrap();
        assert_eq!(confirmation.state, ConfirmationState::Exhausted);
        assert!(confirmation.vectors.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let transport = Arc::new(FnTransport::new(mysql_like));
        let ctx = context(transport, EngineConfig::default());
        let catalog = PayloadCatalog::builtin();
        let decider = BatchDecider;
        let token = CancellationToken::new();
        token.cancel();

        let result = TechniqueSelector::new(ctx, &catalog, &decider, BaselineSummary::default(), None)
            .with_cancel_token(token)
            .confirm()
            .await;
        assert!(matches!(result, Err(BlindsightError::Cancelled(_))));
    }
}
