use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::decision::{BatchDecider, Decider, Question};
use super::events::EngineEvent;
use super::extraction::TargetExtraction;
use crate::config::EngineConfig;
use crate::confirmation::{ConfirmationState, TechniqueSelector};
use crate::dialect::Dialect;
use crate::errors::BlindsightError;
use crate::http::{discover, BodyKind, InjectionPoint, Location, RequestModel, Transport};
use crate::models::{InjectionReport, Outcome};
use crate::oracle::{build_oracle, settle, OracleContext};
use crate::payloads::PayloadCatalog;
use crate::probe::{ConnectionProbe, ProbeOutcome};
use crate::session::{fingerprint, open_store, session_dir, target_fingerprint, SessionHandle, SessionLog, SessionStore};

/// Drives probe, confirmation and extraction for one or more targets.
pub struct Orchestrator {
    config: Arc<EngineConfig>,
    transport: Arc<dyn Transport>,
    catalog: Arc<PayloadCatalog>,
    decider: Arc<dyn Decider>,
    cancel_token: CancellationToken,
    event_tx: Option<mpsc::UnboundedSender<EngineEvent>>,
    /// Fixed store, used instead of one per session directory.
    store: Option<Arc<SessionStore>>,
    stores: DashMap<PathBuf, Arc<SessionStore>>,
    probes: DashMap<String, ProbeOutcome>,
    run_id: String,
}

impl Orchestrator {
    pub fn new(config: Arc<EngineConfig>, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            catalog: Arc::new(PayloadCatalog::builtin()),
            decider: Arc::new(BatchDecider),
            cancel_token: CancellationToken::new(),
            event_tx: None,
            store: None,
            stores: DashMap::new(),
            probes: DashMap::new(),
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = decider;
        self
    }

    pub fn with_catalog(mut self, catalog: PayloadCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    /// Replace the internal cancel token with an external one (e.g. a Ctrl-C handler).
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Attach an event channel for streaming progress to a consumer.
    pub fn with_event_channel(mut self, tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Keep all sessions in `store` instead of one file per target.
    pub fn with_session_store(mut self, store: Arc<SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    fn store_for(&self, request: &RequestModel) -> Result<(Arc<SessionStore>, PathBuf), BlindsightError> {
        let dir = session_dir(&self.config, request);
        if let Some(store) = &self.store {
            return Ok((store.clone(), dir));
        }
        if let Some(store) = self.stores.get(&dir) {
            return Ok((store.clone(), dir));
        }
        let store = Arc::new(open_store(&dir)?);
        self.stores.insert(dir.clone(), store.clone());
        Ok((store, dir))
    }

    /// Points to test, in GET, POST, COOKIE, HEADER order.
    fn candidates(&self, request: &RequestModel) -> Result<Vec<InjectionPoint>, BlindsightError> {
        let discovered = discover(request)?;
        if discovered.points.is_empty() {
            return Err(BlindsightError::InvalidTarget(
                "no parameter(s) found for testing in the provided data".into(),
            ));
        }

        let skip_post = match &discovered.body_kind {
            BodyKind::Json => !self.decider.confirm(&Question::ProcessJsonBody),
            BodyKind::Multipart { .. } => !self.decider.confirm(&Question::ProcessMultipartBody),
            _ => false,
        };
        let custom = discovered.has_custom_markers && self.decider.confirm(&Question::ProcessCustomMarker);
        if custom {
            debug!(locations = ?discovered.custom_locations(), "Testing custom injection markers only");
        }

        let mut points: Vec<InjectionPoint> = discovered
            .points
            .into_iter()
            .filter(|p| !(skip_post && p.location == Location::Post))
            .filter(|p| {
                if custom {
                    p.is_custom_marker
                } else {
                    !p.name.starts_with('#') && self.config.level_allows(p.location)
                }
            })
            .filter(|p| p.is_custom_marker || self.config.parameter_allowed(&p.name))
            .collect();
        points.sort_by_key(|p| p.location);

        if points.is_empty() {
            return Err(BlindsightError::InvalidTarget(format!(
                "all testable parameters were excluded at level {} (try a higher level or a different allow-list)",
                self.config.level
            )));
        }
        Ok(points)
    }

    async fn probe(&self, request: &RequestModel, point: &InjectionPoint) -> Result<ProbeOutcome, BlindsightError> {
        let key = target_fingerprint(request);
        if let Some(cached) = self.probes.get(&key) {
            return Ok(cached.clone());
        }
        info!(url = %request.url, "Testing connection to the target URL");
        let outcome = ConnectionProbe::new(self.transport.as_ref(), &self.config)
            .probe(request, Some(point))
            .await?;
        self.emit(EngineEvent::TargetProbed {
            is_dynamic: outcome.is_dynamic,
            possible_backend: outcome.possible_backend,
        });
        self.probes.insert(key, outcome.clone());
        Ok(outcome)
    }

    /// Confirm an injection point in `request`. A vector stored for the same
    /// fingerprint is trusted as is unless `verify_resumed` asks for a check.
    pub async fn run(&self, request: &RequestModel) -> Result<InjectionReport, BlindsightError> {
        let points = self.candidates(request)?;
        let (store, dir) = self.store_for(request)?;
        let log = SessionLog::new(&dir);
        let shared = Arc::new(request.clone());
        info!(run_id = %self.run_id, session = %dir.display(), parameters = points.len(), "Starting injection tests");

        if self.config.flush_session {
            for point in &points {
                store.flush(&fingerprint(request, point))?;
            }
            info!("Flushed session entries for this target");
        }

        let probe = self.probe(request, &points[0]).await?;

        for point in points {
            if self.cancel_token.is_cancelled() {
                return Err(BlindsightError::Cancelled("run interrupted".into()));
            }
            let fp = fingerprint(request, &point);
            self.emit(EngineEvent::ParameterTesting { point: point.clone() });

            if let Some(mut report) = store.report(&fp)?.filter(|r| r.vulnerable) {
                if !self.config.verify_resumed || self.still_answers(&shared, &point, &report).await {
                    info!(parameter = %point.name, "Resuming from the stored injection point");
                    report.resumed = true;
                    self.emit(EngineEvent::SessionResumed { parameter: point.name.clone() });
                    return Ok(report);
                }
                warn!(parameter = %point.name, "Stored vector no longer answers, testing again");
            }

            info!("testing {}", point.describe());
            let ctx = OracleContext::new(self.transport.clone(), shared.clone(), point.clone(), self.config.clone());
            let mut selector = TechniqueSelector::new(
                ctx,
                &self.catalog,
                self.decider.as_ref(),
                probe.summary(),
                probe.possible_backend,
            )
            .with_cancel_token(self.cancel_token.clone());
            if let Some(tx) = &self.event_tx {
                selector = selector.with_event_channel(tx.clone());
            }
            let confirmation = selector.confirm().await?;

            match confirmation.state {
                ConfirmationState::Confirmed(_) => {
                    let is_post = point.location == Location::Post;
                    let mut report = InjectionReport::confirmed(point, confirmation.vectors, confirmation.backend);
                    report.baseline = probe.summary();
                    report.is_json = is_post && request.body_kind() == BodyKind::Json;
                    report.is_multipart = is_post && matches!(request.body_kind(), BodyKind::Multipart { .. });
                    report.fingerprint = Some(fp.clone());
                    store.save_report(&fp, &report)?;
                    if let Err(e) = log.record("confirmed", &report.render().replace('\n', " | ")).await {
                        warn!(error = %e, "Failed to write session log");
                    }
                    return Ok(report);
                }
                _ => {
                    debug!(parameter = %point.name, state = %confirmation.state, "Parameter exhausted");
                    self.emit(EngineEvent::ParameterExhausted { parameter: point.name.clone() });
                }
            }
        }

        warn!("all tested parameters do not appear to be injectable");
        Ok(InjectionReport {
            baseline: probe.summary(),
            ..InjectionReport::not_injectable()
        })
    }

    /// One tautology/contradiction pair through the stored vector. Only
    /// asked when `verify_resumed` is set.
    async fn still_answers(&self, request: &Arc<RequestModel>, point: &InjectionPoint, report: &InjectionReport) -> bool {
        let Some(vector) = &report.vector else {
            return false;
        };
        let ctx = OracleContext::new(self.transport.clone(), request.clone(), point.clone(), self.config.clone());
        let mut oracle = build_oracle(ctx, vector, &report.baseline);
        let attempts = self.config.retries + 1;
        let n: u32 = rand::random::<u32>() % 9000 + 1000;

        let yes = settle(oracle.as_mut(), &format!("{}={}", n, n), attempts).await;
        if yes.outcome != Outcome::True {
            return false;
        }
        let no = settle(oracle.as_mut(), &format!("{}={}", n, n + 1), attempts).await;
        no.outcome == Outcome::False
    }

    /// Extraction operations over a confirmed report.
    pub fn extraction(&self, request: &RequestModel, report: &InjectionReport) -> Result<TargetExtraction, BlindsightError> {
        let (Some(point), Some(vector)) = (&report.parameter, &report.vector) else {
            return Err(BlindsightError::NotInjectable("no confirmed injection point".into()));
        };
        let (store, dir) = self.store_for(request)?;
        let fp = report.fingerprint.clone().unwrap_or_else(|| fingerprint(request, point));
        let ctx = OracleContext::new(
            self.transport.clone(),
            Arc::new(request.clone()),
            point.clone(),
            self.config.clone(),
        );
        let mut extraction = TargetExtraction::new(
            ctx,
            vector.clone(),
            report.baseline.clone(),
            Dialect::new(report.backend),
            SessionHandle::new(store, fp),
            dir,
        )
        .with_cancel_token(self.cancel_token.clone());
        if let Some(tx) = &self.event_tx {
            extraction = extraction.with_event_channel(tx.clone());
        }
        Ok(extraction)
    }
}
