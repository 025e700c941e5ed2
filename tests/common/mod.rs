#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use blindsight::config::EngineConfig;
use blindsight::dialect::Dialect;
use blindsight::errors::BlindsightError;
use blindsight::http::{HttpResponse, PreparedRequest, Transport};
use blindsight::session::SessionStore;
use blindsight::Orchestrator;
use regex::Regex;

pub const BANNER: &str = "8.0.36-simulated";
pub const USER: &str = "app@localhost";
pub const DB: &str = "shop";

const TRUE_PAGE: &str = "<html><h1>Product</h1>\n<p>Widget, 10 EUR</p>\n<footer>shop</footer></html>";
const FALSE_PAGE: &str = "<html><h1>Product</h1>\n<p>No such item</p>\n<footer>shop</footer></html>";
const MYSQL_ERROR: &str =
    "You have an error in your SQL syntax; check the manual that corresponds to your MySQL server version";

static LENGTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(CHAR_LENGTH|LENGTH)\(\((.+)\)\)>(\d+)$").unwrap());
static ORDINAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ORD\(MID\(\((.+)\),(\d+),1\)\)([>=])(\d+)$").unwrap());
static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\((.+)\)>(\d+)$").unwrap());
static EQUALS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)=(\d+)$").unwrap());
static SLEEP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^1 AND \(SELECT \d+ FROM \(SELECT\(IF\(\((.+)\),SLEEP\((\d+)\),0\)\)\)\w+\)$").unwrap());

/// How the vulnerable parameter leaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leak {
    /// Different page for true and false predicates.
    Boolean,
    /// Same page, true predicates sleep.
    Time,
}

/// An in-process MySQL-backed page with one injectable numeric parameter.
pub struct SimulatedMysql {
    parameter: String,
    leak: Leak,
    text: HashMap<String, String>,
    numbers: HashMap<String, u64>,
    /// Requests answered with an error before the next normal one.
    outage: AtomicUsize,
    pub requests: AtomicUsize,
}

impl SimulatedMysql {
    pub fn new(parameter: &str, leak: Leak) -> Self {
        let d = Dialect::mysql();
        let mut text = HashMap::new();
        text.insert(d.banner(), BANNER.to_string());
        text.insert(d.current_user(), USER.to_string());
        text.insert(d.current_db(), DB.to_string());
        text.insert(d.hostname(), "db01".to_string());
        text.insert(d.db_at(0), "information_schema".to_string());
        text.insert(d.db_at(1), DB.to_string());
        text.insert(d.table_at(DB, 0), "users".to_string());
        text.insert(d.column_at(DB, "users", 0), "id".to_string());
        text.insert(d.column_at(DB, "users", 1), "name".to_string());
        for (i, (id, name)) in [("1", "alice"), ("2", "bob"), ("3", "carol")].iter().enumerate() {
            text.insert(d.record_at(DB, "users", "id", i), id.to_string());
            text.insert(d.record_at(DB, "users", "name", i), name.to_string());
        }

        let mut numbers = HashMap::new();
        numbers.insert(d.dbs_count(), 2);
        numbers.insert(d.tables_count(DB), 1);
        numbers.insert(d.columns_count(DB, "users"), 2);
        numbers.insert(d.records_count(DB, "users"), 3);

        Self {
            parameter: parameter.to_string(),
            leak,
            text,
            numbers,
            outage: AtomicUsize::new(0),
            requests: AtomicUsize::new(0),
        }
    }

    /// Fail the next `n` requests with a network error.
    pub fn fail_next(&self, n: usize) {
        self.outage.store(n, Ordering::SeqCst);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// `None` for a predicate MySQL would reject.
    fn evaluate(&self, condition: &str) -> Option<bool> {
        if condition == "CONNECTION_ID()=CONNECTION_ID()" {
            return Some(true);
        }
        if let Some(c) = EQUALS.captures(condition) {
            return Some(c[1] == c[2]);
        }
        if let Some(c) = LENGTH.captures(condition) {
            let value = self.text.get(&c[2])?;
            // MySQL LENGTH counts bytes, CHAR_LENGTH characters.
            let length = if &c[1] == "LENGTH" { value.len() } else { value.chars().count() };
            return Some(length as u64 > c[3].parse::<u64>().ok()?);
        }
        if let Some(c) = ORDINAL.captures(condition) {
            let value = self.text.get(&c[1])?;
            let position: usize = c[2].parse().ok()?;
            let actual = value.chars().nth(position.checked_sub(1)?).map_or(0, |ch| ch as u32);
            let ordinal: u32 = c[4].parse().ok()?;
            return Some(if &c[3] == ">" { actual > ordinal } else { actual == ordinal });
        }
        if let Some(c) = NUMBER.captures(condition) {
            let value = self.numbers.get(&c[1])?;
            return Some(*value > c[2].parse::<u64>().ok()?);
        }
        None
    }

    fn respond(&self, request: &PreparedRequest) -> HttpResponse {
        let n = self.requests.fetch_add(1, Ordering::SeqCst);
        let jitter = Duration::from_millis(40 + (n as u64 * 37) % 60);
        let pairs: Vec<(String, String)> = url::Url::parse(&request.url)
            .map(|u| u.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect())
            .unwrap_or_default();

        if pairs.iter().any(|(_, v)| v.contains("'\")(")) {
            return HttpResponse::new(500, MYSQL_ERROR).with_elapsed(jitter);
        }
        let value = pairs
            .iter()
            .find(|(k, _)| *k == self.parameter)
            .map(|(_, v)| v.as_str())
            .unwrap_or("1");

        match self.leak {
            Leak::Boolean => {
                let truth = if value == "1" {
                    Some(true)
                } else if let Some(condition) = value.strip_prefix("1 AND (").and_then(|s| s.strip_suffix(')')) {
                    self.evaluate(condition)
                } else if value.contains('\'') || value.contains('"') {
                    None
                } else {
                    Some(false)
                };
                match truth {
                    Some(true) => HttpResponse::new(200, TRUE_PAGE),
                    Some(false) => HttpResponse::new(200, FALSE_PAGE),
                    None => HttpResponse::new(500, MYSQL_ERROR),
                }
                .with_elapsed(jitter)
            }
            Leak::Time => {
                if value.contains('\'') {
                    return HttpResponse::new(500, MYSQL_ERROR).with_elapsed(jitter);
                }
                let delay = SLEEP.captures(value).and_then(|c| {
                    let secs: u64 = c[2].parse().ok()?;
                    self.evaluate(&c[1]).filter(|t| *t).map(|_| Duration::from_secs(secs))
                });
                HttpResponse::new(200, TRUE_PAGE).with_elapsed(delay.unwrap_or_default() + jitter)
            }
        }
    }
}

#[async_trait]
impl Transport for SimulatedMysql {
    async fn send(&self, request: &PreparedRequest) -> Result<HttpResponse, BlindsightError> {
        let pending = self.outage.load(Ordering::SeqCst);
        if pending > 0 {
            self.outage.store(pending - 1, Ordering::SeqCst);
            return Err(BlindsightError::Network("connection reset".into()));
        }
        Ok(self.respond(request))
    }
}

pub fn batch_config() -> EngineConfig {
    EngineConfig { batch: true, retries: 1, ..Default::default() }
}

pub fn orchestrator(target: Arc<SimulatedMysql>, config: EngineConfig, store: Arc<SessionStore>) -> Orchestrator {
    Orchestrator::new(Arc::new(config), target).with_session_store(store)
}
