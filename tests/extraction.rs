mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use blindsight::config::EngineConfig;
use blindsight::extractor::{BisectionExtractor, BisectionSettings, Condition, Inference};
use blindsight::http::RequestModel;
use blindsight::models::{ExtractionResult, ExtractionTarget, OracleVerdict, Outcome, Technique};
use blindsight::pipeline::TargetExtraction;
use blindsight::session::SessionStore;
use common::{batch_config, orchestrator, Leak, SimulatedMysql, BANNER, DB, USER};
use proptest::prelude::*;

/// Truthful answers about a known value, counting questions.
struct Known {
    value: Vec<char>,
    questions: usize,
}

#[async_trait]
impl Inference for Known {
    async fn infer(&mut self, condition: &Condition) -> OracleVerdict {
        self.questions += 1;
        let ordinal_at = |position: &usize| self.value.get(position - 1).map_or(0, |c| *c as u32);
        let truth = match condition {
            Condition::LengthGreaterThan { threshold, .. } => self.value.len() as u64 > *threshold,
            Condition::CharGreaterThan { position, ordinal, .. } => ordinal_at(position) > *ordinal,
            Condition::CharEquals { position, ordinal, .. } => ordinal_at(position) == *ordinal,
            _ => false,
        };
        OracleVerdict::new(Outcome::from_bool(truth), Duration::ZERO, "")
    }

    fn technique(&self) -> Technique {
        Technique::Boolean
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

proptest! {
    #[test]
    fn test_bisection_recovers_any_printable_value(value in "[ -~]{0,256}") {
        let len = value.chars().count();
        let mut oracle = Known { value: value.chars().collect(), questions: 0 };
        let extractor = BisectionExtractor::new(BisectionSettings { retries: 0, verify_characters: false });
        let target = ExtractionTarget::new("value", "x");

        let result = runtime().block_on(extractor.extract(&mut oracle, &target, None, None)).unwrap();
        prop_assert!(result.ok);
        prop_assert_eq!(&result.value, &value);

        let bits = (usize::BITS - len.leading_zeros()) as usize;
        prop_assert!(oracle.questions <= 2 * bits + 4 + 7 * len, "{} questions for {} chars", oracle.questions, len);
    }
}

async fn confirmed(target: Arc<SimulatedMysql>, config: EngineConfig, store: Arc<SessionStore>) -> TargetExtraction {
    confirmed_with_fingerprint(target, config, store).await.0
}

async fn confirmed_with_fingerprint(
    target: Arc<SimulatedMysql>,
    config: EngineConfig,
    store: Arc<SessionStore>,
) -> (TargetExtraction, String) {
    let request = RequestModel::get("http://shop.local/item?id=1");
    let engine = orchestrator(target, config, store);
    let report = engine.run(&request).await.unwrap();
    assert!(report.vulnerable);
    let fingerprint = report.fingerprint.clone().unwrap();
    (engine.extraction(&request, &report).unwrap(), fingerprint)
}

fn config_in(dir: &std::path::Path) -> EngineConfig {
    EngineConfig { output_dir: dir.to_path_buf(), ..batch_config() }
}

#[tokio::test]
async fn test_metadata_and_enumeration() {
    let dir = tempfile::tempdir().unwrap();
    let target = Arc::new(SimulatedMysql::new("id", Leak::Boolean));
    let api = confirmed(target, config_in(dir.path()), Arc::new(SessionStore::in_memory().unwrap())).await;

    assert_eq!(api.banner().await.unwrap().value(), Some(BANNER));
    assert_eq!(api.current_user().await.unwrap().value(), Some(USER));
    assert_eq!(api.current_db().await.unwrap().value(), Some(DB));

    let dbs = api.dbs().await.unwrap();
    assert!(dbs.ok);
    assert_eq!(dbs.values, vec!["information_schema", "shop"]);
    assert_eq!(api.tables(DB).await.unwrap().values, vec!["users"]);
    assert_eq!(api.columns(DB, "users").await.unwrap().values, vec!["id", "name"]);

    let log = std::fs::read_to_string(api.session_dir().join("log")).unwrap();
    assert!(log.contains(&format!("banner: {}", BANNER)));
}

#[tokio::test]
async fn test_dump_table_writes_csv() {
    let dir = tempfile::tempdir().unwrap();
    let target = Arc::new(SimulatedMysql::new("id", Leak::Boolean));
    let config = EngineConfig { threads: 4, ..config_in(dir.path()) };
    let api = confirmed(target, config, Arc::new(SessionStore::in_memory().unwrap())).await;

    let dump = api.dump_table(DB, "users", None).await.unwrap();
    assert!(dump.ok);
    assert_eq!(dump.columns, vec!["id", "name"]);
    assert_eq!(
        dump.rows,
        vec![vec!["1", "alice"], vec!["2", "bob"], vec!["3", "carol"]]
            .into_iter()
            .map(|r| r.into_iter().map(String::from).collect::<Vec<_>>())
            .collect::<Vec<_>>()
    );

    let path = dump.path.unwrap();
    assert!(path.ends_with("dump/shop/users.csv"));
    let csv = std::fs::read_to_string(path).unwrap();
    assert_eq!(csv.lines().collect::<Vec<_>>(), vec!["id,name", "1,alice", "2,bob", "3,carol"]);

    let all = api.dump_database(DB).await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].ok);
}

#[tokio::test]
async fn test_window_limits_rows() {
    let dir = tempfile::tempdir().unwrap();
    let target = Arc::new(SimulatedMysql::new("id", Leak::Boolean));
    let config = EngineConfig { start: 1, stop: Some(2), ..config_in(dir.path()) };
    let api = confirmed(target, config, Arc::new(SessionStore::in_memory().unwrap())).await;

    assert_eq!(api.dbs().await.unwrap().values, vec!["shop"]);
    let rows = api.records(DB, "users", &["name".to_string()]).await.unwrap();
    assert_eq!(rows.rows, vec![vec!["bob".to_string()]]);
}

#[tokio::test]
async fn test_interrupted_value_resumes_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();

    let fresh_target = Arc::new(SimulatedMysql::new("id", Leak::Boolean));
    let fresh = confirmed(fresh_target.clone(), config_in(dir.path()), Arc::new(SessionStore::in_memory().unwrap())).await;
    let before = fresh_target.requests();
    fresh.banner().await.unwrap();
    let full_cost = fresh_target.requests() - before;

    let store = Arc::new(SessionStore::in_memory().unwrap());
    let target = Arc::new(SimulatedMysql::new("id", Leak::Boolean));
    let (api, fingerprint) = confirmed_with_fingerprint(target.clone(), config_in(dir.path()), store.clone()).await;
    let partial = ExtractionResult {
        value: BANNER[..3].to_string(),
        ok: false,
        length: Some(BANNER.len()),
        violation: None,
    };
    store.append_progress(&fingerprint, "banner", &partial).unwrap();

    let before = target.requests();
    let banner = api.banner().await.unwrap();
    assert!(banner.ok);
    assert_eq!(banner.value(), Some(BANNER));
    assert!(target.requests() - before < full_cost);
}
