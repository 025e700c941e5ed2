use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::commands::{split_list, ScanArgs};
use crate::cli::progress::ScanProgress;
use crate::cli::prompt::InteractiveDecider;
use crate::config::{self, EngineConfig};
use crate::errors::BlindsightError;
use crate::http::{RequestModel, ReqwestTransport};
use crate::models::TechniqueSet;
use crate::pipeline::{BatchDecider, Decider, EngineEvent, Fetched, Orchestrator, TableDump, TargetExtraction};
use crate::utils::formatting::format_table;

pub async fn handle_scan(args: ScanArgs, quiet: bool) -> Result<(), BlindsightError> {
    let config = Arc::new(build_engine_config(&args).await?);
    let request = build_request(&args)?;
    info!(url = %request.url, level = config.level, techniques = %config.techniques, "Starting scan");

    let transport = Arc::new(ReqwestTransport::new(&config)?);
    let decider: Arc<dyn Decider> = if config.batch {
        Arc::new(BatchDecider)
    } else {
        Arc::new(InteractiveDecider)
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current query");
            ctrl_c.cancel();
        }
    });

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<EngineEvent>();
    let progress = tokio::spawn(async move {
        let mut view = (!quiet).then(ScanProgress::new);
        while let Some(event) = event_rx.recv().await {
            if let Some(view) = view.as_mut() {
                view.handle_event(&event);
            }
        }
        if let Some(view) = view {
            view.finish();
        }
    });

    let orchestrator = Orchestrator::new(config.clone(), transport)
        .with_decider(decider)
        .with_cancel_token(cancel)
        .with_event_channel(event_tx);

    let outcome = run(&orchestrator, &args, &request).await;
    drop(orchestrator);
    let _ = progress.await;
    outcome
}

async fn run(orchestrator: &Orchestrator, args: &ScanArgs, request: &RequestModel) -> Result<(), BlindsightError> {
    let report = orchestrator.run(request).await?;
    if !report.vulnerable {
        return Err(BlindsightError::NotInjectable(
            "all tested parameters do not appear to be injectable".into(),
        ));
    }
    println!("{}", report.render());
    if !args.wants_extraction() {
        return Ok(());
    }

    let api = orchestrator.extraction(request, &report)?;
    if args.banner {
        print_value("banner", &api.banner().await?);
    }
    if args.current_user {
        print_value("current user", &api.current_user().await?);
    }
    if args.current_db {
        print_value("current database", &api.current_db().await?);
    }
    if args.hostname {
        print_value("hostname", &api.hostname().await?);
    }
    if args.dbs {
        print_list("available databases", &api.dbs().await?);
    }

    let db = match &args.db {
        Some(db) => Some(db.clone()),
        None if args.tables || args.columns || args.dump => api.current_db().await?.value().map(str::to_string),
        None => None,
    };
    let Some(db) = db.filter(|d| !d.is_empty()) else {
        if args.tables || args.columns || args.dump {
            warn!("No database to enumerate, use -D");
        }
        return Ok(());
    };

    if args.tables {
        print_list(&format!("tables in {}", db), &api.tables(&db).await?);
    }
    if args.columns {
        match &args.table {
            Some(table) => print_list(&format!("columns of {}.{}", db, table), &api.columns(&db, table).await?),
            None => warn!("--columns needs -T"),
        }
    }
    if args.dump {
        dump(&api, &db, args).await?;
    }
    Ok(())
}

async fn dump(api: &TargetExtraction, db: &str, args: &ScanArgs) -> Result<(), BlindsightError> {
    let columns = args.column.as_deref().map(split_list);
    let dumps = match &args.table {
        Some(table) => vec![api.dump_table(db, table, columns.as_deref()).await?],
        None => api.dump_database(db).await?,
    };
    for dump in &dumps {
        print_table(dump);
    }
    Ok(())
}

fn print_value(label: &str, fetched: &Fetched) {
    let value = fetched.value().unwrap_or_default();
    if fetched.ok {
        println!("{}: '{}'", label, value);
    } else if let Some(position) = fetched.violation {
        match position {
            0 => println!("{}: length differs from the expected value", label),
            _ => println!("{}: differs from the expected value at character {} ('{}' matched)", label, position, value),
        }
    } else {
        println!("{} (partial): '{}'", label, value);
    }
}

fn print_list(label: &str, fetched: &Fetched) {
    println!("{} [{}]{}:", label, fetched.values.len(), if fetched.ok { "" } else { " (partial)" });
    for value in &fetched.values {
        println!("[*] {}", value);
    }
}

fn print_table(dump: &TableDump) {
    println!("Table: {}.{} [{} entries]", dump.db, dump.table, dump.rows.len());
    println!("{}", format_table(&dump.columns, &dump.rows));
    match &dump.path {
        Some(path) => println!("dumped to '{}'", path.display()),
        None => println!("dump incomplete, nothing written"),
    }
}

/// Defaults, then the config file, then flags.
pub async fn build_engine_config(args: &ScanArgs) -> Result<EngineConfig, BlindsightError> {
    let mut config = match &args.config {
        Some(path) => config::parse_config(&PathBuf::from(path)).await?,
        None => EngineConfig::default(),
    };

    if let Some(level) = args.level {
        config.level = level;
    }
    if let Some(letters) = &args.technique {
        config.techniques = TechniqueSet::parse(letters)?;
    }
    if let Some(dbms) = &args.dbms {
        config.dbms = Some(dbms.parse()?);
    }
    if args.string.is_some() {
        config.string = args.string.clone();
    }
    if args.not_string.is_some() {
        config.not_string = args.not_string.clone();
    }
    if args.code.is_some() {
        config.code = args.code;
    }
    if args.prefix.is_some() {
        config.prefix = args.prefix.clone();
    }
    if args.suffix.is_some() {
        config.suffix = args.suffix.clone();
    }
    if let Some(list) = &args.test_parameter {
        config.test_parameter = Some(split_list(list));
    }
    if let Some(timesec) = args.timesec {
        config.timesec = timesec;
    }
    if let Some(timeout) = args.timeout {
        config.timeout = timeout;
    }
    if let Some(delay) = args.delay {
        config.delay = delay;
    }
    if let Some(retries) = args.retries {
        config.retries = retries;
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    if let Some(start) = args.start {
        config.start = start;
    }
    if args.stop.is_some() {
        config.stop = args.stop;
    }
    if let Some(charset) = &args.charset {
        config.charset = charset.parse()?;
    }
    if args.expect.is_some() {
        config.expect = args.expect.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = PathBuf::from(dir);
    }
    config.text_only |= args.text_only;
    config.batch |= args.batch;
    config.flush_session |= args.flush_session;
    config.verify_resumed |= args.verify_resumed;
    config.skip_urlencoding |= args.skip_urlencoding;

    config::validate_conflicts(&config)?;
    Ok(config)
}

pub fn build_request(args: &ScanArgs) -> Result<RequestModel, BlindsightError> {
    let mut request = RequestModel::get(args.url.clone());
    if let Some(data) = &args.data {
        request = request.with_data(data.clone());
    }
    if let Some(method) = &args.method {
        request = request.with_method(method.clone());
    }
    for header in &args.headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| BlindsightError::InvalidTarget(format!("malformed header '{}'", header)))?;
        request = request.with_header(name.trim(), value.trim());
    }
    if let Some(cookie) = &args.cookie {
        request = request.with_cookie(cookie.clone());
    }
    Ok(request)
}
