use clap::{Args, Parser, Subcommand};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser)]
#[command(
    name = "blindsight",
    version,
    long_version = LONG_VERSION,
    about = "Blind, error and time-based SQL injection confirmation and extraction"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Test a target for injection and optionally extract data
    Scan(ScanArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

#[derive(Args, Clone, Default)]
pub struct ScanArgs {
    /// Target URL, `*` marks a custom injection point
    #[arg(short, long)]
    pub url: String,

    /// Request body (switches the method to POST)
    #[arg(long)]
    pub data: Option<String>,

    /// Extra header, `Name: value` (repeatable)
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Cookie header value
    #[arg(long)]
    pub cookie: Option<String>,

    /// HTTP method override
    #[arg(long)]
    pub method: Option<String>,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Test level: 1 GET/POST, 2 +COOKIE, 3 +HEADER
    #[arg(long)]
    pub level: Option<u8>,

    /// Techniques to test, e.g. BET
    #[arg(long)]
    pub technique: Option<String>,

    /// Force the backend DBMS
    #[arg(long)]
    pub dbms: Option<String>,

    /// String present on TRUE pages
    #[arg(long)]
    pub string: Option<String>,

    /// String present on FALSE pages
    #[arg(long)]
    pub not_string: Option<String>,

    /// HTTP status of TRUE pages
    #[arg(long)]
    pub code: Option<u16>,

    /// Compare visible text only
    #[arg(long)]
    pub text_only: bool,

    /// Payload prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Payload suffix
    #[arg(long)]
    pub suffix: Option<String>,

    /// Comma-separated parameters to test
    #[arg(short = 'p', long = "test-parameter")]
    pub test_parameter: Option<String>,

    /// Seconds the backend is asked to sleep
    #[arg(long)]
    pub timesec: Option<u64>,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Seconds between retries
    #[arg(long)]
    pub delay: Option<f64>,

    /// Retries per request and per inconclusive question
    #[arg(long)]
    pub retries: Option<u32>,

    /// Concurrent row fetches
    #[arg(long)]
    pub threads: Option<usize>,

    /// Never prompt, use default answers
    #[arg(long)]
    pub batch: bool,

    /// Discard stored session data for the target
    #[arg(long)]
    pub flush_session: bool,

    /// Do not URL-encode payloads
    #[arg(long)]
    pub skip_urlencoding: bool,

    /// Session directory root
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Retrieve the DBMS banner
    #[arg(long)]
    pub banner: bool,

    /// Retrieve the current user
    #[arg(long)]
    pub current_user: bool,

    /// Retrieve the current database
    #[arg(long)]
    pub current_db: bool,

    /// Retrieve the server hostname
    #[arg(long)]
    pub hostname: bool,

    /// Enumerate databases
    #[arg(long)]
    pub dbs: bool,

    /// Enumerate tables of -D
    #[arg(long)]
    pub tables: bool,

    /// Enumerate columns of -D/-T
    #[arg(long)]
    pub columns: bool,

    /// Dump -T (or every table of -D)
    #[arg(long)]
    pub dump: bool,

    /// Database to enumerate
    #[arg(short = 'D')]
    pub db: Option<String>,

    /// Table to enumerate
    #[arg(short = 'T')]
    pub table: Option<String>,

    /// Comma-separated columns to dump
    #[arg(short = 'C')]
    pub column: Option<String>,

    /// First row index to retrieve
    #[arg(long)]
    pub start: Option<usize>,

    /// Row index to stop before
    #[arg(long)]
    pub stop: Option<usize>,

    /// Alphabet searched first for dumped values: printable, digits, hex or literal characters
    #[arg(long)]
    pub charset: Option<String>,

    /// Check single values (banner, user, database, hostname) against this one
    #[arg(long)]
    pub expect: Option<String>,

    /// Re-ask a stored injection point before trusting it
    #[arg(long)]
    pub verify_resumed: bool,
}

impl ScanArgs {
    pub fn wants_extraction(&self) -> bool {
        self.banner
            || self.current_user
            || self.current_db
            || self.hostname
            || self.dbs
            || self.tables
            || self.columns
            || self.dump
    }
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Config file to validate
    pub config: String,
}

/// Split a comma-separated flag value, dropping blanks.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
