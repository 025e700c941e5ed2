use blindsight::cli;
use blindsight::errors::BlindsightError;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, 0) => "warn",
        (_, 0) => "info",
        (_, 1) => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!cli.no_color)
        .init();

    let result = match cli.command {
        cli::Commands::Scan(args) => cli::scan::handle_scan(args, cli.quiet).await,
        cli::Commands::Validate(args) => cli::validate::handle_validate(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        let exit_code = match &e {
            BlindsightError::Config(_) => 2,
            BlindsightError::NotInjectable(_) => 4,
            BlindsightError::InvalidTarget(_) => 5,
            e if e.is_cancelled() => 130,
            _ => 1,
        };
        std::process::exit(exit_code);
    }
}
