use std::path::PathBuf;

use crate::cli::commands::ValidateArgs;
use crate::config;
use crate::errors::BlindsightError;

pub async fn handle_validate(args: ValidateArgs) -> Result<(), BlindsightError> {
    let path = PathBuf::from(&args.config);
    let config = config::parse_config(&path).await?;
    println!("Configuration is valid: {}", args.config);
    println!(
        "  level {} | techniques {} | timesec {}s | retries {} | threads {}",
        config.level, config.techniques, config.timesec, config.retries, config.threads
    );
    Ok(())
}
