//! ORBIT Gateway - Main entry point.

use anyhow::Result;
use orbit_common::config::Config;
use orbit_common::logging::init_logging_with_exclusions;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (.env, config file, then environment)
    let (config, report) = Config::load_with_env()?;

    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("ORBIT Gateway v{}", env!("CARGO_PKG_VERSION"));
    report.log();

    config.validate()?;

    orbit_gateway::start_server(&config).await
}
