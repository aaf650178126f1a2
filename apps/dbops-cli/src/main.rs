mod cli;

use std::process::ExitCode;

use clap::Parser;

use cli::logger::LoggerLevel;
use clickhouse_dbops::utilities::sanitizer::{
    is_authentication_error, is_connection_error, sanitize_message, ErrorCategory,
};

// Entry point for the CLI application
fn main() -> ExitCode {
    let cli_result = cli::Cli::parse();

    let mut settings = match cli::settings::read_settings(cli_result.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!(
                "Error: failed to read settings: {}",
                sanitize_message(&e.to_string(), ErrorCategory::Validation)
            );
            return ExitCode::from(1);
        }
    };

    if cli_result.debug {
        settings.logger.level = LoggerLevel::Debug;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to create Tokio runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let logger_settings = settings.logger.clone();
    let clickhouse_url = settings.clickhouse.display_url();

    let result = runtime.block_on(async {
        if let Err(e) = cli::logger::setup_logging(&logger_settings) {
            eprintln!("Warning: logging is disabled: {e}");
        }

        cli::top_command_handler(settings, &cli_result.command).await
    });

    match result {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{}", sanitize_message(&format!("{e:#}"), ErrorCategory::General));
            eprintln!(
                "Error: {}",
                sanitize_message(&e.to_string(), ErrorCategory::General)
            );
            if is_connection_error(&e) {
                eprintln!("Is ClickHouse reachable at {clickhouse_url}?");
            } else if is_authentication_error(&e) {
                eprintln!("Check the user and password configured for {clickhouse_url}.");
            }
            ExitCode::from(1)
        }
    }
}
