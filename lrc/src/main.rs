mod api_client;
mod attestation;
mod cli;
mod commands;
mod error;
mod git;

use clap::Parser;
use cli::{Cli, Commands, HookAction};

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(log_level.into()),
        )
        .init();

    let api_url = cli
        .api_url
        .clone()
        .or_else(|| std::env::var("API_URL").ok())
        .unwrap_or_else(|| "http://127.0.0.1:8080".to_string());
    let api_key = std::env::var("LRC_API_KEY").ok();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("lrc: failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };

    let result = rt.block_on(async {
        match &cli.command {
            Commands::Review { source, output } => {
                commands::review::run(source, *output, &api_url, api_key).await
            }
            Commands::Hooks { action } => match action {
                HookAction::Install { force } => commands::hooks::install(*force),
                HookAction::Uninstall => commands::hooks::uninstall(),
                HookAction::Enable => commands::hooks::enable(),
                HookAction::Disable => commands::hooks::disable(),
                HookAction::Status => commands::hooks::status(),
                HookAction::Run => commands::hooks::run(),
            },
        }
    });

    if let Err(e) = result {
        eprintln!("lrc: {e}");
        std::process::exit(e.exit_code());
    }
}
