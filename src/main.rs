//! Command-line entry point for the sync agent.

use clap::Parser;
use sfs::cli::commands;
use sfs::cli::{Cli, Commands};
use sfs::config::Settings;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => Settings::default_path().unwrap_or_else(|e| {
            eprintln!("Error: {e}");
            eprintln!("Pass --config <FILE> to choose a location.");
            std::process::exit(1);
        }),
    };

    let result = match cli.command {
        Commands::Run => commands::run::run(&config_path).await,
        Commands::Watch { action } => {
            commands::watch::run(action, &config_path);
            Ok(())
        }
        Commands::Config { action } => {
            commands::config::run(action, &config_path);
            Ok(())
        }
        Commands::Upload { file, update } => {
            sfs::logging::init();
            commands::upload::run(&file, update, &config_path).await
        }
        Commands::Search {
            query,
            limit,
            threshold,
        } => commands::search::run(&query.join(" "), limit, threshold, &config_path).await,
        Commands::List { prefix } => commands::files::run_list(prefix.as_deref(), &config_path).await,
        Commands::Download {
            name,
            output,
            output_flag,
        } => commands::files::run_download(&name, output.or(output_flag), &config_path).await,
        Commands::Delete { name } => commands::files::run_delete(&name, &config_path).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
