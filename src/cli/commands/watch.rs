//! Watch commands - edit the list of watched directories.

use std::path::Path;

use crate::cli::WatchAction;
use crate::config::Settings;

/// Run a watch subcommand against the config file at `config_path`.
///
/// A running daemon picks up the saved file on its own.
pub fn run(action: WatchAction, config_path: &Path) {
    let mut settings = load_or_exit(config_path);

    match action {
        WatchAction::Add { directory } => match settings.add_watch_dir(&directory) {
            Ok(true) => {
                save_or_exit(&settings, config_path);
                println!("Watching {}", display_last(&settings));
            }
            Ok(false) => println!("Already watching {}", directory.display()),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
        WatchAction::Remove { directory } => match settings.remove_watch_dir(&directory) {
            Ok(true) => {
                save_or_exit(&settings, config_path);
                println!("Stopped watching {}", directory.display());
            }
            Ok(false) => {
                eprintln!("Not watching {}", directory.display());
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
        WatchAction::List => {
            if settings.watch_dirs.is_empty() {
                println!("No directories watched.");
                println!("Add one with: sfs watch add <DIRECTORY>");
                return;
            }
            for dir in &settings.watch_dirs {
                println!("{}", dir.display());
            }
        }
    }
}

fn display_last(settings: &Settings) -> String {
    settings
        .watch_dirs
        .last()
        .map(|dir| dir.display().to_string())
        .unwrap_or_default()
}

pub(super) fn load_or_exit(config_path: &Path) -> Settings {
    Settings::load_from(config_path).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    })
}

pub(super) fn save_or_exit(settings: &Settings, config_path: &Path) {
    if let Err(e) = settings.save(config_path) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
