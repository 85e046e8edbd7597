//! Config commands - show, get and set configuration values.

use std::path::Path;

use super::watch::{load_or_exit, save_or_exit};
use crate::cli::ConfigAction;
use crate::config::SETTABLE_KEYS;

/// Run a config subcommand against the config file at `config_path`.
pub fn run(action: ConfigAction, config_path: &Path) {
    let mut settings = load_or_exit(config_path);

    match action {
        ConfigAction::Show => {
            println!("# {}", config_path.display());
            match toml::to_string_pretty(&settings.redacted()) {
                Ok(toml_str) => println!("{toml_str}"),
                Err(e) => {
                    eprintln!("Error displaying config: {e}");
                    std::process::exit(1);
                }
            }
        }
        ConfigAction::Get { key } => match settings.get_value(&key) {
            Ok(value) => println!("{value}"),
            Err(e) => {
                eprintln!("Error: {e}");
                eprintln!("Known keys: {}", SETTABLE_KEYS.join(", "));
                std::process::exit(1);
            }
        },
        ConfigAction::Set { key, value } => {
            if let Err(e) = settings.set_value(&key, &value) {
                eprintln!("Error: {e}");
                eprintln!("Known keys: {}", SETTABLE_KEYS.join(", "));
                std::process::exit(1);
            }
            save_or_exit(&settings, config_path);
            println!("Set {key}");
        }
    }
}
