// Configuration management module
// Handles the TOML config file under the base directory and interactive setup

pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, IndexConfig, OllamaConfig, normalize_extension, parse_extensions,
};
