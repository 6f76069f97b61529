use anyhow::Result;
use clap::{Parser, Subcommand};
use notevec::commands::{add_path, index_notes, remove_path, search_notes, show_status, update_path};
use notevec::config::{Config, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "notevec")]
#[command(about = "Semantic search index over a directory of notes")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the vector database
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama and the notes directory
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Index the notes directory, rebuilding the table when it is out of date
    Index {
        /// Notes directory, overriding the configured one
        dir: Option<PathBuf>,
    },
    /// Search notes by meaning
    Search {
        query: String,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
        /// SQL filter applied to results, e.g. "notepath LIKE '%journal%'"
        #[arg(long)]
        filter: Option<String>,
    },
    /// Add a file or directory of notes to the index
    Add { path: PathBuf },
    /// Remove a file or directory of notes from the index
    Remove { path: PathBuf },
    /// Re-index a single note after it changed
    Update { path: PathBuf },
    /// Show row and file counts for the index
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let base_dir = match cli.base_dir {
        Some(dir) => dir,
        None => Config::default_base_dir()?,
    };

    if let Commands::Config { show } = cli.command {
        return if show {
            show_config(&base_dir)
        } else {
            run_interactive_config(&base_dir)
        };
    }

    let config = Config::load(&base_dir)?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Index { dir } => index_notes(&config, dir).await?,
        Commands::Search {
            query,
            limit,
            filter,
        } => search_notes(&config, &query, limit, filter.as_deref()).await?,
        Commands::Add { path } => add_path(&config, &path).await?,
        Commands::Remove { path } => remove_path(&config, &path).await?,
        Commands::Update { path } => update_path(&config, &path).await?,
        Commands::Status => show_status(&config).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["notevec", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Status));
            assert_eq!(parsed.base_dir, None);
        }
    }

    #[test]
    fn index_command_with_dir() {
        let cli = Cli::try_parse_from(["notevec", "index", "/home/me/notes"]);

        if let Ok(Cli {
            command: Commands::Index { dir },
            ..
        }) = cli
        {
            assert_eq!(dir, Some(PathBuf::from("/home/me/notes")));
        } else {
            panic!("expected index command");
        }
    }

    #[test]
    fn search_command_with_options() {
        let cli = Cli::try_parse_from([
            "notevec",
            "search",
            "borrow checker",
            "--limit",
            "5",
            "--filter",
            "notepath LIKE '%rust%'",
        ]);

        if let Ok(Cli {
            command:
                Commands::Search {
                    query,
                    limit,
                    filter,
                },
            ..
        }) = cli
        {
            assert_eq!(query, "borrow checker");
            assert_eq!(limit, Some(5));
            assert_eq!(filter.as_deref(), Some("notepath LIKE '%rust%'"));
        } else {
            panic!("expected search command");
        }
    }

    #[test]
    fn global_base_dir() {
        let cli = Cli::try_parse_from(["notevec", "status", "--base-dir", "/tmp/nv"]);
        assert_eq!(
            cli.ok().and_then(|c| c.base_dir),
            Some(PathBuf::from("/tmp/nv"))
        );
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["notevec", "config", "--show"]);

        if let Ok(Cli {
            command: Commands::Config { show },
            ..
        }) = cli
        {
            assert!(show);
        } else {
            panic!("expected config command");
        }
    }

    #[test]
    fn missing_search_query() {
        let cli = Cli::try_parse_from(["notevec", "search"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["notevec", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }
}
