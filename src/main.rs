//! kit - the system package manager CLI.

use anyhow::{anyhow, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kit::render::Term;
use kit::{ansi, cmd};

#[derive(Parser)]
#[command(name = "kit", version, about = "The system package manager")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a package
    #[command(alias = "add")]
    Install {
        package: String,
        version: Option<String>,
    },
    /// Uninstall a package
    #[command(alias = "remove")]
    Uninstall { package: String },
    /// Switch to a specific version of a package
    Use { spec: String },
    /// List repositories, installed packages or available packages
    #[command(alias = "ls")]
    List { what: Option<String> },
    /// List all versions available for a package
    Versions { package: String },
    /// Search packages
    Search { term: String },
    /// Pull the latest version of all repositories
    Pull,
    /// Print the kit version
    #[command(hide = true)]
    Version,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    if let Err(err) = run(cli) {
        print_error(&err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Install { package, version } => with_term(|term| {
            cmd::install::install(term, &package, version.as_deref())
        }),
        Commands::Versions { package } => {
            with_term(|term| cmd::versions::versions(term, &package))
        }
        Commands::Pull => with_term(cmd::pull::pull),
        Commands::Version => {
            println!(
                "{}{}",
                ansi::color256(123, "Kit Package Manager "),
                ansi::bold(&ansi::cyan(&format!("v{}", kit::VERSION)))
            );
            Ok(())
        }
        Commands::Uninstall { .. } => Err(anyhow!("`uninstall` is not implemented yet")),
        Commands::Use { .. } => Err(anyhow!("`use` is not implemented yet")),
        Commands::List { .. } => Err(anyhow!("`list` is not implemented yet")),
        Commands::Search { .. } => Err(anyhow!("`search` is not implemented yet")),
    }
}

fn with_term(f: impl FnOnce(&Term) -> Result<()>) -> Result<()> {
    let term = Term::new();
    let result = f(&term);
    term.stop();
    result
}

/// Formats failures on one line: red "ERROR " prefix, first letter
/// capitalized.
fn print_error(err: &anyhow::Error) {
    let message = err.to_string();
    let mut chars = message.chars();
    let message = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => message,
    };
    eprintln!("{}{message}", ansi::red("ERROR "));
}
