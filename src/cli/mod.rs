//! CLI layer: argument parsing, command dispatch, and subcommand implementations.

pub mod args;

use args::{CloneArgs, IndexArgs, SearchArgs};
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::SearchError;
use crate::query::SearchOptions;
use crate::service::Service;

/// Sparse n-gram source-code search engine over a local tree of cloned repositories.
#[derive(Parser, Debug)]
#[command(
    name = "gramsearch",
    version,
    about,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("BUILD_DATETIME"), ")")
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Clone a repository into REPO_DIR.
    Clone(CloneArgs),

    /// Reconcile the index against the filesystem under REPO_DIR.
    Index(IndexArgs),

    /// Search the index for files matching a regular expression.
    Search(SearchArgs),
}

/// Parses arguments, builds the `Service`, and dispatches. Exits non-zero
/// on transport/infrastructure failure.
pub fn run() {
    let cli = Cli::parse();

    let result = dispatch(cli.command);

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn dispatch(command: Commands) -> Result<(), SearchError> {
    let config = Config::from_env()?;
    let service = Service::new(config)?;

    match command {
        Commands::Clone(args) => cmd_clone(&service, args),
        Commands::Index(args) => cmd_index(&service, args),
        Commands::Search(args) => cmd_search(&service, args),
    }
}

fn cmd_clone(service: &Service, args: CloneArgs) -> Result<(), SearchError> {
    let dest = service.clone_repo(&args.url)?;
    eprintln!("Cloned {} into {}", args.url, dest.display());
    Ok(())
}

fn cmd_index(service: &Service, _args: IndexArgs) -> Result<(), SearchError> {
    let report = service.index_repo_dir()?;
    eprintln!(
        "Indexed: {} added, {} deleted, {} reindexed",
        report.added, report.deleted, report.reindexed
    );
    Ok(())
}

fn cmd_search(service: &Service, args: SearchArgs) -> Result<(), SearchError> {
    let case_sensitive = args.case_sensitive();
    let opts = SearchOptions {
        case_sensitive,
        skip: args.skip,
        limit: args.limit,
        size_lt: args.size_lt,
        size_gt: args.size_gt,
        path_regex: args.path_like.clone(),
    };
    let result = service.search(&args.regex, &opts)?;

    eprintln!(
        "{} total, skip={}, limit={}",
        result.total, result.skip, result.limit
    );
    for (url, content) in &result.matches {
        println!("=== {url} ===");
        println!("{content}");
    }
    Ok(())
}
