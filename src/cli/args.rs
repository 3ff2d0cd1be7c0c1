//! CLI argument structs for all subcommands.

use clap::Parser;

#[derive(Parser, Debug)]
pub struct CloneArgs {
    /// Repository URL to clone into `REPO_DIR`.
    pub url: String,
}

#[derive(Parser, Debug)]
pub struct IndexArgs {}

#[derive(Parser, Debug)]
pub struct SearchArgs {
    /// Regular expression to search for.
    pub regex: String,

    /// Number of leading matches to skip.
    #[arg(long, default_value = "0")]
    pub skip: usize,

    /// Maximum number of matches to return.
    #[arg(long, default_value = "50")]
    pub limit: usize,

    /// Case-sensitive matching (default).
    #[arg(long, overrides_with = "no_case_sensitive")]
    pub case_sensitive: bool,

    /// Case-insensitive matching.
    #[arg(long, overrides_with = "case_sensitive")]
    pub no_case_sensitive: bool,

    /// Only include documents smaller than N bytes.
    #[arg(long)]
    pub size_lt: Option<u64>,

    /// Only include documents larger than N bytes.
    #[arg(long)]
    pub size_gt: Option<u64>,

    /// Only include documents whose path matches this regex.
    #[arg(long)]
    pub path_like: Option<String>,
}

impl SearchArgs {
    pub fn case_sensitive(&self) -> bool {
        !self.no_case_sensitive
    }
}
