use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sift", about = "Daily news curation — fetch, score, select, render")]
pub struct Cli {
    /// Path to the source registry (a JSON file or a directory of them)
    #[arg(long, short, global = true, default_value = "workflow/resources")]
    pub resource: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the source registry and exit
    Validate,

    /// Run the full daily pipeline (the default when no command is given)
    Run(RunArgs),
}

#[derive(Args, Clone)]
pub struct RunArgs {
    /// Output directory for the daily markdown digest
    #[arg(long, default_value = "src/content/blog")]
    pub blog_root: PathBuf,

    /// Output path for the per-feed metrics snapshot
    #[arg(long, default_value = "src/data/metrics.json")]
    pub metrics_path: PathBuf,

    /// Directory for the per-day article cache
    #[arg(long, default_value = "workflow/draft")]
    pub draft_dir: PathBuf,

    /// Directory for the GitHub ETag cache
    #[arg(long, default_value = "workflow/.github_cache")]
    pub github_cache_dir: PathBuf,

    /// Focus keyword file (one keyword per line)
    #[arg(long, default_value = "workflow/myfocus.md")]
    pub focus_file: PathBuf,

    /// Nofocus keyword file (one keyword per line)
    #[arg(long, default_value = "workflow/mynofocus.md")]
    pub nofocus_file: PathBuf,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            blog_root: PathBuf::from("src/content/blog"),
            metrics_path: PathBuf::from("src/data/metrics.json"),
            draft_dir: PathBuf::from("workflow/draft"),
            github_cache_dir: PathBuf::from("workflow/.github_cache"),
            focus_file: PathBuf::from("workflow/myfocus.md"),
            nofocus_file: PathBuf::from("workflow/mynofocus.md"),
        }
    }
}
