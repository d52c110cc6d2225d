mod article;
mod cache;
mod cli;
mod config;
mod dedup;
mod diversity;
mod error;
mod evaluate;
mod extract;
mod fetch;
mod fetch_github;
mod focus;
mod github;
mod llm;
mod media;
mod metrics;
mod pipeline;
mod render;
mod sampler;
mod scorer;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use crate::cli::{Cli, Commands, RunArgs};
use crate::llm::OpenAiCompatProvider;
use crate::pipeline::RunPaths;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Validate) => {
            let registry = config::load_registry(&cli.resource)
                .with_context(|| format!("loading registry from {}", cli.resource.display()))?;
            config::validate_registry(&registry).context("registry validation failed")?;
            println!("Registry is valid: {} sources.", registry.sources.len());
        }
        command => {
            let args = match command {
                Some(Commands::Run(args)) => args,
                _ => RunArgs::default(),
            };

            let provider = OpenAiCompatProvider::from_env().context("configuring LLM provider")?;

            let paths = RunPaths {
                resource: cli.resource.clone(),
                blog_root: args.blog_root,
                metrics_path: args.metrics_path,
                draft_dir: args.draft_dir,
                github_cache_dir: args.github_cache_dir,
                focus_file: args.focus_file,
                nofocus_file: args.nofocus_file,
            };

            pipeline::run(&paths, &provider).await?;
            info!("pipeline run complete");
        }
    }

    Ok(())
}
