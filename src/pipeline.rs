use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use chrono_tz::Asia::Seoul;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};

use crate::article::{Article, OriginType};
use crate::config::{self, Registry};
use crate::fetch::{self, Fetcher};
use crate::focus::FocusLexicon;
use crate::github::GitHubClient;
use crate::llm::LlmProvider;
use crate::metrics::Metrics;
use crate::{cache, dedup, diversity, evaluate, render, sampler, scorer};

/// Filesystem locations for one pipeline run.
pub struct RunPaths {
    pub resource: PathBuf,
    pub blog_root: PathBuf,
    pub metrics_path: PathBuf,
    pub draft_dir: PathBuf,
    pub github_cache_dir: PathBuf,
    pub focus_file: PathBuf,
    pub nofocus_file: PathBuf,
}

/// The sequential daily run: ingest → sample → evaluate → score → drop →
/// dedup → diversity-select → render → metrics. A failing source
/// contributes zero articles; only configuration problems are fatal.
pub async fn run(paths: &RunPaths, provider: &dyn LlmProvider) -> Result<()> {
    let registry = config::load_registry(&paths.resource)
        .with_context(|| format!("loading registry from {}", paths.resource.display()))?;
    config::validate_registry(&registry).context("registry validation failed")?;
    info!(sources = registry.sources.len(), "registry loaded");

    let mut metrics = Metrics::initialize(&registry.sources);

    let lexicon = FocusLexicon::load(
        &paths.focus_file,
        &paths.nofocus_file,
        registry.configuration.focus_threshold,
    );
    let github = GitHubClient::new(&paths.github_cache_dir).context("building GitHub client")?;
    let fetcher = Fetcher::new(github, lexicon).context("building fetcher")?;

    let today = Utc::now().with_timezone(&Seoul).date_naive();
    let articles = if cache::cache_enabled() {
        if let Some(path) = cache::find_same_day_cache(&paths.draft_dir, today) {
            info!(path = %path.display(), "same-day article cache found, skipping fetch");
            cache::load_articles(&path)?
        } else {
            let articles = ingest_all(&fetcher, &registry, &mut metrics).await;
            cache::save_articles(&cache::cache_path(&paths.draft_dir, today), &articles)?;
            articles
        }
    } else {
        ingest_all(&fetcher, &registry, &mut metrics).await
    };
    info!(count = articles.len(), "articles ingested");

    let daily_target = std::env::var("MAX_ARTICLE_NUMS")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(registry.configuration.daily_target);

    let mut rng = StdRng::from_os_rng();
    let mut candidates = sampler::stratified_sample(articles, &mut rng, &mut metrics);

    evaluate::evaluate_articles(provider, &mut candidates).await;

    let now_utc = Utc::now();
    let scoring = &registry.configuration.selection.scoring;
    for article in &mut candidates {
        let date = article.date;
        if let Some(evaluation) = &mut article.evaluation {
            evaluation.score = scorer::calculate_score(evaluation, date, now_utc, scoring);
        }
    }

    let evaluated: Vec<Article> = candidates
        .into_iter()
        .filter(|article| {
            article
                .evaluation
                .as_ref()
                .is_some_and(|e| !e.title.is_empty() && !e.link.is_empty())
        })
        .collect();
    let raw_count = evaluated.iter().filter(|a| a.origin == OriginType::Raw).count();
    info!(
        total = evaluated.len(),
        raw = raw_count,
        curated = evaluated.len() - raw_count,
        "articles evaluated"
    );

    let drop_rules = &registry.configuration.selection.llm_tagging.drop_if;
    let mut kept: Vec<Article> = Vec::new();
    for article in evaluated {
        let Some(evaluation) = &article.evaluation else {
            continue;
        };
        match scorer::drop_reason(evaluation, drop_rules) {
            Some(reason) => info!(reason = %reason, title = %evaluation.title, "dropping article"),
            None => kept.push(article),
        }
    }
    info!(kept = kept.len(), "after drop rules");

    // Score-desc order before dedup, so the first occurrence of any
    // duplicate is its highest-scored copy
    kept.sort_by(|a, b| {
        b.score()
            .partial_cmp(&a.score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let unique = dedup::deduplicate(kept, &registry.configuration.deduplication);

    let selected = diversity::enforce_diversity_quotas(
        unique,
        &registry.configuration.selection.diversity_quotas,
        daily_target,
    );

    for (rank, article) in selected.iter().enumerate() {
        metrics.record_release(article.feed_title(), article.score(), rank + 1);
    }
    let final_raw = selected.iter().filter(|a| a.origin == OriginType::Raw).count();
    info!(
        selected = selected.len(),
        raw = final_raw,
        curated = selected.len() - final_raw,
        "final selection"
    );

    let now_seoul = fetch::now_seoul();
    match render::render_daily_digest(&selected, &paths.blog_root, now_seoul)? {
        Some(digest) => info!(path = %digest.path.display(), "daily digest complete"),
        None => warn!("no digest written"),
    }

    let generated_at = now_seoul.format("%Y-%m-%dT%H:%M:%S").to_string();
    metrics
        .save(&paths.metrics_path, &generated_at)
        .context("saving metrics")?;

    Ok(())
}

async fn ingest_all(fetcher: &Fetcher, registry: &Registry, metrics: &mut Metrics) -> Vec<Article> {
    let mut all = Vec::new();
    for source in &registry.sources {
        let survivors = match fetcher.fetch_source(source).await {
            Ok(survivors) => survivors,
            Err(e) => {
                warn!(source = %source.title, error = %e, "source fetch failed, contributing no articles");
                Vec::new()
            }
        };

        let feed = if source.title.is_empty() {
            "Unknown"
        } else {
            source.title.as_str()
        };
        metrics.set_find_count(feed, survivors.len());

        for mut article in survivors {
            if article.link.starts_with(fetch::TELEGRAM_PREFIX) {
                fetcher.transform_telegram_article(&mut article).await;
            }
            info!(date = %article.date, link = %article.link, "ingested");
            all.push(article);
        }
    }
    all
}
