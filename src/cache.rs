use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::info;

use crate::article::Article;

/// Same-day fetch results are reused only when explicitly enabled.
pub fn cache_enabled() -> bool {
    std::env::var("RSS_CACHE_ENABLE").is_ok_and(|value| value == "true")
}

pub fn cache_path(draft_dir: &Path, today: NaiveDate) -> PathBuf {
    draft_dir.join(format!("article_cache_{}.json", today.format("%Y-%m-%d")))
}

/// The per-day cache file, when one exists for today.
pub fn find_same_day_cache(draft_dir: &Path, today: NaiveDate) -> Option<PathBuf> {
    let path = cache_path(draft_dir, today);
    path.exists().then_some(path)
}

pub fn save_articles(path: &Path, articles: &[Article]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating draft directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(articles).context("serializing article cache")?;
    std::fs::write(path, json).with_context(|| format!("writing article cache to {}", path.display()))?;
    info!(path = %path.display(), count = articles.len(), "article cache saved");
    Ok(())
}

pub fn load_articles(path: &Path) -> Result<Vec<Article>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading article cache from {}", path.display()))?;
    let articles: Vec<Article> = serde_json::from_str(&content).context("parsing article cache")?;
    info!(path = %path.display(), count = articles.len(), "article cache loaded");
    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::testing::evaluated;

    #[test]
    fn articles_round_trip_through_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        let path = cache_path(dir.path(), today);

        let mut article = evaluated("제목", "https://example.com/1", "Model", 4.2);
        article.cover_url = "https://cdn.example/c.png".to_string();
        article.focus = 4;

        save_articles(&path, std::slice::from_ref(&article)).unwrap();
        let loaded = load_articles(&path).unwrap();

        assert_eq!(loaded.len(), 1);
        let restored = &loaded[0];
        assert_eq!(restored.link, article.link);
        assert_eq!(restored.date, article.date);
        assert_eq!(restored.date.offset(), article.date.offset());
        assert_eq!(restored.focus, 4);
        assert_eq!(restored.evaluation.as_ref().unwrap().score, 4.2);
        assert_eq!(restored.config.title, article.config.title);
    }

    #[test]
    fn cache_lookup_misses_on_other_days() {
        let dir = tempfile::tempdir().unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2025, 11, 30).unwrap();

        save_articles(&cache_path(dir.path(), yesterday), &[]).unwrap();
        assert!(find_same_day_cache(dir.path(), today).is_none());
        assert!(find_same_day_cache(dir.path(), yesterday).is_some());
    }
}
