use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::info;

use crate::article::Tier;
use crate::config::SourceConfig;

/// Per-source accounting threaded through the whole pipeline:
/// `find_count` = per-source survivors, `candidate_count` = sampled into
/// the global pool, `release_count` = final slate appearances.
#[derive(Debug, Clone, Default)]
pub struct FeedMetric {
    pub title: String,
    pub tier: Option<Tier>,
    pub priority: String,
    pub find_count: usize,
    pub candidate_count: usize,
    pub release_count: usize,
    pub release_scores: Vec<f64>,
    pub rank_list: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct Metrics {
    feeds: HashMap<String, FeedMetric>,
}

impl Metrics {
    /// Zeroed record for every registered source, before any fetching.
    pub fn initialize(sources: &[SourceConfig]) -> Self {
        let mut feeds = HashMap::new();
        for source in sources {
            let title = if source.title.is_empty() {
                "Unknown".to_string()
            } else {
                source.title.clone()
            };
            feeds.entry(title.clone()).or_insert_with(|| FeedMetric {
                title,
                tier: source.tier,
                priority: source.priority.clone().unwrap_or_default(),
                ..FeedMetric::default()
            });
        }
        info!(count = feeds.len(), "initialized metrics for registered feeds");
        Self { feeds }
    }

    pub fn set_find_count(&mut self, feed: &str, count: usize) {
        if let Some(metric) = self.feeds.get_mut(feed) {
            metric.find_count = count;
        }
    }

    pub fn record_candidate(&mut self, feed: &str) {
        if let Some(metric) = self.feeds.get_mut(feed) {
            metric.candidate_count += 1;
        }
    }

    pub fn record_release(&mut self, feed: &str, score: f64, rank: usize) {
        if let Some(metric) = self.feeds.get_mut(feed) {
            metric.release_count += 1;
            metric.release_scores.push(score);
            metric.rank_list.push(rank);
        }
    }

    #[cfg(test)]
    pub(crate) fn get(&self, feed: &str) -> Option<&FeedMetric> {
        self.feeds.get(feed)
    }

    /// Serialize `{generated_at, feeds[]}`, sorted by tier priority then
    /// by release count descending, with averaged release scores.
    pub fn save(&self, path: &Path, generated_at: &str) -> Result<()> {
        let mut metrics: Vec<&FeedMetric> = self.feeds.values().collect();
        metrics.sort_by(|a, b| {
            tier_sort_key(a.tier)
                .cmp(&tier_sort_key(b.tier))
                .then_with(|| b.release_count.cmp(&a.release_count))
        });

        let rows: Vec<serde_json::Value> = metrics
            .into_iter()
            .map(|metric| {
                let avg = if metric.release_scores.is_empty() {
                    0.0
                } else {
                    metric.release_scores.iter().sum::<f64>() / metric.release_scores.len() as f64
                };
                json!({
                    "title": metric.title,
                    "tier": metric.tier.map(Tier::as_str).unwrap_or(""),
                    "priority": metric.priority,
                    "find_count": metric.find_count,
                    "candidate_count": metric.candidate_count,
                    "release_count": metric.release_count,
                    "release_score": (avg * 100.0).round() / 100.0,
                    "rank_list": metric.rank_list,
                })
            })
            .collect();

        let payload = json!({
            "generated_at": generated_at,
            "feeds": rows,
        });

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating metrics directory: {}", parent.display()))?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&payload)?)
            .with_context(|| format!("writing metrics to {}", path.display()))?;
        info!(path = %path.display(), "metrics saved");
        Ok(())
    }
}

fn tier_sort_key(tier: Option<Tier>) -> u32 {
    match tier {
        Some(tier) => 5 - u32::from(tier.priority()),
        None => 999,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(title: &str, tier: Option<Tier>) -> SourceConfig {
        let mut config = SourceConfig::for_test(title);
        config.tier = tier;
        config
    }

    #[test]
    fn counters_accumulate_per_feed() {
        let sources = vec![source("A", Some(Tier::P0Curated)), source("B", None)];
        let mut metrics = Metrics::initialize(&sources);

        metrics.set_find_count("A", 3);
        metrics.record_candidate("A");
        metrics.record_candidate("A");
        metrics.record_release("A", 4.2, 1);
        metrics.record_release("A", 3.8, 5);
        // Unregistered feeds are ignored, not created
        metrics.record_release("Nope", 1.0, 2);

        let a = metrics.get("A").unwrap();
        assert_eq!(a.find_count, 3);
        assert_eq!(a.candidate_count, 2);
        assert_eq!(a.release_count, 2);
        assert_eq!(a.rank_list, vec![1, 5]);
        assert!(metrics.get("Nope").is_none());
    }

    #[test]
    fn saved_metrics_are_sorted_and_averaged() {
        let sources = vec![
            source("Raw Feed", Some(Tier::P2Raw)),
            source("Curated A", Some(Tier::P0Curated)),
            source("Curated B", Some(Tier::P0Curated)),
            source("No Tier", None),
        ];
        let mut metrics = Metrics::initialize(&sources);
        metrics.record_release("Curated B", 4.0, 1);
        metrics.record_release("Curated B", 3.0, 2);
        metrics.record_release("Curated A", 5.0, 3);
        metrics.record_release("Raw Feed", 10.0 / 3.0, 4);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/metrics.json");
        metrics.save(&path, "2025-12-01T09:00:00").unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["generated_at"], "2025-12-01T09:00:00");

        let feeds = saved["feeds"].as_array().unwrap();
        let titles: Vec<&str> = feeds.iter().map(|f| f["title"].as_str().unwrap()).collect();
        // P0_CURATED first (B before A by release_count), untiered feed last
        assert_eq!(titles, vec!["Curated B", "Curated A", "Raw Feed", "No Tier"]);

        assert_eq!(feeds[0]["release_score"], 3.5);
        assert_eq!(feeds[2]["release_score"], 3.33);
        assert_eq!(feeds[3]["tier"], "");
        assert_eq!(feeds[3]["release_count"], 0);
    }
}
