use std::collections::HashSet;

use rand::Rng;
use rand::seq::index;
use tracing::info;

use crate::article::{Article, Tier};
use crate::metrics::Metrics;

/// Tier quotas for the global candidate pool (~100 articles).
pub const TIER_QUOTAS: [(Tier, usize); 5] = [
    (Tier::P0Curated, 30),
    (Tier::P0Releases, 12),
    (Tier::P1Context, 20),
    (Tier::P2Raw, 20),
    (Tier::Community, 18),
];

/// Cap the candidate set by tier quota. Tiers with enough articles get a
/// uniform random sample of their quota; underfilled tiers contribute
/// everything and their deficit is drawn proportionally from the
/// remainder pool. Each chosen article counts toward its source's
/// `candidate_count`.
pub fn stratified_sample<R: Rng>(
    articles: Vec<Article>,
    rng: &mut R,
    metrics: &mut Metrics,
) -> Vec<Article> {
    let total = articles.len();
    let mut chosen: Vec<usize> = Vec::new();
    let mut chosen_set: HashSet<usize> = HashSet::new();
    let mut deficit = 0usize;

    for (tier, quota) in TIER_QUOTAS {
        let tier_indices: Vec<usize> = articles
            .iter()
            .enumerate()
            .filter(|(_, article)| article.tier == tier)
            .map(|(i, _)| i)
            .collect();

        if tier_indices.len() >= quota {
            for pick in index::sample(rng, tier_indices.len(), quota) {
                let idx = tier_indices[pick];
                chosen.push(idx);
                chosen_set.insert(idx);
            }
        } else {
            deficit += quota - tier_indices.len();
            for idx in tier_indices {
                chosen.push(idx);
                chosen_set.insert(idx);
            }
        }
    }

    if deficit > 0 {
        let remainder: Vec<usize> = (0..total).filter(|i| !chosen_set.contains(i)).collect();
        let extra = deficit.min(remainder.len());
        if extra > 0 {
            for pick in index::sample(rng, remainder.len(), extra) {
                let idx = remainder[pick];
                chosen.push(idx);
                chosen_set.insert(idx);
            }
        }
    }

    for &idx in &chosen {
        metrics.record_candidate(articles[idx].feed_title());
    }

    info!(input = total, sampled = chosen.len(), "stratified sampling");
    for (tier, _) in TIER_QUOTAS {
        let count = chosen
            .iter()
            .filter(|&&idx| articles[idx].tier == tier)
            .count();
        if count > 0 {
            info!(tier = tier.as_str(), count, "tier share of candidate pool");
        }
    }

    let mut slots: Vec<Option<Article>> = articles.into_iter().map(Some).collect();
    chosen.iter().filter_map(|&idx| slots[idx].take()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::testing::article;
    use crate::config::SourceConfig;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn tiered_articles(tier: Tier, count: usize, feed: &str) -> Vec<Article> {
        (0..count)
            .map(|i| {
                let mut a = article(
                    &format!("{feed}-{i}"),
                    &format!("https://example.com/{feed}/{i}"),
                );
                a.tier = tier;
                a.config = SourceConfig::for_test(feed);
                a.config.tier = Some(tier);
                a
            })
            .collect()
    }

    #[test]
    fn underfilled_tiers_are_taken_whole() {
        let mut articles = tiered_articles(Tier::P0Curated, 4, "curated");
        articles.extend(tiered_articles(Tier::Community, 3, "community"));

        let mut rng = StdRng::seed_from_u64(7);
        let mut metrics = Metrics::initialize(&[
            SourceConfig::for_test("curated"),
            SourceConfig::for_test("community"),
        ]);

        let sampled = stratified_sample(articles, &mut rng, &mut metrics);
        assert_eq!(sampled.len(), 7);
    }

    #[test]
    fn deficit_redistributes_to_remainder_pool() {
        let articles = tiered_articles(Tier::P0Releases, 40, "releases");
        let mut rng = StdRng::seed_from_u64(7);
        let mut metrics = Metrics::initialize(&[SourceConfig::for_test("releases")]);

        let sampled = stratified_sample(articles, &mut rng, &mut metrics);
        // 12 from the P0_RELEASES quota, plus the deficit of every other
        // tier (30+20+20+18 = 88) drawn from the remaining 28
        assert_eq!(sampled.len(), 40);
    }

    #[test]
    fn deficit_draw_is_bounded_by_quota_sum() {
        let articles = tiered_articles(Tier::P2Raw, 150, "raw");
        let mut rng = StdRng::seed_from_u64(42);
        let mut metrics = Metrics::initialize(&[SourceConfig::for_test("raw")]);

        let sampled = stratified_sample(articles, &mut rng, &mut metrics);
        // P2_RAW quota (20) plus the other tiers' deficit (80)
        assert_eq!(sampled.len(), 100);

        // No duplicates
        let mut links: Vec<&str> = sampled.iter().map(|a| a.link.as_str()).collect();
        links.sort();
        links.dedup();
        assert_eq!(links.len(), 100);
    }

    #[test]
    fn candidate_counts_follow_sampling() {
        let articles = tiered_articles(Tier::P1Context, 5, "context");
        let mut rng = StdRng::seed_from_u64(7);
        let mut metrics = Metrics::initialize(&[SourceConfig::for_test("context")]);

        let sampled = stratified_sample(articles, &mut rng, &mut metrics);
        assert_eq!(metrics.get("context").unwrap().candidate_count, sampled.len());
    }

    #[test]
    fn sampling_is_deterministic_for_a_seed() {
        let articles = tiered_articles(Tier::P2Raw, 60, "raw");
        let mut metrics_a = Metrics::initialize(&[SourceConfig::for_test("raw")]);
        let mut metrics_b = Metrics::initialize(&[SourceConfig::for_test("raw")]);

        let mut rng_a = StdRng::seed_from_u64(99);
        let mut rng_b = StdRng::seed_from_u64(99);
        let a: Vec<String> = stratified_sample(articles.clone(), &mut rng_a, &mut metrics_a)
            .into_iter()
            .map(|a| a.link)
            .collect();
        let b: Vec<String> = stratified_sample(articles, &mut rng_b, &mut metrics_b)
            .into_iter()
            .map(|a| a.link)
            .collect();
        assert_eq!(a, b);
    }
}
