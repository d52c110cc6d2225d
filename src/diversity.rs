use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::article::Article;
use crate::config::DiversityQuotas;

/// Pick the final slate from score-sorted articles while honoring
/// per-topic minimum and maximum quotas. Deterministic given its inputs:
/// phase 1 walks the declared minimums in topic order, phase 2 fills the
/// remaining slots from the global score order, skipping topics at their
/// maximum.
pub fn enforce_diversity_quotas(
    articles: Vec<Article>,
    quotas: &DiversityQuotas,
    target: usize,
) -> Vec<Article> {
    let mut chosen: Vec<usize> = Vec::new();
    let mut chosen_set: HashSet<usize> = HashSet::new();
    let mut topic_counts: HashMap<String, usize> = HashMap::new();

    for (topic, &min_count) in &quotas.min {
        let mut taken = 0usize;
        for (idx, article) in articles.iter().enumerate() {
            if taken >= min_count {
                break;
            }
            if article.topic() == topic && !chosen_set.contains(&idx) {
                chosen.push(idx);
                chosen_set.insert(idx);
                *topic_counts.entry(topic.clone()).or_default() += 1;
                taken += 1;
            }
        }
        info!(topic = %topic, taken, min = min_count, "minimum quota pass");
    }

    info!(selected = chosen.len(), target, "filling remaining slots by score");
    let mut remaining = target.saturating_sub(chosen.len());
    for (idx, article) in articles.iter().enumerate() {
        if remaining == 0 {
            break;
        }
        if chosen_set.contains(&idx) {
            continue;
        }
        let topic = article.topic().to_string();
        let max_quota = quotas.max.get(&topic).copied().unwrap_or(usize::MAX);
        if topic_counts.get(&topic).copied().unwrap_or(0) >= max_quota {
            debug!(topic = %topic, max_quota, "skipping article, topic at maximum");
            continue;
        }
        chosen.push(idx);
        chosen_set.insert(idx);
        *topic_counts.entry(topic).or_default() += 1;
        remaining -= 1;
    }

    let mut distribution: Vec<(&String, &usize)> = topic_counts.iter().collect();
    distribution.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    info!(selected = chosen.len(), "final selection");
    for (topic, count) in distribution {
        let max_display = quotas
            .max
            .get(topic)
            .map(|m| m.to_string())
            .unwrap_or_else(|| "∞".to_string());
        info!(
            topic = %topic,
            count,
            min = quotas.min.get(topic).copied().unwrap_or(0),
            max = %max_display,
            "topic distribution"
        );
    }

    let mut slots: Vec<Option<Article>> = articles.into_iter().map(Some).collect();
    chosen.iter().filter_map(|&idx| slots[idx].take()).collect()
}
