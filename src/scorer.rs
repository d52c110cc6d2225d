use chrono::{DateTime, FixedOffset, Utc};
use tracing::debug;

use crate::article::Evaluation;
use crate::config::{DropRules, PenaltyRule, ScoringConfig};

/// Exponential decay `5 · 0.5^(hours_old / half_life)` with a mandatory
/// −0.5 step past 24 hours, clamped to [0, 5]. `hours_old` compares UTC
/// now against the timezone-aware publication time.
pub fn recency_score(
    date: DateTime<FixedOffset>,
    now: DateTime<Utc>,
    half_life_hours: f64,
) -> f64 {
    let hours_old = (now - date.with_timezone(&Utc)).num_seconds() as f64 / 3600.0;
    let mut recency = 5.0 * 0.5f64.powf(hours_old / half_life_hours);
    if hours_old > 24.0 {
        recency -= 0.5;
    }
    recency.clamp(0.0, 5.0)
}

/// Weighted score `0.35·impact + 0.25·novelty + 0.25·proof + 0.15·recency`,
/// with keyword penalties applied on top.
pub fn calculate_score(
    evaluation: &Evaluation,
    date: DateTime<FixedOffset>,
    now: DateTime<Utc>,
    scoring: &ScoringConfig,
) -> f64 {
    let recency = recency_score(date, now, scoring.recency.half_life_hours);
    let base = 0.35 * evaluation.impact
        + 0.25 * evaluation.novelty
        + 0.25 * evaluation.proof
        + 0.15 * recency;
    let score = apply_penalties(base, &evaluation.title, &evaluation.summary, &scoring.penalties);
    debug!(
        impact = evaluation.impact,
        novelty = evaluation.novelty,
        proof = evaluation.proof,
        recency,
        score,
        "score calculated"
    );
    score
}

/// Each rule subtracts its amount at most once, on the first matching
/// keyword; the result is floored at 0.
pub fn apply_penalties(
    base_score: f64,
    title: &str,
    summary: &str,
    rules: &[PenaltyRule],
) -> f64 {
    let combined = format!("{title} {summary}").to_lowercase();
    let mut adjusted = base_score;
    for rule in rules {
        if let Some(keyword) = rule
            .keywords
            .iter()
            .find(|kw| combined.contains(&kw.to_lowercase()))
        {
            adjusted -= rule.subtract;
            debug!(keyword = %keyword, subtract = rule.subtract, "penalty applied");
        }
    }
    adjusted.max(0.0)
}

/// Hard drop rules: topic blacklist, impact/proof thresholds, and
/// content-quality minima. Returns the human-readable reason when a rule
/// fires.
pub fn drop_reason(evaluation: &Evaluation, rules: &DropRules) -> Option<String> {
    if rules.topic_in.iter().any(|topic| topic == &evaluation.topic) {
        return Some(format!("topic={} in blacklist", evaluation.topic));
    }

    if evaluation.impact <= rules.impact_lte {
        return Some(format!(
            "impact={} <= {}",
            evaluation.impact, rules.impact_lte
        ));
    }

    if evaluation.proof <= rules.proof_lte {
        return Some(format!("proof={} <= {}", evaluation.proof, rules.proof_lte));
    }

    if let Some(quality) = &rules.content_quality {
        let summary_len = evaluation.summary.chars().count();
        if summary_len < quality.summary_min_chars {
            return Some(format!(
                "summary too short ({summary_len}<{} chars)",
                quality.summary_min_chars
            ));
        }

        let filled = evaluation
            .insights()
            .iter()
            .filter(|(_, value)| value.trim().chars().count() >= quality.insight_min_chars_each)
            .count();
        if filled < quality.insight_min_filled {
            return Some(format!(
                "insufficient insights ({filled}<{})",
                quality.insight_min_filled
            ));
        }
    }

    None
}
