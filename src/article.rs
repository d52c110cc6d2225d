use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::config::SourceConfig;

/// Priority band assigned per source. Controls stratified sampling quotas
/// and tie-breaking in deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Tier {
    #[serde(rename = "P0_CURATED")]
    P0Curated,
    #[serde(rename = "P0_RELEASES")]
    P0Releases,
    #[serde(rename = "P1_CONTEXT")]
    P1Context,
    #[serde(rename = "P2_RAW")]
    #[default]
    P2Raw,
    #[serde(rename = "COMMUNITY")]
    Community,
}

impl Tier {
    /// Higher is better: P0_CURATED > P0_RELEASES > P1_CONTEXT > P2_RAW > COMMUNITY.
    pub fn priority(self) -> u8 {
        match self {
            Tier::P0Curated => 5,
            Tier::P0Releases => 4,
            Tier::P1Context => 3,
            Tier::P2Raw => 2,
            Tier::Community => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::P0Curated => "P0_CURATED",
            Tier::P0Releases => "P0_RELEASES",
            Tier::P1Context => "P1_CONTEXT",
            Tier::P2Raw => "P2_RAW",
            Tier::Community => "COMMUNITY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OriginType {
    #[default]
    Raw,
    Curated,
}

/// LLM-derived evaluation for one article, plus the weighted score
/// computed afterwards by the scorer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Evaluation {
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub impact: f64,
    #[serde(default)]
    pub novelty: f64,
    #[serde(default)]
    pub proof: f64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub why_it_matters: String,
    #[serde(default)]
    pub key_evidence: String,
    #[serde(default)]
    pub who_should_care: String,
    #[serde(default)]
    pub next_action: String,
    #[serde(default)]
    pub comparison: String,
    #[serde(default)]
    pub score: f64,
}

impl Evaluation {
    /// Insight fields paired with their values, in declaration order.
    pub fn insights(&self) -> [(&'static str, &str); 5] {
        [
            ("why_it_matters", self.why_it_matters.as_str()),
            ("key_evidence", self.key_evidence.as_str()),
            ("who_should_care", self.who_should_care.as_str()),
            ("next_action", self.next_action.as_str()),
            ("comparison", self.comparison.as_str()),
        ]
    }
}

/// The unit flowing through the pipeline. Created by source fetchers,
/// owned by the driver for the duration of a run; the driver is the sole
/// mutator of `evaluation` and selection-time fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub summary: String,
    pub link: String,
    #[serde(default)]
    pub cover_url: String,
    /// Publication time, normalized to the pipeline timezone (Asia/Seoul).
    pub date: DateTime<FixedOffset>,
    /// Feed-level channel title, when the source exposes one.
    #[serde(default)]
    pub channel: Option<String>,
    /// The registry entry this article came from.
    pub config: SourceConfig,
    #[serde(default)]
    pub origin: OriginType,
    #[serde(default)]
    pub tier: Tier,
    /// Lexical focus pre-score, used only for per-source top-K culling.
    #[serde(default)]
    pub focus: i32,
    /// Importance annotation from curated markdown sections.
    #[serde(default)]
    pub importance: Option<u32>,
    /// ML confidence annotation from curated JSON snapshots.
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub evaluation: Option<Evaluation>,
}

impl Article {
    /// Feed identity used for metrics and evaluation batching:
    /// registry title, falling back to the channel title.
    pub fn feed_title(&self) -> &str {
        if !self.config.title.is_empty() {
            &self.config.title
        } else {
            self.channel.as_deref().unwrap_or("Unknown")
        }
    }

    /// Final weighted score, 0 when not yet evaluated.
    pub fn score(&self) -> f64 {
        self.evaluation.as_ref().map_or(0.0, |e| e.score)
    }

    /// LLM-assigned topic, "Other" when absent or not yet evaluated.
    pub fn topic(&self) -> &str {
        match self.evaluation.as_ref() {
            Some(e) if !e.topic.is_empty() => &e.topic,
            _ => "Other",
        }
    }
}
