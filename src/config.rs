use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::article::Tier;
use crate::error::ConfigError;

const KNOWN_SOURCE_TYPES: &[&str] = &[
    "rss",
    "atom",
    "curated_rss",
    "rsshub",
    "link",
    "code",
    "github_md_folder",
    "github_json",
];

/// One entry of the source registry. `category` and `priority` are
/// inherited from the enclosing category block at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub rsshub_path: Option<String>,
    #[serde(default)]
    pub input_count: Option<usize>,
    #[serde(default)]
    pub output_count: Option<usize>,
    #[serde(default)]
    pub image_enable: Option<bool>,
    #[serde(default)]
    pub exclude_threads_links: Option<bool>,
}

impl SourceConfig {
    /// Cap on pre-evaluation candidates pulled from this source.
    pub fn input_cap(&self) -> usize {
        self.input_count.unwrap_or(6)
    }

    /// Cap on candidates kept per source after focus selection.
    pub fn output_cap(&self) -> usize {
        self.output_count.unwrap_or(3)
    }

    pub fn images_enabled(&self) -> bool {
        self.image_enable.unwrap_or(true)
    }

    pub fn tier(&self) -> Tier {
        self.tier.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CategoryBlock {
    #[serde(default = "default_category")]
    category: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    items: Vec<SourceConfig>,
}

fn default_category() -> String {
    "Daily News".to_string()
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    categories: Vec<CategoryBlock>,
    #[serde(default)]
    configuration: serde_json::Map<String, Value>,
}

/// Global selection/scoring/diversity/dedup settings from the registry's
/// `configuration` block. Unknown keys are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    #[serde(default = "default_daily_target")]
    pub daily_target: usize,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub deduplication: DedupConfig,
    #[serde(default)]
    pub rsshub_domain: Option<String>,
    #[serde(default)]
    pub focus_threshold: i32,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            daily_target: default_daily_target(),
            selection: SelectionConfig::default(),
            deduplication: DedupConfig::default(),
            rsshub_domain: None,
            focus_threshold: 0,
        }
    }
}

fn default_daily_target() -> usize {
    12
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectionConfig {
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub diversity_quotas: DiversityQuotas,
    #[serde(default)]
    pub llm_tagging: LlmTagging,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub recency: RecencyConfig,
    #[serde(default)]
    pub penalties: Vec<PenaltyRule>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            recency: RecencyConfig::default(),
            penalties: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecencyConfig {
    #[serde(default = "default_half_life")]
    pub half_life_hours: f64,
}

impl Default for RecencyConfig {
    fn default() -> Self {
        Self {
            half_life_hours: default_half_life(),
        }
    }
}

fn default_half_life() -> f64 {
    36.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct PenaltyRule {
    #[serde(alias = "if_title_or_content_contains_any")]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub subtract: f64,
}

/// Min/max slate quotas keyed by topic. BTreeMaps keep quota iteration
/// deterministic for the diversity selector.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiversityQuotas {
    #[serde(default)]
    pub min: BTreeMap<String, usize>,
    #[serde(default)]
    pub max: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmTagging {
    #[serde(default)]
    pub drop_if: DropRules,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DropRules {
    #[serde(default)]
    pub topic_in: Vec<String>,
    #[serde(default)]
    pub impact_lte: f64,
    #[serde(default)]
    pub proof_lte: f64,
    #[serde(default)]
    pub content_quality: Option<ContentQuality>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentQuality {
    #[serde(default = "default_summary_min_chars")]
    pub summary_min_chars: usize,
    #[serde(default = "default_insight_min_filled")]
    pub insight_min_filled: usize,
    #[serde(default = "default_insight_min_chars_each")]
    pub insight_min_chars_each: usize,
}

fn default_summary_min_chars() -> usize {
    200
}
fn default_insight_min_filled() -> usize {
    2
}
fn default_insight_min_chars_each() -> usize {
    15
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Accepted for registry compatibility; canonicalization always keys
    /// on the article link.
    #[serde(default = "default_canonical_fields")]
    pub canonical_url_fields: Vec<String>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            canonical_url_fields: default_canonical_fields(),
        }
    }
}

fn default_enabled() -> bool {
    true
}
fn default_canonical_fields() -> Vec<String> {
    vec!["link".to_string(), "guid".to_string()]
}

/// The fully loaded registry: flattened source list plus global settings.
#[derive(Debug, Clone)]
pub struct Registry {
    pub sources: Vec<SourceConfig>,
    pub configuration: GlobalConfig,
}

/// Load the registry from a JSON file, or merge every `*.json` file in a
/// directory. Category metadata is flattened onto each source and
/// `rsshub_path` entries are resolved against `rsshub_domain`.
pub fn load_registry(resource: &Path) -> Result<Registry, ConfigError> {
    let mut categories: Vec<CategoryBlock> = Vec::new();
    let mut configuration = serde_json::Map::new();

    let mut load_file = |path: &Path| -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let file: RegistryFile = serde_json::from_str(&content)?;
        categories.extend(file.categories);
        for (key, value) in file.configuration {
            configuration.insert(key, value);
        }
        Ok(())
    };

    if resource.is_dir() {
        let mut paths: Vec<_> = std::fs::read_dir(resource)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        for path in &paths {
            load_file(path)?;
        }
    } else {
        load_file(resource)?;
    }

    let configuration: GlobalConfig = serde_json::from_value(Value::Object(configuration))?;

    let mut sources = Vec::new();
    for block in categories {
        for mut source in block.items {
            source.category = block.category.clone();
            if source.priority.is_none() {
                source.priority = block.priority.clone();
            }
            if let Some(ref path) = source.rsshub_path {
                let domain = configuration.rsshub_domain.as_deref().ok_or_else(|| {
                    ConfigError::Validation(format!(
                        "source '{}' uses rsshub_path but configuration has no rsshub_domain",
                        source.title
                    ))
                })?;
                source.url = format!("{domain}{path}");
            }
            sources.push(source);
        }
    }

    Ok(Registry {
        sources,
        configuration,
    })
}

pub fn validate_registry(registry: &Registry) -> Result<(), ConfigError> {
    if registry.configuration.daily_target == 0 {
        return Err(ConfigError::Validation(
            "daily_target must be at least 1".to_string(),
        ));
    }

    for source in &registry.sources {
        if !KNOWN_SOURCE_TYPES.contains(&source.source_type.as_str()) {
            return Err(ConfigError::Validation(format!(
                "source '{}': unknown type '{}'",
                source.title, source.source_type
            )));
        }
        if source.url.is_empty() {
            return Err(ConfigError::Validation(format!(
                "source '{}': must have a 'url' (or an rsshub_path with rsshub_domain)",
                source.title
            )));
        }
    }

    let quotas = &registry.configuration.selection.diversity_quotas;
    for (topic, min) in &quotas.min {
        if let Some(max) = quotas.max.get(topic)
            && min > max
        {
            return Err(ConfigError::Validation(format!(
                "diversity quota for topic '{topic}': min {min} exceeds max {max}"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
impl SourceConfig {
    pub(crate) fn for_test(title: &str) -> Self {
        Self {
            title: title.to_string(),
            url: "https://example.com/feed".to_string(),
            source_type: "rss".to_string(),
            tier: None,
            category: "Daily News".to_string(),
            priority: None,
            rsshub_path: None,
            input_count: None,
            output_count: None,
            image_enable: None,
            exclude_threads_links: None,
        }
    }
}
