use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset};
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::article::{Article, OriginType};
use crate::config::SourceConfig;
use crate::error::{FetchError, GitHubError};
use crate::fetch::{Fetcher, now_seoul};
use crate::focus::select_top_articles;

/// Snapshot entries below this ML confidence are discarded.
const CONFIDENCE_THRESHOLD: f64 = 0.5;

static SECTION_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[Image\]\((https?://[^\s)]+)\)").expect("static regex"));
static SECTION_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"##\s*제목:\s*([^\n]+)").expect("static regex"));
static SECTION_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"##\s*([^\n]+)").expect("static regex"));
static SECTION_SUMMARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\*\*요약\*\*:\s*(.+?)(?:\*\*|\z)").expect("static regex"));
static SECTION_EASY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\*\*쉬운설명\*\*:\s*(.+?)(?:\*\*|\z)").expect("static regex"));
static SECTION_RELATED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\*\*관련분야\*\*:\s*(.+?)(?:\*\*|\z)").expect("static regex"));
static SECTION_IMPORTANCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*중요도\*\*:\s*(\d+)").expect("static regex"));
static SECTION_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*전체링크\*\*\s*:?\s*(https?://[^\s\n]+)").expect("static regex"));

/// `github://owner/repo/folder[@ref]`; the folder may be percent-encoded
/// and may contain slashes; ref defaults to `main`.
pub(crate) fn parse_md_folder_url(url: &str) -> Result<(String, String, String, String), FetchError> {
    let rest = url
        .strip_prefix("github://")
        .ok_or_else(|| FetchError::InvalidUrl {
            url: url.to_string(),
            message: "expected github:// scheme".to_string(),
        })?;

    let (path_part, git_ref) = match rest.rsplit_once('@') {
        Some((path, git_ref)) => (path, git_ref.to_string()),
        None => (rest, "main".to_string()),
    };

    let mut parts = path_part.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), Some(folder)) if !owner.is_empty() && !repo.is_empty() && !folder.is_empty() => Ok((
            owner.to_string(),
            repo.to_string(),
            folder.to_string(),
            git_ref,
        )),
        _ => Err(FetchError::InvalidUrl {
            url: url.to_string(),
            message: "expected owner/repo/folder".to_string(),
        }),
    }
}

/// `github-json://owner/repo[@YYYY-MM-DD]`; the date defaults to today.
pub(crate) fn parse_json_url(url: &str) -> Result<(String, String, Option<String>), FetchError> {
    let rest = url
        .strip_prefix("github-json://")
        .ok_or_else(|| FetchError::InvalidUrl {
            url: url.to_string(),
            message: "expected github-json:// scheme".to_string(),
        })?;

    let (path_part, date) = match rest.rsplit_once('@') {
        Some((path, date)) => (path, Some(date.to_string())),
        None => (rest, None),
    };

    match path_part.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => {
            Ok((owner.to_string(), repo.to_string(), date))
        }
        _ => Err(FetchError::InvalidUrl {
            url: url.to_string(),
            message: "expected owner/repo".to_string(),
        }),
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MdSection {
    pub title: String,
    pub full_summary: String,
    pub link: String,
    pub image_url: String,
    pub importance: u32,
}

fn field_value(section: &str, pattern: &Regex) -> String {
    pattern
        .captures(section)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default()
}

/// Split a curated markdown file on `---` lines and extract one news item
/// per non-trivial section. Sections without a title or link are skipped.
pub(crate) fn parse_md_sections(content: &str) -> Vec<MdSection> {
    let mut sections = Vec::new();

    for raw_section in content.split("\n---\n") {
        let section = raw_section.trim();
        if section.chars().count() < 50 {
            continue;
        }

        let title = SECTION_TITLE
            .captures(section)
            .or_else(|| SECTION_HEADING.captures(section))
            .map(|c| c[1].trim().to_string());
        let Some(title) = title else {
            continue;
        };

        let link = SECTION_LINK.captures(section).map(|c| c[1].trim().to_string());
        let Some(link) = link else {
            warn!(title = %title.chars().take(50).collect::<String>(), "no link found in section");
            continue;
        };

        let image_url = field_value(section, &SECTION_IMAGE);
        let summary = field_value(section, &SECTION_SUMMARY);
        let easy_explanation = field_value(section, &SECTION_EASY);
        let related_field = field_value(section, &SECTION_RELATED);
        let importance = SECTION_IMPORTANCE
            .captures(section)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(5);

        let mut full_summary = summary;
        if !easy_explanation.is_empty() {
            full_summary.push_str(&format!("\n\n쉬운설명: {easy_explanation}"));
        }
        if !related_field.is_empty() {
            full_summary.push_str(&format!("\n\n관련분야: {related_field}"));
        }

        sections.push(MdSection {
            title,
            full_summary,
            link,
            image_url,
            importance,
        });
    }

    info!(count = sections.len(), "parsed sections from markdown file");
    sections
}

/// Turn snapshot JSON (`{articles: [...]}`) into Articles: confidence
/// filter, input cap, and an enriched summary carrying the snapshot
/// metadata.
pub(crate) fn articles_from_snapshot(
    payload: &Value,
    config: &SourceConfig,
    now: DateTime<FixedOffset>,
) -> Vec<Article> {
    let Some(items) = payload.get("articles").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut articles = Vec::new();
    for item in items
        .iter()
        .filter(|item| {
            item.get("confidence").and_then(Value::as_f64).unwrap_or(0.0) >= CONFIDENCE_THRESHOLD
        })
        .take(config.input_cap())
    {
        let title = item.get("title").and_then(Value::as_str).unwrap_or_default();
        let url = item.get("url").and_then(Value::as_str).unwrap_or_default();
        if title.is_empty() || url.is_empty() {
            continue;
        }

        let summary = item.get("summary").and_then(Value::as_str).unwrap_or_default();
        let category = item.get("category").and_then(Value::as_str).unwrap_or_default();
        let source = item.get("source").and_then(Value::as_str).unwrap_or_default();
        let confidence = item.get("confidence").and_then(Value::as_f64).unwrap_or(0.0);

        let mut enhanced = summary.to_string();
        if !category.is_empty() {
            enhanced.push_str(&format!("\n\nCategory: {category}"));
        }
        if !source.is_empty() {
            enhanced.push_str(&format!("\nSource: {source}"));
        }
        if confidence > 0.0 {
            enhanced.push_str(&format!("\nConfidence: {confidence:.2}"));
        }

        articles.push(Article {
            title: title.to_string(),
            summary: enhanced,
            link: url.to_string(),
            cover_url: String::new(),
            date: now,
            channel: None,
            config: config.clone(),
            origin: OriginType::Curated,
            tier: config.tier(),
            focus: 0,
            importance: None,
            confidence: Some(confidence),
            evaluation: None,
        });
    }

    articles
}

impl Fetcher {
    /// `github_md_folder`: pick the newest date-prefixed `.md` file from
    /// the folder and emit one curated Article per section.
    pub(crate) async fn fetch_md_folder_source(
        &self,
        config: &SourceConfig,
    ) -> Result<Vec<Article>, FetchError> {
        let (owner, repo, folder, git_ref) = parse_md_folder_url(&config.url)?;
        let folder_display = percent_decode_str(&folder).decode_utf8_lossy().to_string();

        let items = self
            .github
            .list_folder_contents(&owner, &repo, &folder, &git_ref)
            .await?;

        let mut md_files: Vec<(&str, &str)> = items
            .iter()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some("file"))
            .filter_map(|item| {
                let name = item.get("name").and_then(Value::as_str)?;
                let download_url = item.get("download_url").and_then(Value::as_str)?;
                name.ends_with(".md").then_some((name, download_url))
            })
            .collect();

        if md_files.is_empty() {
            error!(owner = %owner, repo = %repo, folder = %folder_display, "no .md files found in folder");
            return Ok(Vec::new());
        }

        // Filenames are date-prefixed, so descending order puts the newest first
        md_files.sort_by(|a, b| b.0.cmp(a.0));
        let Some(&(latest_name, download_url)) = md_files.first() else {
            return Ok(Vec::new());
        };
        info!(file = latest_name, total = md_files.len(), "selected latest markdown file");

        let content = self.github.download_file_content(download_url).await?;
        if content.chars().count() < 100 {
            warn!(
                file = latest_name,
                chars = content.chars().count(),
                "file content too short"
            );
            return Ok(Vec::new());
        }

        let sections = parse_md_sections(&content);
        if sections.is_empty() {
            warn!(file = latest_name, "no sections parsed from markdown file");
            return Ok(Vec::new());
        }

        let now = now_seoul();
        let articles: Vec<Article> = sections
            .into_iter()
            .map(|section| {
                let mut article = Article {
                    title: section.title,
                    summary: section.full_summary,
                    link: section.link,
                    cover_url: section.image_url,
                    date: now,
                    channel: None,
                    config: config.clone(),
                    origin: OriginType::Curated,
                    tier: config.tier(),
                    focus: 0,
                    importance: Some(section.importance),
                    confidence: None,
                    evaluation: None,
                };
                article.focus = self.lexicon.score(&article);
                article
            })
            .collect();

        let total = articles.len();
        let selected = select_top_articles(articles, config.output_cap(), self.lexicon.threshold);
        info!(
            selected = selected.len(),
            total,
            source = %config.title,
            "selected articles from markdown folder"
        );
        Ok(selected)
    }

    /// `github_json`: pull the dated snapshot from raw.githubusercontent;
    /// a 404 is a soft miss.
    pub(crate) async fn fetch_json_snapshot_source(
        &self,
        config: &SourceConfig,
    ) -> Result<Vec<Article>, FetchError> {
        let (owner, repo, date) = parse_json_url(&config.url)?;
        let date_str = date.unwrap_or_else(|| now_seoul().format("%Y-%m-%d").to_string());
        let url = format!(
            "https://raw.githubusercontent.com/{owner}/{repo}/main/data/{date_str}-processed.json"
        );

        info!(url = %url, "fetching daily snapshot");
        let payload = match self.github.get_json(&url).await {
            Ok(payload) => payload,
            Err(GitHubError::Http(e)) if e.status() == Some(reqwest::StatusCode::NOT_FOUND) => {
                warn!(date = %date_str, "no snapshot data found for this date (404)");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut articles = articles_from_snapshot(&payload, config, now_seoul());
        if articles.is_empty() {
            warn!(date = %date_str, "no usable articles in snapshot");
            return Ok(Vec::new());
        }
        for article in &mut articles {
            article.focus = self.lexicon.score(article);
        }

        let total = articles.len();
        let selected = select_top_articles(articles, config.output_cap(), self.lexicon.threshold);
        info!(
            selected = selected.len(),
            total,
            source = %config.title,
            "selected articles from snapshot"
        );
        Ok(selected)
    }
}
