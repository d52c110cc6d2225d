use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Asia::Seoul;
use feed_rs::model::Entry;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{info, warn};
use url::Url;

use crate::article::{Article, OriginType};
use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::extract;
use crate::focus::{FocusLexicon, select_top_articles};
use crate::github::GitHubClient;
use crate::media;

/// Entries older than this are dropped at ingestion.
pub const FRESHNESS_WINDOW_HOURS: f64 = 36.0;

pub const TELEGRAM_PREFIX: &str = "https://t.me/";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const WEB_TIMEOUT: Duration = Duration::from_secs(10);

static TCO_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https://t\.co\S+").expect("static regex"));

/// Current time in the pipeline timezone (Asia/Seoul).
pub fn now_seoul() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&Seoul).fixed_offset()
}

/// Freshness check against the 36-hour window (articles without a date
/// are stamped "now" before this is called).
pub fn is_recent(date: DateTime<FixedOffset>, now: DateTime<FixedOffset>, hours_limit: f64) -> bool {
    let hours_old = (now - date).num_seconds() as f64 / 3600.0;
    hours_old <= hours_limit
}

/// Source-aware ingestion front end. Owns the general-web HTTP client
/// (browser UA, 10s timeout), the shared GitHub client, and the focus
/// lexicon.
pub struct Fetcher {
    pub(crate) http: reqwest::Client,
    pub(crate) github: GitHubClient,
    pub(crate) lexicon: FocusLexicon,
}

impl Fetcher {
    pub fn new(github: GitHubClient, lexicon: FocusLexicon) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        let http = reqwest::Client::builder()
            .timeout(WEB_TIMEOUT)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            http,
            github,
            lexicon,
        })
    }

    /// Fetch one registered source and return its ordered survivors.
    pub async fn fetch_source(&self, config: &SourceConfig) -> Result<Vec<Article>, FetchError> {
        match config.source_type.as_str() {
            "github_md_folder" => self.fetch_md_folder_source(config).await,
            "github_json" => self.fetch_json_snapshot_source(config).await,
            _ => self.fetch_feed_source(config).await,
        }
    }

    /// Syndicated feeds (`rss`/`atom`/`curated_rss`/`rsshub`), including
    /// the `link` and `code` kinds whose summaries come from the linked
    /// page rather than the entry body.
    async fn fetch_feed_source(&self, config: &SourceConfig) -> Result<Vec<Article>, FetchError> {
        let url = config.url.as_str();

        let response = self.http.get(url).send().await.map_err(|e| FetchError::Http {
            url: url.to_string(),
            source: e,
        })?;
        if !response.status().is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                source: response.error_for_status().unwrap_err(),
            });
        }
        let body = response.bytes().await.map_err(|e| FetchError::Http {
            url: url.to_string(),
            source: e,
        })?;

        let feed = feed_rs::parser::parse(&body[..]).map_err(|e| FetchError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let now = now_seoul();
        let channel_title = feed.title.as_ref().map(|t| t.content.clone());
        let feed_updated = feed.updated.map(|d| d.with_timezone(&Seoul).fixed_offset());

        let input_cap = config.input_cap();
        let mut candidates = Vec::new();
        for entry in &feed.entries {
            if candidates.len() >= input_cap {
                break;
            }

            // published → updated → feed-level fallback → now
            let date = entry
                .published
                .or(entry.updated)
                .map(|d| d.with_timezone(&Seoul).fixed_offset())
                .or(feed_updated)
                .unwrap_or(now);

            if !is_recent(date, now, FRESHNESS_WINDOW_HOURS) {
                continue;
            }

            if let Some(mut article) = self
                .article_from_entry(entry, config, channel_title.as_deref(), date)
                .await
            {
                article.focus = self.lexicon.score(&article);
                candidates.push(article);
            }
        }

        let candidate_count = candidates.len();
        let selected = select_top_articles(candidates, config.output_cap(), self.lexicon.threshold);

        let origin_label = if config.source_type == "curated_rss" {
            "curated"
        } else {
            "raw"
        };
        if selected.is_empty() {
            info!(url, "content of today is empty");
        } else {
            info!(
                url,
                origin = origin_label,
                selected = selected.len(),
                candidates = candidate_count,
                "content selected for today"
            );
        }
        Ok(selected)
    }

    async fn article_from_entry(
        &self,
        entry: &Entry,
        config: &SourceConfig,
        channel: Option<&str>,
        date: DateTime<FixedOffset>,
    ) -> Option<Article> {
        let title = entry
            .title
            .as_ref()
            .map(|t| t.content.clone())
            .unwrap_or_default();

        let Some(link) = resolve_entry_link(entry) else {
            let source_name = channel.filter(|c| !c.is_empty()).unwrap_or_else(|| {
                if !config.title.is_empty() {
                    config.title.as_str()
                } else {
                    config.url.as_str()
                }
            });
            warn!(source = source_name, title = %title, "skipping article without link");
            return None;
        };

        let summary_raw = entry
            .summary
            .as_ref()
            .map(|t| t.content.clone())
            .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
            .unwrap_or_default();

        let base = Url::parse(&link).ok();
        let mut cover_url = String::new();
        if config.images_enabled() {
            cover_url = media::image_from_entry(entry, base.as_ref());
            if cover_url.is_empty() {
                cover_url = media::image_from_html_snippet(&summary_raw, base.as_ref());
            }
        }

        let summary = match config.source_type.as_str() {
            "link" => {
                let (text, fetched_cover) = extract::fetch_web_page(&self.http, &link).await;
                if config.images_enabled() && cover_url.is_empty() {
                    cover_url = fetched_cover;
                }
                text.unwrap_or_default()
            }
            "code" => extract::fetch_github_readme(&self.http, &self.github, &link)
                .await
                .unwrap_or_default(),
            _ => extract::html_to_text(&summary_raw),
        };

        if config.images_enabled() && cover_url.is_empty() {
            cover_url = media::fetch_image_from_page(&self.http, &link).await;
        }

        if summary.chars().count() < 10 {
            return None;
        }

        let origin = if config.source_type == "curated_rss" {
            OriginType::Curated
        } else {
            OriginType::Raw
        };

        Some(Article {
            title,
            summary,
            link,
            cover_url,
            date,
            channel: channel.map(str::to_string),
            config: config.clone(),
            origin,
            tier: config.tier(),
            focus: 0,
            importance: None,
            confidence: None,
            evaluation: None,
        })
    }

    /// Telegram-origin items carry a `t.co` shortlink in the message body.
    /// Follow the first one (ignoring quoted lines) and re-fetch the
    /// destination as a README or web page.
    pub async fn transform_telegram_article(&self, article: &mut Article) {
        let shortlink = article
            .summary
            .lines()
            .filter(|line| !line.starts_with('>'))
            .find_map(|line| TCO_LINK.find(line).map(|m| m.as_str().to_string()));
        let Some(shortlink) = shortlink else {
            return;
        };

        let Some(destination) = extract::resolve_short_link(&self.http, &shortlink).await else {
            return;
        };
        article.link = destination.clone();

        let (summary, cover) = if destination.starts_with("https://github.com") {
            let readme = extract::fetch_github_readme(&self.http, &self.github, &destination).await;
            (readme, String::new())
        } else {
            extract::fetch_web_page(&self.http, &destination).await
        };

        if let Some(summary) = summary {
            article.summary = summary;
        }
        if !cover.is_empty() && article.cover_url.is_empty() {
            article.cover_url = cover;
        }
    }
}

fn resolve_entry_link(entry: &Entry) -> Option<String> {
    if let Some(link) = entry.links.first() {
        return Some(link.href.clone());
    }
    if !entry.id.is_empty() {
        return Some(entry.id.clone());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rss_feed(items: &[(&str, &str, DateTime<FixedOffset>)]) -> String {
        let mut body = String::from(
            "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>Example Wire</title>",
        );
        for (title, link, date) in items {
            body.push_str(&format!(
                "<item><title>{title}</title><link>{link}</link>\
                 <description>&lt;p&gt;A sufficiently long summary body.&lt;/p&gt;</description>\
                 <pubDate>{}</pubDate></item>",
                date.to_rfc2822()
            ));
        }
        body.push_str("</channel></rss>");
        body
    }

    fn fetcher(cache_dir: &std::path::Path) -> Fetcher {
        let github = GitHubClient::new(cache_dir).unwrap();
        Fetcher::new(github, FocusLexicon::default()).unwrap()
    }

    #[test]
    fn freshness_window_boundary() {
        let now = now_seoul();
        assert!(is_recent(now - ChronoDuration::hours(35), now, 36.0));
        assert!(!is_recent(now - ChronoDuration::hours(37), now, 36.0));
        // Undated entries are stamped "now" and always pass
        assert!(is_recent(now, now, 36.0));
    }

    #[tokio::test]
    async fn stale_entries_are_dropped_and_fresh_ones_kept() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let now = now_seoul();
        let feed = rss_feed(&[
            ("Fresh story", "https://example.com/fresh", now - ChronoDuration::hours(2)),
            ("Stale story", "https://example.com/stale", now - ChronoDuration::hours(48)),
        ]);
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(feed))
            .mount(&server)
            .await;

        let mut config = SourceConfig::for_test("Example Wire");
        config.url = format!("{}/feed", server.uri());
        config.image_enable = Some(false);

        let articles = fetcher(dir.path()).fetch_source(&config).await.unwrap();
        assert_eq!(articles.len(), 1);

        let article = &articles[0];
        assert_eq!(article.title, "Fresh story");
        assert_eq!(article.link, "https://example.com/fresh");
        assert_eq!(article.origin, OriginType::Raw);
        assert_eq!(article.channel.as_deref(), Some("Example Wire"));
        assert!(article.summary.contains("sufficiently long summary"));
        assert!(!article.summary.contains("<p>"));
    }

    #[tokio::test]
    async fn input_and_output_caps_apply() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let now = now_seoul();
        let items: Vec<(String, String, DateTime<FixedOffset>)> = (0..10)
            .map(|i| {
                (
                    format!("Story {i}"),
                    format!("https://example.com/{i}"),
                    now - ChronoDuration::minutes(i),
                )
            })
            .collect();
        let refs: Vec<(&str, &str, DateTime<FixedOffset>)> = items
            .iter()
            .map(|(t, l, d)| (t.as_str(), l.as_str(), *d))
            .collect();
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss_feed(&refs)))
            .mount(&server)
            .await;

        let mut config = SourceConfig::for_test("Example Wire");
        config.url = format!("{}/feed", server.uri());
        config.image_enable = Some(false);
        config.input_count = Some(4);
        config.output_count = Some(2);

        let articles = fetcher(dir.path()).fetch_source(&config).await.unwrap();
        assert_eq!(articles.len(), 2);
    }

    #[tokio::test]
    async fn curated_rss_is_stamped_curated() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let now = now_seoul();
        let feed = rss_feed(&[("Picked story", "https://example.com/picked", now)]);
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(feed))
            .mount(&server)
            .await;

        let mut config = SourceConfig::for_test("Curator");
        config.url = format!("{}/feed", server.uri());
        config.source_type = "curated_rss".to_string();
        config.image_enable = Some(false);

        let articles = fetcher(dir.path()).fetch_source(&config).await.unwrap();
        assert_eq!(articles[0].origin, OriginType::Curated);
    }

    #[test]
    fn tco_links_in_quoted_lines_are_ignored() {
        let summary = "> quoted https://t.co/abc\nreal line https://t.co/xyz trailing";
        let found = summary
            .lines()
            .filter(|line| !line.starts_with('>'))
            .find_map(|line| TCO_LINK.find(line).map(|m| m.as_str()));
        assert_eq!(found, Some("https://t.co/xyz"));
    }
}
