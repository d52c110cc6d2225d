use std::sync::LazyLock;

use base64::Engine;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, error};
use url::Url;

use crate::github::GitHubClient;
use crate::media;

static CONTENT_TAGS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, p, code").expect("static selector"));
static FENCED_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("static regex"));
static PRE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<pre>.*?</pre>").expect("static regex"));
static CODE_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<code>.*?</code>").expect("static regex"));

/// Convert HTML to plain text: no inline images, tables, or emphasis.
/// Input that doesn't look like HTML passes through unchanged.
pub fn html_to_text(html: &str) -> String {
    if !html.contains('<') {
        return html.to_string();
    }
    html2text::config::plain()
        .string_from_read(html.as_bytes(), 200)
        .unwrap_or_else(|_| html.to_string())
}

/// Text of `h1/h2/p/code` tags whose first child is not itself a tag,
/// joined by newlines.
pub fn page_text(document: &Html) -> String {
    document
        .select(&CONTENT_TAGS)
        .filter(|el| el.first_child().is_none_or(|node| !node.value().is_element()))
        .map(|el| el.text().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fetch a web page and extract its text and primary media.
/// Fails softly to `(None, "")` on any HTTP or network error.
pub async fn fetch_web_page(client: &reqwest::Client, url: &str) -> (Option<String>, String) {
    let response = match client.get(url).send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            error!(url, status = response.status().as_u16(), "page fetch failed");
            return (None, String::new());
        }
        Err(e) => {
            error!(url, error = %e, "page fetch failed");
            return (None, String::new());
        }
    };

    let Ok(body) = response.text().await else {
        return (None, String::new());
    };

    let document = Html::parse_document(&body);
    let text = page_text(&document).trim().to_string();
    let cover = match Url::parse(url) {
        Ok(base) => media::primary_media(&document, &base),
        Err(_) => String::new(),
    };
    (Some(text), cover)
}

/// Follow a shortlink chain and return the final destination URL.
pub async fn resolve_short_link(client: &reqwest::Client, url: &str) -> Option<String> {
    match client.head(url).send().await {
        Ok(response) => Some(response.url().to_string()),
        Err(e) => {
            debug!(url, error = %e, "shortlink resolution failed");
            None
        }
    }
}

/// Fetch a repository README via the contents API and reduce it to plain
/// text, with fenced code blocks and `<pre>`/`<code>` stripped.
pub async fn fetch_github_readme(
    client: &reqwest::Client,
    github: &GitHubClient,
    repo_url: &str,
) -> Option<String> {
    let resolved = resolve_short_link(client, repo_url)
        .await
        .unwrap_or_else(|| repo_url.to_string());

    let trimmed = resolved.trim_end_matches('/');
    let mut segments = trimmed.rsplit('/');
    let repo = segments.next()?;
    let owner = segments.next()?;
    if owner.is_empty() || repo.is_empty() {
        error!(url = repo_url, "could not extract owner/repo from URL");
        return None;
    }

    let api_url = github.api_url(&format!("/repos/{owner}/{repo}/readme"));
    let payload = match github.get_json(&api_url).await {
        Ok(payload) => payload,
        Err(e) => {
            error!(url = repo_url, error = %e, "readme fetch failed");
            return None;
        }
    };

    let encoded = payload.get("content")?.as_str()?;
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let decoded = match base64::engine::general_purpose::STANDARD.decode(compact) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(url = repo_url, error = %e, "readme content was not valid base64");
            return None;
        }
    };
    let markdown = String::from_utf8_lossy(&decoded).to_string();
    Some(readme_to_text(&markdown))
}

/// markdown → HTML → plain text, dropping code along the way.
fn readme_to_text(markdown: &str) -> String {
    let without_fences = FENCED_CODE.replace_all(markdown, "");
    let parser = pulldown_cmark::Parser::new(&without_fences);
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, parser);

    let html = PRE_BLOCK.replace_all(&html, "");
    let html = CODE_SPAN.replace_all(&html, "");

    let document = Html::parse_document(&html);
    document
        .root_element()
        .text()
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(html_to_text("no markup here"), "no markup here");
    }

    #[test]
    fn html_is_flattened_without_emphasis() {
        let text = html_to_text("<p>Hello <strong>world</strong></p>");
        assert!(text.contains("Hello world"));
        assert!(!text.contains("<strong>"));
        assert!(!text.contains("**"));
    }

    #[test]
    fn page_text_skips_tags_wrapping_other_tags() {
        let html = r#"<html><body>
            <h1>Headline</h1>
            <p><span>wrapped</span> inner</p>
            <p>Plain paragraph</p>
            <code>let x = 1;</code>
            </body></html>"#;
        let document = Html::parse_document(html);
        let text = page_text(&document);
        assert!(text.contains("Headline"));
        assert!(text.contains("Plain paragraph"));
        assert!(text.contains("let x = 1;"));
        assert!(!text.contains("wrapped"));
    }

    #[test]
    fn readme_text_drops_code_blocks() {
        let markdown = "# Tool\n\nDoes things.\n\n```rust\nfn main() {}\n```\n\nUse `cargo run` to start.";
        let text = readme_to_text(markdown);
        assert!(text.contains("Tool"));
        assert!(text.contains("Does things."));
        assert!(!text.contains("fn main"));
        assert!(!text.contains("cargo run"));
    }
}
