use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

/// URL fragments that suggest page chrome rather than article media.
const IMAGE_EXCLUDE_KEYWORDS: [&str; 7] = [
    "sprite",
    "spacer",
    "pixel",
    "logo",
    "icon",
    "avatar",
    "transparent",
];

const VALID_IMAGE_EXTENSIONS: [&str; 6] = [".jpg", ".jpeg", ".png", ".webp", ".gif", ".bmp"];

const IMG_CANDIDATE_ATTRS: [&str; 6] = [
    "data-src",
    "data-original",
    "data-lazy-src",
    "data-large-src",
    "srcset",
    "src",
];

fn selector(s: &'static str) -> Selector {
    Selector::parse(s).expect("static selector")
}

static IMG_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("img"));
static IMG_SRC_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("img[src]"));
static LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("link[rel]"));
static VIDEO_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("video"));
static VIDEO_SOURCE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("video source[src]"));

static META_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        r#"meta[property="og:image"]"#,
        r#"meta[name="og:image"]"#,
        r#"meta[property="og:image:secure_url"]"#,
        r#"meta[name="twitter:image"]"#,
        r#"meta[property="twitter:image"]"#,
        r#"meta[name="twitter:image:src"]"#,
        r#"meta[name="image"]"#,
    ]
    .iter()
    .map(|s| Selector::parse(s).expect("static selector"))
    .collect()
});

static PREFERRED_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "article img[src]",
        "main img[src]",
        ".post img[src]",
        ".entry-content img[src]",
        ".content img[src]",
    ]
    .iter()
    .map(|s| Selector::parse(s).expect("static selector"))
    .collect()
});

fn normalize_image_url(candidate: &str, base: Option<&Url>) -> String {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return String::new();
    }
    if let Some(base) = base
        && let Ok(joined) = base.join(candidate)
    {
        return joined.to_string();
    }
    candidate.to_string()
}

/// Accept standard image extensions, or URLs that advertise an image via
/// "image"/"format=" in the path; reject anything that looks like chrome.
pub fn looks_like_valid_image(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    let lower = url.to_lowercase();
    if IMAGE_EXCLUDE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return false;
    }
    if VALID_IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return true;
    }
    lower.contains("format=") || lower.contains("image")
}

fn first_srcset_entry(srcset: &str) -> &str {
    srcset
        .split(',')
        .next()
        .and_then(|part| part.split_whitespace().next())
        .unwrap_or("")
}

/// Media attachments on a feed entry: media:content / enclosures first,
/// thumbnails second.
pub fn image_from_entry(entry: &feed_rs::model::Entry, base: Option<&Url>) -> String {
    for media in &entry.media {
        for content in &media.content {
            if let Some(ref content_type) = content.content_type
                && !content_type.to_string().starts_with("image/")
            {
                continue;
            }
            if let Some(ref url) = content.url {
                let normalized = normalize_image_url(url.as_str(), base);
                if looks_like_valid_image(&normalized) {
                    return normalized;
                }
            }
        }
        for thumbnail in &media.thumbnails {
            let normalized = normalize_image_url(&thumbnail.image.uri, base);
            if looks_like_valid_image(&normalized) {
                return normalized;
            }
        }
    }
    String::new()
}

/// First usable `<img>` in an HTML snippet, preferring lazy-load
/// attributes and the first srcset entry over plain `src`.
pub fn image_from_html_snippet(html: &str, base: Option<&Url>) -> String {
    if html.is_empty() {
        return String::new();
    }
    let fragment = Html::parse_fragment(html);
    for img in fragment.select(&IMG_SELECTOR) {
        let mut candidate = None;
        for attr in IMG_CANDIDATE_ATTRS {
            if let Some(value) = img.value().attr(attr)
                && !value.is_empty()
            {
                candidate = Some(if attr == "srcset" {
                    first_srcset_entry(value).to_string()
                } else {
                    value.to_string()
                });
                break;
            }
        }
        if let Some(candidate) = candidate {
            let normalized = normalize_image_url(&candidate, base);
            if looks_like_valid_image(&normalized) {
                return normalized;
            }
        }
    }
    String::new()
}

/// Primary media of a full page: og:/twitter: meta tags, `link
/// rel=image_src`, article-content selectors, any `<img>`, then video
/// poster/src.
pub fn primary_media(document: &Html, base: &Url) -> String {
    for meta_selector in META_SELECTORS.iter() {
        if let Some(meta) = document.select(meta_selector).next()
            && let Some(content) = meta.value().attr("content")
        {
            let candidate = normalize_image_url(content, Some(base));
            if looks_like_valid_image(&candidate) {
                return candidate;
            }
        }
    }

    for link in document.select(&LINK_SELECTOR) {
        let rel_matches = link
            .value()
            .attr("rel")
            .is_some_and(|rel| rel.to_lowercase().contains("image_src"));
        if rel_matches && let Some(href) = link.value().attr("href") {
            let candidate = normalize_image_url(href, Some(base));
            if looks_like_valid_image(&candidate) {
                return candidate;
            }
        }
    }

    for preferred in PREFERRED_SELECTORS.iter() {
        if let Some(img) = document.select(preferred).next()
            && let Some(src) = img.value().attr("src")
        {
            let candidate = normalize_image_url(src, Some(base));
            if looks_like_valid_image(&candidate) {
                return candidate;
            }
        }
    }

    if let Some(img) = document.select(&IMG_SRC_SELECTOR).next()
        && let Some(src) = img.value().attr("src")
    {
        let candidate = normalize_image_url(src, Some(base));
        if looks_like_valid_image(&candidate) {
            return candidate;
        }
    }

    if let Some(video) = document.select(&VIDEO_SELECTOR).next() {
        if let Some(poster) = video.value().attr("poster") {
            return normalize_image_url(poster, Some(base));
        }
        if let Some(src) = video.value().attr("src") {
            return normalize_image_url(src, Some(base));
        }
        if let Some(source) = document.select(&VIDEO_SOURCE_SELECTOR).next()
            && let Some(src) = source.value().attr("src")
        {
            return normalize_image_url(src, Some(base));
        }
    }

    String::new()
}

/// Last-resort cover lookup: fetch the article page itself and scan it.
pub async fn fetch_image_from_page(client: &reqwest::Client, link: &str) -> String {
    let Ok(base) = Url::parse(link) else {
        return String::new();
    };
    let response = match client.get(link).send().await.and_then(|r| r.error_for_status()) {
        Ok(response) => response,
        Err(e) => {
            debug!(link, error = %e, "failed to fetch article page for image extraction");
            return String::new();
        }
    };
    let Ok(body) = response.text().await else {
        return String::new();
    };
    let document = Html::parse_document(&body);
    primary_media(&document, &base)
}
