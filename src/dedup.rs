use std::collections::HashMap;

use tracing::{debug, info, warn};
use url::Url;

use crate::article::{Article, OriginType};
use crate::config::DedupConfig;

/// Curated items whose normalized titles reach this similarity collide.
const TITLE_SIMILARITY_THRESHOLD: f64 = 0.85;

const TITLE_PUNCTUATION: &[char] = &[
    '.', ',', '!', '?', ';', ':', '(', ')', '[', ']', '{', '}', '"', '“', '”', '‘', '’', '—', '–',
    '-',
];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_lowercase();
    key.starts_with("utm_")
        || matches!(key.as_str(), "ref" | "source" | "fbclid" | "gclid" | "msclkid")
}

/// Lowercase scheme and host, drop the fragment and tracking query keys,
/// sort the remaining keys (first value per key). Unparseable URLs pass
/// through unchanged.
pub fn canonicalize_url(url: &str) -> String {
    if url.is_empty() {
        return String::new();
    }
    let Ok(mut parsed) = Url::parse(url) else {
        warn!(url, "failed to canonicalize URL");
        return url.to_string();
    };

    parsed.set_fragment(None);

    let mut pairs: Vec<(String, String)> = Vec::new();
    for (key, value) in parsed.query_pairs() {
        if is_tracking_param(&key) {
            continue;
        }
        if pairs.iter().any(|(seen, _)| *seen == *key) {
            continue;
        }
        pairs.push((key.into_owned(), value.into_owned()));
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in &pairs {
            serializer.append_pair(key, value);
        }
        let query = serializer.finish();
        parsed.set_query(Some(&query));
    }

    parsed.to_string()
}

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let replaced: String = lowered
        .chars()
        .map(|c| if TITLE_PUNCTUATION.contains(&c) { ' ' } else { c })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Similarity of normalized titles: 1.0 when equal, otherwise a
/// longest-common-subsequence ratio over characters.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let norm_a = normalize_title(a);
    let norm_b = normalize_title(b);
    if norm_a == norm_b {
        return 1.0;
    }
    let chars_a: Vec<char> = norm_a.chars().collect();
    let chars_b: Vec<char> = norm_b.chars().collect();
    if chars_a.is_empty() || chars_b.is_empty() {
        return 0.0;
    }
    let lcs = lcs_len(&chars_a, &chars_b);
    2.0 * lcs as f64 / (chars_a.len() + chars_b.len()) as f64
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    for &ch_a in a {
        let mut current = vec![0usize; b.len() + 1];
        for (j, &ch_b) in b.iter().enumerate() {
            current[j + 1] = if ch_a == ch_b {
                prev[j] + 1
            } else {
                current[j].max(prev[j + 1])
            };
        }
        prev = current;
    }
    prev[b.len()]
}

/// Total order for picking the survivor among duplicates: higher tier,
/// then curated over raw, then snapshot confidence, then focus score,
/// then the incumbent.
fn challenger_wins(incumbent: &Article, challenger: &Article) -> bool {
    let (tier_i, tier_c) = (incumbent.tier.priority(), challenger.tier.priority());
    if tier_c != tier_i {
        return tier_c > tier_i;
    }

    let curated_i = incumbent.origin == OriginType::Curated;
    let curated_c = challenger.origin == OriginType::Curated;
    if curated_c != curated_i {
        return curated_c;
    }

    let (conf_i, conf_c) = (
        incumbent.confidence.unwrap_or(0.0),
        challenger.confidence.unwrap_or(0.0),
    );
    if conf_c != conf_i {
        return conf_c > conf_i;
    }

    if challenger.focus != incumbent.focus {
        return challenger.focus > incumbent.focus;
    }

    false
}

fn display_title(article: &Article) -> String {
    if !article.title.is_empty() {
        article.title.clone()
    } else {
        article
            .evaluation
            .as_ref()
            .map(|e| e.title.clone())
            .unwrap_or_default()
    }
}

/// Swap a better duplicate into the slot the incumbent occupies, keeping
/// the URL map, the curated title map, and the output list consistent.
fn replace_slot(
    out: &mut [Article],
    seen_urls: &mut HashMap<String, usize>,
    seen_titles: &mut Vec<(String, usize)>,
    idx: usize,
    article: Article,
    canonical: String,
) {
    let old_canonical = canonicalize_url(&out[idx].link);
    if old_canonical != canonical {
        seen_urls.remove(&old_canonical);
    }
    seen_urls.insert(canonical, idx);

    if out[idx].origin == OriginType::Curated {
        seen_titles.retain(|(_, slot)| *slot != idx);
    }
    if article.origin == OriginType::Curated {
        let title = display_title(&article);
        if !title.is_empty() {
            seen_titles.push((normalize_title(&title), idx));
        }
    }

    out[idx] = article;
}

/// Deduplicate by canonical URL, and for curated items also by fuzzy
/// title match. The input is expected sorted by score descending, so the
/// incumbent of any collision is the highest-scored duplicate.
pub fn deduplicate(articles: Vec<Article>, config: &DedupConfig) -> Vec<Article> {
    if !config.enabled {
        info!("deduplication disabled in config");
        return articles;
    }

    let input_len = articles.len();
    let mut out: Vec<Article> = Vec::new();
    let mut seen_urls: HashMap<String, usize> = HashMap::new();
    // Curated-only, insertion order preserved so collisions resolve
    // against the earliest matching survivor
    let mut seen_titles: Vec<(String, usize)> = Vec::new();
    let mut url_duplicates = 0usize;
    let mut title_duplicates = 0usize;

    'next_article: for article in articles {
        if article.link.is_empty() {
            warn!(title = %article.title, "article missing URL, skipping");
            continue;
        }
        let title = display_title(&article);
        let canonical = canonicalize_url(&article.link);

        if let Some(&idx) = seen_urls.get(&canonical) {
            url_duplicates += 1;
            if challenger_wins(&out[idx], &article) {
                debug!(title = %title, tier = article.tier.as_str(), "URL duplicate replaced");
                replace_slot(&mut out, &mut seen_urls, &mut seen_titles, idx, article, canonical);
            } else {
                debug!(title = %title, "URL duplicate dropped, kept existing");
            }
            continue;
        }

        if article.origin == OriginType::Curated && !title.is_empty() {
            let normalized = normalize_title(&title);
            for entry in 0..seen_titles.len() {
                let idx = seen_titles[entry].1;
                let similarity = title_similarity(&title, &display_title(&out[idx]));
                if similarity >= TITLE_SIMILARITY_THRESHOLD {
                    title_duplicates += 1;
                    if challenger_wins(&out[idx], &article) {
                        debug!(title = %title, similarity, "title duplicate replaced");
                        replace_slot(&mut out, &mut seen_urls, &mut seen_titles, idx, article, canonical);
                    } else {
                        debug!(title = %title, similarity, "title duplicate dropped, kept existing");
                    }
                    continue 'next_article;
                }
            }
            seen_titles.push((normalized, out.len()));
        }

        seen_urls.insert(canonical, out.len());
        out.push(article);
    }

    info!(
        input = input_len,
        output = out.len(),
        url_duplicates,
        title_duplicates,
        "deduplication complete"
    );
    out
}
