use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::article::Article;

/// The rendered digest and where it was written.
pub struct RenderedDigest {
    pub path: PathBuf,
    pub content: String,
}

/// Render and write `dailyNews_<YYYY-MM-DD>.md` under the blog root.
/// Returns `None` (after logging) when there is nothing to render.
pub fn render_daily_digest(
    articles: &[Article],
    blog_root: &Path,
    now: DateTime<FixedOffset>,
) -> Result<Option<RenderedDigest>> {
    let mut tags: Vec<String> = Vec::new();
    let mut titles: Vec<&str> = Vec::new();
    for article in articles {
        if let Some(evaluation) = &article.evaluation {
            tags.extend(evaluation.tags.iter().cloned());
            titles.push(&evaluation.title);
        }
    }

    let body = articles_content(articles);
    if body.is_empty() {
        error!("articles content is empty");
        return Ok(None);
    }

    let description = titles.join("\n");
    let metadata = front_matter(&description, &tags, now);
    let guide = daily_guide(&titles);
    let content = format!("{metadata}{guide}{body}");

    std::fs::create_dir_all(blog_root)
        .with_context(|| format!("creating blog directory: {}", blog_root.display()))?;
    let path = blog_root.join(format!("dailyNews_{}.md", now.format("%Y-%m-%d")));
    std::fs::write(&path, &content)
        .with_context(|| format!("writing digest to {}", path.display()))?;
    info!(path = %path.display(), articles = titles.len(), "daily digest written");

    Ok(Some(RenderedDigest { path, content }))
}

/// YAML front matter: dated title, Seoul timestamp, newline-joined
/// description, and the tag list with `/` rewritten to `_`.
pub(crate) fn front_matter(description: &str, tags: &[String], now: DateTime<FixedOffset>) -> String {
    let title = format!("Daily News #{}", now.format("%Y-%m-%d"));

    let tags_field = if tags.is_empty() {
        "tags: []".to_string()
    } else {
        let unique: BTreeSet<String> = tags.iter().map(|tag| tag.replace('/', "_")).collect();
        let lines: Vec<String> = unique.iter().map(|tag| format!("- \"{tag}\"")).collect();
        format!("tags: \n{}", lines.join("\n"))
    };

    format!(
        "---\ntitle: \"{title}\"\ndate: \"{}\"\ndescription: \"{description}\"\n{tags_field}\n---\n",
        now.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Blockquote bullet list of every final title.
pub(crate) fn daily_guide(titles: &[&str]) -> String {
    let lines: String = titles.iter().map(|title| format!("> - {title}\n")).collect();
    format!("\n{lines}\n")
}

fn articles_content(articles: &[Article]) -> String {
    let mut content = String::new();
    for article in articles {
        let Some(evaluation) = &article.evaluation else {
            warn!(title = %article.title, "article reached renderer without an evaluation");
            continue;
        };

        let cover = if article.cover_url.is_empty() {
            String::new()
        } else {
            format!("![]({})", article.cover_url)
        };
        let insights = build_insight_lines(article);

        content.push_str(&format!(
            "\n### {}\n\n발행시간: {}\n{cover}\n{}\n{insights}\n",
            evaluation.title,
            article.date.format("%Y-%m-%d %H:%M:%S"),
            evaluation.summary,
        ));
    }
    content
}

/// Pick 3 of the filled insight fields (fewer when fewer are filled) and
/// render them through the fixed Korean templates. The RNG is seeded from
/// `title ⊕ "-" ⊕ date`, so rendering is reproducible.
pub(crate) fn build_insight_lines(article: &Article) -> String {
    let Some(evaluation) = &article.evaluation else {
        return String::new();
    };

    let available: Vec<(&str, &str)> = evaluation
        .insights()
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .collect();
    if available.is_empty() {
        return String::new();
    }

    let sample_count = available.len().min(3);
    let seed_source = format!(
        "{}-{}",
        evaluation.title,
        article.date.format("%Y-%m-%d %H:%M:%S")
    );
    let mut rng = seeded_rng(&seed_source);

    let sentences: Vec<String> = index::sample(&mut rng, available.len(), sample_count)
        .iter()
        .map(|pick| {
            let (key, value) = available[pick];
            insight_sentence(key, value)
        })
        .collect();

    format!("\n{}\n", sentences.join("\n"))
}

fn seeded_rng(seed_source: &str) -> StdRng {
    let digest = Sha256::digest(seed_source.as_bytes());
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);
    StdRng::from_seed(seed)
}

fn insight_sentence(key: &str, value: &str) -> String {
    let sentence = match key {
        "why_it_matters" => format!("이 소식이 중요한 이유는 {value}"),
        "key_evidence" => format!("구체적 근거로 {value}"),
        "who_should_care" => format!("특히 {value}에게 직접적인 도움이 됩니다"),
        "next_action" => format!("이후에는 {value}"),
        "comparison" => format!("경쟁 대비 차별점은 {value}"),
        _ => value.to_string(),
    };
    let sentence = sentence.trim();
    if sentence.ends_with("다.") || sentence.ends_with('다') {
        sentence.to_string()
    } else {
        format!("{}.", sentence.trim_end_matches('.'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::testing::evaluated;
    use chrono::TimeZone;
    use gray_matter::Matter;
    use gray_matter::engine::YAML;

    fn seoul_now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 12, 1, 9, 30, 0)
            .unwrap()
    }

    fn slate() -> Vec<Article> {
        let mut a = evaluated("모델 출시", "https://example.com/1", "Model", 4.5);
        {
            let e = a.evaluation.as_mut().unwrap();
            e.summary = "대형 모델이 공개되었습니다.".to_string();
            e.tags = vec!["ai/model".to_string(), "release".to_string()];
            e.why_it_matters = "업계 판도가 바뀝니다".to_string();
            e.key_evidence = "벤치마크 점수가 20% 올랐습니다".to_string();
            e.who_should_care = "모델 개발자".to_string();
            e.next_action = "다음 주에 API가 공개됩니다".to_string();
            e.comparison = "경쟁사 대비 두 배 빠릅니다".to_string();
        }
        a.cover_url = "https://cdn.example/cover.png".to_string();

        let mut b = evaluated("에이전트 소식", "https://example.com/2", "Agent", 3.9);
        b.evaluation.as_mut().unwrap().summary = "에이전트 프레임워크 업데이트.".to_string();
        vec![a, b]
    }

    #[test]
    fn rendering_is_byte_reproducible() {
        let articles = slate();
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();

        let first = render_daily_digest(&articles, dir_a.path(), seoul_now())
            .unwrap()
            .unwrap();
        let second = render_daily_digest(&articles, dir_b.path(), seoul_now())
            .unwrap()
            .unwrap();
        assert_eq!(first.content, second.content);
        assert!(first.path.ends_with("dailyNews_2025-12-01.md"));
    }

    #[test]
    fn front_matter_parses_with_rewritten_tags() {
        let articles: Vec<Article> = slate().into_iter().take(1).collect();
        let dir = tempfile::tempdir().unwrap();
        let digest = render_daily_digest(&articles, dir.path(), seoul_now())
            .unwrap()
            .unwrap();

        let matter = Matter::<YAML>::new();
        let parsed = matter.parse(&digest.content);
        let data = parsed.data.unwrap().as_hashmap().unwrap();
        assert_eq!(
            data["title"].as_string().unwrap(),
            "Daily News #2025-12-01"
        );
        assert_eq!(data["date"].as_string().unwrap(), "2025-12-01 09:30:00");

        // "/" in tags is rewritten for the site's tag routes
        assert!(digest.content.contains("- \"ai_model\""));
        assert!(digest.content.contains("- \"release\""));
        assert!(!digest.content.contains("ai/model"));
    }

    #[test]
    fn empty_tag_list_renders_as_empty_array() {
        let fm = front_matter("desc", &[], seoul_now());
        assert!(fm.contains("tags: []"));
    }

    #[test]
    fn guide_and_sections_carry_every_title() {
        let articles = slate();
        let dir = tempfile::tempdir().unwrap();
        let digest = render_daily_digest(&articles, dir.path(), seoul_now())
            .unwrap()
            .unwrap();

        assert!(digest.content.contains("> - 모델 출시"));
        assert!(digest.content.contains("> - 에이전트 소식"));
        assert!(digest.content.contains("### 모델 출시"));
        assert!(digest.content.contains("발행시간: 2025-12-01 09:00:00"));
        assert!(digest.content.contains("![](https://cdn.example/cover.png)"));
    }

    #[test]
    fn three_of_five_insights_are_selected() {
        let articles = slate();
        let lines = build_insight_lines(&articles[0]);
        let sentence_count = lines.trim().lines().count();
        assert_eq!(sentence_count, 3);
        // Every rendered sentence ends like a sentence
        for line in lines.trim().lines() {
            assert!(line.ends_with('.') || line.ends_with('다'), "bad line: {line}");
        }
    }

    #[test]
    fn fewer_filled_insights_sample_them_all() {
        let mut article = evaluated("단신", "https://example.com/3", "Other", 2.0);
        article.evaluation.as_mut().unwrap().why_it_matters = "이유".to_string();
        let lines = build_insight_lines(&article);
        assert_eq!(lines.trim().lines().count(), 1);
        assert!(lines.contains("이 소식이 중요한 이유는 이유."));
    }

    #[test]
    fn insight_selection_is_stable_for_the_same_seed() {
        let articles = slate();
        assert_eq!(
            build_insight_lines(&articles[0]),
            build_insight_lines(&articles[0])
        );
    }

    #[test]
    fn empty_slate_renders_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let rendered = render_daily_digest(&[], dir.path(), seoul_now()).unwrap();
        assert!(rendered.is_none());
    }
}
