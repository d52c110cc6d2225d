use std::path::Path;

use tracing::debug;

use crate::article::Article;

/// Focus/nofocus keyword lists, loaded once at pipeline start and
/// read-only thereafter.
#[derive(Debug, Clone, Default)]
pub struct FocusLexicon {
    focus: Vec<String>,
    nofocus: Vec<String>,
    /// Minimum focus score a non-leading candidate needs to survive
    /// per-source selection. 0 is permissive.
    pub threshold: i32,
}

impl FocusLexicon {
    pub fn load(focus_path: &Path, nofocus_path: &Path, threshold: i32) -> Self {
        let lexicon = Self {
            focus: load_keywords(focus_path),
            nofocus: load_keywords(nofocus_path),
            threshold,
        };
        debug!(
            focus = lexicon.focus.len(),
            nofocus = lexicon.nofocus.len(),
            "focus lexicon loaded"
        );
        lexicon
    }

    /// Lexical pre-score: +2 per focus keyword occurring in the article
    /// text, -2 per nofocus keyword. The text is title, summary, source
    /// category, and channel title, lowercased.
    pub fn score(&self, article: &Article) -> i32 {
        let mut parts = vec![
            article.title.as_str(),
            article.summary.as_str(),
            article.config.category.as_str(),
        ];
        if let Some(ref channel) = article.channel {
            parts.push(channel);
        }
        let text = parts.join(" ").to_lowercase();

        let mut score = 0;
        for keyword in &self.focus {
            if text.contains(keyword.as_str()) {
                score += 2;
            }
        }
        for keyword in &self.nofocus {
            if text.contains(keyword.as_str()) {
                score -= 2;
            }
        }
        score
    }
}

/// One keyword per line, lowercased; blank lines and `#` comments are
/// skipped. A missing file yields an empty list.
fn load_keywords(path: &Path) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .map(|line| line.trim().to_lowercase())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

/// Per-source top-K: sort by (focus desc, date desc, title desc), always
/// keep the top item, then keep items at or above the threshold until
/// `limit` is reached.
pub fn select_top_articles(candidates: Vec<Article>, limit: usize, threshold: i32) -> Vec<Article> {
    if candidates.is_empty() {
        return candidates;
    }

    let mut sorted = candidates;
    sorted.sort_by(|a, b| {
        b.focus
            .cmp(&a.focus)
            .then_with(|| b.date.cmp(&a.date))
            .then_with(|| b.title.cmp(&a.title))
    });

    let mut iter = sorted.into_iter();
    let Some(top) = iter.next() else {
        return Vec::new();
    };
    let mut selected = vec![top];
    if limit <= 1 {
        return selected;
    }
    for article in iter {
        if selected.len() >= limit {
            break;
        }
        if article.focus >= threshold {
            selected.push(article);
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::testing::article;

    fn lexicon(focus: &[&str], nofocus: &[&str]) -> FocusLexicon {
        FocusLexicon {
            focus: focus.iter().map(|s| s.to_string()).collect(),
            nofocus: nofocus.iter().map(|s| s.to_string()).collect(),
            threshold: 0,
        }
    }

    #[test]
    fn keyword_hits_add_and_subtract_two() {
        let lex = lexicon(&["llm", "agent"], &["crypto"]);

        let mut a = article("LLM agents ship", "https://example.com/1");
        a.summary = "A crypto angle too".to_string();
        // +2 llm, +2 agent, -2 crypto
        assert_eq!(lex.score(&a), 2);

        let b = article("Nothing relevant", "https://example.com/2");
        assert_eq!(lex.score(&b), 0);
    }

    #[test]
    fn category_and_channel_count_toward_the_score() {
        let lex = lexicon(&["research"], &[]);
        let mut a = article("Plain title", "https://example.com/1");
        a.summary = "plain body".to_string();
        a.config.category = "Research".to_string();
        assert_eq!(lex.score(&a), 2);

        a.config.category = String::new();
        a.channel = Some("Research Weekly".to_string());
        assert_eq!(lex.score(&a), 2);
    }

    #[test]
    fn top_item_survives_even_below_threshold() {
        let mut a = article("a", "https://example.com/a");
        a.focus = -4;
        let mut b = article("b", "https://example.com/b");
        b.focus = -6;

        let selected = select_top_articles(vec![a, b], 3, 0);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].title, "a");
    }

    #[test]
    fn selection_respects_limit_and_threshold() {
        let mut articles = Vec::new();
        for (i, focus) in [4, 2, 0, -2].into_iter().enumerate() {
            let mut a = article(&format!("t{i}"), &format!("https://example.com/{i}"));
            a.focus = focus;
            articles.push(a);
        }

        let selected = select_top_articles(articles.clone(), 3, 0);
        let titles: Vec<_> = selected.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["t0", "t1", "t2"]);

        let selected = select_top_articles(articles, 4, 1);
        let titles: Vec<_> = selected.iter().map(|a| a.title.as_str()).collect();
        // -2 and 0 fall below threshold 1; leader always kept
        assert_eq!(titles, vec!["t0", "t1"]);
    }

    #[test]
    fn ties_break_by_date_then_title() {
        let mut a = article("alpha", "https://example.com/a");
        let mut b = article("beta", "https://example.com/b");
        a.focus = 2;
        b.focus = 2;

        let selected = select_top_articles(vec![a, b], 1, 0);
        // Same focus and date: reverse title order puts "beta" first
        assert_eq!(selected[0].title, "beta");
    }

    #[test]
    fn missing_keyword_files_yield_empty_lexicon() {
        let dir = tempfile::tempdir().unwrap();
        let lex = FocusLexicon::load(
            &dir.path().join("missing-focus.md"),
            &dir.path().join("missing-nofocus.md"),
            0,
        );
        let a = article("anything", "https://example.com/1");
        assert_eq!(lex.score(&a), 0);
    }

    #[test]
    fn keyword_files_skip_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let focus_path = dir.path().join("focus.md");
        std::fs::write(&focus_path, "# comment\n\nLLM\n  agent  \n").unwrap();
        let lex = FocusLexicon::load(&focus_path, &dir.path().join("none.md"), 0);

        let a = article("LLM agent news", "https://example.com/1");
        assert_eq!(lex.score(&a), 4);
    }
}
