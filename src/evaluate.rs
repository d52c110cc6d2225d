use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::article::{Article, Evaluation};
use crate::llm::LlmProvider;

/// Minimum gap between per-source batches, to respect provider rate limits.
const BATCH_GAP: Duration = Duration::from_secs(2);

const EVALUATION_PROMPT_KO: &str = r#"당신은 AI 뉴스 큐레이터입니다. 아래에 여러 기사가 ```link: URL, content: 본문``` 형식으로 주어집니다.
각 기사를 평가하여 JSON 배열로만 응답하세요. 배열의 각 원소는 다음 필드를 모두 포함해야 합니다.

- link: 입력에 주어진 링크를 그대로 사용
- title: 한국어로 다듬은 제목 (이모지 금지)
- tags: 핵심 키워드 1~3개의 배열
- topic: Model | Agent | Infra | Research | Product | Policy | Other 중 하나
- impact: 0~5 (산업 파급력)
- novelty: 0~5 (새로움)
- proof: 0~5 (근거의 구체성)
- summary: 3~5문장의 한국어 요약
- why_it_matters: 이 소식이 중요한 이유 한 문장
- key_evidence: 구체적 근거 한 문장
- who_should_care: 주목해야 할 대상 한 문장
- next_action: 예상되는 다음 단계 한 문장
- comparison: 경쟁 대비 차별점 한 문장

JSON 외의 텍스트는 출력하지 마세요."#;

static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(" {2,}").expect("static regex"));
static HEADER_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(#{1,6})\s+").expect("static regex"));

/// The fixed Korean prompt, with an optional output-language hint from
/// `SUMMARY_LANGUAGE`.
pub fn build_prompt() -> String {
    let mut prompt = EVALUATION_PROMPT_KO.to_string();
    if let Ok(language) = std::env::var("SUMMARY_LANGUAGE")
        && !language.is_empty()
    {
        prompt.push_str(&format!(
            "\n\n제목과 요약, 인사이트 문장은 반드시 {language} 언어로 작성하세요."
        ));
    }
    prompt
}

/// Group candidates by source title and evaluate each group with one
/// provider call, attaching results back by link. Provider failures and
/// malformed elements are logged and skipped; affected articles simply
/// stay unevaluated.
pub async fn evaluate_articles(provider: &dyn LlmProvider, articles: &mut [Article]) {
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (idx, article) in articles.iter().enumerate() {
        if article.summary.is_empty() {
            continue;
        }
        let feed = article.feed_title().to_string();
        match groups.iter_mut().find(|(name, _)| *name == feed) {
            Some((_, indices)) => indices.push(idx),
            None => groups.push((feed, vec![idx])),
        }
    }

    let prompt = build_prompt();
    for (feed, indices) in groups {
        tokio::time::sleep(BATCH_GAP).await;

        let mut content = String::new();
        for &idx in &indices {
            content.push_str(&format!(
                "```link: {}, content:{}```.\n",
                articles[idx].link, articles[idx].summary
            ));
        }

        info!(feed = %feed, articles = indices.len(), "evaluating source batch");
        let response = match provider.request(&prompt, &content).await {
            Ok(response) => response,
            Err(e) => {
                warn!(feed = %feed, error = %e, "evaluation request failed, skipping batch");
                continue;
            }
        };

        let results = parse_llm_payload(&response);
        if results.is_empty() {
            warn!(feed = %feed, "no parseable evaluations in response");
            continue;
        }

        let mut attached = 0usize;
        for value in results {
            let mut evaluation: Evaluation = match serde_json::from_value(value) {
                Ok(evaluation) => evaluation,
                Err(e) => {
                    warn!(feed = %feed, error = %e, "skipping malformed evaluation element");
                    continue;
                }
            };
            if evaluation.title.is_empty() || evaluation.link.is_empty() {
                continue;
            }
            evaluation.title = clean_text(&evaluation.title);
            evaluation.summary = clean_text(&evaluation.summary);

            for &idx in &indices {
                if articles[idx].link == evaluation.link {
                    articles[idx].evaluation = Some(evaluation.clone());
                    attached += 1;
                }
            }
        }
        info!(feed = %feed, attached, "evaluations attached");
    }
}

/// The provider sometimes fences its JSON and sometimes returns a single
/// object instead of an array; strip fences first, then accept either.
pub(crate) fn parse_llm_payload(raw: &str) -> Vec<Value> {
    let text = raw.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text).trim();

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => items,
        Ok(value @ Value::Object(_)) => vec![value],
        Ok(_) => {
            warn!("LLM output was valid JSON but not an object or array");
            Vec::new()
        }
        Err(e) => {
            warn!(error = %e, "failed to parse LLM output as JSON");
            Vec::new()
        }
    }
}

fn is_emoji(c: char) -> bool {
    matches!(c as u32,
        0x1F600..=0x1F64F   // emoticons
        | 0x1F300..=0x1F5FF // symbols & pictographs
        | 0x1F680..=0x1F6FF // transport & map symbols
        | 0x1F700..=0x1F77F // alchemical symbols
        | 0x1F780..=0x1F7FF // geometric shapes extended
        | 0x1F800..=0x1F8FF // supplemental arrows
        | 0x1F900..=0x1F9FF // supplemental symbols and pictographs
        | 0x1FA00..=0x1FA6F // chess symbols
        | 0x1FA70..=0x1FAFF // symbols and pictographs extended-A
        | 0x2600..=0x26FF   // miscellaneous symbols
        | 0x2700..=0x27BF   // dingbats
        | 0xFE00..=0xFE0F   // variation selectors
        | 0x1F1E0..=0x1F1FF // flags
        | 0x2300..=0x23FF   // miscellaneous technical
        | 0x2B50..=0x2BFF   // stars
        | 0x200D            // zero width joiner
        | 0x1F004..=0x1F0CF // mahjong/playing cards
        | 0x1F18E
        | 0x1F191..=0x1F19A
        | 0x1F201..=0x1F251 // enclosed ideographic supplement
        | 0x203C | 0x2049
        | 0x25AA..=0x25FE   // geometric shapes
    )
}

/// Strip emoji codepoints, collapse repeated spaces, and normalize
/// markdown-header spacing.
pub(crate) fn clean_text(text: &str) -> String {
    let stripped: String = text.chars().filter(|c| !is_emoji(*c)).collect();
    let collapsed = MULTI_SPACE.replace_all(&stripped, " ");
    let normalized = HEADER_SPACE.replace_all(&collapsed, "$1 ");
    normalized.trim().to_string()
}
