// Batch prompt construction and response parsing for LLM backends

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::errors::{TranslationError, TranslationResult};
use crate::core::types::{BubbleCluster, Language, TranslatedBubble};

pub fn system_prompt(source: Language, target: Language) -> String {
    format!(
        "You are an expert manga translator. Translate speech bubble text from {} to {}.

Rules:
- Translate naturally as a manga reader would expect, preserving tone, emotion, and character voice.
- Maintain consistency in how characters address each other.
- Keep onomatopoeia translations natural in the target language.
- If the reading order of bubbles seems incorrect based on dialogue flow (e.g., an answer appears before its question), reorder them.

You will receive a JSON array of bubbles with their positions (x, y coordinates where origin is top-left).
Manga reads right-to-left, top-to-bottom.

Respond with ONLY a JSON array in this exact format:
[
  {{\"index\": 0, \"translation\": \"translated text here\"}},
  {{\"index\": 1, \"translation\": \"translated text here\"}}
]

The \"index\" field should reflect the corrected reading order (0 = first to read).
Do not include any other text outside the JSON array.",
        source.display_name(),
        target.display_name()
    )
}

#[derive(Debug, Serialize)]
struct PromptBubble<'a> {
    index: usize,
    x: i64,
    y: i64,
    width: i64,
    height: i64,
    text: &'a str,
}

/// JSON array of `{index, x, y, width, height, text}`, `index` being the position in `bubbles`
pub fn user_prompt(bubbles: &[BubbleCluster]) -> String {
    let items: Vec<PromptBubble> = bubbles
        .iter()
        .enumerate()
        .map(|(i, b)| PromptBubble {
            index: i,
            x: b.bbox.x as i64,
            y: b.bbox.y as i64,
            width: b.bbox.width as i64,
            height: b.bbox.height as i64,
            text: &b.text,
        })
        .collect();
    // Serializing plain structs of numbers and strings cannot fail
    serde_json::to_string_pretty(&items).unwrap_or_else(|_| "[]".to_string())
}

#[derive(Debug, Deserialize)]
struct ResponseItem {
    index: i64,
    translation: String,
}

fn strip_code_fences(text: &str) -> String {
    text.trim()
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Decode a `[{index, translation}]` response.
///
/// Each item's `index` selects the bubble at that position of `bubbles`; the result
/// carries that bubble's own index. Items pointing past the end are dropped.
pub fn parse_response(
    text: &str,
    bubbles: &[BubbleCluster],
) -> TranslationResult<Vec<TranslatedBubble>> {
    let cleaned = strip_code_fences(text);
    let items: Vec<ResponseItem> = serde_json::from_str(&cleaned)
        .map_err(|e| TranslationError::InvalidResponse(e.to_string()))?;

    Ok(items
        .into_iter()
        .filter_map(|item| {
            let Some(bubble) = usize::try_from(item.index)
                .ok()
                .and_then(|i| bubbles.get(i))
            else {
                warn!("LLM returned out-of-range index {}", item.index);
                return None;
            };
            Some(TranslatedBubble {
                bubble: bubble.clone(),
                translated_text: item.translation,
                index: bubble.index,
            })
        })
        .collect())
}

/// Pair non-blank response lines 1:1 with bubbles in order; never fails
pub fn fallback_parse(text: &str, bubbles: &[BubbleCluster]) -> Vec<TranslatedBubble> {
    text.trim()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .zip(bubbles)
        .map(|(line, bubble)| TranslatedBubble {
            bubble: bubble.clone(),
            translated_text: line.trim().to_string(),
            index: bubble.index,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Rect;

    fn bubbles(texts: &[&str]) -> Vec<BubbleCluster> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let mut b = BubbleCluster::new(
                    Rect::new(10.5 * i as f32, 20.0, 30.9, 40.0),
                    t.to_string(),
                    vec![],
                );
                b.index = i;
                b
            })
            .collect()
    }

    #[test]
    fn test_user_prompt_payload() {
        let prompt = user_prompt(&bubbles(&["「あ」", "い\"う"]));
        let parsed: serde_json::Value = serde_json::from_str(&prompt).unwrap();
        assert_eq!(parsed[1]["index"], 1);
        assert_eq!(parsed[1]["x"], 10);
        assert_eq!(parsed[1]["width"], 30);
        assert_eq!(parsed[1]["text"], "い\"う");
    }

    #[test]
    fn test_system_prompt_names_languages() {
        let prompt = system_prompt(Language::Japanese, Language::TraditionalChinese);
        assert!(prompt.contains("from Japanese to Traditional Chinese"));
        assert!(prompt.contains("{\"index\": 0, \"translation\""));
    }

    #[test]
    fn test_reordered_response_maps_index_to_original_slot() {
        let input = bubbles(&["question", "answer"]);
        let response = r#"[{"index":1,"translation":"B"},{"index":0,"translation":"A"}]"#;
        let mut result = parse_response(response, &input).unwrap();

        // presented order follows the response
        assert_eq!(result[0].bubble.text, "answer");
        assert_eq!(result[0].translated_text, "B");
        assert_eq!(result[0].index, 1);

        result.sort_by_key(|t| t.index);
        let pairs: Vec<_> = result
            .iter()
            .map(|t| (t.index, t.bubble.text.as_str(), t.translated_text.as_str()))
            .collect();
        assert_eq!(pairs, vec![(0, "question", "A"), (1, "answer", "B")]);
    }

    #[test]
    fn test_fenced_response_and_out_of_range() {
        let input = bubbles(&["a"]);
        let response = "```json\n[{\"index\":0,\"translation\":\"x\"},{\"index\":5,\"translation\":\"y\"}]\n```";
        let result = parse_response(response, &input).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].translated_text, "x");
    }

    #[test]
    fn test_negative_index_is_dropped_not_fatal() {
        let input = bubbles(&["a", "b"]);
        let response = r#"[{"index":-1,"translation":"junk"},{"index":0,"translation":"A"}]"#;
        let result = parse_response(response, &input).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].bubble.text, "a");
        assert_eq!(result[0].translated_text, "A");
        assert_eq!(result[0].index, 0);
    }

    #[test]
    fn test_malformed_response_is_error() {
        let err = parse_response("Sure! Here you go.", &bubbles(&["a"])).unwrap_err();
        assert!(matches!(err, TranslationError::InvalidResponse(_)));
    }

    #[test]
    fn test_fallback_pairs_lines_in_order() {
        let input = bubbles(&["a", "b", "c"]);
        let result = fallback_parse("  first  \n\n second\n", &input);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].translated_text, "first");
        assert_eq!(result[1].translated_text, "second");
        assert_eq!(result[1].index, 1);

        let result = fallback_parse("one\ntwo\nthree\nfour", &input[..1]);
        assert_eq!(result.len(), 1);
    }
}
