// DeepL v2 translate client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::{TranslationError, TranslationResult};
use crate::core::types::{Language, TranslationEngine};
use crate::services::translation::http::send_with_retry;
use crate::services::translation::phrase::PhraseTranslator;

const DEEPL_API_URL: &str = "https://api-free.deepl.com/v2/translate";

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: [&'a str; 1],
    source_lang: &'static str,
    target_lang: &'static str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
}

pub fn language_code(language: Language) -> &'static str {
    match language {
        Language::Japanese => "JA",
        Language::English => "EN",
        Language::TraditionalChinese => "ZH-HANT",
    }
}

pub struct DeepLClient {
    http_client: reqwest::Client,
}

impl DeepLClient {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

fn extract_translation(body: &str) -> TranslationResult<String> {
    let response: TranslateResponse = serde_json::from_str(body)
        .map_err(|e| TranslationError::InvalidResponse(e.to_string()))?;
    response
        .translations
        .into_iter()
        .next()
        .map(|t| t.text)
        .ok_or_else(|| TranslationError::InvalidResponse("empty translations array".into()))
}

#[async_trait]
impl PhraseTranslator for DeepLClient {
    fn engine(&self) -> TranslationEngine {
        TranslationEngine::DeepL
    }

    async fn translate_text(
        &self,
        text: &str,
        source: Language,
        target: Language,
        api_key: &str,
    ) -> TranslationResult<String> {
        let request = TranslateRequest {
            text: [text],
            source_lang: language_code(source),
            target_lang: language_code(target),
        };
        let builder = self
            .http_client
            .post(DEEPL_API_URL)
            .header("Authorization", format!("DeepL-Auth-Key {}", api_key))
            .json(&request);
        let body = send_with_retry(builder, "DeepL").await?;
        extract_translation(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let request = TranslateRequest {
            text: ["こんにちは"],
            source_lang: language_code(Language::Japanese),
            target_lang: language_code(Language::TraditionalChinese),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["text"][0], "こんにちは");
        assert_eq!(json["source_lang"], "JA");
        assert_eq!(json["target_lang"], "ZH-HANT");
    }

    #[test]
    fn test_extract_translation() {
        let body = r#"{"translations":[{"detected_source_language":"JA","text":"Hello"}]}"#;
        assert_eq!(extract_translation(body).unwrap(), "Hello");
        assert!(extract_translation(r#"{"translations":[]}"#).is_err());
    }
}
