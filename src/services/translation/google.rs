// Google Cloud Translation v2 client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::{TranslationError, TranslationResult};
use crate::core::types::{Language, TranslationEngine};
use crate::services::translation::http::send_with_retry;
use crate::services::translation::phrase::PhraseTranslator;

const GOOGLE_API_URL: &str = "https://translation.googleapis.com/language/translate/v2";

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'static str,
    target: &'static str,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
}

pub fn language_code(language: Language) -> &'static str {
    match language {
        Language::Japanese => "ja",
        Language::English => "en",
        Language::TraditionalChinese => "zh-TW",
    }
}

pub struct GoogleClient {
    http_client: reqwest::Client,
}

impl GoogleClient {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

fn extract_translation(body: &str) -> TranslationResult<String> {
    let response: TranslateResponse = serde_json::from_str(body)
        .map_err(|e| TranslationError::InvalidResponse(e.to_string()))?;
    response
        .data
        .translations
        .into_iter()
        .next()
        .map(|t| t.translated_text)
        .ok_or_else(|| TranslationError::InvalidResponse("empty translations array".into()))
}

#[async_trait]
impl PhraseTranslator for GoogleClient {
    fn engine(&self) -> TranslationEngine {
        TranslationEngine::Google
    }

    async fn translate_text(
        &self,
        text: &str,
        source: Language,
        target: Language,
        api_key: &str,
    ) -> TranslationResult<String> {
        let request = TranslateRequest {
            q: text,
            source: language_code(source),
            target: language_code(target),
            format: "text",
        };
        let builder = self
            .http_client
            .post(GOOGLE_API_URL)
            .query(&[("key", api_key)])
            .json(&request);
        let body = send_with_retry(builder, "Google").await?;
        extract_translation(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_codes() {
        assert_eq!(language_code(Language::TraditionalChinese), "zh-TW");
        assert_eq!(language_code(Language::Japanese), "ja");
    }

    #[test]
    fn test_extract_translation() {
        let body = r#"{"data":{"translations":[{"translatedText":"Bonjour"}]}}"#;
        assert_eq!(extract_translation(body).unwrap(), "Bonjour");
        assert!(matches!(
            extract_translation(r#"{"error":{"code":400}}"#),
            Err(TranslationError::InvalidResponse(_))
        ));
    }
}
