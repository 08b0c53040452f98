// General-purpose OCR used when the Japanese pipeline fails or for other languages
// Backed by the Tesseract CLI in TSV mode

use async_trait::async_trait;
use image::DynamicImage;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::core::config::FallbackOcrConfig;
use crate::core::errors::{OcrError, OcrResult};
use crate::core::types::{Language, Rect, TextObservation};
use crate::utils::image_ops::encode_png_async;

/// Line-level recognizer producing raw observations in image pixel coordinates
#[async_trait]
pub trait FallbackOcr: Send + Sync {
    async fn recognize(
        &self,
        image: Arc<DynamicImage>,
        language: Language,
    ) -> OcrResult<Vec<TextObservation>>;
}

pub struct TesseractOcr {
    binary: String,
    min_confidence: f32,
}

impl TesseractOcr {
    pub fn new(config: &FallbackOcrConfig) -> Self {
        Self {
            binary: config.tesseract_bin.clone(),
            min_confidence: config.min_confidence,
        }
    }

    pub fn language_code(language: Language) -> &'static str {
        match language {
            Language::Japanese => "jpn",
            Language::English => "eng",
            Language::TraditionalChinese => "chi_tra",
        }
    }

    async fn run_tsv(&self, png: Vec<u8>, language: Language) -> OcrResult<String> {
        let mut child = Command::new(&self.binary)
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(Self::language_code(language))
            .arg("--psm")
            .arg("6")
            .arg("tsv")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                OcrError::FallbackFailed(format!("failed to run {} (is it installed?): {}", self.binary, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&png)
                .await
                .map_err(|e| OcrError::FallbackFailed(format!("failed to feed image: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| OcrError::FallbackFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::FallbackFailed(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl FallbackOcr for TesseractOcr {
    async fn recognize(
        &self,
        image: Arc<DynamicImage>,
        language: Language,
    ) -> OcrResult<Vec<TextObservation>> {
        let png = encode_png_async(image).await?;
        let tsv = self.run_tsv(png, language).await?;
        let observations = parse_tsv(&tsv, language, self.min_confidence);
        debug!("Tesseract produced {} line observations", observations.len());
        Ok(observations)
    }
}

struct Word {
    text: String,
    bbox: Rect,
    confidence: f32,
}

/// Group level-5 word rows into one observation per (page, block, paragraph, line).
///
/// Observations whose mean confidence is not above `min_confidence` are dropped.
pub fn parse_tsv(tsv: &str, language: Language, min_confidence: f32) -> Vec<TextObservation> {
    let mut lines: BTreeMap<(i32, i32, i32, i32), Vec<Word>> = BTreeMap::new();

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != 5 {
            continue;
        }
        let num = |i: usize| cols[i].parse::<i32>().unwrap_or(0);
        let dim = |i: usize| cols[i].parse::<f32>().unwrap_or(0.0);

        let confidence: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || confidence < 0.0 {
            continue;
        }

        lines
            .entry((num(1), num(2), num(3), num(4)))
            .or_default()
            .push(Word {
                text: text.to_string(),
                bbox: Rect::new(dim(6), dim(7), dim(8), dim(9)),
                confidence,
            });
    }

    let separator = if language.is_cjk() { "" } else { " " };

    lines
        .into_values()
        .filter_map(|words| {
            let first = words.first()?.bbox;
            let bbox = words.iter().skip(1).fold(first, |acc, w| acc.union(&w.bbox));
            let text = words
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(separator);
            let confidence =
                words.iter().map(|w| w.confidence).sum::<f32>() / words.len() as f32 / 100.0;

            (confidence > min_confidence).then_some(TextObservation {
                bbox,
                text,
                confidence,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn tsv(rows: &[&str]) -> String {
        let mut out = String::from(HEADER);
        for row in rows {
            out.push('\n');
            out.push_str(row);
        }
        out
    }

    #[test]
    fn test_groups_words_into_lines() {
        let input = tsv(&[
            "4\t1\t1\t1\t1\t0\t10\t10\t200\t30\t-1\t",
            "5\t1\t1\t1\t1\t1\t10\t10\t50\t30\t90\tHello",
            "5\t1\t1\t1\t1\t2\t70\t12\t60\t28\t80\tworld",
            "5\t1\t1\t1\t2\t1\t10\t60\t40\t30\t70\tBye",
        ]);
        let obs = parse_tsv(&input, Language::English, 0.15);
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].text, "Hello world");
        assert_eq!(obs[0].bbox, Rect::from_corners(10.0, 10.0, 130.0, 40.0));
        assert!((obs[0].confidence - 0.85).abs() < 1e-6);
        assert_eq!(obs[1].text, "Bye");
    }

    #[test]
    fn test_cjk_words_join_without_spaces() {
        let input = tsv(&[
            "5\t1\t1\t1\t1\t1\t0\t0\t20\t20\t95\tこん",
            "5\t1\t1\t1\t1\t2\t20\t0\t20\t20\t95\tにちは",
        ]);
        let obs = parse_tsv(&input, Language::Japanese, 0.15);
        assert_eq!(obs[0].text, "こんにちは");
    }

    #[test]
    fn test_low_confidence_lines_dropped() {
        let input = tsv(&[
            "5\t1\t1\t1\t1\t1\t0\t0\t20\t20\t15\tnoise",
            "5\t1\t1\t1\t2\t1\t0\t30\t20\t20\t60\tkept",
            "5\t1\t1\t1\t3\t1\t0\t60\t20\t20\t-1\tskipped",
        ]);
        let obs = parse_tsv(&input, Language::English, 0.15);
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].text, "kept");
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(TesseractOcr::language_code(Language::TraditionalChinese), "chi_tra");
        assert_eq!(TesseractOcr::language_code(Language::Japanese), "jpn");
    }

    #[tokio::test]
    async fn test_missing_binary_reports_fallback_failure() {
        let ocr = TesseractOcr::new(&FallbackOcrConfig {
            tesseract_bin: "/nonexistent/tesseract".to_string(),
            min_confidence: 0.15,
        });
        let image = Arc::new(DynamicImage::new_rgb8(8, 8));
        let err = ocr.recognize(image, Language::English).await.unwrap_err();
        assert!(matches!(err, OcrError::FallbackFailed(_)));
    }
}
