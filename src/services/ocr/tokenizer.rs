// WordPiece vocabulary for the recognizer's decoder output

use std::path::Path;
use tracing::debug;

use crate::core::errors::{OcrError, OcrResult};

pub const PAD_TOKEN_ID: usize = 0;
pub const UNK_TOKEN_ID: usize = 1;
/// Decoder start token ([CLS])
pub const START_TOKEN_ID: usize = 2;
/// End of sequence ([SEP])
pub const EOS_TOKEN_ID: usize = 3;

const UNK_TOKEN: &str = "[UNK]";
const CONTINUATION_PREFIX: &str = "##";

/// Id → token table loaded from `vocab.txt` (one token per line)
#[derive(Debug, Clone)]
pub struct Tokenizer {
    vocab: Vec<String>,
}

impl Tokenizer {
    pub fn from_file(path: &Path) -> OcrResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| OcrError::VocabNotFound(path.display().to_string()))?;
        let tokenizer = Self::from_vocab_str(&content);
        debug!("Loaded {} vocabulary entries", tokenizer.len());
        Ok(tokenizer)
    }

    /// Empty lines are skipped, so ids are line positions among non-empty lines
    pub fn from_vocab_str(content: &str) -> Self {
        let vocab = content
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self { vocab }
    }

    pub fn len(&self) -> usize {
        self.vocab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocab.is_empty()
    }

    /// Token ids → text.
    ///
    /// Special and unknown tokens are dropped, `##` continuations are glued on,
    /// then all whitespace is removed and `…` becomes `...`.
    pub fn decode(&self, ids: &[usize]) -> String {
        let mut text = String::new();
        for &id in ids {
            if matches!(id, PAD_TOKEN_ID | START_TOKEN_ID | EOS_TOKEN_ID) {
                continue;
            }
            let Some(token) = self.vocab.get(id) else {
                continue;
            };
            if token == UNK_TOKEN {
                continue;
            }
            text.push_str(token.strip_prefix(CONTINUATION_PREFIX).unwrap_or(token));
        }

        text.chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .replace('\u{2026}', "...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer() -> Tokenizer {
        Tokenizer::from_vocab_str("[PAD]\n[UNK]\n[CLS]\n[SEP]\n\nな\nに\n##か\n…\na b\n")
    }

    #[test]
    fn test_skips_blank_lines() {
        assert_eq!(tokenizer().len(), 9);
    }

    #[test]
    fn test_decode_drops_specials_and_unknown() {
        let t = tokenizer();
        assert_eq!(t.decode(&[2, 4, 1, 5, 6, 3, 0]), "なにか");
    }

    #[test]
    fn test_decode_normalizes_text() {
        let t = tokenizer();
        // whitespace inside tokens is removed, ellipsis expanded, out-of-range ignored
        assert_eq!(t.decode(&[2, 8, 4, 7, 999]), "abな...");
    }

    #[test]
    fn test_missing_vocab_file() {
        let err = Tokenizer::from_file(Path::new("/nonexistent/vocab.txt")).unwrap_err();
        assert!(matches!(err, OcrError::VocabNotFound(_)));
    }
}
