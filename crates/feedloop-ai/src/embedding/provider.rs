use async_trait::async_trait;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    pub timeout_secs: u64,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get embedding dimension.
    fn dimension(&self) -> usize;

    /// Get model name.
    fn model_name(&self) -> &str;

    /// Normalize text before embedding (optional).
    ///
    /// Whitespace and control characters both separate words, so
    /// `"a\nb"` becomes `"a b"`.
    fn normalize_text(&self, text: &str) -> String {
        text.split(|c: char| c.is_whitespace() || c.is_control())
            .filter(|word| !word.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopEmbedder;

    #[async_trait]
    impl EmbeddingProvider for NoopEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(Vec::new())
        }

        fn dimension(&self) -> usize {
            0
        }

        fn model_name(&self) -> &str {
            "noop"
        }
    }

    #[test]
    fn test_normalize_keeps_words_apart_across_line_breaks() {
        let embedder = NoopEmbedder;
        assert_eq!(embedder.normalize_text("a\nb"), "a b");
        assert_eq!(
            embedder.normalize_text("Export\nfails\ton login"),
            "Export fails on login"
        );
        assert_eq!(embedder.normalize_text("  Sync\r\n\u{7}broken  "), "Sync broken");
        assert_eq!(embedder.normalize_text("\n\t "), "");
    }
}
