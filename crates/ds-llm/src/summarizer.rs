use std::sync::Arc;

use async_trait::async_trait;
use ds_core::AnalysisKind;
use tracing::instrument;

use crate::{ChatModel, ChatRequest, DsError, Result};

/// 送入模型的最大字符数
pub const DEFAULT_MAX_INPUT_CHARS: usize = 24_000;

/// AI 派生文本（摘要、要点、情感分析）
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn analyze(&self, kind: AnalysisKind, title: Option<&str>, text: &str)
        -> Result<String>;

    fn name(&self) -> &str;
}

pub struct LlmSummarizer {
    chat: Arc<dyn ChatModel>,
    max_input_chars: usize,
}

impl LlmSummarizer {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self {
            chat,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }

    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars.max(1);
        self
    }

    fn instructions(kind: AnalysisKind) -> &'static str {
        match kind {
            AnalysisKind::Summary => {
                "You summarize documents. Reply with a concise summary of the document in plain prose."
            }
            AnalysisKind::BulletPoints => {
                "You extract the key points of documents. Reply with 3 to 8 bullet points, one per line, each starting with '- '."
            }
            AnalysisKind::Sentiment => {
                "You analyse the sentiment of documents. Reply with one of Positive, Negative, Neutral or Mixed on the first line, followed by a one-sentence justification."
            }
        }
    }

    fn prompt(&self, title: Option<&str>, text: &str) -> String {
        let body = match text.char_indices().nth(self.max_input_chars) {
            Some((cut, _)) => {
                tracing::warn!(
                    max_input_chars = self.max_input_chars,
                    "document exceeds model input budget, truncating"
                );
                &text[..cut]
            }
            None => text,
        };
        match title {
            Some(t) if !t.trim().is_empty() => format!("Title: {}\n\nDocument:\n{}", t, body),
            _ => format!("Document:\n{}", body),
        }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    #[instrument(skip(self, title, text), fields(provider = self.chat.provider(), kind = kind.as_str(), chars = text.len()))]
    async fn analyze(
        &self,
        kind: AnalysisKind,
        title: Option<&str>,
        text: &str,
    ) -> Result<String> {
        if text.trim().is_empty() {
            return Err(DsError::validation("Document text is empty"));
        }
        let prompt = self.prompt(title, text);
        let out = self
            .chat
            .complete(&ChatRequest::new(Self::instructions(kind), &prompt))
            .await?;
        Ok(out.trim().to_string())
    }

    fn name(&self) -> &str {
        "llm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingChat {
        prompts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChatModel for RecordingChat {
        async fn complete(&self, req: &ChatRequest<'_>) -> Result<String> {
            self.prompts
                .lock()
                .unwrap()
                .push((req.system.to_string(), req.prompt.to_string()));
            Ok("  result  \n".to_string())
        }

        fn provider(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_prompt_carries_title_and_trims_reply() {
        let chat = Arc::new(RecordingChat::default());
        let summarizer = LlmSummarizer::new(chat.clone());
        let out = summarizer
            .analyze(AnalysisKind::Summary, Some("Q3 report"), "revenue grew")
            .await
            .unwrap();
        assert_eq!(out, "result");

        let prompts = chat.prompts.lock().unwrap();
        assert!(prompts[0].0.contains("summary"));
        assert_eq!(prompts[0].1, "Title: Q3 report\n\nDocument:\nrevenue grew");
    }

    #[tokio::test]
    async fn test_long_input_is_truncated_and_empty_rejected() {
        let chat = Arc::new(RecordingChat::default());
        let summarizer = LlmSummarizer::new(chat.clone()).with_max_input_chars(5);
        summarizer
            .analyze(AnalysisKind::Sentiment, None, "abcdefghij")
            .await
            .unwrap();
        assert_eq!(chat.prompts.lock().unwrap()[0].1, "Document:\nabcde");

        let err = summarizer
            .analyze(AnalysisKind::BulletPoints, None, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, DsError::Validation { .. }));
    }
}
