//! Lead-sentence extractive model.
//!
//! A deterministic baseline: keeps whole leading sentences until the word
//! budget is met. `max_length` and `min_length` are read as word counts, the
//! way abstractive models read them as token counts.

use super::LocalModel;
use crate::error::ModelError;
use crate::types::{GenerationParams, Task};
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct ExtractiveModel;

impl ExtractiveModel {
    pub fn new() -> Self {
        Self
    }

    /// Split on sentence-final punctuation followed by whitespace.
    fn sentences(text: &str) -> Vec<&str> {
        let mut sentences = Vec::new();
        let mut start = 0;
        let mut chars = text.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if matches!(c, '.' | '!' | '?')
                && chars.peek().is_none_or(|(_, next)| next.is_whitespace())
            {
                let end = i + c.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = end;
            }
        }
        let tail = text[start..].trim();
        if !tail.is_empty() {
            sentences.push(tail);
        }
        sentences
    }

    /// Lead sentences of `text` within the `max_length` word budget.
    pub fn summarize(&self, text: &str, params: &GenerationParams) -> String {
        let max_words = params.max_length.max(1) as usize;
        let min_words = params.min_length as usize;

        let mut picked: Vec<&str> = Vec::new();
        let mut words = 0;
        for sentence in Self::sentences(text) {
            let count = sentence.split_whitespace().count();
            if words + count > max_words {
                if picked.is_empty() {
                    // A single oversized lead sentence is cut at the budget.
                    return sentence
                        .split_whitespace()
                        .take(max_words)
                        .collect::<Vec<_>>()
                        .join(" ");
                }
                break;
            }
            picked.push(sentence);
            words += count;
            if words >= min_words && picked.len() >= 3 {
                break;
            }
        }
        picked.join(" ")
    }
}

#[async_trait]
impl LocalModel for ExtractiveModel {
    fn supports(&self, task: Task) -> bool {
        task == Task::Summarize
    }

    async fn generate(
        &mut self,
        task: Task,
        text: &str,
        params: &GenerationParams,
    ) -> Result<String, ModelError> {
        match task {
            Task::Summarize => Ok(self.summarize(text, params)),
            other => Err(ModelError::UnsupportedTask {
                task: other.to_string(),
            }),
        }
    }
}
