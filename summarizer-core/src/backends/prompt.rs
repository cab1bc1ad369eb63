//! Instruction prompts for generative backends.

use crate::types::{LanguagePair, Task};

pub(crate) fn build(task: Task, text: &str, languages: &LanguagePair) -> String {
    match task {
        Task::Summarize => {
            format!("Summarize the following text in 2-3 clear sentences:\n\n{text}")
        }
        Task::Translate => format!(
            "Translate the following {} text to {}. Reply with the translation only:\n\n{text}",
            languages.source, languages.target
        ),
    }
}
