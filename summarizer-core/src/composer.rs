//! Turns raw backend output into the normalized result.
//!
//! Lengths are always derived here from the text actually returned. Whatever
//! length the provider claims is logged and otherwise ignored.

use crate::types::{BackendOutput, InferenceResult, LanguagePair, Task};

/// Build the result for one successful inference call.
pub fn compose(
    task: Task,
    input: &str,
    output: BackendOutput,
    languages: Option<&LanguagePair>,
) -> InferenceResult {
    let output_text = output.text.trim().to_string();
    let output_length = output_text.chars().count();

    if let Some(claimed) = output.reported_length
        && claimed != output_length
    {
        tracing::debug!(
            claimed,
            actual = output_length,
            "Backend-reported length differs from generated text"
        );
    }

    let (source_lang, target_lang) = match (task, languages) {
        (Task::Translate, Some(pair)) => (Some(pair.source.clone()), Some(pair.target.clone())),
        _ => (None, None),
    };

    InferenceResult {
        output_text,
        input_length: input.chars().count(),
        output_length,
        source_lang,
        target_lang,
    }
}
