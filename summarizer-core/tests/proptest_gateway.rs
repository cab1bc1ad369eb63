//! Property-based tests for the gateway pipeline using proptest.

use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use summarizer_core::backends::ExtractiveModel;
use summarizer_core::composer::compose;
use summarizer_core::config::GatewayConfig;
use summarizer_core::{
    BackendError, BackendKind, BackendOutput, GenerationParams, InferenceRequest, MockBackend,
    ParamLimits, RequestGateway, Task,
};

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
        .block_on(future)
}

// --- Composer properties ---

proptest! {
    #[test]
    fn composed_lengths_match_actual_text(
        input in "\\PC{0,200}",
        generated in "\\s{0,3}\\PC{0,120}\\s{0,3}",
        claimed in proptest::option::of(0usize..10_000),
    ) {
        let output = BackendOutput { text: generated.clone(), reported_length: claimed };
        let result = compose(Task::Summarize, &input, output, None);
        prop_assert_eq!(result.input_length, input.chars().count());
        prop_assert_eq!(result.output_text.as_str(), generated.trim());
        prop_assert_eq!(result.output_length, generated.trim().chars().count());
    }
}

// --- Gateway properties ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn short_summaries_never_reach_backend(
        core in "[a-zA-Z0-9 ]{0,9}",
        padding in "[ \\t\\n]{0,5}",
    ) {
        let text = format!("{padding}{}{padding}", core.trim());
        prop_assume!(text.trim().chars().count() < 10);

        let backend = Arc::new(MockBackend::new(BackendKind::HostedApi));
        let gw = RequestGateway::new(backend.clone(), GatewayConfig::default());
        let result = block_on(gw.handle(InferenceRequest::summarize(text)));

        let is_invalid_input = matches!(result, Err(BackendError::InvalidInput { .. }));
        prop_assert!(is_invalid_input);
        prop_assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn gateway_lengths_ignore_backend_claims(
        text in "[a-zA-Z ]{10,200}",
        generated in "\\PC{0,80}",
        claimed in 0usize..5_000,
    ) {
        prop_assume!(text.trim().chars().count() >= 10);

        let backend = Arc::new(
            MockBackend::new(BackendKind::HostedApi)
                .with_response(&generated)
                .with_reported_length(claimed),
        );
        let gw = RequestGateway::new(backend.clone(), GatewayConfig::default());
        let result = block_on(gw.handle(InferenceRequest::summarize(text.clone()))).unwrap();

        prop_assert_eq!(result.input_length, text.chars().count());
        prop_assert_eq!(result.output_length, result.output_text.chars().count());
        prop_assert_eq!(backend.call_count(), 1);
    }
}

// --- Parameter merge properties ---

proptest! {
    #[test]
    fn merged_params_stay_within_limits(
        max_length in -10_000i64..10_000,
        min_length in -10_000i64..10_000,
        max_tokens in -10_000i64..100_000,
        temperature in -5.0f64..10.0,
    ) {
        let overrides: BTreeMap<String, serde_json::Value> = serde_json::from_value(json!({
            "max_length": max_length,
            "min_length": min_length,
            "max_tokens": max_tokens,
            "temperature": temperature,
        }))
        .unwrap();
        let limits = ParamLimits::default();
        let params = GenerationParams::merge(&overrides, &limits).unwrap();

        prop_assert!(params.max_length >= limits.max_length.min);
        prop_assert!(params.max_length <= limits.max_length.max);
        prop_assert!(params.min_length <= params.max_length);
        prop_assert!(params.max_tokens >= limits.max_tokens.min);
        prop_assert!(params.max_tokens <= limits.max_tokens.max);
        prop_assert!(params.temperature >= limits.temperature.min);
        prop_assert!(params.temperature <= limits.temperature.max);
    }
}

// --- Extractive model properties ---

proptest! {
    #[test]
    fn extractive_summary_respects_word_budget(
        sentences in proptest::collection::vec("[a-z]{1,8}( [a-z]{1,8}){0,12}\\.", 1..12),
        max_length in 1u32..60,
    ) {
        let text = sentences.join(" ");
        let params = GenerationParams { max_length, min_length: 0, ..GenerationParams::default() };
        let model = ExtractiveModel::new();
        let first = model.summarize(&text, &params);
        let second = model.summarize(&text, &params);

        prop_assert!(first.split_whitespace().count() <= max_length as usize);
        prop_assert_eq!(first, second);
    }
}
