use std::collections::BTreeMap;
use std::sync::Arc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::CorrectConfig;
use crate::error::{Result, KoseiError};
use super::aligner::repair_batch;
use super::service::{ChatMessage, CorrectionService};
use super::validator::validate_batch;

pub const SYSTEM_PROMPT: &str = "\
You are a professional subtitle proofreader.

You receive machine-transcribed subtitles as a JSON dictionary mapping \
position numbers to text lines. Fix speech recognition errors: wrong words, \
misspellings, missing punctuation and broken casing. Keep the original \
language; never translate. Preserve the original wording, length and line \
structure as much as possible, and never merge or split entries.

Return ONLY a JSON dictionary with exactly the same keys as the input, where \
each value is the corrected text for that position.";

/// Per-batch correction loop: call the service, parse, validate, and either
/// accept (with alignment repair) or feed the failure back and retry. Bounded
/// by `max_attempts`; validation failures never raise.
pub struct BatchCorrector {
    service: Arc<dyn CorrectionService>,
    config: CorrectConfig,
}

impl BatchCorrector {
    pub fn new(service: Arc<dyn CorrectionService>, config: CorrectConfig) -> Self {
        Self { service, config }
    }

    /// Correct one batch. Returns the accepted (aligned) candidate, or a
    /// best-effort repair of the last parsed candidate when attempts run
    /// out. Errors only when the service itself fails or no attempt ever
    /// produced a parseable dictionary; the orchestrator turns either case
    /// into an original-batch substitution.
    pub async fn run(
        &self,
        batch: &BTreeMap<usize, String>,
        reference: Option<&str>,
    ) -> Result<BTreeMap<usize, String>> {
        let mut messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_user_prompt(batch, reference)),
        ];

        let max_attempts = self.config.max_attempts.max(1);
        let mut last_parsed: Option<BTreeMap<usize, String>> = None;

        for attempt in 1..=max_attempts {
            let response = self.service.complete(&messages).await?;

            match parse_correction(&response) {
                Ok(candidate) => {
                    let validation = validate_batch(batch, &candidate, &self.config);
                    if validation.is_valid {
                        return Ok(repair_batch(batch, &candidate));
                    }

                    warn!(
                        "Batch validation failed (attempt {}/{}): {}",
                        attempt, max_attempts, validation.feedback
                    );
                    if attempt < max_attempts {
                        messages.push(ChatMessage::assistant(&response));
                        messages.push(ChatMessage::user(format!(
                            "Validation failed: {}\nPlease fix the errors and output ONLY a valid JSON dictionary.",
                            validation.feedback
                        )));
                    }
                    last_parsed = Some(candidate);
                }
                Err(e) => {
                    warn!(
                        "Batch response did not parse (attempt {}/{}): {}",
                        attempt, max_attempts, e
                    );
                    if attempt == max_attempts && last_parsed.is_none() {
                        return Err(e);
                    }
                    if attempt < max_attempts {
                        messages.push(ChatMessage::assistant(&response));
                        messages.push(ChatMessage::user(
                            "Your response could not be parsed as a JSON dictionary. \
                             Return ONLY a valid JSON dictionary mapping every position \
                             to its corrected text."
                                .to_string(),
                        ));
                    }
                }
            }
        }

        warn!(
            "Reached max attempts ({}), returning best effort result",
            max_attempts
        );
        Ok(match last_parsed {
            Some(candidate) => repair_batch(batch, &candidate),
            None => batch.clone(),
        })
    }
}

/// Serialize the batch into the user message, with optional free-form
/// reference context appended.
fn build_user_prompt(batch: &BTreeMap<usize, String>, reference: Option<&str>) -> String {
    let entries: serde_json::Map<String, Value> = batch
        .iter()
        .map(|(position, text)| (position.to_string(), Value::String(text.clone())))
        .collect();
    let payload = Value::Object(entries).to_string();

    let mut prompt = format!(
        "Correct the following subtitles. Keep the original language, do not translate:\n\
         <input_subtitle>{}</input_subtitle>",
        payload
    );
    if let Some(reference) = reference {
        if !reference.trim().is_empty() {
            prompt.push_str(&format!(
                "\nReference content:\n<reference>{}</reference>",
                reference
            ));
        }
    }
    prompt
}

/// Best-effort structured parse of a correction response.
///
/// Tolerates markdown code fences, stray prose around the JSON object and
/// trailing commas. Numeric string keys become positions; anything without a
/// numeric key is dropped (the validator then reports it as missing). An
/// empty or non-object result is a parse failure.
pub fn parse_correction(response: &str) -> Result<BTreeMap<usize, String>> {
    let text = strip_code_fences(response.trim());

    let object = parse_object(text)
        .or_else(|| extract_braced(text).and_then(|inner| parse_object(inner)))
        .ok_or_else(|| {
            KoseiError::Parse(format!(
                "expected a JSON dictionary, got: {}",
                truncate(response, 200)
            ))
        })?;

    let mut batch = BTreeMap::new();
    for (key, value) in object {
        let Ok(position) = key.trim().parse::<usize>() else {
            debug!("Dropping non-numeric key '{}' from correction response", key);
            continue;
        };
        let text = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        batch.insert(position, text);
    }

    if batch.is_empty() {
        return Err(KoseiError::Parse(
            "correction response contained no positions".to_string(),
        ));
    }
    Ok(batch)
}

fn parse_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    let attempt = |s: &str| match serde_json::from_str::<Value>(s) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    };

    attempt(text).or_else(|| attempt(&strip_trailing_commas(text)))
}

/// Slice out the outermost `{ ... }` from mixed prose.
fn extract_braced(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    for fence in ["```json", "```"] {
        if let Some(inner) = text.strip_prefix(fence) {
            if let Some(inner) = inner.strip_suffix("```") {
                return inner.trim();
            }
        }
    }
    text
}

/// Remove commas that directly precede a closing brace or bracket, outside of
/// string literals.
fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '}' | ']' => {
                while out.ends_with([',', ' ', '\t', '\n', '\r']) {
                    let trailing = out.trim_end_matches([' ', '\t', '\n', '\r']);
                    if trailing.ends_with(',') {
                        out.truncate(trailing.len() - 1);
                    } else {
                        break;
                    }
                }
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }

    out
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correct::service::MockCorrectionService;
    use mockall::Sequence;

    fn config() -> CorrectConfig {
        crate::config::Config::default().correct
    }

    fn batch(entries: &[(usize, &str)]) -> BTreeMap<usize, String> {
        entries.iter().map(|&(k, v)| (k, v.to_string())).collect()
    }

    #[test]
    fn test_parse_plain_object() {
        let parsed = parse_correction(r#"{"1": "Hello", "2": "World"}"#).unwrap();
        assert_eq!(parsed, batch(&[(1, "Hello"), (2, "World")]));
    }

    #[test]
    fn test_parse_code_fence() {
        let parsed = parse_correction("```json\n{\"1\": \"Hello\"}\n```").unwrap();
        assert_eq!(parsed, batch(&[(1, "Hello")]));
    }

    #[test]
    fn test_parse_stray_text_and_trailing_comma() {
        let response = "Here is the corrected version:\n{\"1\": \"Hello\", \"2\": \"World\",}\nHope that helps!";
        let parsed = parse_correction(response).unwrap();
        assert_eq!(parsed, batch(&[(1, "Hello"), (2, "World")]));
    }

    #[test]
    fn test_parse_drops_non_numeric_keys() {
        let parsed = parse_correction(r#"{"1": "Hello", "note": "done"}"#).unwrap();
        assert_eq!(parsed, batch(&[(1, "Hello")]));
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(parse_correction(r#"["a", "b"]"#).is_err());
        assert!(parse_correction("no json here").is_err());
        assert!(parse_correction("{}").is_err());
    }

    #[test]
    fn test_strip_trailing_commas_respects_strings() {
        let input = r#"{"1": "a, }", "2": "b",}"#;
        let stripped = strip_trailing_commas(input);
        assert_eq!(stripped, r#"{"1": "a, }", "2": "b"}"#);
    }

    #[test]
    fn test_user_prompt_includes_reference() {
        let prompt = build_user_prompt(&batch(&[(1, "hi")]), Some("episode context"));
        assert!(prompt.contains("<input_subtitle>"));
        assert!(prompt.contains("\"1\":\"hi\""));
        assert!(prompt.contains("<reference>episode context</reference>"));
    }

    #[tokio::test]
    async fn test_accepts_valid_first_response() {
        let mut service = MockCorrectionService::new();
        service
            .expect_complete()
            .times(1)
            .returning(|_| Ok(r#"{"1": "Hello world", "2": "This is a test"}"#.to_string()));

        let original = batch(&[(1, "Hello wrld"), (2, "This is a tst")]);
        let corrector = BatchCorrector::new(Arc::new(service), config());
        let result = corrector.run(&original, None).await.unwrap();

        assert_eq!(result, batch(&[(1, "Hello world"), (2, "This is a test")]));
    }

    #[tokio::test]
    async fn test_retries_after_key_mismatch_with_feedback() {
        let mut service = MockCorrectionService::new();
        let mut seq = Sequence::new();

        service
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(r#"{"1": "Hello world"}"#.to_string()));
        service
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|messages| {
                let last = messages.last().unwrap();
                last.role == "user" && last.content.contains("Missing keys: [2]")
            })
            .returning(|_| Ok(r#"{"1": "Hello world", "2": "This is a test"}"#.to_string()));

        let original = batch(&[(1, "Hello wrld"), (2, "This is a tst")]);
        let corrector = BatchCorrector::new(Arc::new(service), config());
        let result = corrector.run(&original, None).await.unwrap();

        assert_eq!(result, batch(&[(1, "Hello world"), (2, "This is a test")]));
    }

    #[tokio::test]
    async fn test_exhausted_attempts_return_last_parsed_candidate() {
        // Every attempt parses but drops a key, so validation never passes.
        let mut service = MockCorrectionService::new();
        service
            .expect_complete()
            .times(3)
            .returning(|_| Ok(r#"{"1": "Hello world"}"#.to_string()));

        let original = batch(&[(1, "Hello wrld"), (2, "This is a tst")]);
        let corrector = BatchCorrector::new(Arc::new(service), config());
        let result = corrector.run(&original, None).await.unwrap();

        // Best effort: the last parsed candidate, repaired. No exception.
        assert_eq!(result.get(&1).map(String::as_str), Some("Hello world"));
    }

    #[tokio::test]
    async fn test_nothing_ever_parsed_propagates_parse_error() {
        let mut service = MockCorrectionService::new();
        service
            .expect_complete()
            .times(3)
            .returning(|_| Ok("not json at all".to_string()));

        let original = batch(&[(1, "Hello")]);
        let corrector = BatchCorrector::new(Arc::new(service), config());
        let result = corrector.run(&original, None).await;

        assert!(matches!(result, Err(KoseiError::Parse(_))));
    }

    #[tokio::test]
    async fn test_parse_failure_then_success() {
        let mut service = MockCorrectionService::new();
        let mut seq = Sequence::new();

        service
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("garbage".to_string()));
        service
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|messages| {
                messages
                    .last()
                    .unwrap()
                    .content
                    .contains("could not be parsed")
            })
            .returning(|_| Ok(r#"{"1": "Hello"}"#.to_string()));

        let original = batch(&[(1, "Helo")]);
        let corrector = BatchCorrector::new(Arc::new(service), config());
        let result = corrector.run(&original, None).await.unwrap();

        assert_eq!(result, batch(&[(1, "Hello")]));
    }

    #[tokio::test]
    async fn test_service_error_propagates() {
        let mut service = MockCorrectionService::new();
        service
            .expect_complete()
            .times(1)
            .returning(|_| Err(KoseiError::Correction("connection refused".to_string())));

        let original = batch(&[(1, "Hello")]);
        let corrector = BatchCorrector::new(Arc::new(service), config());
        let result = corrector.run(&original, None).await;

        assert!(matches!(result, Err(KoseiError::Correction(_))));
    }
}
