//! Resilient result parser
//!
//! The analysis engine serializes floats with a writer that emits `NaN`,
//! `Infinity` and `-Infinity` as bare tokens (and sometimes as quoted strings
//! where a number was meant). Bare tokens are not valid JSON, so results are
//! parsed in up to three stages:
//!
//! 1. strict parse of the text as stored
//! 2. targeted rewrite of `: NaN`, `:"NaN"`, `: "NaN"` (plus the infinite
//!    forms) to `null`, then strict parse
//! 3. blanket rewrite of every `NaN` / `Infinity` token anywhere, leaving any
//!    surrounding quotes alone, then strict parse
//!
//! Stage 2 only touches exact value positions so string labels that merely
//! contain "NaN" survive. Stage 3 runs only when nothing narrower worked.
//! Every non-finite value comes out as `null`; callers cannot tell it apart
//! from an absent value.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::ResultPayload;

/// Characters of context logged on each side of a parse failure
const EXCERPT_RADIUS: usize = 50;

/// Exact value-position rewrites applied in stage 2, in order
const TARGETED_REPAIRS: &[(&str, &str)] = &[
    (": NaN", ": null"),
    (":\"NaN\"", ":null"),
    (": \"NaN\"", ": null"),
    (": -Infinity", ": null"),
    (": Infinity", ": null"),
];

/// Token rewrites applied anywhere in stage 3, in order. Quoted tokens keep
/// their quotes, so a `"NaN"` key becomes the valid key `"null"`.
const BLANKET_REPAIRS: &[(&str, &str)] = &[
    ("-Infinity", "null"),
    ("Infinity", "null"),
    ("NaN", "null"),
];

/// Result text that no stage could turn into JSON
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Carries the strict parser's error for the text as stored
    #[error("result payload is not valid JSON at line {line}, column {column}: {message}")]
    Unrecoverable {
        message: String,
        line: usize,
        column: usize,
    },
}

impl From<&serde_json::Error> for ParseError {
    fn from(e: &serde_json::Error) -> Self {
        ParseError::Unrecoverable {
            message: e.to_string(),
            line: e.line(),
            column: e.column(),
        }
    }
}

/// Stage that produced a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStage {
    Strict,
    Targeted,
    Blanket,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResult {
    pub payload: ResultPayload,
    pub stage: RepairStage,
}

/// Parse result text, repairing non-finite tokens when needed
pub fn parse(raw_text: &str) -> Result<ResultPayload, ParseError> {
    parse_with_report(raw_text).map(|parsed| parsed.payload)
}

/// Same as [`parse`], also reporting which stage succeeded
pub fn parse_with_report(raw_text: &str) -> Result<ParsedResult, ParseError> {
    let first_error = match serde_json::from_str::<Value>(raw_text) {
        Ok(payload) => {
            return Ok(ParsedResult {
                payload,
                stage: RepairStage::Strict,
            })
        }
        Err(e) => e,
    };

    let targeted = apply_repairs(raw_text, TARGETED_REPAIRS);
    let targeted_error = match serde_json::from_str::<Value>(&targeted) {
        Ok(payload) => {
            debug!(error = %first_error, "Repaired non-finite values at value positions");
            return Ok(ParsedResult {
                payload,
                stage: RepairStage::Targeted,
            });
        }
        Err(e) => e,
    };

    let excerpt = excerpt_around(
        &targeted,
        targeted_error.line(),
        targeted_error.column(),
        EXCERPT_RADIUS,
    );
    warn!(
        error = %targeted_error,
        excerpt = %excerpt,
        "Targeted repair insufficient, applying blanket substitution"
    );

    let blanket = apply_repairs(raw_text, BLANKET_REPAIRS);
    match serde_json::from_str::<Value>(&blanket) {
        Ok(payload) => Ok(ParsedResult {
            payload,
            stage: RepairStage::Blanket,
        }),
        Err(final_error) => {
            warn!(
                original_error = %first_error,
                final_error = %final_error,
                "Result payload unrecoverable"
            );
            Err(ParseError::from(&first_error))
        }
    }
}

fn apply_repairs(text: &str, repairs: &[(&str, &str)]) -> String {
    repairs
        .iter()
        .fold(text.to_string(), |acc, (from, to)| acc.replace(from, to))
}

/// Slice of `text` around a 1-based (line, column) position, for logs
fn excerpt_around(text: &str, line: usize, column: usize, radius: usize) -> String {
    let line_start: usize = text
        .split('\n')
        .take(line.saturating_sub(1))
        .map(|l| l.len() + 1)
        .sum();
    let offset = (line_start + column.saturating_sub(1)).min(text.len());

    let mut start = offset.saturating_sub(radius);
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (offset + radius).min(text.len());
    while !text.is_char_boundary(end) {
        end += 1;
    }

    text[start..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_text_returned_by_strict_stage() {
        let parsed = parse_with_report(r#"{"heart_rate": 72.5, "peaks": [1, 2, 3]}"#).unwrap();
        assert_eq!(parsed.stage, RepairStage::Strict);
        assert_eq!(parsed.payload, json!({"heart_rate": 72.5, "peaks": [1, 2, 3]}));
    }

    #[test]
    fn test_labels_containing_nan_untouched_when_valid() {
        let text = r#"{"label": "NaN-tagged channel", "note": "x: NaN", "q": "NaN"}"#;
        let parsed = parse_with_report(text).unwrap();
        assert_eq!(parsed.stage, RepairStage::Strict);
        assert_eq!(parsed.payload["label"], "NaN-tagged channel");
        assert_eq!(parsed.payload["note"], "x: NaN");
        assert_eq!(parsed.payload["q"], "NaN");
    }

    #[test]
    fn test_bare_nan_repaired_by_targeted_stage() {
        let parsed = parse_with_report(r#"{"sdnn": NaN, "rmssd": 41.2}"#).unwrap();
        assert_eq!(parsed.stage, RepairStage::Targeted);
        assert_eq!(parsed.payload, json!({"sdnn": null, "rmssd": 41.2}));
    }

    #[test]
    fn test_each_targeted_form_rewritten_independently() {
        assert_eq!(apply_repairs(r#"{"a": NaN}"#, TARGETED_REPAIRS), r#"{"a": null}"#);
        assert_eq!(apply_repairs(r#"{"a":"NaN"}"#, TARGETED_REPAIRS), r#"{"a":null}"#);
        assert_eq!(apply_repairs(r#"{"a": "NaN"}"#, TARGETED_REPAIRS), r#"{"a": null}"#);
    }

    #[test]
    fn test_quoted_forms_coerced_alongside_bare() {
        let compact = parse_with_report(r#"{"a":"NaN", "b": NaN}"#).unwrap();
        assert_eq!(compact.stage, RepairStage::Targeted);
        assert_eq!(compact.payload, json!({"a": null, "b": null}));

        let spaced = parse_with_report(r#"{"a": "NaN", "b": NaN}"#).unwrap();
        assert_eq!(spaced.stage, RepairStage::Targeted);
        assert_eq!(spaced.payload, json!({"a": null, "b": null}));
    }

    #[test]
    fn test_infinite_values_repaired() {
        let parsed = parse_with_report(r#"{"lf_hf": Infinity, "min": -Infinity}"#).unwrap();
        assert_eq!(parsed.stage, RepairStage::Targeted);
        assert_eq!(parsed.payload, json!({"lf_hf": null, "min": null}));
    }

    #[test]
    fn test_array_elements_need_blanket_stage() {
        let text = r#"{"signal": {"cleaned": [0.1, NaN, 0.3, Infinity]}, "hr": NaN}"#;
        let parsed = parse_with_report(text).unwrap();
        assert_eq!(parsed.stage, RepairStage::Blanket);
        assert_eq!(
            parsed.payload,
            json!({"signal": {"cleaned": [0.1, null, 0.3, null]}, "hr": null})
        );
    }

    #[test]
    fn test_compact_separators_need_blanket_stage() {
        let parsed = parse_with_report(r#"{"entropy":NaN,"values":[NaN,-Infinity]}"#).unwrap();
        assert_eq!(parsed.stage, RepairStage::Blanket);
        assert_eq!(parsed.payload, json!({"entropy": null, "values": [null, null]}));
    }

    #[test]
    fn test_nan_key_survives_blanket_stage() {
        let parsed = parse_with_report(r#"{"channels": {"NaN": [0.1, NaN]}}"#).unwrap();
        assert_eq!(parsed.stage, RepairStage::Blanket);
        assert_eq!(parsed.payload, json!({"channels": {"null": [0.1, null]}}));
    }

    #[test]
    fn test_quoted_tokens_in_arrays_become_strings() {
        let parsed = parse_with_report(r#"{"labels": ["NaN", "Infinity"], "v": [NaN]}"#).unwrap();
        assert_eq!(parsed.stage, RepairStage::Blanket);
        assert_eq!(parsed.payload, json!({"labels": ["null", "null"], "v": [null]}));
    }

    #[test]
    fn test_unbalanced_brace_is_unrecoverable() {
        let result = parse(r#"{"metadata": {"sampling_rate": 250}"#);
        match result {
            Err(ParseError::Unrecoverable { line, .. }) => assert_eq!(line, 1),
            other => panic!("expected unrecoverable error, got {:?}", other),
        }
    }

    #[test]
    fn test_unrecoverable_reports_original_error() {
        let text = "{\n  \"a\": NaN,\n  \"b\": [1, 2\n}";
        let original = serde_json::from_str::<Value>(text).unwrap_err();

        let err = parse(text).unwrap_err();
        assert_eq!(err, ParseError::from(&original));
        let ParseError::Unrecoverable { line, .. } = err;
        assert_eq!(line, 2);
    }

    #[test]
    fn test_empty_text_is_unrecoverable() {
        assert!(parse("").is_err());
    }

    #[test]
    fn test_excerpt_window_on_later_line() {
        let text = "{\n\"entropy\": oops\n}";
        let excerpt = excerpt_around(text, 2, 12, 4);
        assert_eq!(excerpt, "y\": oops");
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let text = "{\"µV\": ΩΩΩ}";
        // Window end lands inside 'Ω' and is widened to the next boundary
        let excerpt = excerpt_around(text, 1, 8, 2);
        assert_eq!(excerpt, "\": Ω");
    }
}
