//! Strategies for finding a JSON object in model output.
//!
//! Models wrap JSON in prose ("Sure! Here it is: {...}") often enough that
//! a strict parse alone rejects usable answers. Extraction is a chain of
//! strategies tried in order; the validator records which one succeeded.
//! Swap the chain to make the policy stricter or looser without touching
//! the validator's control flow.

use serde_json::Value;

use super::result::JsonObject;

/// A JSON object found in raw text.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    /// The parsed object
    pub object: JsonObject,

    /// Character offset of the opening brace in the raw text
    pub offset: usize,
}

/// One way of turning raw text into a JSON object.
pub trait ExtractionStrategy: Send + Sync {
    /// Short name recorded in validation steps.
    fn name(&self) -> &'static str;

    /// Try to extract an object. `Err` carries a human-readable reason.
    fn extract(&self, text: &str) -> Result<Extracted, String>;
}

/// Parse the whole (trimmed) text as one JSON object.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictParse;

impl ExtractionStrategy for StrictParse {
    fn name(&self) -> &'static str {
        "strict parse"
    }

    fn extract(&self, text: &str) -> Result<Extracted, String> {
        let trimmed = text.trim_start();
        let offset = text[..text.len() - trimmed.len()].chars().count();

        match serde_json::from_str::<Value>(trimmed.trim_end()) {
            Ok(Value::Object(object)) => Ok(Extracted { object, offset }),
            Ok(other) => Err(format!("expected a JSON object, found {}", kind(&other))),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Find the first balanced `{ ... }` span that parses as an object.
///
/// Braces are paired in one pass with a stack; string literals inside an
/// open span are skipped, so quoted braces do not end the span early.
/// Candidates are tried left to right, which yields the outermost object
/// of the first parseable span.
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketMatch;

impl ExtractionStrategy for BracketMatch {
    fn name(&self) -> &'static str {
        "bracket match"
    }

    fn extract(&self, text: &str) -> Result<Extracted, String> {
        let mut last_error = None;

        for (start, end) in balanced_spans(text.as_bytes()) {
            // Both ends are ASCII, so the slice is on char boundaries.
            match serde_json::from_str::<Value>(&text[start..=end]) {
                Ok(Value::Object(object)) => {
                    return Ok(Extracted {
                        object,
                        offset: text[..start].chars().count(),
                    });
                }
                Ok(_) => {}
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        Err(match last_error {
            Some(e) => format!("no parseable JSON object found ({e})"),
            None => "no JSON object found in text".to_string(),
        })
    }
}

/// Byte ranges of every balanced `{ ... }` span, ordered by start.
/// Unmatched braces on either side are ignored.
fn balanced_spans(bytes: &[u8]) -> Vec<(usize, usize)> {
    let mut open = Vec::new();
    let mut spans = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' if !open.is_empty() => in_string = true,
            b'{' => open.push(i),
            b'}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, i));
                }
            }
            _ => {}
        }
    }

    spans.sort_unstable_by_key(|&(start, _)| start);
    spans
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The default chain: strict parse, then bracket matching.
pub fn default_strategies() -> Vec<Box<dyn ExtractionStrategy>> {
    vec![Box::new(StrictParse), Box::new(BracketMatch)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_parse_object() {
        let extracted = StrictParse.extract("  {\"a\": 1}\n").unwrap();
        assert_eq!(extracted.object["a"], 1);
        assert_eq!(extracted.offset, 2);
    }

    #[test]
    fn test_strict_parse_rejects_array() {
        let err = StrictParse.extract("[1, 2]").unwrap_err();
        assert_eq!(err, "expected a JSON object, found an array");
    }

    #[test]
    fn test_strict_parse_rejects_prose() {
        assert!(StrictParse.extract("I think {\"a\": 1}").is_err());
    }

    #[test]
    fn test_bracket_match_with_prose() {
        let text = r#"I think the answer is {"name":"Bob"}"#;
        let extracted = BracketMatch.extract(text).unwrap();
        assert_eq!(extracted.object["name"], "Bob");
        assert_eq!(extracted.offset, 22);
    }

    #[test]
    fn test_bracket_match_nested_and_trailing_text() {
        let text = r#"Result: {"person": {"name": "Ann"}, "ok": true} -- done"#;
        let extracted = BracketMatch.extract(text).unwrap();
        assert_eq!(extracted.object["person"]["name"], "Ann");
        assert_eq!(extracted.object["ok"], true);
    }

    #[test]
    fn test_bracket_match_ignores_braces_in_strings() {
        let text = r#"x {"note": "a } inside", "n": 2} y"#;
        let extracted = BracketMatch.extract(text).unwrap();
        assert_eq!(extracted.object["note"], "a } inside");
        assert_eq!(extracted.object["n"], 2);
    }

    #[test]
    fn test_bracket_match_handles_escaped_quotes() {
        let text = r#"{"q": "say \"hi\" {"}"#;
        let extracted = BracketMatch.extract(text).unwrap();
        assert_eq!(extracted.object["q"], "say \"hi\" {");
    }

    #[test]
    fn test_bracket_match_skips_invalid_candidate() {
        let text = r#"{not json} then {"a": 1}"#;
        let extracted = BracketMatch.extract(text).unwrap();
        assert_eq!(extracted.object["a"], 1);
        assert_eq!(extracted.offset, 16);
    }

    #[test]
    fn test_bracket_match_counts_chars_not_bytes() {
        let text = "héllo {\"a\": 1}";
        let extracted = BracketMatch.extract(text).unwrap();
        assert_eq!(extracted.offset, 6);
    }

    #[test]
    fn test_bracket_match_no_object() {
        let err = BracketMatch.extract("no braces here").unwrap_err();
        assert_eq!(err, "no JSON object found in text");
    }

    #[test]
    fn test_bracket_match_unbalanced() {
        assert!(BracketMatch.extract("{\"a\": 1").is_err());
    }

    #[test]
    fn test_bracket_match_unmatched_open_before_object() {
        let text = r#"{ oops {"a": 1} and {"b": 2}"#;
        let extracted = BracketMatch.extract(text).unwrap();
        assert_eq!(extracted.object["a"], 1);
        assert_eq!(extracted.offset, 7);
    }

    #[test]
    fn test_bracket_match_ignores_quotes_in_prose() {
        let text = r#"He said "look: {"a": 1}"#;
        let extracted = BracketMatch.extract(text).unwrap();
        assert_eq!(extracted.object["a"], 1);
    }

    #[test]
    fn test_balanced_spans_single_pass() {
        assert_eq!(balanced_spans(b"{a{b}c} } {"), vec![(0, 6), (2, 4)]);
        assert!(balanced_spans(&b"{".repeat(200_000)).is_empty());
    }

    #[test]
    fn test_large_unbalanced_input_is_linear() {
        let text = "{".repeat(200_000);
        let started = std::time::Instant::now();
        let err = BracketMatch.extract(&text).unwrap_err();

        assert_eq!(err, "no JSON object found in text");
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }
}
