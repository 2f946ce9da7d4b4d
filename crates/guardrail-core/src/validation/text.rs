//! Validators for plain-text answers (labels, bounded free text).

use super::result::ParseResult;

/// Match `text` against a fixed set of choices, ignoring case and
/// surrounding whitespace. On success `data` is the choice as written in
/// `choices`, not as the model spelled it.
pub fn validate_choice<S: AsRef<str>>(text: &str, choices: &[S]) -> ParseResult<String> {
    let mut steps = Vec::new();
    let normalized = text.trim().to_lowercase();

    if normalized.is_empty() {
        steps.push("input is empty".to_string());
        return ParseResult::failed("empty response", text, steps);
    }
    steps.push(format!("input received: '{}'", text.trim()));

    if let Some(choice) = choices
        .iter()
        .map(AsRef::<str>::as_ref)
        .find(|c| c.to_lowercase() == normalized)
    {
        steps.push(format!("matched choice: '{choice}'"));
        return ParseResult::passed(choice.to_string(), text, steps);
    }

    let allowed: Vec<&str> = choices.iter().map(AsRef::<str>::as_ref).collect();
    steps.push(format!("not in allowed choices: {allowed:?}"));
    ParseResult::failed(
        format!("'{}' is not one of: {allowed:?}", text.trim()),
        text,
        steps,
    )
}

/// Check that `text` has between `min_chars` and `max_chars` characters
/// (inclusive). `max_chars = None` means unbounded.
pub fn validate_length(text: &str, min_chars: usize, max_chars: Option<usize>) -> ParseResult<String> {
    let length = text.chars().count();
    let mut steps = vec![format!("text length: {length} chars")];

    if length < min_chars {
        steps.push(format!("too short: {length} < {min_chars}"));
        return ParseResult::failed(format!("text too short: {length} < {min_chars}"), text, steps);
    }

    if let Some(max) = max_chars {
        if length > max {
            steps.push(format!("too long: {length} > {max}"));
            return ParseResult::failed(format!("text too long: {length} > {max}"), text, steps);
        }
    }

    steps.push("length within bounds".to_string());
    ParseResult::passed(text.to_string(), text, steps)
}
