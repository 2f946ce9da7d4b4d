//! Built-in prompt templates.
//!
//! Every template carries its own output-format instructions so that the
//! application code only passes a template name and variables around.
//! Changing how the model is asked is a change to this table, not to the
//! calling code.

/// System instruction sent ahead of every templated prompt.
pub const SYSTEM_INSTRUCTION: &str = r#"You are a helpful, clear, and concise assistant.
Answer questions directly without unnecessary explanation.
If unsure, say so.
ALWAYS follow the output format specified in the prompt."#;

/// Short free-text answer to a single question.
pub const QA_TEMPLATE: &str = r#"Question: {question}

Answer this clearly in 1-2 sentences. No explanations, no preamble.
Just answer the question directly."#;

/// Pull arbitrary keys out of a block of text as a JSON object.
pub const JSON_EXTRACT_TEMPLATE: &str = r#"Extract the key information from the text below and return ONLY a valid JSON object.
Do not include any text before or after the JSON.
The JSON must have exactly these keys: {required_keys}

Text: {text}

Return ONLY valid JSON (no markdown, no explanation):"#;

/// Single-label classification.
pub const CLASSIFY_TEMPLATE: &str = r#"Classify the text below as exactly one of: {categories}

Text: {text}

Return ONLY the classification word, nothing else. No explanation."#;

/// Three-way sentiment label.
pub const SENTIMENT_TEMPLATE: &str = r#"Analyze the sentiment of the text below.
Return ONLY one word: positive, neutral, or negative.
No explanation, no punctuation.

Text: {text}

Answer:"#;

/// Person record with a fixed `name` / `age` / `location` shape.
pub const STRUCTURED_INFO_TEMPLATE: &str = r#"Extract information about a person from the text below.
Return ONLY a valid JSON object with exactly these fields: name, age, location
If any field is unknown, use "unknown" as the value.
Do not include any text before or after the JSON.

Text: {text}

Return ONLY valid JSON:"#;

/// Name/body pairs registered by [`TemplateRegistry::with_defaults`](super::TemplateRegistry::with_defaults).
pub const DEFAULT_TEMPLATES: [(&str, &str); 5] = [
    ("qa", QA_TEMPLATE),
    ("json_extract", JSON_EXTRACT_TEMPLATE),
    ("classify", CLASSIFY_TEMPLATE),
    ("sentiment", SENTIMENT_TEMPLATE),
    ("structured_info", STRUCTURED_INFO_TEMPLATE),
];
