use serde_json::{Map, Value};

use super::ForecastError;

/// Extract the single JSON object carried by an upstream response.
///
/// Accepts, in order: a bare JSON object, a ```json (or bare ```) fenced block, or
/// the outermost `{ … }` span inside explanatory prose. Anything else is malformed.
pub fn parse_response_object(raw: &str) -> Result<Map<String, Value>, ForecastError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ForecastError::MalformedResponse("Empty response".into()));
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return into_object(value);
    }

    if let Some(block) = extract_fenced_block(trimmed) {
        let value = serde_json::from_str::<Value>(block).map_err(|e| {
            ForecastError::MalformedResponse(format!("Fenced block is not valid JSON: {e}"))
        })?;
        return into_object(value);
    }

    if let Some(span) = extract_brace_span(trimmed) {
        let value = serde_json::from_str::<Value>(span).map_err(|e| {
            ForecastError::MalformedResponse(format!("Embedded object is not valid JSON: {e}"))
        })?;
        return into_object(value);
    }

    Err(ForecastError::MalformedResponse("No JSON object found".into()))
}

fn into_object(value: Value) -> Result<Map<String, Value>, ForecastError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ForecastError::MalformedResponse(format!(
            "Expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Contents of the first fenced code block, preferring one tagged `json`.
fn extract_fenced_block(response: &str) -> Option<&str> {
    let lower = response.to_ascii_lowercase();
    let (content_start, search_from) = match lower.find("```json") {
        Some(pos) => (pos + 7, pos + 7),
        None => {
            let pos = response.find("```")?;
            // Skip an optional language tag on the opening fence line
            let line_end = response[pos + 3..]
                .find('\n')
                .map(|i| pos + 3 + i + 1)
                .unwrap_or(pos + 3);
            (line_end, line_end)
        }
    };

    let end = response[search_from..].find("```")?;
    Some(response[content_start..search_from + end].trim())
}

/// Outermost `{ … }` span, for objects wrapped in prose.
fn extract_brace_span(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_object() {
        let map = parse_response_object(r#"  {"trend": "stable"}  "#).unwrap();
        assert_eq!(map["trend"], "stable");
    }

    #[test]
    fn parses_json_fence_with_prose() {
        let raw = "Here is your forecast:\n\n```json\n{\"trend\": \"increasing\"}\n```\n\nLet me know!";
        let map = parse_response_object(raw).unwrap();
        assert_eq!(map["trend"], "increasing");
    }

    #[test]
    fn parses_uppercase_fence_tag() {
        let raw = "```JSON\n{\"trend\": \"stable\"}\n```";
        assert!(parse_response_object(raw).is_ok());
    }

    #[test]
    fn parses_untagged_fence() {
        let raw = "Result:\n```\n{\"trend\": \"decreasing\"}\n```";
        let map = parse_response_object(raw).unwrap();
        assert_eq!(map["trend"], "decreasing");
    }

    #[test]
    fn parses_object_embedded_in_prose() {
        let raw = "Sure! {\"trend\": \"stable\", \"accuracy\": {\"rmse\": 1.0}} Hope this helps.";
        let map = parse_response_object(raw).unwrap();
        assert_eq!(map["accuracy"]["rmse"], 1.0);
    }

    #[test]
    fn empty_response_is_malformed() {
        assert!(matches!(
            parse_response_object("   \n"),
            Err(ForecastError::MalformedResponse(_))
        ));
    }

    #[test]
    fn plain_prose_is_malformed() {
        assert!(matches!(
            parse_response_object("I'm sorry, I cannot forecast this data."),
            Err(ForecastError::MalformedResponse(_))
        ));
    }

    #[test]
    fn broken_fence_is_malformed() {
        let raw = "```json\n{\"trend\": \"stable\",,}\n```";
        assert!(matches!(
            parse_response_object(raw),
            Err(ForecastError::MalformedResponse(_))
        ));
    }

    #[test]
    fn top_level_array_is_malformed() {
        let err = parse_response_object("[1, 2, 3]").unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn nan_literal_is_malformed() {
        let raw = r#"{"accuracy": {"rmse": NaN}}"#;
        assert!(matches!(
            parse_response_object(raw),
            Err(ForecastError::MalformedResponse(_))
        ));
    }

    #[test]
    fn unclosed_fence_falls_back_to_braces() {
        let raw = "```json\n{\"trend\": \"stable\"}";
        let map = parse_response_object(raw).unwrap();
        assert_eq!(map["trend"], "stable");
    }
}
