//! Pull JSON out of model output.
//!
//! Model text is untrusted. It may be wrapped in code fences, surrounded by
//! prose, or cut off. Everything that parses a completion goes through here.

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::LlmError;

/// Strip code fences and return the outermost `{...}` or `[...]` span.
pub fn locate_json(raw: &str) -> Option<&str> {
    let text = strip_fences(raw);
    let start = text.find(['{', '['])?;
    let open = text.as_bytes()[start];
    let close = if open == b'{' { b'}' } else { b']' };

    match balanced_end(&text[start..], open, close) {
        Some(len) => Some(&text[start..start + len]),
        // Unbalanced; fall back to the last closing bracket.
        None => {
            let end = text.rfind(close as char)?;
            (end > start).then(|| &text[start..=end])
        }
    }
}

/// Parse a typed value out of model output.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, LlmError> {
    let span = locate_json(raw).ok_or_else(|| LlmError::Unparsable(preview(raw)))?;
    match serde_json::from_str(span) {
        Ok(value) => Ok(value),
        Err(e) => {
            // Trailing commas are the most common defect
            debug!(error = %e, "retrying parse without trailing commas");
            let repaired = remove_trailing_commas(span);
            serde_json::from_str(&repaired).map_err(|_| LlmError::Json(e))
        }
    }
}

fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[open + 3..];
    // Skip the language tag line, e.g. ```json
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Length of the balanced span starting at `text[0]`, honoring string literals.
fn balanced_end(text: &str, open: u8, close: u8) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in text.as_bytes().iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn remove_trailing_commas(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let chars: Vec<char> = json.chars().collect();
    let mut in_string = false;
    let mut escaped = false;
    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        }
        if c == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn preview(raw: &str) -> String {
    let mut s: String = raw.chars().take(80).collect();
    if raw.chars().count() > 80 {
        s.push_str("...");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Intent {
        category: String,
        confidence: f64,
    }

    #[test]
    fn test_fenced_json() {
        let raw = "Sure! Here you go:\n```json\n{\"category\": \"Trend\", \"confidence\": 0.9}\n```\nHope this helps.";
        let intent: Intent = parse_json(raw).unwrap();
        assert_eq!(intent.category, "Trend");
    }

    #[test]
    fn test_prose_around_object() {
        let raw = "The answer is {\"category\": \"Comparative\", \"confidence\": 0.8} as requested.";
        let intent: Intent = parse_json(raw).unwrap();
        assert_eq!(intent.confidence, 0.8);
    }

    #[test]
    fn test_braces_inside_strings() {
        let raw = r#"{"sql": "SELECT '}' FROM data", "n": 1} trailing }"#;
        assert_eq!(locate_json(raw), Some(r#"{"sql": "SELECT '}' FROM data", "n": 1}"#));
    }

    #[test]
    fn test_array_payload() {
        let values: Vec<i32> = parse_json("result: [1, 2, 3]").unwrap();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_trailing_comma_repaired() {
        let intent: Intent = parse_json(r#"{"category": "Trend", "confidence": 0.5,}"#).unwrap();
        assert_eq!(intent.category, "Trend");
    }

    #[test]
    fn test_malformed_is_an_error() {
        assert!(matches!(parse_json::<Intent>("{category: Trend}"), Err(LlmError::Json(_))));
        assert!(matches!(parse_json::<Intent>("no json here"), Err(LlmError::Unparsable(_))));
    }
}
