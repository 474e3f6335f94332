//! # JSON Repair
//!
//! Best-effort recovery of JSON embedded in raw model output.
//!
//! Attempts, in order:
//! 1. the text as-is
//! 2. the body of a fenced code block
//! 3. the span from the first opening bracket to its matching close
//! 4. the same span with trailing commas removed and unclosed strings and
//!    brackets closed

use crate::GraphError;
use serde_json::Value;

/// Recover a JSON value from `text`.
pub fn repair_json(text: &str) -> Result<Value, GraphError> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let body = fenced_body(trimmed).unwrap_or(trimmed);
    if let Ok(value) = serde_json::from_str(body) {
        return Ok(value);
    }

    let Some(start) = body.find(['{', '[']) else {
        return Err(GraphError::SerializationError(
            "no JSON object or array found".to_string(),
        ));
    };
    let candidate = &body[start..];

    let balanced = balance(candidate);
    serde_json::from_str(&balanced)
        .or_else(|_| serde_json::from_str(&strip_trailing_commas(&balanced)))
        .map_err(|e| GraphError::SerializationError(format!("unrecoverable JSON: {e}")))
}

/// Contents of the first ``` fenced block, with an optional language tag.
fn fenced_body(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    let body_start = after.find('\n').map_or(0, |i| i + 1);
    let tag = after[..body_start].trim();
    let body = if tag.is_empty() || tag.chars().all(|c| c.is_ascii_alphanumeric()) {
        &after[body_start..]
    } else {
        after
    };
    let close = body.find("```").unwrap_or(body.len());
    Some(body[..close].trim())
}

/// Cut at the point the first value closes, or close whatever is left open.
fn balance(candidate: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in candidate.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
                if stack.is_empty() {
                    return candidate[..i + c.len_utf8()].to_string();
                }
            }
            _ => {}
        }
    }

    let mut repaired = candidate.trim_end().to_string();
    if escaped {
        repaired.pop();
    }
    if in_string {
        repaired.push('"');
    }
    let kept = repaired.trim_end().trim_end_matches([',', ':']).len();
    repaired.truncate(kept);
    while let Some(close) = stack.pop() {
        repaired.push(close);
    }
    repaired
}

/// Remove commas directly followed by a closing bracket, outside strings.
fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(c);
            continue;
        }
        if c == '"' {
            in_string = true;
        }
        if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}' | ']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}
