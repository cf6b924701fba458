use crate::model::FieldMap;

/// Normalized view of an LLM extraction output. Grading only ever operates
/// on the `Structured` field map; `Unstructured` keeps the raw text as
/// evidence when no JSON object could be recovered.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOutput {
    Structured(FieldMap),
    Unstructured(String),
}

impl ParsedOutput {
    pub fn fields(&self) -> Option<&FieldMap> {
        match self {
            ParsedOutput::Structured(m) => Some(m),
            ParsedOutput::Unstructured(_) => None,
        }
    }
}

/// Best-effort extraction of a JSON object from raw model text.
///
/// Tries, in order: the whole string, a fenced ```json block, and the first
/// balanced `{...}` span. Anything else is kept verbatim as `Unstructured`.
pub fn parse_output(raw: &str) -> ParsedOutput {
    let trimmed = raw.trim();

    if let Some(map) = try_object(trimmed) {
        return ParsedOutput::Structured(map);
    }

    if let Some(block) = fenced_block(trimmed) {
        if let Some(map) = try_object(block) {
            return ParsedOutput::Structured(map);
        }
    }

    if let Some(span) = first_balanced_object(trimmed) {
        if let Some(map) = try_object(span) {
            return ParsedOutput::Structured(map);
        }
    }

    ParsedOutput::Unstructured(raw.to_string())
}

fn try_object(s: &str) -> Option<FieldMap> {
    match serde_json::from_str::<serde_json::Value>(s) {
        Ok(serde_json::Value::Object(obj)) => Some(obj.into_iter().collect()),
        _ => None,
    }
}

fn fenced_block(s: &str) -> Option<&str> {
    let start = s.find("```json").map(|i| i + "```json".len()).or_else(|| {
        s.find("```").map(|i| i + 3)
    })?;
    let rest = &s[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

fn first_balanced_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
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
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
