use serde_json::{Map, Value};

/// Pull a JSON object out of a model reply. Tolerates bare objects,
/// ``` fenced blocks (with or without a `json` tag) and surrounding
/// whitespace. Returns None when nothing parses.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let stripped = text.trim();
    if stripped.is_empty() {
        return None;
    }

    if stripped.starts_with("```") {
        for part in stripped.split("```") {
            let mut candidate = part.trim();
            if candidate.is_empty() {
                continue;
            }
            // Fenced blocks like ```json\n{...}\n```
            if candidate.to_lowercase().starts_with("json") {
                if let Some(idx) = candidate.find('{') {
                    candidate = candidate[idx..].trim();
                }
            }
            if candidate.starts_with('{') && candidate.ends_with('}') {
                if let Ok(Value::Object(obj)) = serde_json::from_str(candidate) {
                    return Some(obj);
                }
            }
        }
    }

    if stripped.starts_with('{') && stripped.ends_with('}') {
        if let Ok(Value::Object(obj)) = serde_json::from_str(stripped) {
            return Some(obj);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_object() {
        let obj = extract_json_object(r#"  {"a": 1}  "#).unwrap();
        assert_eq!(obj["a"], 1);
    }

    #[test]
    fn fenced_with_language_tag() {
        let text = "```json\n{\"intent\": \"chat\"}\n```";
        let obj = extract_json_object(text).unwrap();
        assert_eq!(obj["intent"], "chat");
    }

    #[test]
    fn fenced_without_tag() {
        let text = "```\n{\"x\": true}\n```";
        let obj = extract_json_object(text).unwrap();
        assert_eq!(obj["x"], true);
    }

    #[test]
    fn prose_is_none() {
        assert!(extract_json_object("I cannot answer that.").is_none());
        assert!(extract_json_object("").is_none());
        assert!(extract_json_object("{broken").is_none());
    }
}
