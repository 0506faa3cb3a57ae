use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

const MASK: &str = "[REDACTED]";
const INLINE_MASK: &str = "***REDACTED***";

/// Key substrings that mark a metadata member as sensitive wherever it
/// appears. The controller's own field names (`userName`, `token_id`,
/// `tokenId`) all fall under these.
const SENSITIVE_KEY_PARTS: [&str; 4] = ["password", "secret", "token", "user"];

const SENSITIVE_HEADERS: [&str; 5] = [
    "authorization",
    "proxy-authorization",
    "x-api-key",
    "x-auth-token",
    "x-access-token",
];

static INLINE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"\beyJ[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}\b")
                .expect("inline mask regex"),
            INLINE_MASK,
        ),
        (
            Regex::new(r"\b(Bearer)\s+([A-Za-z0-9._~-]{10,})\b").expect("inline mask regex"),
            "$1 ***REDACTED***",
        ),
        (
            Regex::new(r#""(password|userName|username|token_id|tokenId|token)"\s*:\s*"[^"]*""#)
                .expect("inline mask regex"),
            "\"$1\":\"***REDACTED***\"",
        ),
        (
            Regex::new(
                r#"\b(password|passwd|token|api[_-]?key|secret|access[_-]?token)\b\s*([:=])\s*([^\s"'`]+)"#,
            )
            .expect("inline mask regex"),
            "$1$2***REDACTED***",
        ),
    ]
});

fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.trim().to_lowercase();
    !lowered.is_empty()
        && SENSITIVE_KEY_PARTS
            .iter()
            .any(|part| lowered.contains(part))
}

fn clip(value: &str, max_length: usize) -> String {
    if max_length == usize::MAX || value.len() <= max_length {
        return value.to_string();
    }
    let mut cut = max_length;
    while cut > 0 && !value.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &value[..cut])
}

fn scrub_known_shapes(value: &str, extra: Option<&[String]>) -> String {
    let mut out = value.to_string();
    for (pattern, replacement) in INLINE_PATTERNS.iter() {
        out = pattern.replace_all(&out, *replacement).into_owned();
    }
    for needle in extra.unwrap_or_default() {
        let needle = needle.trim();
        if needle.len() >= 6 {
            out = out.replace(needle, INLINE_MASK);
        }
    }
    out
}

/// Scrub secrets out of free text (response previews, rendered URLs) and
/// cap its length. `extra_secrets` carries the literal credential values in
/// play for this run so they are masked wherever they appear.
pub fn redact_text(value: &str, max_string: usize, extra_secrets: Option<&[String]>) -> String {
    clip(&scrub_known_shapes(value, extra_secrets), max_string)
}

fn redact_headers(value: &Value, max_string: usize, extra: Option<&[String]>) -> Value {
    let Some(map) = value.as_object() else {
        return value.clone();
    };
    let out = map
        .iter()
        .map(|(key, entry)| {
            let masked = if SENSITIVE_HEADERS.contains(&key.trim().to_lowercase().as_str()) {
                Value::String(MASK.to_string())
            } else if let Some(text) = entry.as_str() {
                Value::String(redact_text(text, max_string, extra))
            } else {
                entry.clone()
            };
            (key.clone(), masked)
        })
        .collect();
    Value::Object(out)
}

/// Recursive masking pass applied to every logged metadata value.
pub fn redact_object(value: &Value, max_string: usize, extra_secrets: Option<&[String]>) -> Value {
    match value {
        Value::String(text) => Value::String(redact_text(text, max_string, extra_secrets)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| redact_object(item, max_string, extra_secrets))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, entry)| {
                    let masked = if key == "headers" {
                        redact_headers(entry, max_string, extra_secrets)
                    } else if is_sensitive_key(key) {
                        Value::String(MASK.to_string())
                    } else {
                        redact_object(entry, max_string, extra_secrets)
                    };
                    (key.clone(), masked)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::{redact_object, redact_text};
    use serde_json::Value;

    #[test]
    fn masks_credential_keys_recursively() {
        let input = serde_json::json!({
            "body": {"userName": "admin", "password": "hunter2"},
            "page": 1,
        });
        let out = redact_object(&input, usize::MAX, None);
        assert_eq!(
            out["body"]["userName"],
            Value::String("[REDACTED]".to_string())
        );
        assert_eq!(
            out["body"]["password"],
            Value::String("[REDACTED]".to_string())
        );
        assert_eq!(out["page"], Value::Number(1.into()));
    }

    #[test]
    fn masks_token_headers() {
        let input = serde_json::json!({"headers": {
            "X-ACCESS-TOKEN": "abcdef123456",
            "Content-Type": "application/json",
        }});
        let out = redact_object(&input, usize::MAX, None);
        assert_eq!(
            out["headers"]["X-ACCESS-TOKEN"],
            Value::String("[REDACTED]".to_string())
        );
        assert_eq!(
            out["headers"]["Content-Type"],
            Value::String("application/json".to_string())
        );
    }

    #[test]
    fn scrubs_json_fields_in_free_text() {
        let preview = r#"{"errcode":"1","token_id":"deadbeefcafe"}"#;
        let out = redact_text(preview, usize::MAX, None);
        assert!(!out.contains("deadbeefcafe"));
        assert!(out.contains("errcode"));
    }

    #[test]
    fn masks_extra_secret_values() {
        let secrets = vec!["s3cr3tvalue".to_string()];
        let out = redact_text("calling with s3cr3tvalue now", usize::MAX, Some(&secrets));
        assert!(!out.contains("s3cr3tvalue"));
    }

    #[test]
    fn truncates_long_previews() {
        let long = "x".repeat(100);
        let out = redact_text(&long, 10, None);
        assert_eq!(out, format!("{}...", "x".repeat(10)));
    }
}
