use crate::errors::ClientError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// What to do when a `{name}` reference has no value in the context map.
/// Header and path templates fail loudly; filename templates substitute an
/// empty segment (collapsed away afterwards).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingValue {
    Fail,
    Empty,
}

pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Number(num) => num.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Array(items) => items
            .iter()
            .map(stringify)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Substitute `{name}` references from `context`. `{{` and `}}` are literal
/// braces. Null values count as missing.
pub fn render_template(
    template: &str,
    context: &Map<String, Value>,
    missing: MissingValue,
) -> Result<String, ClientError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    name.push(inner);
                }
                if !closed {
                    return Err(ClientError::config(format!(
                        "Unclosed placeholder in template '{}'",
                        template
                    )));
                }
                let name = name.trim();
                match context.get(name).filter(|v| !v.is_null()) {
                    Some(value) => out.push_str(&stringify(value)),
                    None => match missing {
                        MissingValue::Empty => {}
                        MissingValue::Fail => {
                            return Err(ClientError::config(format!(
                                "Template references '{{{}}}' but no such value was supplied",
                                name
                            )));
                        }
                    },
                }
            }
            '}' => {
                return Err(ClientError::config(format!(
                    "Stray '}}' in template '{}'",
                    template
                )));
            }
            _ => out.push(ch),
        }
    }
    Ok(out)
}

/// Names referenced by `{name}` placeholders, in template order. Escaped
/// braces are skipped; malformed templates are the renderer's problem.
pub fn placeholder_names(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
            }
            '{' => {
                let mut name = String::new();
                for inner in chars.by_ref() {
                    if inner == '}' {
                        break;
                    }
                    name.push(inner);
                }
                let name = name.trim();
                if !name.is_empty() {
                    names.push(name.to_string());
                }
            }
            _ => {}
        }
    }
    names
}

static UNDERSCORE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{2,}").expect("separator regex"));

/// Collapse the gaps left by empty substitutions and trim the edges, so
/// `get_tenants__response.json` becomes `get_tenants_response.json`.
pub fn sanitize_filename(name: &str) -> String {
    UNDERSCORE_RUNS
        .replace_all(name, "_")
        .trim_matches('_')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn lists_placeholder_names_in_order() {
        assert_eq!(
            placeholder_names("/tenants/{tenant_id}/sites/{ site_id }"),
            vec!["tenant_id".to_string(), "site_id".to_string()]
        );
        assert!(placeholder_names("literal {{braces}} only").is_empty());
    }

    #[test]
    fn renders_values_and_joins_lists() {
        let ctx = context(&[
            ("token", json!("abc")),
            ("ids", json!(["1", "2", "3"])),
            ("page", json!(5)),
        ]);
        let out = render_template("t={token} ids={ids} p={page}", &ctx, MissingValue::Fail)
            .expect("render");
        assert_eq!(out, "t=abc ids=1,2,3 p=5");
    }

    #[test]
    fn missing_reference_fails_loudly() {
        let ctx = context(&[]);
        let err = render_template("{token}", &ctx, MissingValue::Fail).unwrap_err();
        assert!(err.message.contains("token"));
    }

    #[test]
    fn null_counts_as_missing() {
        let ctx = context(&[("tenant_id", Value::Null)]);
        let out = render_template("a_{tenant_id}_b", &ctx, MissingValue::Empty).expect("render");
        assert_eq!(out, "a__b");
        assert!(render_template("{tenant_id}", &ctx, MissingValue::Fail).is_err());
    }

    #[test]
    fn literal_braces_pass_through() {
        let ctx = context(&[("v", json!("x"))]);
        let out = render_template("{{\"k\": \"{v}\"}}", &ctx, MissingValue::Fail).expect("render");
        assert_eq!(out, "{\"k\": \"x\"}");
    }

    #[test]
    fn unclosed_placeholder_is_an_error() {
        let ctx = context(&[]);
        assert!(render_template("{oops", &ctx, MissingValue::Empty).is_err());
    }

    #[test]
    fn sanitize_collapses_and_trims() {
        assert_eq!(
            sanitize_filename("get_tenants__response.json"),
            "get_tenants_response.json"
        );
        assert_eq!(sanitize_filename("___a____b__"), "a_b");
        assert_eq!(sanitize_filename("plain.json"), "plain.json");
    }
}
