use crate::errors::ClientError;

pub fn normalize_identifier_part(value: &str) -> Result<String, ClientError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ClientError::config("Identifier must be a non-empty string"));
    }
    if trimmed.contains('\0') {
        return Err(ClientError::config("Identifier must not contain null bytes"));
    }
    let unquoted = if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };
    Ok(format!("\"{}\"", unquoted.replace('"', "\"\"")))
}

/// Quote a possibly schema-qualified table name (`public.tenants`).
pub fn quote_qualified_identifier(identifier: &str) -> Result<String, ClientError> {
    let parts: Vec<&str> = identifier.split('.').collect();
    if parts.is_empty() {
        return Err(ClientError::config("Identifier must be a non-empty string"));
    }
    let mut out = Vec::new();
    for part in parts {
        out.push(normalize_identifier_part(part)?);
    }
    Ok(out.join("."))
}

fn quote_json_field(field: &str) -> Result<String, ClientError> {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Err(ClientError::config(
            "Natural-key path segment must be non-empty",
        ));
    }
    Ok(trimmed.replace('\'', "''"))
}

/// Build the `ON CONFLICT (...)` expression list from dotted natural-key
/// paths: `tenant_id` becomes `(data->>'tenant_id')`, `site.id` becomes
/// `(data->'site'->>'id')`. The table's unique index must match these
/// expressions. Deeper nesting is rejected.
pub fn build_conflict_target(key_fields: &[String]) -> Result<String, ClientError> {
    if key_fields.is_empty() {
        return Err(ClientError::config(
            "Database sink requires at least one natural-key field",
        ));
    }
    let mut exprs = Vec::new();
    for field in key_fields {
        let segments: Vec<&str> = field.split('.').collect();
        match segments.as_slice() {
            [single] => exprs.push(format!("(data->>'{}')", quote_json_field(single)?)),
            [parent, child] => exprs.push(format!(
                "(data->'{}'->>'{}')",
                quote_json_field(parent)?,
                quote_json_field(child)?
            )),
            _ => {
                return Err(ClientError::config(format!(
                    "Natural-key path '{}' nests deeper than one level",
                    field
                ))
                .with_hint("Use 'field' or 'parent.child'"));
            }
        }
    }
    Ok(exprs.join(", "))
}
