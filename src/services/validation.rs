use crate::errors::ClientError;

#[derive(Clone)]
pub struct Validation;

impl Validation {
    pub fn new() -> Self {
        Self
    }

    pub fn ensure_non_empty(&self, value: &str, label: &str) -> Result<String, ClientError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ClientError::caller(format!(
                "{} must be a non-empty string",
                label
            )));
        }
        Ok(trimmed.to_string())
    }

    /// The controller host is combined with catalog paths as
    /// `https://<host><path>`, so schemes and paths in the value would build
    /// a broken URL.
    pub fn ensure_host(&self, value: &str) -> Result<String, ClientError> {
        let host = self.ensure_non_empty(value, "host")?;
        if host.contains("://") || host.contains('/') {
            return Err(ClientError::caller(format!(
                "host '{}' must be a bare hostname[:port]",
                host
            ))
            .with_hint("Pass e.g. nce.example.com, not a URL"));
        }
        Ok(host)
    }

    pub fn ensure_int(&self, value: &str, label: &str) -> Result<i64, ClientError> {
        value.trim().parse::<i64>().map_err(|_| {
            ClientError::caller(format!("{} must be an integer, got '{}'", label, value))
        })
    }

    /// Split one `--arg key=value` pair.
    pub fn parse_key_value(&self, raw: &str) -> Result<(String, String), ClientError> {
        match raw.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(ClientError::caller(format!(
                "Argument '{}' is not of the form key=value",
                raw
            ))),
        }
    }
}

impl Default for Validation {
    fn default() -> Self {
        Self::new()
    }
}
