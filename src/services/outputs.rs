use crate::constants::catalog::DEFAULT_HANDLER;
use crate::errors::ClientError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Conflict policy for database writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveMode {
    /// `ON CONFLICT .. DO UPDATE`: refresh the stored payload.
    #[default]
    Update,
    /// `ON CONFLICT .. DO NOTHING`: keep the existing row.
    Ignore,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HandlerConfig {
    File {
        base_path: String,
        filename: String,
    },
    Database {
        database: String,
        table: String,
        #[serde(default)]
        on_conflict: Vec<String>,
        #[serde(default)]
        save_mode: SaveMode,
    },
}

/// Connection registry entry: either a full connection URL or discrete
/// fields, whichever the operator prefers to maintain.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DatabaseEntry {
    Url(String),
    Fields(DatabaseFields),
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseFields {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
}

fn default_port() -> u16 {
    5432
}

#[derive(Debug, Deserialize)]
struct OutputFile {
    #[serde(default)]
    handlers: BTreeMap<String, HandlerConfig>,
    #[serde(default)]
    databases: BTreeMap<String, DatabaseEntry>,
}

#[derive(Debug, Clone)]
pub struct OutputRegistry {
    handlers: BTreeMap<String, HandlerConfig>,
    databases: BTreeMap<String, DatabaseEntry>,
}

impl OutputRegistry {
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            ClientError::config(format!(
                "Cannot read output config {}: {}",
                path.display(),
                err
            ))
        })?;
        let parsed: OutputFile = serde_json::from_str(&raw).map_err(|err| {
            ClientError::config(format!(
                "Output config {} is not valid: {}",
                path.display(),
                err
            ))
        })?;
        Ok(Self {
            handlers: parsed.handlers,
            databases: parsed.databases,
        })
    }

    /// Handler for an endpoint: an exact entry wins, otherwise the
    /// `default` entry. No entry at all is a configuration error.
    pub fn resolve(&self, endpoint: &str) -> Result<&HandlerConfig, ClientError> {
        if let Some(handler) = self.handlers.get(endpoint) {
            return Ok(handler);
        }
        self.handlers.get(DEFAULT_HANDLER).ok_or_else(|| {
            ClientError::config(format!(
                "No output handler for endpoint '{}' and no '{}' entry",
                endpoint, DEFAULT_HANDLER
            ))
            .with_hint("Add a handler under \"handlers\" in output_config.json")
        })
    }

    pub fn database(&self, name: &str) -> Result<&DatabaseEntry, ClientError> {
        self.databases.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.databases.keys().map(String::as_str).collect();
            ClientError::config(format!("Unknown database '{}'", name)).with_hint(if known
                .is_empty()
            {
                "Declare it under \"databases\" in output_config.json".to_string()
            } else {
                format!("Known databases: {}", known.join(", "))
            })
        })
    }
}
