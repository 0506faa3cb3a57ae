use crate::errors::ClientError;
use crate::managers::postgres::PostgresManager;
use crate::services::logger::Logger;
use crate::services::outputs::{DatabaseEntry, HandlerConfig, OutputRegistry, SaveMode};
use crate::utils::fs_atomic::atomic_write_text_file;
use crate::utils::sql::{build_conflict_target, quote_qualified_identifier};
use crate::utils::template::{render_template, sanitize_filename, MissingValue};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// A fully resolved destination for one call's response. Built before the
/// HTTP request goes out so configuration mistakes cost nothing.
#[derive(Debug, Clone)]
pub enum Sink {
    File {
        base_path: String,
        filename_template: String,
    },
    Database {
        name: String,
        entry: DatabaseEntry,
        table: String,
        mode: SaveMode,
        key_fields: Vec<String>,
    },
}

/// Borrowed view of everything a sink may need from a finished call.
pub struct SinkContext<'a> {
    pub endpoint: &'a str,
    pub args: &'a Map<String, Value>,
    pub response: &'a Value,
    pub records: &'a [Value],
}

#[derive(Clone)]
pub struct OutputManager {
    logger: Logger,
    registry: Arc<OutputRegistry>,
    postgres: PostgresManager,
}

impl OutputManager {
    pub fn new(logger: Logger, registry: Arc<OutputRegistry>, postgres: PostgresManager) -> Self {
        Self {
            logger: logger.child("output"),
            registry,
            postgres,
        }
    }

    /// Turn the endpoint's handler entry into a concrete sink, resolving the
    /// database registry reference and checking everything that can be
    /// checked without data: table name, natural-key depth.
    pub fn resolve_sink(&self, endpoint: &str) -> Result<Sink, ClientError> {
        match self.registry.resolve(endpoint)? {
            HandlerConfig::File {
                base_path,
                filename,
            } => {
                if filename.trim().is_empty() {
                    return Err(ClientError::config(format!(
                        "File handler for '{}' has an empty filename template",
                        endpoint
                    )));
                }
                Ok(Sink::File {
                    base_path: base_path.clone(),
                    filename_template: filename.clone(),
                })
            }
            HandlerConfig::Database {
                database,
                table,
                on_conflict,
                save_mode,
            } => {
                let entry = self.registry.database(database)?.clone();
                quote_qualified_identifier(table)?;
                if !on_conflict.is_empty() {
                    build_conflict_target(on_conflict)?;
                }
                Ok(Sink::Database {
                    name: database.clone(),
                    entry,
                    table: table.clone(),
                    mode: *save_mode,
                    key_fields: on_conflict.clone(),
                })
            }
        }
    }

    pub async fn persist(&self, sink: &Sink, ctx: &SinkContext<'_>) -> Result<Value, ClientError> {
        match sink {
            Sink::File {
                base_path,
                filename_template,
            } => self.persist_file(base_path, filename_template, ctx),
            Sink::Database {
                name,
                entry,
                table,
                mode,
                key_fields,
            } => {
                self.persist_database(name, entry, table, *mode, key_fields, ctx)
                    .await
            }
        }
    }

    /// The file sink keeps the whole response, not just the extracted
    /// records, so a later inspection sees exactly what the controller sent.
    fn persist_file(
        &self,
        base_path: &str,
        filename_template: &str,
        ctx: &SinkContext<'_>,
    ) -> Result<Value, ClientError> {
        let mut context = ctx.args.clone();
        context.insert(
            "endpoint".to_string(),
            Value::String(ctx.endpoint.to_string()),
        );
        let rendered = render_template(filename_template, &context, MissingValue::Empty)?;
        let mut filename = sanitize_filename(&rendered);
        if filename.is_empty() {
            filename = format!("{}.json", ctx.endpoint);
        }

        let path = PathBuf::from(base_path).join(&filename);
        let payload = serde_json::to_string_pretty(ctx.response).map_err(|err| {
            ClientError::sink(format!("Cannot serialize response for file sink: {}", err))
        })?;
        atomic_write_text_file(&path, &format!("{}\n", payload), 0o644)
            .map_err(|err| ClientError::sink(format!("Cannot write {}: {}", path.display(), err)))?;

        self.logger.info(
            "response written to file",
            Some(&json!({"path": path.display().to_string()})),
        );
        Ok(json!({
            "type": "file",
            "path": path.display().to_string(),
            "bytes": payload.len() + 1,
        }))
    }

    async fn persist_database(
        &self,
        name: &str,
        entry: &DatabaseEntry,
        table: &str,
        mode: SaveMode,
        key_fields: &[String],
        ctx: &SinkContext<'_>,
    ) -> Result<Value, ClientError> {
        if ctx.records.is_empty() {
            self.logger.warn(
                "no records to store",
                Some(&json!({"endpoint": ctx.endpoint, "table": table})),
            );
            return Ok(json!({
                "type": "database",
                "database": name,
                "table": table,
                "received": 0,
                "written": 0,
            }));
        }

        let written = self
            .postgres
            .upsert_records(name, entry, table, mode, key_fields, ctx.records)
            .await?;
        Ok(json!({
            "type": "database",
            "database": name,
            "table": table,
            "received": ctx.records.len(),
            "written": written,
        }))
    }
}
