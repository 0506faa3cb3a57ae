use crate::constants::db as db_constants;
use crate::errors::ClientError;
use crate::services::logger::Logger;
use crate::services::outputs::{DatabaseEntry, SaveMode};
use crate::utils::sql::{build_conflict_target, quote_qualified_identifier};
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use dashmap::DashMap;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tokio_postgres::types::{Json, ToSql, Type};
use tokio_postgres::{Config, NoTls, Row};

/// Connection handling for database-backed output handlers and the ad-hoc
/// query runner. Pools are cached per registry name; a process rarely needs
/// more than one, but tenant loops can touch several.
#[derive(Clone)]
pub struct PostgresManager {
    logger: Logger,
    pools: Arc<DashMap<String, Pool<PostgresConnectionManager<NoTls>>>>,
}

impl PostgresManager {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger: logger.child("db"),
            pools: Arc::new(DashMap::new()),
        }
    }

    async fn get_pool(
        &self,
        name: &str,
        entry: &DatabaseEntry,
    ) -> Result<Pool<PostgresConnectionManager<NoTls>>, ClientError> {
        if let Some(existing) = self.pools.get(name) {
            return Ok(existing.value().clone());
        }
        let config = build_config(name, entry)?;
        let manager = PostgresConnectionManager::new(config, NoTls);
        let pool = Pool::builder()
            .max_size(db_constants::MAX_CONNECTIONS)
            .build(manager)
            .await
            .map_err(map_pool_error)?;
        self.pools.insert(name.to_string(), pool.clone());
        Ok(pool)
    }

    /// Write one JSON payload per row into `table (data, collected_at)`,
    /// all inside a single transaction so a failing record rolls back the
    /// whole batch. Returns the number of rows the server reports written.
    pub async fn upsert_records(
        &self,
        name: &str,
        entry: &DatabaseEntry,
        table: &str,
        mode: SaveMode,
        key_fields: &[String],
        records: &[Value],
    ) -> Result<u64, ClientError> {
        let sql = build_upsert_sql(table, mode, key_fields)?;
        let pool = self.get_pool(name, entry).await?;
        let mut conn = pool.get().await.map_err(map_pool_error)?;
        let transaction = conn.transaction().await.map_err(map_pg_error)?;
        let statement = transaction.prepare(&sql).await.map_err(map_pg_error)?;

        let started = std::time::Instant::now();
        let mut written = 0u64;
        for record in records {
            let params: [&(dyn ToSql + Sync); 1] = [&Json(record)];
            written += transaction
                .execute(&statement, &params)
                .await
                .map_err(map_pg_error)?;
        }
        transaction.commit().await.map_err(map_pg_error)?;

        self.logger.debug(
            "records stored",
            Some(&serde_json::json!({
                "database": name,
                "table": table,
                "received": records.len(),
                "written": written,
                "duration_ms": started.elapsed().as_millis() as u64,
            })),
        );
        Ok(written)
    }

    /// Run one read-mostly statement and decode every row to JSON.
    pub async fn run_query(
        &self,
        name: &str,
        entry: &DatabaseEntry,
        sql: &str,
    ) -> Result<Value, ClientError> {
        let pool = self.get_pool(name, entry).await?;
        let conn = pool.get().await.map_err(map_pool_error)?;
        let started = std::time::Instant::now();
        let rows = conn.query(sql, &[]).await.map_err(map_pg_error)?;
        let duration_ms = started.elapsed().as_millis() as u64;

        let command = sql.split_whitespace().next().unwrap_or("").to_uppercase();
        let rows_json: Vec<Value> = rows.iter().map(row_to_value).collect();
        Ok(serde_json::json!({
            "command": command,
            "rowCount": rows_json.len(),
            "rows": rows_json,
            "duration_ms": duration_ms,
        }))
    }
}

fn build_config(name: &str, entry: &DatabaseEntry) -> Result<Config, ClientError> {
    match entry {
        DatabaseEntry::Url(url) => Config::from_str(url).map_err(|err| {
            ClientError::config(format!("Connection URL for database '{}' is invalid", name))
                .with_details(serde_json::json!({"error": err.to_string()}))
        }),
        DatabaseEntry::Fields(fields) => {
            let mut config = Config::new();
            config
                .host(&fields.host)
                .port(fields.port)
                .user(&fields.user)
                .password(&fields.password)
                .dbname(&fields.dbname);
            Ok(config)
        }
    }
}

fn build_upsert_sql(
    table: &str,
    mode: SaveMode,
    key_fields: &[String],
) -> Result<String, ClientError> {
    let table_sql = quote_qualified_identifier(table)?;
    let mut sql = format!(
        "INSERT INTO {} (data, collected_at) VALUES ($1, NOW())",
        table_sql
    );
    if !key_fields.is_empty() {
        let target = build_conflict_target(key_fields)?;
        match mode {
            SaveMode::Update => {
                sql.push_str(&format!(
                    " ON CONFLICT ({}) DO UPDATE SET data = EXCLUDED.data, collected_at = NOW()",
                    target
                ));
            }
            SaveMode::Ignore => {
                sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", target));
            }
        }
    }
    Ok(sql)
}

fn row_to_value(row: &Row) -> Value {
    let mut map = serde_json::Map::new();
    for (idx, col) in row.columns().iter().enumerate() {
        map.insert(
            col.name().to_string(),
            column_to_value(row, idx, col.type_()),
        );
    }
    Value::Object(map)
}

/// `to_json` runs only when the column held a non-null value the driver
/// could decode; everything else, SQL NULL included, maps to JSON null.
fn decoded<T>(
    fetched: Result<Option<T>, tokio_postgres::Error>,
    to_json: impl FnOnce(T) -> Value,
) -> Value {
    match fetched {
        Ok(Some(value)) => to_json(value),
        _ => Value::Null,
    }
}

fn column_to_value(row: &Row, idx: usize, ty: &Type) -> Value {
    // Integer widths get their own arms: the driver refuses to read an
    // int4 column as i64, it is not a silent widening.
    match *ty {
        Type::BOOL => decoded(row.try_get::<_, Option<bool>>(idx), Value::Bool),
        Type::INT2 => decoded(row.try_get::<_, Option<i16>>(idx), |v| {
            Value::Number(i64::from(v).into())
        }),
        Type::INT4 => decoded(row.try_get::<_, Option<i32>>(idx), |v| {
            Value::Number(i64::from(v).into())
        }),
        Type::INT8 => decoded(row.try_get::<_, Option<i64>>(idx), |v| {
            Value::Number(v.into())
        }),
        Type::FLOAT4 | Type::FLOAT8 => decoded(row.try_get::<_, Option<f64>>(idx), |v| {
            serde_json::Number::from_f64(v)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        }),
        Type::JSON | Type::JSONB => decoded(row.try_get::<_, Option<Value>>(idx), |v| v),
        Type::UUID => decoded(row.try_get::<_, Option<uuid::Uuid>>(idx), |v| {
            Value::String(v.to_string())
        }),
        Type::TIMESTAMP => decoded(row.try_get::<_, Option<chrono::NaiveDateTime>>(idx), |v| {
            Value::String(v.to_string())
        }),
        Type::TIMESTAMPTZ => decoded(
            row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx),
            |v| Value::String(v.to_rfc3339()),
        ),
        Type::DATE => decoded(row.try_get::<_, Option<chrono::NaiveDate>>(idx), |v| {
            Value::String(v.to_string())
        }),
        _ => decoded(row.try_get::<_, Option<String>>(idx), Value::String),
    }
}

fn map_pool_error<E: std::fmt::Display>(err: E) -> ClientError {
    ClientError::sink(format!("PostgreSQL pool error: {}", err))
}

fn map_pg_error(err: tokio_postgres::Error) -> ClientError {
    ClientError::sink(format!("PostgreSQL error: {}", err))
}
