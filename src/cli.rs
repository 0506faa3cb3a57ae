use crate::app::{App, AppOptions};
use crate::constants::{auth as auth_constants, exit};
use crate::errors::ClientError;
use crate::managers::access::AuthContext;
use crate::managers::api::CallRequest;
use crate::services::outputs::HandlerConfig;
use crate::services::validation::Validation;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "cloudharvest")]
#[command(about = "Configuration-driven collector for cloud-managed network controllers")]
#[command(version)]
pub struct Cli {
    /// Directory holding api_config.json and output_config.json
    #[arg(long, global = true, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Call a catalog endpoint and persist the response
    Call {
        /// Endpoint name from api_config.json
        endpoint: String,

        /// Controller hostname, e.g. nce.example.com
        #[arg(long)]
        host: String,

        /// Organization login user
        #[arg(long)]
        username: String,

        /// Login password; omit to read CLOUDHARVEST_PASSWORD instead
        #[arg(long)]
        password: Option<String>,

        /// Tenant id, required by tenant-scoped endpoints
        #[arg(long)]
        tenant_id: Option<String>,

        /// Endpoint argument as name=value; repeatable
        #[arg(long = "arg", value_name = "NAME=VALUE")]
        args: Vec<String>,

        /// Skip TLS certificate verification
        #[arg(long)]
        insecure: bool,

        /// Print the full response body instead of the summary
        #[arg(long)]
        print_body: bool,
    },

    /// List the endpoints the catalog declares
    Endpoints,

    /// Run an ad-hoc SQL statement against a configured database
    Query {
        /// Database name from output_config.json
        #[arg(long)]
        database: String,

        /// Statement to execute
        sql: String,
    },
}

/// Parse, execute, and turn the outcome into a process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    match execute(cli).await {
        Ok(()) => exit::SUCCESS,
        Err(err) => {
            report_failure(&err);
            err.exit_code()
        }
    }
}

async fn execute(cli: Cli) -> Result<(), ClientError> {
    let insecure = matches!(&cli.command, Commands::Call { insecure: true, .. });
    let options = AppOptions {
        config_dir: cli.config_dir.clone(),
        insecure,
    };
    let app = App::initialize(&options)?;

    let outcome = run_command(&app, cli.command).await;
    if let Err(err) = &outcome {
        app.logger.error(
            "run failed",
            Some(&json!({
                "runId": app.run_id,
                "kind": err.kind,
                "code": err.code,
            })),
        );
    }
    outcome
}

async fn run_command(app: &App, command: Commands) -> Result<(), ClientError> {
    match command {
        Commands::Call {
            endpoint,
            host,
            username,
            password,
            tenant_id,
            args,
            insecure: _,
            print_body,
        } => {
            let validation = Validation::new();
            let auth = AuthContext {
                host: validation.ensure_host(&host)?,
                username: validation.ensure_non_empty(&username, "username")?,
                password: resolve_password(password)?,
            };
            let mut pairs = Vec::with_capacity(args.len());
            for raw in &args {
                pairs.push(validation.parse_key_value(raw)?);
            }
            let request = CallRequest {
                endpoint: endpoint.clone(),
                auth,
                tenant_id,
                args: pairs,
            };

            let outcome = app.api_manager.call(&request).await?;
            let printed = if print_body {
                outcome.body
            } else {
                json!({
                    "endpoint": endpoint,
                    "status": outcome.status,
                    "records": outcome.record_count,
                    "sink": outcome.sink_report,
                })
            };
            print_value(&printed)
        }
        Commands::Endpoints => {
            let listing: Vec<Value> = app
                .catalog
                .iter()
                .map(|(name, descriptor)| {
                    let sink = match app.outputs.resolve(name) {
                        Ok(HandlerConfig::File { .. }) => "file",
                        Ok(HandlerConfig::Database { .. }) => "database",
                        Err(_) => "none",
                    };
                    json!({
                        "name": name,
                        "method": descriptor.method,
                        "path": descriptor.path,
                        "scope": descriptor.scope.as_str(),
                        "sink": sink,
                        "description": descriptor.description,
                    })
                })
                .collect();
            print_value(&Value::Array(listing))
        }
        Commands::Query { database, sql } => {
            let entry = app.outputs.database(&database)?.clone();
            let result = app
                .postgres_manager
                .run_query(&database, &entry, &sql)
                .await?;
            print_value(&result)
        }
    }
}

fn resolve_password(flag: Option<String>) -> Result<String, ClientError> {
    if let Some(password) = flag {
        if !password.trim().is_empty() {
            return Ok(password);
        }
    }
    match std::env::var(auth_constants::PASSWORD_ENV) {
        Ok(password) if !password.trim().is_empty() => Ok(password),
        _ => Err(ClientError::caller("No login password supplied").with_hint(format!(
            "Pass --password or set {}",
            auth_constants::PASSWORD_ENV
        ))),
    }
}

fn print_value(value: &Value) -> Result<(), ClientError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| ClientError::internal(format!("Cannot render output: {}", err)))?;
    println!("{}", text);
    Ok(())
}

fn report_failure(err: &ClientError) {
    let mut line = format!("cloudharvest: {}", err.message);
    if let Some(hint) = &err.hint {
        line.push_str(&format!(" ({})", hint));
    }
    eprintln!("{}", line);
    if let Some(details) = &err.details {
        if let Ok(text) = serde_json::to_string(details) {
            eprintln!("cloudharvest: details: {}", text);
        }
    }
}
