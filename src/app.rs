use crate::errors::ClientError;
use crate::managers::access::AccessManager;
use crate::managers::api::ApiManager;
use crate::managers::output::OutputManager;
use crate::managers::postgres::PostgresManager;
use crate::services::catalog::EndpointCatalog;
use crate::services::logger::Logger;
use crate::services::outputs::OutputRegistry;
use crate::services::validation::Validation;
use crate::stores::CredentialStore;
use crate::utils::paths::{
    api_config_path, output_config_path, resolve_config_dir, resolve_credentials_dir,
};
use reqwest::Client;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    pub config_dir: Option<PathBuf>,
    pub insecure: bool,
}

/// Everything one invocation needs, built up front so configuration
/// problems surface before any work starts.
pub struct App {
    pub logger: Logger,
    pub run_id: String,
    pub catalog: Arc<EndpointCatalog>,
    pub outputs: Arc<OutputRegistry>,
    pub api_manager: ApiManager,
    pub postgres_manager: PostgresManager,
}

impl App {
    pub fn initialize(options: &AppOptions) -> Result<Self, ClientError> {
        let logger = Logger::new("cloudharvest");
        let run_id = uuid::Uuid::new_v4().to_string();
        let validation = Validation::new();

        let config_dir = resolve_config_dir(options.config_dir.as_deref());
        let catalog = Arc::new(EndpointCatalog::load(&api_config_path(&config_dir))?);
        let outputs = Arc::new(OutputRegistry::load(&output_config_path(&config_dir))?);
        let store = CredentialStore::new(resolve_credentials_dir(&config_dir));

        let client = build_http_client(options.insecure)?;
        if options.insecure {
            logger.warn("TLS certificate verification is disabled", None);
        }
        logger.debug(
            "initialized",
            Some(&json!({
                "runId": run_id,
                "configDir": config_dir.display().to_string(),
                "endpoints": catalog.names().len(),
            })),
        );

        let postgres_manager = PostgresManager::new(logger.clone());
        let output_manager =
            OutputManager::new(logger.clone(), outputs.clone(), postgres_manager.clone());
        let access_manager = AccessManager::new(
            logger.clone(),
            client.clone(),
            catalog.clone(),
            store,
        );
        let api_manager = ApiManager::new(
            logger.clone(),
            validation,
            client,
            catalog.clone(),
            access_manager,
            output_manager,
        );

        Ok(Self {
            logger,
            run_id,
            catalog,
            outputs,
            api_manager,
            postgres_manager,
        })
    }
}

fn build_http_client(insecure: bool) -> Result<Client, ClientError> {
    let mut builder = Client::builder().redirect(reqwest::redirect::Policy::limited(10));
    if insecure {
        builder = builder.danger_accept_invalid_certs(true);
    }
    builder
        .build()
        .map_err(|err| ClientError::internal(format!("Failed to build HTTP client: {}", err)))
}
