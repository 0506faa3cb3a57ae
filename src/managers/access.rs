use crate::constants::auth as auth_constants;
use crate::constants::http::ERROR_PREVIEW_LIMIT;
use crate::constants::tokens::{LOCK_MAX_ATTEMPTS, LOCK_WAIT_MS};
use crate::errors::ClientError;
use crate::managers::api::{auth_url, map_reqwest_error};
use crate::services::catalog::{EndpointCatalog, TokenScope};
use crate::services::logger::Logger;
use crate::stores::{CredentialKey, CredentialRecord, CredentialStore};
use crate::utils::redact::redact_text;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Login parameters for one invocation. The password lives here and in the
/// outgoing request body only; it must never reach a log line or an error.
#[derive(Clone)]
pub struct AuthContext {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Owns token lifecycle for both credential scopes: serve from the store
/// while valid, wait briefly on a concurrent refresh, authenticate against
/// the controller otherwise. Tenant tokens chain through the organization
/// token via the assume-role call.
#[derive(Clone)]
pub struct AccessManager {
    logger: Logger,
    client: Client,
    catalog: Arc<EndpointCatalog>,
    store: CredentialStore,
}

impl AccessManager {
    pub fn new(
        logger: Logger,
        client: Client,
        catalog: Arc<EndpointCatalog>,
        store: CredentialStore,
    ) -> Self {
        Self {
            logger: logger.child("access"),
            client,
            catalog,
            store,
        }
    }

    pub async fn resolve(
        &self,
        scope: TokenScope,
        ctx: &AuthContext,
        tenant_id: Option<&str>,
    ) -> Result<String, ClientError> {
        match scope {
            TokenScope::Organization => self.organization_token(ctx).await,
            TokenScope::Tenant => {
                let tenant_id = tenant_id.ok_or_else(|| {
                    ClientError::caller("Endpoint requires a tenant scope")
                        .with_hint("Pass --tenant-id <id>")
                })?;
                self.tenant_token(ctx, tenant_id).await
            }
        }
    }

    pub async fn organization_token(&self, ctx: &AuthContext) -> Result<String, ClientError> {
        let key = CredentialKey::Organization;
        if let Some(token) = self.usable_token_after_wait(&key).await {
            return Ok(token);
        }
        self.refresh_organization(ctx).await
    }

    pub async fn tenant_token(
        &self,
        ctx: &AuthContext,
        tenant_id: &str,
    ) -> Result<String, ClientError> {
        let key = CredentialKey::Tenant(tenant_id.to_string());
        if let Some(token) = self.usable_token_after_wait(&key).await {
            return Ok(token);
        }
        self.refresh_tenant(ctx, tenant_id).await
    }

    /// Read the stored record, waiting out a fresh lock held by another
    /// process. Returns `None` whenever a refresh is due: record absent,
    /// expired, lock gone stale, or still locked after the waits ran out.
    async fn usable_token_after_wait(&self, key: &CredentialKey) -> Option<String> {
        let mut attempts = 0u32;
        loop {
            let now = Utc::now().naive_utc();
            match self.store.read(key) {
                Some(record) if record.is_usable(now) => return Some(record.token),
                Some(record)
                    if record.locked
                        && !record.lock_is_stale(now)
                        && attempts < LOCK_MAX_ATTEMPTS =>
                {
                    attempts += 1;
                    self.logger.info(
                        "waiting for a concurrent refresh",
                        Some(&json!({"credential": key.describe(), "attempt": attempts})),
                    );
                    tokio::time::sleep(Duration::from_millis(LOCK_WAIT_MS)).await;
                }
                _ => return None,
            }
        }
    }

    async fn refresh_organization(&self, ctx: &AuthContext) -> Result<String, ClientError> {
        let descriptor = self
            .catalog
            .lookup(auth_constants::ORG_LOGIN_ENDPOINT)
            .map_err(|_| {
                ClientError::config(format!(
                    "Endpoint catalog must declare '{}' for organization login",
                    auth_constants::ORG_LOGIN_ENDPOINT
                ))
            })?;
        let url = auth_url(&ctx.host, &descriptor.path)?;
        self.logger.info(
            "refreshing organization token",
            Some(&json!({"host": ctx.host, "username": ctx.username})),
        );

        let key = CredentialKey::Organization;
        let lease = self.store.acquire(&key, Utc::now().naive_utc())?;

        let payload = json!({
            "userName": ctx.username,
            "password": ctx.password,
        });
        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        let text = response.text().await.map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(auth_failure("Organization login", status.as_u16(), &text));
        }

        let body: Value = serde_json::from_str(&text).map_err(|_| {
            ClientError::auth("Organization login returned a non-JSON response")
        })?;
        let errcode = body.get("errcode").and_then(|v| v.as_str());
        if errcode != Some(auth_constants::SUCCESS_ERRCODE) {
            let errmsg = body.get("errmsg").and_then(|v| v.as_str()).unwrap_or("");
            return Err(ClientError::auth(format!(
                "Organization login rejected (errcode {})",
                errcode.unwrap_or("missing")
            ))
            .with_details(json!({"errmsg": errmsg})));
        }

        let token = extract_str(&body, "token_id")
            .ok_or_else(|| ClientError::auth("Organization login response is missing token_id"))?;
        let expires_at = extract_str(&body, "expiredDate").ok_or_else(|| {
            ClientError::auth("Organization login response is missing expiredDate")
        })?;

        let record = CredentialRecord::active(token, expires_at);
        lease.complete(&record)?;
        self.logger.info(
            "organization token refreshed",
            Some(&json!({"expiresAt": record.expires_at})),
        );
        Ok(record.token)
    }

    async fn refresh_tenant(
        &self,
        ctx: &AuthContext,
        tenant_id: &str,
    ) -> Result<String, ClientError> {
        let org_token = self.organization_token(ctx).await?;
        let descriptor = self
            .catalog
            .lookup(auth_constants::TENANT_TOKEN_ENDPOINT)
            .map_err(|_| {
                ClientError::config(format!(
                    "Endpoint catalog must declare '{}' for tenant tokens",
                    auth_constants::TENANT_TOKEN_ENDPOINT
                ))
            })?;
        let url = auth_url(&ctx.host, &descriptor.path)?;
        self.logger.info(
            "refreshing tenant token",
            Some(&json!({"host": ctx.host, "tenantId": tenant_id})),
        );

        let key = CredentialKey::Tenant(tenant_id.to_string());
        let lease = self.store.acquire(&key, Utc::now().naive_utc())?;

        let payload = json!({
            "identity": {
                "methods": ["assumeRole"],
                "assumeRole": {"tenantId": tenant_id},
            }
        });
        let response = self
            .client
            .post(url)
            .header(auth_constants::ACCESS_TOKEN_HEADER, &org_token)
            .json(&payload)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        let text = response.text().await.map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(auth_failure("Tenant token request", status.as_u16(), &text));
        }

        let body: Value = serde_json::from_str(&text).map_err(|_| {
            ClientError::auth("Tenant token response is not JSON")
        })?;
        let token = extract_str(&body, "tokenId")
            .ok_or_else(|| ClientError::auth("Tenant token response is missing tokenId"))?;
        let expires_at = extract_str(&body, "expiredDate")
            .ok_or_else(|| ClientError::auth("Tenant token response is missing expiredDate"))?;

        let record = CredentialRecord::active(token, expires_at);
        lease.complete(&record)?;
        self.logger.info(
            "tenant token refreshed",
            Some(&json!({"tenantId": tenant_id, "expiresAt": record.expires_at})),
        );
        Ok(record.token)
    }
}

fn extract_str(body: &Value, field: &str) -> Option<String> {
    body.get("data")
        .and_then(|data| data.get(field))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn auth_failure(what: &str, status: u16, body: &str) -> ClientError {
    ClientError::auth(format!("{} failed with status {}", what, status)).with_details(json!({
        "status": status,
        "body": redact_text(body, ERROR_PREVIEW_LIMIT, None),
    }))
}
