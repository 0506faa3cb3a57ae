use crate::constants::catalog::DEFAULT_RESPONSE_KEY;
use crate::errors::ClientError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Credential domain an endpoint requires. `msp` is accepted as a legacy
/// spelling of the organization scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    #[serde(alias = "msp")]
    Organization,
    Tenant,
}

impl TokenScope {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenScope::Organization => "organization",
            TokenScope::Tenant => "tenant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    #[default]
    String,
    Int,
    Array,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: ParamKind,
    #[serde(default)]
    pub description: String,
}

/// One callable operation as declared in `api_config.json`. Immutable at
/// runtime; the dispatcher and the access manager only ever read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub method: String,
    pub path: String,
    pub scope: TokenScope,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub url_params: Vec<ParamSpec>,
    #[serde(default)]
    pub body_params: Vec<ParamSpec>,
    #[serde(default = "default_response_key")]
    pub response_key: String,
    #[serde(default)]
    pub description: String,
}

fn default_response_key() -> String {
    DEFAULT_RESPONSE_KEY.to_string()
}

impl EndpointDescriptor {
    /// Declared type of a parameter, searching URL then body lists.
    pub fn param_kind(&self, name: &str) -> Option<ParamKind> {
        self.url_params
            .iter()
            .chain(self.body_params.iter())
            .find(|param| param.name == name)
            .map(|param| param.kind)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    endpoints: BTreeMap<String, EndpointDescriptor>,
}

#[derive(Debug, Clone)]
pub struct EndpointCatalog {
    endpoints: BTreeMap<String, EndpointDescriptor>,
}

impl EndpointCatalog {
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            ClientError::config(format!(
                "Cannot read endpoint catalog {}: {}",
                path.display(),
                err
            ))
        })?;
        let parsed: CatalogFile = serde_json::from_str(&raw).map_err(|err| {
            ClientError::config(format!(
                "Endpoint catalog {} is not valid: {}",
                path.display(),
                err
            ))
        })?;
        Ok(Self {
            endpoints: parsed.endpoints,
        })
    }

    pub fn lookup(&self, name: &str) -> Result<&EndpointDescriptor, ClientError> {
        self.endpoints.get(name).ok_or_else(|| {
            ClientError::config(format!("Unknown endpoint '{}'", name)).with_hint(format!(
                "Known endpoints: {}",
                self.names().join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.endpoints.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &EndpointDescriptor)> {
        self.endpoints.iter()
    }
}
