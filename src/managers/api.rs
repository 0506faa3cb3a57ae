use crate::constants::http::ERROR_PREVIEW_LIMIT;
use crate::errors::ClientError;
use crate::managers::access::{AccessManager, AuthContext};
use crate::managers::output::{OutputManager, SinkContext};
use crate::services::catalog::{EndpointCatalog, EndpointDescriptor, ParamKind};
use crate::services::logger::Logger;
use crate::services::validation::Validation;
use crate::utils::redact::redact_text;
use crate::utils::template::{placeholder_names, render_template, stringify, MissingValue};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use url::Url;

/// One invocation's worth of dispatch input, assembled by the CLI layer.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub endpoint: String,
    pub auth: AuthContext,
    pub tenant_id: Option<String>,
    pub args: Vec<(String, String)>,
}

/// What a completed call returns to the caller: the parsed body plus
/// bookkeeping for the summary line. Sink trouble never fails the call, so
/// the report carries it as data instead.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub status: u16,
    pub body: Value,
    pub record_count: usize,
    pub sink_report: Option<Value>,
}

#[derive(Clone)]
pub struct ApiManager {
    logger: Logger,
    validation: Validation,
    client: Client,
    catalog: Arc<EndpointCatalog>,
    access: AccessManager,
    output: OutputManager,
}

impl ApiManager {
    pub fn new(
        logger: Logger,
        validation: Validation,
        client: Client,
        catalog: Arc<EndpointCatalog>,
        access: AccessManager,
        output: OutputManager,
    ) -> Self {
        Self {
            logger: logger.child("api"),
            validation,
            client,
            catalog,
            access,
            output,
        }
    }

    /// Run one catalog endpoint end to end: resolve configuration, resolve
    /// the token, perform the HTTP call, hand the response to the output
    /// sink. Configuration problems surface before any network traffic.
    pub async fn call(&self, request: &CallRequest) -> Result<CallOutcome, ClientError> {
        let descriptor = self.catalog.lookup(&request.endpoint)?;
        let method = parse_method(&descriptor.method)?;
        let args = self.normalize_arguments(descriptor, request)?;

        // Sink settings come from config too; a broken handler entry should
        // not cost a round-trip to the controller.
        let sink = self.output.resolve_sink(&request.endpoint)?;

        let token = self
            .access
            .resolve(descriptor.scope, &request.auth, request.tenant_id.as_deref())
            .await?;

        let path = render_template(&descriptor.path, &args, MissingValue::Fail)
            .map_err(|err| err.with_hint("Supply the referenced value with --arg name=value"))?;
        let headers = self.render_headers(descriptor, &args, &token)?;
        let query = build_query_pairs(descriptor, &args);
        let url = build_url(&request.auth.host, &path, &query)?;

        let body = if method == Method::POST {
            Some(collect_body(descriptor, &args))
        } else {
            None
        };

        self.logger.info(
            "calling endpoint",
            Some(&json!({
                "endpoint": request.endpoint,
                "method": method.as_str(),
                "url": url.as_str(),
            })),
        );
        if self.logger.is_debug() {
            self.logger.debug(
                "request detail",
                Some(&json!({
                    "headers": headers_to_value(&headers),
                    "body": body,
                })),
            );
        }

        let mut req = self.client.request(method, url).headers(headers);
        if let Some(body) = &body {
            req = req.json(body);
        }
        let started = std::time::Instant::now();
        let response = req.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let text = response.text().await.map_err(map_reqwest_error)?;
        let duration_ms = started.elapsed().as_millis() as u64;

        if !status.is_success() {
            self.logger.error(
                "endpoint call failed",
                Some(&json!({
                    "endpoint": request.endpoint,
                    "status": status.as_u16(),
                    "duration_ms": duration_ms,
                })),
            );
            return Err(ClientError::call_failed(format!(
                "Endpoint '{}' returned status {}",
                request.endpoint,
                status.as_u16()
            ))
            .with_details(json!({
                "status": status.as_u16(),
                "body": redact_text(&text, ERROR_PREVIEW_LIMIT, None),
            })));
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|_| {
            ClientError::call_failed(format!(
                "Endpoint '{}' returned a non-JSON body",
                request.endpoint
            ))
            .with_details(json!({
                "status": status.as_u16(),
                "body": redact_text(&text, ERROR_PREVIEW_LIMIT, None),
            }))
        })?;

        let records = self.extract_records(&request.endpoint, descriptor, &parsed);
        self.logger.info(
            "endpoint call succeeded",
            Some(&json!({
                "endpoint": request.endpoint,
                "status": status.as_u16(),
                "records": records.len(),
                "duration_ms": duration_ms,
            })),
        );

        let sink_context = SinkContext {
            endpoint: &request.endpoint,
            args: &args,
            response: &parsed,
            records: &records,
        };
        let sink_report = match self.output.persist(&sink, &sink_context).await {
            Ok(report) => Some(report),
            Err(err) => {
                // The call itself succeeded; losing the sink write must not
                // change that. The operator learns from the log line.
                self.logger.error(
                    "output handler failed",
                    Some(&json!({
                        "endpoint": request.endpoint,
                        "error": err.to_string(),
                        "kind": err.kind,
                    })),
                );
                None
            }
        };

        Ok(CallOutcome {
            status: status.as_u16(),
            body: parsed,
            record_count: records.len(),
            sink_report,
        })
    }

    /// Apply the descriptor's declared types to raw `key=value` arguments.
    /// Undeclared names stay available to templates but are never sent on
    /// the wire; a repeated name keeps its last value.
    fn normalize_arguments(
        &self,
        descriptor: &EndpointDescriptor,
        request: &CallRequest,
    ) -> Result<Map<String, Value>, ClientError> {
        let mut args = Map::new();
        let mut undeclared = Vec::new();
        for (name, raw) in &request.args {
            let value = match descriptor.param_kind(name) {
                Some(ParamKind::Int) => Value::Number(
                    self.validation.ensure_int(raw, name)?.into(),
                ),
                Some(ParamKind::Array) => Value::Array(
                    raw.split(',').map(|part| Value::String(part.to_string())).collect(),
                ),
                Some(ParamKind::String) => Value::String(raw.clone()),
                None => {
                    undeclared.push(name.clone());
                    Value::String(raw.clone())
                }
            };
            args.insert(name.clone(), value);
        }
        if let Some(tenant_id) = &request.tenant_id {
            args.entry("tenant_id".to_string())
                .or_insert_with(|| Value::String(tenant_id.clone()));
        }
        if !undeclared.is_empty() {
            self.logger.debug(
                "arguments not declared by the endpoint",
                Some(&json!({ "names": undeclared })),
            );
        }
        Ok(args)
    }

    fn render_headers(
        &self,
        descriptor: &EndpointDescriptor,
        args: &Map<String, Value>,
        token: &str,
    ) -> Result<HeaderMap, ClientError> {
        let mut context = args.clone();
        context.insert("token".to_string(), Value::String(token.to_string()));
        let mut rendered = Vec::new();
        for (name, template) in &descriptor.headers {
            let value = render_template(template, &context, MissingValue::Fail)
                .map_err(|err| err.with_hint(format!("While rendering header '{}'", name)))?;
            rendered.push((name.clone(), value));
        }
        headers_to_headermap(&rendered)
    }

    /// Pull the configured extraction key out of the body. Arrays persist
    /// element-wise, a lone object persists as one record, anything else
    /// means the endpoint had nothing row-shaped to offer.
    fn extract_records(
        &self,
        endpoint: &str,
        descriptor: &EndpointDescriptor,
        body: &Value,
    ) -> Vec<Value> {
        match body.get(&descriptor.response_key) {
            Some(Value::Array(items)) => items.clone(),
            Some(single @ Value::Object(_)) => vec![single.clone()],
            Some(Value::Null) | None => {
                self.logger.warn(
                    "response key missing from body",
                    Some(&json!({
                        "endpoint": endpoint,
                        "responseKey": descriptor.response_key,
                    })),
                );
                Vec::new()
            }
            Some(other) => {
                self.logger.warn(
                    "response key does not hold records",
                    Some(&json!({
                        "endpoint": endpoint,
                        "responseKey": descriptor.response_key,
                        "found": value_type_name(other),
                    })),
                );
                Vec::new()
            }
        }
    }
}

fn parse_method(raw: &str) -> Result<Method, ClientError> {
    if raw.eq_ignore_ascii_case("get") {
        Ok(Method::GET)
    } else if raw.eq_ignore_ascii_case("post") {
        Ok(Method::POST)
    } else {
        Err(
            ClientError::config(format!("Unsupported HTTP method '{}'", raw))
                .with_hint("Declare the endpoint with method GET or POST"),
        )
    }
}

/// Query pairs from declared URL parameters: values consumed by a path
/// placeholder stay out of the query string, arrays become repeated keys.
fn build_query_pairs(
    descriptor: &EndpointDescriptor,
    args: &Map<String, Value>,
) -> Vec<(String, String)> {
    let consumed = placeholder_names(&descriptor.path);
    let mut pairs = Vec::new();
    for param in &descriptor.url_params {
        if consumed.iter().any(|name| name == &param.name) {
            continue;
        }
        let Some(value) = args.get(&param.name).filter(|v| !v.is_null()) else {
            continue;
        };
        match value {
            Value::Array(items) => {
                for item in items {
                    pairs.push((param.name.clone(), stringify(item)));
                }
            }
            other => pairs.push((param.name.clone(), stringify(other))),
        }
    }
    pairs
}

fn collect_body(descriptor: &EndpointDescriptor, args: &Map<String, Value>) -> Value {
    let mut body = Map::new();
    for param in &descriptor.body_params {
        if let Some(value) = args.get(&param.name) {
            if !value.is_null() {
                body.insert(param.name.clone(), value.clone());
            }
        }
    }
    Value::Object(body)
}

pub(crate) fn build_url(
    host: &str,
    path: &str,
    query: &[(String, String)],
) -> Result<Url, ClientError> {
    let base = Url::parse(&format!("https://{}", host))
        .map_err(|_| ClientError::caller(format!("Invalid host '{}'", host)))?;
    let mut url = base
        .join(path)
        .map_err(|_| ClientError::config(format!("Invalid endpoint path '{}'", path)))?;
    for (key, value) in query {
        url.query_pairs_mut().append_pair(key, value);
    }
    Ok(url)
}

pub(crate) fn auth_url(host: &str, path: &str) -> Result<Url, ClientError> {
    build_url(host, path, &[])
}

fn headers_to_headermap(headers: &[(String, String)]) -> Result<HeaderMap, ClientError> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| ClientError::config(format!("Invalid header name '{}'", key)))?;
        let val = HeaderValue::from_str(value)
            .map_err(|_| ClientError::config(format!("Invalid value for header '{}'", key)))?;
        map.insert(name, val);
    }
    Ok(map)
}

fn headers_to_value(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for (key, value) in headers {
        if let Ok(text) = value.to_str() {
            map.insert(key.as_str().to_string(), Value::String(text.to_string()));
        }
    }
    Value::Object(map)
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        return ClientError::call_failed("HTTP request timed out");
    }
    if err.is_connect() {
        return ClientError::call_failed(format!("Connection failed: {}", err));
    }
    ClientError::call_failed(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::ParamSpec;
    use std::collections::BTreeMap;

    fn descriptor(url_params: &[(&str, ParamKind)], path: &str) -> EndpointDescriptor {
        EndpointDescriptor {
            method: "GET".to_string(),
            path: path.to_string(),
            scope: crate::services::catalog::TokenScope::Organization,
            headers: BTreeMap::new(),
            url_params: url_params
                .iter()
                .map(|(name, kind)| ParamSpec {
                    name: name.to_string(),
                    kind: *kind,
                    description: String::new(),
                })
                .collect(),
            body_params: Vec::new(),
            response_key: "data".to_string(),
            description: String::new(),
        }
    }

    fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn methods_other_than_get_and_post_are_rejected() {
        assert!(parse_method("get").is_ok());
        assert!(parse_method("POST").is_ok());
        assert!(parse_method("DELETE").is_err());
    }

    #[test]
    fn path_placeholders_do_not_leak_into_the_query() {
        let descriptor = descriptor(
            &[("tenant_id", ParamKind::String), ("page", ParamKind::Int)],
            "/tenants/{tenant_id}/devices",
        );
        let args = args(&[
            ("tenant_id", Value::String("t-1".to_string())),
            ("page", Value::Number(2.into())),
        ]);
        let pairs = build_query_pairs(&descriptor, &args);
        assert_eq!(pairs, vec![("page".to_string(), "2".to_string())]);
    }

    #[test]
    fn arguments_partition_into_query_and_body() {
        let mut descriptor = descriptor(&[("siteId", ParamKind::String)], "/devices");
        descriptor.method = "POST".to_string();
        descriptor.body_params = vec![
            ParamSpec {
                name: "pageSize".to_string(),
                kind: ParamKind::Int,
                description: String::new(),
            },
            ParamSpec {
                name: "note".to_string(),
                kind: ParamKind::String,
                description: String::new(),
            },
        ];
        let args = args(&[
            ("siteId", Value::String("s-1".to_string())),
            ("pageSize", Value::Number(50.into())),
            ("note", Value::Null),
            ("extra", Value::String("never sent".to_string())),
        ]);

        let pairs = build_query_pairs(&descriptor, &args);
        assert_eq!(pairs, vec![("siteId".to_string(), "s-1".to_string())]);

        let body = collect_body(&descriptor, &args);
        assert_eq!(body, serde_json::json!({"pageSize": 50}));
    }

    #[test]
    fn array_values_become_repeated_keys_without_json_quoting() {
        let descriptor = descriptor(&[("status", ParamKind::Array)], "/devices");
        let args = args(&[(
            "status",
            Value::Array(vec![
                Value::String("online".to_string()),
                Value::String("offline".to_string()),
            ]),
        )]);
        let pairs = build_query_pairs(&descriptor, &args);
        assert_eq!(
            pairs,
            vec![
                ("status".to_string(), "online".to_string()),
                ("status".to_string(), "offline".to_string()),
            ]
        );
    }

    #[test]
    fn url_building_appends_query_to_joined_path() {
        let url = build_url(
            "nce.example.com",
            "/controller/v2/tenants",
            &[("pageSize".to_string(), "100".to_string())],
        )
        .expect("url");
        assert_eq!(
            url.as_str(),
            "https://nce.example.com/controller/v2/tenants?pageSize=100"
        );
    }

    #[test]
    fn unusable_hosts_fail_url_building() {
        assert!(build_url("", "/path", &[]).is_err());
        assert!(build_url("nce example.com", "/path", &[]).is_err());
    }
}
