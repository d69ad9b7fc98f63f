//! Orchestration against the external automation engine.
//!
//! Wraps the HTTP client with the launch protocol: ensure the host exists
//! in the engine, resolve template and inventory ids, shape the payload to
//! what the template accepts, and translate upstream failures into stable
//! error codes.

pub mod client;
pub mod filter;

pub use client::AwxClient;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::Result;
use crate::config::awx::AwxConfig;
use crate::error::{Error, code};
use crate::model::Host;

/// Alias template names tolerated for the standard client install.
const CLIENT_ALIASES: [&str; 2] = ["client", "monokit-client"];
const CLIENT_TEMPLATE: &str = "manual-install-monokit-client";

#[derive(Debug, Default, Deserialize)]
pub struct LaunchRequest {
    pub template_id: Option<i64>,
    pub template_name: Option<String>,
    pub workflow_template_id: Option<i64>,
    pub inventory_id: Option<i64>,
    pub extra_vars: Option<Map<String, Value>>,
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LaunchResponse {
    pub job_id: i64,
    pub status: String,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_template_id: Option<i64>,
}

pub struct Awx {
    config: AwxConfig,
    client: AwxClient,
}

impl Awx {
    pub fn new(config: AwxConfig) -> Result<Self> {
        let client = AwxClient::new(&config)
            .map_err(|err| Error::awx(code::AWX_API_ERROR, err))?;
        Ok(Awx { config, client })
    }

    pub async fn job_templates(&self) -> Result<Vec<Value>> {
        self.client.job_templates().await.map_err(into_error)
    }

    pub async fn workflow_templates(&self) -> Result<Vec<Value>> {
        self.client.workflow_templates().await.map_err(into_error)
    }

    /// Finds the host in the engine by exact name, creating it under the
    /// default inventory when missing. Returns the engine host id.
    pub async fn ensure_host(&self, name: &str, ip_address: &str) -> Result<i64> {
        if let Some(id) = self.client.find_host(name).await.map_err(into_error)? {
            return Ok(id);
        }

        let inventory = self
            .config
            .default_inventory_id
            .ok_or_else(|| Error::awx(code::MISSING_INVENTORY_ID, "no inventory id configured"))?;
        let variables = serde_yaml::to_string(&json!({ "ansible_host": ip_address }))
            .map_err(|err| Error::Unexpected(err.into()))?;
        let created = self
            .client
            .create_host(&json!({
                "name": name,
                "inventory": inventory,
                "enabled": true,
                "variables": variables,
            }))
            .await
            .map_err(into_error)?;
        created["id"]
            .as_i64()
            .ok_or_else(|| Error::awx(code::AWX_API_ERROR, "engine host create returned no id"))
    }

    pub async fn launch_job(&self, host: &Host, request: &LaunchRequest) -> Result<LaunchResponse> {
        self.ensure_host(&host.name, &host.ip_address).await?;

        let template_id = self.resolve_job_template(request)?;
        let inventory_id = self.resolve_inventory(request)?;
        let payload = launch_payload(
            inventory_id,
            Some(&host.name),
            request.extra_vars.as_ref(),
            request.format.as_deref(),
            !self.config.rejects_extra_vars(template_id),
        )?;

        let response = self
            .client
            .launch_job(template_id, &payload)
            .await
            .map_err(translate_launch_error)?;
        let job_id = launched_id(&response)?;
        Ok(LaunchResponse {
            job_id,
            status: "launched".to_string(),
            host: host.name.clone(),
            template_id: Some(template_id),
            workflow_template_id: None,
        })
    }

    pub async fn launch_workflow(
        &self,
        host: &Host,
        request: &LaunchRequest,
    ) -> Result<LaunchResponse> {
        self.ensure_host(&host.name, &host.ip_address).await?;

        let template_id = self.resolve_workflow_template(request)?;
        let inventory_id = self.resolve_inventory(request)?;
        // Workflows are not host-limited; the scope comes from the
        // workflow's own node layout.
        let payload = launch_payload(
            inventory_id,
            None,
            request.extra_vars.as_ref(),
            request.format.as_deref(),
            !self.config.rejects_extra_vars(template_id),
        )?;

        let response = self
            .client
            .launch_workflow(template_id, &payload)
            .await
            .map_err(translate_launch_error)?;
        let job_id = launched_id(&response)?;
        Ok(LaunchResponse {
            job_id,
            status: "launched".to_string(),
            host: host.name.clone(),
            template_id: None,
            workflow_template_id: Some(template_id),
        })
    }

    /// Upstream job JSON, passed through untouched.
    pub async fn job_status(&self, job_id: i64) -> Result<Value> {
        self.client.job(job_id).await.map_err(into_error)
    }

    /// Plain-text job output, host-focused unless the caller opts out.
    pub async fn job_logs(&self, job_id: i64, hostname: &str, focus: bool) -> Result<String> {
        let stdout = self.client.job_stdout(job_id).await.map_err(into_error)?;
        if focus {
            Ok(filter::focus_host(&stdout, hostname))
        } else {
            Ok(stdout)
        }
    }

    fn resolve_job_template(&self, request: &LaunchRequest) -> Result<i64> {
        if let Some(id) = request.template_id {
            return Ok(id);
        }
        if let Some(name) = request.template_name.as_deref() {
            if let Some(id) = self.config.job_template_id(name) {
                return Ok(id);
            }
            if CLIENT_ALIASES.contains(&name) {
                if let Some(id) = self.config.job_template_id(CLIENT_TEMPLATE) {
                    return Ok(id);
                }
            }
            return Err(Error::awx(
                code::TEMPLATE_NOT_FOUND,
                format!("no job template named `{name}`"),
            ));
        }
        self.config.default_template_id.ok_or_else(|| {
            Error::awx(code::MISSING_TEMPLATE_INFO, "no template id, name, or default")
        })
    }

    fn resolve_workflow_template(&self, request: &LaunchRequest) -> Result<i64> {
        if let Some(id) = request.workflow_template_id {
            return Ok(id);
        }
        if let Some(name) = request.template_name.as_deref() {
            return self.config.workflow_template_id(name).ok_or_else(|| {
                Error::awx(
                    code::WORKFLOW_TEMPLATE_NOT_FOUND,
                    format!("no workflow template named `{name}`"),
                )
            });
        }
        Err(Error::awx(
            code::MISSING_TEMPLATE_INFO,
            "no workflow template id or name",
        ))
    }

    fn resolve_inventory(&self, request: &LaunchRequest) -> Result<i64> {
        request
            .inventory_id
            .or(self.config.default_inventory_id)
            .ok_or_else(|| {
                Error::awx(
                    code::MISSING_INVENTORY_ID,
                    "no inventory id given and no default configured",
                )
            })
    }
}

/// Minimum payload is `{inventory}` (+ `limit` for host-scoped jobs).
/// `extra_vars` is serialized to a string, YAML on request, JSON otherwise,
/// and omitted entirely for templates that reject it.
fn launch_payload(
    inventory_id: i64,
    limit: Option<&str>,
    extra_vars: Option<&Map<String, Value>>,
    format: Option<&str>,
    allow_extra_vars: bool,
) -> Result<Value> {
    let mut payload = Map::new();
    payload.insert("inventory".to_string(), json!(inventory_id));
    if let Some(limit) = limit {
        payload.insert("limit".to_string(), json!(limit));
    }
    if allow_extra_vars {
        if let Some(vars) = extra_vars {
            let serialized = match format {
                Some("yaml") | Some("yml") => serde_yaml::to_string(vars)
                    .map_err(|err| Error::Unexpected(err.into()))?,
                _ => serde_json::to_string(vars).map_err(|err| Error::Unexpected(err.into()))?,
            };
            payload.insert("extra_vars".to_string(), json!(serialized));
        }
    }
    Ok(Value::Object(payload))
}

fn launched_id(response: &Value) -> Result<i64> {
    response["id"]
        .as_i64()
        .ok_or_else(|| Error::awx(code::AWX_API_ERROR, "engine launch returned no job id"))
}

fn into_error(err: client::Error) -> Error {
    match err {
        client::Error::ResponseCode(status, body) => Error::upstream(status, &body),
        other => Error::awx(code::AWX_API_ERROR, other),
    }
}

/// Translates well-known engine launch failures into stable codes; anything
/// unrecognized mirrors the upstream response.
fn translate_launch_error(err: client::Error) -> Error {
    let client::Error::ResponseCode(status, body) = err else {
        return Error::awx(code::AWX_API_ERROR, err);
    };
    if !status.is_client_error() {
        return Error::upstream(status, &body);
    }

    let lower = body.to_lowercase();
    let missing = |what: &str| {
        lower.contains(what) && (lower.contains("not found") || lower.contains("does not exist"))
    };
    if missing("inventory") {
        Error::awx(code::INVENTORY_NOT_FOUND, "engine rejected the inventory id")
    } else if missing("template") {
        Error::awx(code::TEMPLATE_NOT_FOUND, "engine rejected the template id")
    } else if lower.contains("already exists") || lower.contains("conflict") {
        Error::awx(code::TEMPLATE_NAME_CONFLICT, "template name conflict")
    } else if lower.contains("capacity") || lower.contains("queue") {
        Error::awx(code::QUEUE_FULL, "engine queue is full")
    } else {
        Error::upstream(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;

    fn config(url: &str) -> AwxConfig {
        let mut job_templates = HashMap::new();
        job_templates.insert(CLIENT_TEMPLATE.to_string(), 12);
        job_templates.insert("reboot".to_string(), 30);
        let mut workflow_templates = HashMap::new();
        workflow_templates.insert("provision".to_string(), 95);

        AwxConfig {
            enabled: true,
            url: url.to_string(),
            username: "svc".to_string(),
            password: "pw".to_string(),
            timeout: Duration::from_secs(5),
            verify_tls: true,
            default_inventory_id: Some(7),
            default_template_id: Some(12),
            job_templates,
            workflow_templates,
            templates_without_vars: vec![95],
        }
    }

    fn awx(url: &str) -> Awx {
        Awx::new(config(url)).unwrap()
    }

    fn host(name: &str) -> Host {
        use chrono::Utc;
        Host {
            id: 1,
            name: name.to_string(),
            ip_address: "10.0.0.5".to_string(),
            os: "debian".to_string(),
            inventory: "default".to_string(),
            groups: "nil".to_string(),
            installed_components: String::new(),
            disabled_components: "nil".to_string(),
            monokit_version: "7.0.0".to_string(),
            wants_update_to: String::new(),
            status: "Online".to_string(),
            up_for_deletion: false,
            awx_only: false,
            awx_host_id: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn template_resolution_order() {
        let awx = awx("https://awx.example.com");

        let explicit = LaunchRequest {
            template_id: Some(99),
            template_name: Some("reboot".to_string()),
            ..Default::default()
        };
        assert_eq!(awx.resolve_job_template(&explicit).unwrap(), 99);

        let by_name = LaunchRequest {
            template_name: Some("reboot".to_string()),
            ..Default::default()
        };
        assert_eq!(awx.resolve_job_template(&by_name).unwrap(), 30);

        // "client" and "monokit-client" fall back to the standard install
        // template.
        for alias in CLIENT_ALIASES {
            let request = LaunchRequest {
                template_name: Some(alias.to_string()),
                ..Default::default()
            };
            assert_eq!(awx.resolve_job_template(&request).unwrap(), 12);
        }

        let defaulted = LaunchRequest::default();
        assert_eq!(awx.resolve_job_template(&defaulted).unwrap(), 12);
    }

    #[test]
    fn missing_inventory_is_a_stable_code() {
        let mut bare = config("https://awx.example.com");
        bare.default_inventory_id = None;
        let awx = Awx::new(bare).unwrap();

        let err = awx.resolve_inventory(&LaunchRequest::default()).unwrap_err();
        let Error::Awx { code: got, .. } = err else {
            panic!("expected coded error");
        };
        assert_eq!(got, code::MISSING_INVENTORY_ID);
    }

    #[test]
    fn payload_minimum_and_extra_vars_shapes() {
        let payload = launch_payload(7, Some("alpha"), None, None, true).unwrap();
        assert_eq!(payload, json!({"inventory": 7, "limit": "alpha"}));

        let mut vars = Map::new();
        vars.insert("version".to_string(), json!("7.1.0"));

        let with_json = launch_payload(7, Some("alpha"), Some(&vars), None, true).unwrap();
        assert_eq!(with_json["extra_vars"], json!(r#"{"version":"7.1.0"}"#));

        let with_yaml =
            launch_payload(7, Some("alpha"), Some(&vars), Some("yaml"), true).unwrap();
        let yaml = with_yaml["extra_vars"].as_str().unwrap();
        assert!(yaml.contains("version: 7.1.0"));

        // Templates configured to reject extra vars never see the field.
        let rejected = launch_payload(7, None, Some(&vars), None, false).unwrap();
        assert_eq!(rejected, json!({"inventory": 7}));
    }

    #[test]
    fn launch_error_translation() {
        let inventory = translate_launch_error(client::Error::ResponseCode(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"inventory": ["Inventory matching query does not exist."]}"#.to_string(),
        ));
        assert!(matches!(
            inventory,
            Error::Awx { code: code::INVENTORY_NOT_FOUND, .. }
        ));

        let queue = translate_launch_error(client::Error::ResponseCode(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"detail": "Job queue is at capacity"}"#.to_string(),
        ));
        assert!(matches!(queue, Error::Awx { code: code::QUEUE_FULL, .. }));

        // Unrecognized bodies mirror upstream.
        let other = translate_launch_error(client::Error::ResponseCode(
            reqwest::StatusCode::IM_A_TEAPOT,
            "short and stout".to_string(),
        ));
        assert!(matches!(other, Error::Upstream { .. }));
    }

    #[tokio::test]
    async fn workflow_launch_sends_minimum_payload() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/hosts/")
            .match_query(mockito::Matcher::UrlEncoded("name".into(), "alpha".into()))
            .with_status(200)
            .with_body(r#"{"count": 1, "next": null, "results": [{"id": 3, "name": "alpha"}]}"#)
            .create_async()
            .await;
        let launch = server
            .mock("POST", "/api/v2/workflow_job_templates/95/launch/")
            .match_body(mockito::Matcher::Json(json!({"inventory": 7})))
            .with_status(201)
            .with_body(r#"{"id": 42, "status": "pending"}"#)
            .create_async()
            .await;

        let awx = awx(&server.url());
        let request = LaunchRequest {
            workflow_template_id: Some(95),
            inventory_id: Some(7),
            ..Default::default()
        };
        let response = awx.launch_workflow(&host("alpha"), &request).await.unwrap();

        launch.assert_async().await;
        assert_eq!(response.job_id, 42);
        assert_eq!(response.status, "launched");
        assert_eq!(response.host, "alpha");
        assert_eq!(response.workflow_template_id, Some(95));
    }

    #[tokio::test]
    async fn ensure_host_creates_with_yaml_variables() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/hosts/")
            .match_query(mockito::Matcher::UrlEncoded("name".into(), "beta".into()))
            .with_status(200)
            .with_body(r#"{"count": 0, "next": null, "results": []}"#)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/api/v2/hosts/")
            .match_body(mockito::Matcher::PartialJson(json!({
                "name": "beta",
                "inventory": 7,
                "enabled": true,
            })))
            .with_status(201)
            .with_body(r#"{"id": 55, "name": "beta"}"#)
            .create_async()
            .await;

        let awx = awx(&server.url());
        let id = awx.ensure_host("beta", "10.0.0.9").await.unwrap();

        create.assert_async().await;
        assert_eq!(id, 55);
    }
}
