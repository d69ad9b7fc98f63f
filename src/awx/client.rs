use displaydoc::Display;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::awx::AwxConfig;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// Failed to build engine client: {0}
    BuildClient(reqwest::Error),
    /// Failed to send engine request: {0}
    SendRequest(reqwest::Error),
    /// Failed to parse engine response with code `{0}`: {1}
    ParseResponse(reqwest::StatusCode, reqwest::Error),
    /// Engine returned {0}: {1}
    ResponseCode(reqwest::StatusCode, String),
}

/// One page of an engine list endpoint.
#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    results: Vec<Value>,
}

/// Thin HTTP client for the automation engine: BasicAuth, configured
/// timeout, optional TLS verification.
pub struct AwxClient {
    inner: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl AwxClient {
    pub fn new(config: &AwxConfig) -> Result<Self, Error> {
        let inner = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(Error::BuildClient)?;
        Ok(AwxClient {
            inner,
            base_url: config.base_url(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Follows `next` links until the catalog is exhausted, accumulating
    /// every page's `results`. Short-circuits on any non-2xx.
    pub async fn list_paginated(&self, path: &str) -> Result<Vec<Value>, Error> {
        let mut results = Vec::new();
        let mut next_url = format!("{}{path}", self.base_url);
        loop {
            let page: Page = self.get_json(&next_url).await?;
            results.extend(page.results);
            match page.next {
                Some(next) => next_url = resolve_next(&self.base_url, &next),
                None => break,
            }
        }
        Ok(results)
    }

    pub async fn job_templates(&self) -> Result<Vec<Value>, Error> {
        self.list_paginated("/api/v2/job_templates/").await
    }

    pub async fn workflow_templates(&self) -> Result<Vec<Value>, Error> {
        self.list_paginated("/api/v2/workflow_job_templates/").await
    }

    /// Exact-name search; `Some(id)` when the engine already knows the host.
    pub async fn find_host(&self, name: &str) -> Result<Option<i64>, Error> {
        let url = format!("{}/api/v2/hosts/?name={name}", self.base_url);
        let page: Page = self.get_json(&url).await?;
        let id = page
            .results
            .iter()
            .find(|host| host["name"] == name)
            .and_then(|host| host["id"].as_i64());
        Ok(id)
    }

    pub async fn create_host(&self, body: &Value) -> Result<Value, Error> {
        let url = format!("{}/api/v2/hosts/", self.base_url);
        self.post_json(&url, body).await
    }

    pub async fn launch_job(&self, template_id: i64, body: &Value) -> Result<Value, Error> {
        let url = format!("{}/api/v2/job_templates/{template_id}/launch/", self.base_url);
        self.post_json(&url, body).await
    }

    pub async fn launch_workflow(&self, template_id: i64, body: &Value) -> Result<Value, Error> {
        let url = format!(
            "{}/api/v2/workflow_job_templates/{template_id}/launch/",
            self.base_url
        );
        self.post_json(&url, body).await
    }

    pub async fn job(&self, job_id: i64) -> Result<Value, Error> {
        let url = format!("{}/api/v2/jobs/{job_id}/", self.base_url);
        self.get_json(&url).await
    }

    /// Plain-text job output.
    pub async fn job_stdout(&self, job_id: i64) -> Result<String, Error> {
        let url = format!(
            "{}/api/v2/jobs/{job_id}/stdout/?format=txt_download",
            self.base_url
        );
        let response = self
            .inner
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(Error::SendRequest)?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| Error::ParseResponse(status, err))?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(Error::ResponseCode(status, body))
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, Error> {
        let response = self
            .inner
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(Error::SendRequest)?;
        self.read_json(response).await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, Error> {
        let response = self
            .inner
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .send()
            .await
            .map_err(Error::SendRequest)?;
        self.read_json(response).await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, Error> {
        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|err| Error::ParseResponse(status, err))
        } else {
            let body = response
                .text()
                .await
                .map_err(|err| Error::ParseResponse(status, err))?;
            Err(Error::ResponseCode(status, body))
        }
    }
}

/// Re-anchors a pagination link onto the configured base URL. Engines hand
/// back absolute, root-relative, or protocol-relative links depending on
/// their proxy setup; all three collapse to base + path.
pub fn resolve_next(base_url: &str, next: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if let Some(rest) = next.strip_prefix("//") {
        return match rest.find('/') {
            Some(idx) => format!("{base}{}", &rest[idx..]),
            None => base.to_string(),
        };
    }
    if next.starts_with("http://") || next.starts_with("https://") {
        return match Url::parse(next) {
            Ok(url) => {
                let mut resolved = format!("{base}{}", url.path());
                if let Some(query) = url.query() {
                    resolved.push('?');
                    resolved.push_str(query);
                }
                resolved
            }
            Err(_) => next.to_string(),
        };
    }
    if next.starts_with('/') {
        format!("{base}{next}")
    } else {
        format!("{base}/{next}")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;

    fn test_config(url: &str) -> AwxConfig {
        AwxConfig {
            enabled: true,
            url: url.to_string(),
            username: "svc".to_string(),
            password: "pw".to_string(),
            timeout: Duration::from_secs(5),
            verify_tls: true,
            default_inventory_id: Some(1),
            default_template_id: None,
            job_templates: HashMap::new(),
            workflow_templates: HashMap::new(),
            templates_without_vars: vec![],
        }
    }

    #[test]
    fn next_link_forms_re_anchor_to_base() {
        let base = "https://awx.example.com";
        assert_eq!(
            resolve_next(base, "/api/v2/job_templates/?page=2"),
            "https://awx.example.com/api/v2/job_templates/?page=2"
        );
        assert_eq!(
            resolve_next(base, "http://internal:8052/api/v2/job_templates/?page=2"),
            "https://awx.example.com/api/v2/job_templates/?page=2"
        );
        assert_eq!(
            resolve_next(base, "//internal/api/v2/job_templates/?page=3"),
            "https://awx.example.com/api/v2/job_templates/?page=3"
        );
        // Trailing slashes on the base never double up.
        assert_eq!(
            resolve_next("https://awx.example.com/", "/api/v2/jobs/"),
            "https://awx.example.com/api/v2/jobs/"
        );
    }

    #[tokio::test]
    async fn catalog_fetch_follows_next_links() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/job_templates/")
            .with_status(200)
            // An absolute next link pointing at some internal address; the
            // client re-anchors it onto its configured base URL.
            .with_body(
                r#"{"count": 3, "next": "http://internal:8052/api/v2/job_templates/page2/",
                    "results": [{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/api/v2/job_templates/page2/")
            .with_status(200)
            .with_body(r#"{"count": 3, "next": null, "results": [{"id": 3, "name": "c"}]}"#)
            .create_async()
            .await;

        let client = AwxClient::new(&test_config(&server.url())).unwrap();
        let templates = client.job_templates().await.unwrap();
        assert_eq!(templates.len(), 3);
        assert_eq!(templates[2]["name"], "c");
    }

    #[tokio::test]
    async fn non_2xx_short_circuits_with_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/job_templates/")
            .with_status(403)
            .with_body(r#"{"detail": "authentication credentials were not provided"}"#)
            .create_async()
            .await;

        let client = AwxClient::new(&test_config(&server.url())).unwrap();
        let err = client.job_templates().await.unwrap_err();
        let Error::ResponseCode(status, body) = err else {
            panic!("expected response code error");
        };
        assert_eq!(status, reqwest::StatusCode::FORBIDDEN);
        assert!(body.contains("authentication credentials"));
    }

    #[tokio::test]
    async fn find_host_requires_exact_name_match() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/hosts/")
            .match_query(mockito::Matcher::UrlEncoded("name".into(), "alpha".into()))
            .with_status(200)
            .with_body(
                r#"{"count": 2, "next": null,
                    "results": [{"id": 10, "name": "alpha-db"}, {"id": 11, "name": "alpha"}]}"#,
            )
            .create_async()
            .await;

        let client = AwxClient::new(&test_config(&server.url())).unwrap();
        assert_eq!(client.find_host("alpha").await.unwrap(), Some(11));
    }
}
