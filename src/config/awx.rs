use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

/// Connection and policy settings for the external automation engine.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwxConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_enabled")]
    pub verify_tls: bool,
    pub default_inventory_id: Option<i64>,
    pub default_template_id: Option<i64>,
    /// Job template name -> engine id.
    #[serde(default)]
    pub job_templates: HashMap<String, i64>,
    /// Workflow template name -> engine id.
    #[serde(default)]
    pub workflow_templates: HashMap<String, i64>,
    /// Template ids whose launch endpoint rejects an `extra_vars` field.
    #[serde(default)]
    pub templates_without_vars: Vec<i64>,
}

impl AwxConfig {
    /// Base URL with trailing slashes trimmed, so pagination links can be
    /// re-anchored by plain concatenation.
    pub fn base_url(&self) -> String {
        self.url.trim_end_matches('/').to_string()
    }

    pub fn rejects_extra_vars(&self, template_id: i64) -> bool {
        self.templates_without_vars.contains(&template_id)
    }

    pub fn job_template_id(&self, name: &str) -> Option<i64> {
        self.job_templates.get(name).copied()
    }

    pub fn workflow_template_id(&self, name: &str) -> Option<i64> {
        self.workflow_templates.get(name).copied()
    }
}

fn default_enabled() -> bool {
    true
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trims_trailing_slashes() {
        let config: AwxConfig = toml::from_str(
            r#"
            url = "https://awx.example.com/"
            username = "svc"
            password = "pw"
            "#,
        )
        .unwrap();
        assert_eq!(config.base_url(), "https://awx.example.com");
        assert!(config.enabled);
        assert!(config.verify_tls);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }
}
