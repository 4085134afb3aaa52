//! Scenario files and `${env:NAME}` interpolation.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use spindle_types::StepDefinition;
use thiserror::Error;
use tracing::debug;

static ENV_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{env:([\w-]*)}").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("environment variable '{name}' is not set")]
    MissingEnvVar { name: String },
}

/// A scenario file as authored. YAML or JSON.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub report: Option<String>,
    pub steps: Vec<Value>,
}

fn default_verify_tls() -> bool {
    true
}

impl ScenarioFile {
    /// Step descriptors in file order.
    pub fn step_definitions(&self) -> Result<Vec<StepDefinition>> {
        self.steps
            .iter()
            .enumerate()
            .map(|(index, raw)| StepDefinition::try_from(raw.clone()).with_context(|| format!("step #{} is not a valid descriptor", index + 1)))
            .collect()
    }

    pub fn report_path(&self) -> Option<PathBuf> {
        self.report.as_ref().map(PathBuf::from)
    }

    /// Resolve `${env:NAME}` in hosts, token and report using `lookup`.
    fn interpolate_with<F>(&mut self, lookup: F) -> Result<(), InterpolationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for host in self.hosts.iter_mut() {
            *host = interpolate_env(host, &lookup)?;
        }
        if let Some(token) = self.token.as_mut() {
            *token = interpolate_env(token, &lookup)?;
        }
        if let Some(report) = self.report.as_mut() {
            *report = interpolate_env(report, &lookup)?;
        }
        Ok(())
    }
}

/// Read, parse and interpolate a scenario file.
pub fn load_scenario(path: &Path) -> Result<ScenarioFile> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut file: ScenarioFile = serde_yaml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))?;
    file.interpolate_with(|name| std::env::var(name).ok())
        .with_context(|| format!("failed to interpolate {}", path.display()))?;
    debug!(path = %path.display(), steps = file.steps.len(), hosts = file.hosts.len(), "loaded scenario");
    Ok(file)
}

/// Replace every `${env:NAME}` in `value`. A missing variable is an error.
pub fn interpolate_env<F>(value: &str, lookup: F) -> Result<String, InterpolationError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(value.len());
    let mut last = 0;
    for captures in ENV_PLACEHOLDER.captures_iter(value) {
        let (Some(placeholder), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let resolved = lookup(name.as_str()).ok_or_else(|| InterpolationError::MissingEnvVar {
            name: name.as_str().to_string(),
        })?;
        debug!("Interpolated env var: {} -> [REDACTED]", name.as_str());
        result.push_str(&value[last..placeholder.start()]);
        result.push_str(&resolved);
        last = placeholder.end();
    }
    result.push_str(&value[last..]);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "API_HOST" => Some("api.internal".into()),
            "API_TOKEN" => Some("t0ken".into()),
            _ => None,
        }
    }

    fn write_temp(contents: &str, suffix: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn interpolates_env_placeholders() {
        assert_eq!(interpolate_env("https://${env:API_HOST}:8443", lookup).unwrap(), "https://api.internal:8443");
        assert_eq!(interpolate_env("plain", lookup).unwrap(), "plain");
        assert_eq!(interpolate_env("${env:API_HOST}/${env:API_TOKEN}", lookup).unwrap(), "api.internal/t0ken");
    }

    #[test]
    fn missing_env_var_is_an_error() {
        assert_eq!(
            interpolate_env("${env:NOPE}", lookup).unwrap_err(),
            InterpolationError::MissingEnvVar { name: "NOPE".into() }
        );
    }

    #[test]
    fn step_templates_are_left_alone() {
        assert_eq!(interpolate_env("/items/${{ created.id }}", lookup).unwrap(), "/items/${{ created.id }}");
    }

    #[test]
    fn loads_yaml_scenarios() {
        let file = write_temp(
            r#"
hosts: ["http://localhost:8080"]
parallel: true
token: secret
report: out.json
steps:
  - name: create
    method: POST
    route: /items
    body: { name: demo }
    output: created
    rollback: [delete]
  - name: delete
    method: DELETE
    route: "/items/${{ created.id }}"
"#,
            ".yaml",
        );
        let scenario = load_scenario(file.path()).unwrap();
        assert!(scenario.parallel);
        assert!(scenario.verify_tls);
        assert_eq!(scenario.token.as_deref(), Some("secret"));
        assert_eq!(scenario.report_path(), Some(PathBuf::from("out.json")));

        let steps = scenario.step_definitions().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].name(), Some("create"));
        assert_eq!(steps[1].target(), "/items/${{ created.id }}");
    }

    #[test]
    fn loads_json_scenarios() {
        let contents = json!({
            "hosts": ["http://a", "http://b"],
            "verify_tls": false,
            "steps": [{"method": "GET", "route": "/health"}]
        });
        let file = write_temp(&contents.to_string(), ".json");
        let scenario = load_scenario(file.path()).unwrap();
        assert_eq!(scenario.hosts.len(), 2);
        assert!(!scenario.verify_tls);
        assert!(!scenario.parallel);
        assert!(scenario.token.is_none());
    }

    #[test]
    fn interpolation_covers_hosts_token_and_report() {
        let mut scenario: ScenarioFile = serde_yaml::from_str(
            r#"
hosts: ["https://${env:API_HOST}"]
token: "${env:API_TOKEN}"
report: "${env:API_HOST}.json"
steps: []
"#,
        )
        .unwrap();
        scenario.interpolate_with(lookup).unwrap();
        assert_eq!(scenario.hosts, ["https://api.internal"]);
        assert_eq!(scenario.token.as_deref(), Some("t0ken"));
        assert_eq!(scenario.report.as_deref(), Some("api.internal.json"));
    }

    #[test]
    fn unknown_top_level_keys_are_rejected() {
        let file = write_temp("hosts: []\nsteps: []\nretries: 3\n", ".yaml");
        assert!(load_scenario(file.path()).is_err());
    }

    #[test]
    fn non_mapping_steps_are_reported_by_position() {
        let file = write_temp("steps:\n  - GET /health\n", ".yaml");
        let scenario = load_scenario(file.path()).unwrap();
        let err = scenario.step_definitions().unwrap_err();
        assert!(err.to_string().contains("step #1"));
    }

    #[test]
    fn missing_file_has_context() {
        let err = load_scenario(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
