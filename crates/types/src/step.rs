//! Step descriptors as authored and as executed.
//!
//! HTTP steps are authored as loose JSON/YAML mappings ([`HttpStepDefinition`]) and only become
//! an [`HttpStepSpec`] when the executor normalizes them, so a malformed descriptor turns into a
//! failed step result instead of aborting the whole scenario. Callable steps are built in code and
//! carry a shared [`StepCallable`] capability.

use std::{fmt, future::Future, str::FromStr, sync::Arc};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::errors::{CallableError, SchemaError};

pub mod validation;

/// Discriminant of a step descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    HttpRequest,
    Callable,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::HttpRequest => "http_request",
            StepKind::Callable => "callable",
        }
    }
}

/// A step in a scenario: either a declarative HTTP request or a user-supplied async check.
#[derive(Debug, Clone)]
pub enum StepDefinition {
    Http(HttpStepDefinition),
    Callable(CallableStep),
}

impl StepDefinition {
    pub fn kind(&self) -> StepKind {
        match self {
            StepDefinition::Http(_) => StepKind::HttpRequest,
            StepDefinition::Callable(_) => StepKind::Callable,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            StepDefinition::Http(definition) => definition.name(),
            StepDefinition::Callable(step) => step.name.as_deref(),
        }
    }

    pub fn is_ignored(&self) -> bool {
        match self {
            StepDefinition::Http(definition) => definition.is_ignored(),
            StepDefinition::Callable(step) => step.ignore,
        }
    }

    /// Route for HTTP steps, capability name for callables.
    pub fn target(&self) -> String {
        match self {
            StepDefinition::Http(definition) => definition.route().to_string(),
            StepDefinition::Callable(step) => step.target.name().to_string(),
        }
    }

    pub fn rollback_entries(&self) -> Vec<RollbackEntry> {
        match self {
            StepDefinition::Http(definition) => definition.rollback_entries(),
            StepDefinition::Callable(step) => step.rollback.clone(),
        }
    }

    /// Returns a copy with the ignore flag overridden.
    pub fn with_ignore(mut self, ignore: bool) -> Self {
        match &mut self {
            StepDefinition::Http(definition) => definition.set_ignore(ignore),
            StepDefinition::Callable(step) => step.ignore = ignore,
        }
        self
    }
}

impl From<HttpStepDefinition> for StepDefinition {
    fn from(definition: HttpStepDefinition) -> Self {
        StepDefinition::Http(definition)
    }
}

impl From<CallableStep> for StepDefinition {
    fn from(step: CallableStep) -> Self {
        StepDefinition::Callable(step)
    }
}

impl TryFrom<Value> for StepDefinition {
    type Error = SchemaError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        HttpStepDefinition::try_from(value).map(StepDefinition::Http)
    }
}

/// Scenario files only carry HTTP steps; callables are attached programmatically.
impl<'de> Deserialize<'de> for StepDefinition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        HttpStepDefinition::deserialize(deserializer).map(StepDefinition::Http)
    }
}

/// One element of a step's rollback list.
#[derive(Debug, Clone)]
pub enum RollbackEntry {
    /// Back-reference to another step by `name`.
    Reference(String),
    /// Compensating step declared in place.
    Inline(StepDefinition),
    /// Anything else found in an authored rollback list.
    Malformed(Value),
}

impl RollbackEntry {
    pub fn reference(name: impl Into<String>) -> Self {
        RollbackEntry::Reference(name.into())
    }

    fn from_value(value: &Value) -> Self {
        match value {
            Value::String(name) => RollbackEntry::Reference(name.clone()),
            Value::Object(fields) => RollbackEntry::Inline(StepDefinition::Http(HttpStepDefinition::new(fields.clone()))),
            other => RollbackEntry::Malformed(other.clone()),
        }
    }
}

/// Raw HTTP step descriptor, kept exactly as authored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HttpStepDefinition {
    fields: Map<String, Value>,
}

impl HttpStepDefinition {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(Value::as_str)
    }

    pub fn route(&self) -> &str {
        self.fields.get("route").and_then(Value::as_str).unwrap_or("/")
    }

    pub fn is_ignored(&self) -> bool {
        self.fields.get("ignore").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn set_ignore(&mut self, ignore: bool) {
        self.fields.insert("ignore".to_string(), Value::Bool(ignore));
    }

    pub fn rollback_entries(&self) -> Vec<RollbackEntry> {
        match self.fields.get("rollback") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries.iter().map(RollbackEntry::from_value).collect(),
            Some(other) => vec![RollbackEntry::Malformed(other.clone())],
        }
    }
}

impl TryFrom<Value> for HttpStepDefinition {
    type Error = SchemaError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Self::new(fields)),
            _ => Err(SchemaError::NotAMapping),
        }
    }
}

/// HTTP methods accepted by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Put,
    Delete,
    Head,
    Connect,
    Options,
    Trace,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Connect => "CONNECT",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PATCH" => Ok(HttpMethod::Patch),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "CONNECT" => Ok(HttpMethod::Connect),
            "OPTIONS" => Ok(HttpMethod::Options),
            "TRACE" => Ok(HttpMethod::Trace),
            _ => Err(SchemaError::InvalidMethod(s.to_string())),
        }
    }
}

impl Serialize for HttpMethod {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HttpMethod {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Body comparison semantics used by [`ResponseClause`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Key sets and lengths must agree.
    #[default]
    Strict,
    /// Expected keys and elements must be present; extras are tolerated.
    Partial,
}

/// Response shape used both for `expected` and for each `fail_on` clause.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseClause {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default)]
    pub expected_match: MatchMode,
}

fn default_route() -> String {
    "/".to_string()
}

fn default_delay() -> u64 {
    1
}

/// Normalized HTTP step descriptor with every default applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpStepSpec {
    pub method: HttpMethod,
    #[serde(default = "default_route")]
    pub route: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<ResponseClause>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fail_on: Vec<ResponseClause>,
    #[serde(default)]
    pub retry: u32,
    /// Seconds to wait after every unsuccessful attempt.
    #[serde(default = "default_delay")]
    pub delay: u64,
    #[serde(default)]
    pub ignore: bool,
}

pub const DEFAULT_HEADERS: [(&str, &str); 2] = [("Accept", "application/json"), ("Content-Type", "application/json")];

impl HttpStepSpec {
    /// Default headers overlaid with the authored ones. Names compare case-insensitively.
    pub fn effective_headers(&self) -> IndexMap<String, String> {
        let mut merged: IndexMap<String, String> = DEFAULT_HEADERS
            .iter()
            .filter(|(name, _)| !self.headers.keys().any(|authored| authored.eq_ignore_ascii_case(name)))
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        merged.extend(self.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    pub fn to_value(&self) -> Result<Value, SchemaError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        Ok(serde_json::from_value(value)?)
    }
}

/// User-supplied asynchronous check executed as a step.
#[async_trait]
pub trait StepCallable: Send + Sync {
    /// Identifier used as the result's target.
    fn name(&self) -> &str;

    async fn call(&self, host: &str, inputs: Map<String, Value>) -> Result<Value, CallableError>;
}

/// Adapter turning an async closure into a [`StepCallable`].
pub struct FnCallable<F> {
    name: String,
    func: F,
}

#[async_trait]
impl<F, Fut> StepCallable for FnCallable<F>
where
    F: Fn(String, Map<String, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, CallableError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, host: &str, inputs: Map<String, Value>) -> Result<Value, CallableError> {
        (self.func)(host.to_string(), inputs).await
    }
}

/// Wraps `func` as a shareable callable named `name`.
pub fn callable_fn<F, Fut>(name: impl Into<String>, func: F) -> Arc<dyn StepCallable>
where
    F: Fn(String, Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, CallableError>> + Send + 'static,
{
    Arc::new(FnCallable { name: name.into(), func })
}

/// Callable step descriptor.
#[derive(Clone)]
pub struct CallableStep {
    pub name: Option<String>,
    pub target: Arc<dyn StepCallable>,
    /// Keyword inputs: a mapping, or a single template string rendering to a JSON object.
    pub inputs: Value,
    pub output: Option<String>,
    pub ignore: bool,
    pub rollback: Vec<RollbackEntry>,
}

impl CallableStep {
    pub fn new(target: Arc<dyn StepCallable>) -> Self {
        Self {
            name: None,
            target,
            inputs: Value::Object(Map::new()),
            output: None,
            ignore: false,
            rollback: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_inputs(mut self, inputs: Value) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn ignored(mut self, ignore: bool) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn with_rollback(mut self, entries: Vec<RollbackEntry>) -> Self {
        self.rollback = entries;
        self
    }

    /// Serializable view of the descriptor for result records.
    pub fn describe(&self, inputs: &Value) -> Value {
        let mut fields = Map::new();
        fields.insert("kind".into(), Value::String(StepKind::Callable.as_str().into()));
        if let Some(name) = &self.name {
            fields.insert("name".into(), Value::String(name.clone()));
        }
        fields.insert("target".into(), Value::String(self.target.name().to_string()));
        fields.insert("inputs".into(), inputs.clone());
        if let Some(output) = &self.output {
            fields.insert("output".into(), Value::String(output.clone()));
        }
        fields.insert("ignore".into(), Value::Bool(self.ignore));
        Value::Object(fields)
    }
}

impl fmt::Debug for CallableStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableStep")
            .field("name", &self.name)
            .field("target", &self.target.name())
            .field("inputs", &self.inputs)
            .field("output", &self.output)
            .field("ignore", &self.ignore)
            .field("rollback", &self.rollback)
            .finish()
    }
}
