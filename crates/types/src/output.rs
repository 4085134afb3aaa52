//! Per-host output state threaded through a scenario.

use std::{fmt, sync::Arc};

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Reserved variable name under which the token is exposed.
pub const TOKEN_KEY: &str = "__token__";

/// Replacement written wherever a token would be reported.
pub const TOKEN_MASK: &str = "***";

/// Supplies a bearer token on demand. Called once per dispatch attempt.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> String;
}

impl<F> TokenProvider for F
where
    F: Fn() -> String + Send + Sync,
{
    fn token(&self) -> String {
        self()
    }
}

/// Static bearer token or a provider that may rotate between calls.
#[derive(Clone)]
pub enum TokenSource {
    Static(String),
    Provider(Arc<dyn TokenProvider>),
}

impl TokenSource {
    pub fn provider(provider: impl TokenProvider + 'static) -> Self {
        TokenSource::Provider(Arc::new(provider))
    }

    pub fn resolve(&self) -> String {
        match self {
            TokenSource::Static(value) => value.clone(),
            TokenSource::Provider(provider) => provider.token(),
        }
    }
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSource::Static(_) => f.write_str("Static(***)"),
            TokenSource::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

impl From<String> for TokenSource {
    fn from(value: String) -> Self {
        TokenSource::Static(value)
    }
}

impl From<&str> for TokenSource {
    fn from(value: &str) -> Self {
        TokenSource::Static(value.to_string())
    }
}

/// Captured variables for one host plus its token.
///
/// Steps receive a snapshot by value and hand back a replacement; nothing is shared by
/// reference between concurrent executions. Serialization and `Debug` always mask the token,
/// while [`OutputState::token`] keeps the real value for dispatch.
#[derive(Clone, Default)]
pub struct OutputState {
    token: Option<TokenSource>,
    variables: Map<String, Value>,
}

impl OutputState {
    pub fn new(token: Option<TokenSource>) -> Self {
        Self {
            token,
            variables: Map::new(),
        }
    }

    pub fn token(&self) -> Option<&TokenSource> {
        self.token.as_ref()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Returns the successor state with `name` bound to `value`.
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Variables visible to templates. A static token is available as `__token__`.
    pub fn template_context(&self) -> Map<String, Value> {
        let mut context = self.variables.clone();
        if let Some(TokenSource::Static(value)) = &self.token {
            context.insert(TOKEN_KEY.to_string(), Value::String(value.clone()));
        }
        context
    }

    /// Reportable view with the token masked.
    pub fn redacted(&self) -> Value {
        let mut view = self.variables.clone();
        let token = match self.token {
            Some(_) => Value::String(TOKEN_MASK.to_string()),
            None => Value::Null,
        };
        view.insert(TOKEN_KEY.to_string(), token);
        Value::Object(view)
    }
}

impl Serialize for OutputState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.redacted().serialize(serializer)
    }
}

impl fmt::Debug for OutputState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputState({})", self.redacted())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    #[test]
    fn serialization_masks_static_token() {
        let state = OutputState::new(Some("secret-value".into())).with_variable("id", json!(7));
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value, json!({"id": 7, "__token__": "***"}));
        assert!(!format!("{state:?}").contains("secret-value"));
    }

    #[test]
    fn template_context_exposes_static_token_only() {
        let state = OutputState::new(Some("abc".into()));
        assert_eq!(state.template_context().get(TOKEN_KEY), Some(&json!("abc")));

        let provided = OutputState::new(Some(TokenSource::provider(|| "rotating".to_string())));
        assert!(provided.template_context().get(TOKEN_KEY).is_none());
    }

    #[test]
    fn provider_is_invoked_on_every_resolve() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let source = TokenSource::provider(move || format!("t{}", counter.fetch_add(1, Ordering::SeqCst)));
        assert_eq!(source.resolve(), "t0");
        assert_eq!(source.resolve(), "t1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn with_variable_leaves_the_original_untouched() {
        let first = OutputState::default();
        let second = first.clone().with_variable("a", json!(1));
        assert!(first.get("a").is_none());
        assert_eq!(second.get("a"), Some(&json!(1)));
        assert_eq!(serde_json::to_value(&first).unwrap(), json!({"__token__": null}));
    }
}
