//! Test doubles shared by executor and scenario tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{Value, json};
use spindle_types::{CallableError, StepDefinition};
use spindle_util::{DispatchError, DispatchRequest, DispatchResponse, Dispatcher};

type Responder = dyn Fn(&DispatchRequest) -> Result<DispatchResponse, DispatchError> + Send + Sync;

/// Dispatcher that answers from a script and records every request.
///
/// Queued replies are consumed first; once the queue is empty the responder decides.
pub(crate) struct ScriptedDispatcher {
    queue: Mutex<VecDeque<Result<DispatchResponse, DispatchError>>>,
    responder: Box<Responder>,
    requests: Mutex<Vec<DispatchRequest>>,
    latency: Duration,
}

impl ScriptedDispatcher {
    pub(crate) fn new<F>(responder: F) -> Self
    where
        F: Fn(&DispatchRequest) -> Result<DispatchResponse, DispatchError> + Send + Sync + 'static,
    {
        Self {
            queue: Mutex::new(VecDeque::new()),
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
        }
    }

    /// Always answers `code` with `body`.
    pub(crate) fn always(code: u16, body: Value) -> Self {
        Self::new(move |_| Ok(DispatchResponse::new(code, body.clone())))
    }

    /// Answers by `(method, path)`, falling back to 404.
    pub(crate) fn routes(table: Vec<(&'static str, &'static str, u16, Value)>) -> Self {
        Self::new(move |request| {
            let path = path_of(&request.url);
            table
                .iter()
                .find(|(method, route, _, _)| request.method.as_str() == *method && path == *route)
                .map(|(_, _, code, body)| Ok(DispatchResponse::new(*code, body.clone())))
                .unwrap_or_else(|| Ok(DispatchResponse::new(404, json!({"error": "not found"}))))
        })
    }

    pub(crate) fn with_queue(self, replies: Vec<Result<DispatchResponse, DispatchError>>) -> Self {
        *self.queue.lock().unwrap() = replies.into();
        self
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn requests(&self) -> Vec<DispatchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl Dispatcher for ScriptedDispatcher {
    async fn send(&self, request: DispatchRequest) -> Result<DispatchResponse, DispatchError> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let queued = self.queue.lock().unwrap().pop_front();
        match queued {
            Some(reply) => reply,
            None => (self.responder)(&request),
        }
    }
}

/// Host and path of a dispatched URL, e.g. `("http://a", "/items")`.
pub(crate) fn split_url(url: &str) -> (String, String) {
    let after_scheme = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[after_scheme..].find('/') {
        Some(slash) => (url[..after_scheme + slash].to_string(), url[after_scheme + slash..].to_string()),
        None => (url.to_string(), "/".to_string()),
    }
}

pub(crate) fn path_of(url: &str) -> String {
    split_url(url).1
}

pub(crate) fn step(value: Value) -> StepDefinition {
    StepDefinition::try_from(value).expect("step descriptor mapping")
}

pub(crate) fn assertion(message: &str) -> Result<Value, CallableError> {
    Err(CallableError::assertion(message))
}

pub(crate) fn explode(message: &str) -> Result<Value, CallableError> {
    panic!("{message}")
}
