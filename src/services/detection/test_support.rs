// In-memory completion backend for tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::services::providers::{ChatResult, CompletionBackend, CompletionRequest, ProviderError};

#[derive(Debug, Clone)]
enum Script {
    Reply(String),
    Fail(u16),
    MissingContent,
}

/// Answers by model id, optionally after a delay, and records every call.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<String, (Script, Duration)>>,
    calls: Mutex<Vec<CompletionRequest>>,
    completed: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self, model_id: &str, script: Script) {
        let mut scripts = self.scripts.lock().unwrap();
        let delay = scripts
            .get(model_id)
            .map(|(_, d)| *d)
            .unwrap_or(Duration::ZERO);
        scripts.insert(model_id.to_string(), (script, delay));
    }

    pub fn reply(&self, model_id: &str, content: &str) {
        self.script(model_id, Script::Reply(content.to_string()));
    }

    pub fn fail(&self, model_id: &str, status: u16) {
        self.script(model_id, Script::Fail(status));
    }

    pub fn missing_content(&self, model_id: &str) {
        self.script(model_id, Script::MissingContent);
    }

    pub fn delay(&self, model_id: &str, delay: Duration) {
        let mut scripts = self.scripts.lock().unwrap();
        if let Some(entry) = scripts.get_mut(model_id) {
            entry.1 = delay;
        }
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Model ids in the order their calls finished.
    pub fn completion_order(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn generate(&self, request: &CompletionRequest) -> Result<ChatResult, ProviderError> {
        self.calls.lock().unwrap().push(request.clone());

        let scripted = self.scripts.lock().unwrap().get(&request.model_id).cloned();
        let (script, delay) = scripted.unwrap_or((Script::Fail(404), Duration::ZERO));

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.completed.lock().unwrap().push(request.model_id.clone());

        match script {
            Script::Reply(content) => Ok(ChatResult {
                content,
                latency_ms: delay.as_millis() as i64,
            }),
            Script::Fail(status) => Err(ProviderError::ApiError {
                status,
                message: "scripted failure".to_string(),
            }),
            Script::MissingContent => Err(ProviderError::MissingContent),
        }
    }
}
