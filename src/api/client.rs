//! Assistants API client.

use super::error::Error;
use super::http::{Credentials, HttpClient};
use super::types::{
    Assistant, AssistantConfig, CreateMessageRequest, CreateRunRequest, ListResponse, Message,
    Role, Run, RunStep, Thread,
};
use async_trait::async_trait;
use tracing::debug;

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Remote operations the conversation layer depends on.
#[async_trait]
pub trait AssistantsApi: Send + Sync {
    /// Create an assistant.
    async fn create_assistant(&self, config: &AssistantConfig) -> Result<Assistant, Error>;
    /// Fetch an assistant by id. `None` if the service reports it missing.
    async fn get_assistant(&self, assistant_id: &str) -> Result<Option<Assistant>, Error>;
    /// Create an empty thread.
    async fn create_thread(&self) -> Result<Thread, Error>;
    /// Append a user message to a thread.
    async fn send_message(&self, thread_id: &str, text: &str) -> Result<Message, Error>;
    /// Start a run of an assistant against a thread.
    async fn execute_thread(&self, thread_id: &str, assistant_id: &str) -> Result<Run, Error>;
    /// Fetch the current state of a run.
    async fn retrieve_execution(&self, thread_id: &str, run_id: &str) -> Result<Run, Error>;
    /// List the steps of a run.
    async fn list_run_steps(&self, thread_id: &str, run_id: &str) -> Result<Vec<RunStep>, Error>;
    /// List thread messages, most recent first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, Error>;
}

/// HTTP implementation of [`AssistantsApi`].
#[derive(Debug)]
pub struct OpenAiClient {
    http: HttpClient,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, None, DEFAULT_BASE_URL)
    }

    /// Create a client against a custom endpoint (proxies, tests).
    pub fn with_base_url(
        api_key: impl Into<String>,
        organization: Option<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let credentials = Credentials {
            api_key: api_key.into(),
            organization,
        };
        Self {
            http: HttpClient::new(base_url, credentials),
        }
    }
}

#[async_trait]
impl AssistantsApi for OpenAiClient {
    async fn create_assistant(&self, config: &AssistantConfig) -> Result<Assistant, Error> {
        debug!(model = %config.model, tools = config.tools.len(), "Creating assistant");
        self.http.post_json("/assistants", config).await
    }

    async fn get_assistant(&self, assistant_id: &str) -> Result<Option<Assistant>, Error> {
        debug!(assistant_id, "Fetching assistant");
        self.http
            .get_json_optional(&format!("/assistants/{assistant_id}"))
            .await
    }

    async fn create_thread(&self) -> Result<Thread, Error> {
        self.http
            .post_json("/threads", &serde_json::json!({}))
            .await
    }

    async fn send_message(&self, thread_id: &str, text: &str) -> Result<Message, Error> {
        let body = CreateMessageRequest {
            role: Role::User,
            content: text,
        };
        self.http
            .post_json(&format!("/threads/{thread_id}/messages"), &body)
            .await
    }

    async fn execute_thread(&self, thread_id: &str, assistant_id: &str) -> Result<Run, Error> {
        debug!(thread_id, assistant_id, "Starting run");
        self.http
            .post_json(
                &format!("/threads/{thread_id}/runs"),
                &CreateRunRequest { assistant_id },
            )
            .await
    }

    async fn retrieve_execution(&self, thread_id: &str, run_id: &str) -> Result<Run, Error> {
        self.http
            .get_json(&format!("/threads/{thread_id}/runs/{run_id}"))
            .await
    }

    async fn list_run_steps(&self, thread_id: &str, run_id: &str) -> Result<Vec<RunStep>, Error> {
        let list: ListResponse<RunStep> = self
            .http
            .get_json(&format!("/threads/{thread_id}/runs/{run_id}/steps"))
            .await?;
        Ok(list.data)
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, Error> {
        let list: ListResponse<Message> = self
            .http
            .get_json(&format!("/threads/{thread_id}/messages?order=desc"))
            .await?;
        Ok(list.data)
    }
}
