//! Scripted Assistants API for exercising the conversation layer without I/O.

use super::backoff::BackoffPolicy;
use super::events::{ConversationEvent, EventBus, EventKind};
use crate::api::{
    Assistant, AssistantConfig, AssistantsApi, Error, Message, MessageContent, Role, Run,
    RunError, RunStatus, RunStep, TextContent, Thread,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Backoff with millisecond delays so tests never wait on real time.
pub fn tiny_policy(max_retries: u32) -> BackoffPolicy {
    BackoffPolicy {
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        max_retries,
    }
}

pub fn message(id: &str, role: Role, text: &str) -> Message {
    Message {
        id: id.into(),
        thread_id: "thread_1".into(),
        role,
        content: vec![MessageContent::Text {
            text: TextContent {
                value: text.into(),
                annotations: vec![],
            },
        }],
        assistant_id: None,
        run_id: None,
        metadata: HashMap::new(),
        created_at: chrono::DateTime::default(),
    }
}

/// Record every event emitted on `events`.
pub fn recorder(events: &EventBus) -> Arc<Mutex<Vec<ConversationEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    for kind in EventKind::ALL {
        let log = Arc::clone(&log);
        events.on(kind, move |event| log.lock().unwrap().push(event.clone()));
    }
    log
}

type ScriptedRun = Result<(RunStatus, Option<RunError>), Error>;

/// Mock API that replays queued run statuses and records every call.
#[derive(Default)]
pub struct MockApi {
    statuses: Mutex<VecDeque<ScriptedRun>>,
    assistants: Mutex<HashMap<String, Assistant>>,
    /// Most recent first.
    messages: Mutex<Vec<Message>>,
    reply: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
    fail_send: Mutex<bool>,
    fail_create_assistant: Mutex<bool>,
    fail_steps: Mutex<bool>,
    counter: Mutex<u32>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_statuses(&self, statuses: impl IntoIterator<Item = RunStatus>) {
        self.statuses
            .lock()
            .unwrap()
            .extend(statuses.into_iter().map(|s| Ok((s, None))));
    }

    pub fn queue_status_error(&self, error: Error) {
        self.statuses.lock().unwrap().push_back(Err(error));
    }

    pub fn queue_run_error(&self, error: RunError) {
        self.statuses
            .lock()
            .unwrap()
            .push_back(Ok((RunStatus::Failed, Some(error))));
    }

    pub fn add_assistant(&self, id: &str) {
        self.assistants
            .lock()
            .unwrap()
            .insert(id.to_string(), assistant(id, "gpt-4-1106-preview"));
    }

    pub fn push_message(&self, message: Message) {
        self.messages.lock().unwrap().insert(0, message);
    }

    /// Assistant reply appended to the thread when a completed status is served.
    pub fn reply_with(&self, text: &str) {
        *self.reply.lock().unwrap() = Some(text.to_string());
    }

    pub fn fail_send_message(&self) {
        *self.fail_send.lock().unwrap() = true;
    }

    pub fn fail_create_assistant(&self) {
        *self.fail_create_assistant.lock().unwrap() = true;
    }

    pub fn fail_run_steps(&self) {
        *self.fail_steps.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        format!("{prefix}_{counter}")
    }
}

fn assistant(id: &str, model: &str) -> Assistant {
    Assistant {
        id: id.into(),
        name: None,
        model: model.into(),
        instructions: None,
        tools: vec![],
        metadata: HashMap::new(),
        created_at: chrono::DateTime::default(),
    }
}

#[async_trait]
impl AssistantsApi for MockApi {
    async fn create_assistant(&self, config: &AssistantConfig) -> Result<Assistant, Error> {
        self.record("create_assistant");
        if *self.fail_create_assistant.lock().unwrap() {
            return Err(Error::Api("HTTP 401: invalid key".into()));
        }
        let id = self.next_id("asst");
        let created = Assistant {
            name: config.name.clone(),
            instructions: config.instructions.clone(),
            tools: config.tools.clone(),
            ..assistant(&id, &config.model)
        };
        self.assistants
            .lock()
            .unwrap()
            .insert(id, created.clone());
        Ok(created)
    }

    async fn get_assistant(&self, assistant_id: &str) -> Result<Option<Assistant>, Error> {
        self.record("get_assistant");
        Ok(self.assistants.lock().unwrap().get(assistant_id).cloned())
    }

    async fn create_thread(&self) -> Result<Thread, Error> {
        self.record("create_thread");
        Ok(Thread {
            id: self.next_id("thread"),
            metadata: HashMap::new(),
            created_at: chrono::DateTime::default(),
        })
    }

    async fn send_message(&self, thread_id: &str, text: &str) -> Result<Message, Error> {
        self.record("send_message");
        if *self.fail_send.lock().unwrap() {
            return Err(Error::Api(format!("HTTP 404: no thread {thread_id}")));
        }
        let msg = Message {
            thread_id: thread_id.into(),
            ..message(&self.next_id("msg"), Role::User, text)
        };
        self.push_message(msg.clone());
        Ok(msg)
    }

    async fn execute_thread(&self, thread_id: &str, assistant_id: &str) -> Result<Run, Error> {
        self.record("execute_thread");
        Ok(Run {
            id: self.next_id("run"),
            thread_id: thread_id.into(),
            assistant_id: assistant_id.into(),
            status: RunStatus::Queued,
            last_error: None,
            created_at: chrono::DateTime::default(),
        })
    }

    async fn retrieve_execution(&self, thread_id: &str, run_id: &str) -> Result<Run, Error> {
        self.record("retrieve_execution");
        let next = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Api("no status queued".into())));
        let (status, last_error) = next?;
        if status == RunStatus::Completed
            && let Some(text) = self.reply.lock().unwrap().take()
        {
            let reply = message(&self.next_id("msg"), Role::Assistant, &text);
            self.push_message(reply);
        }
        Ok(Run {
            id: run_id.into(),
            thread_id: thread_id.into(),
            assistant_id: "asst_1".into(),
            status,
            last_error,
            created_at: chrono::DateTime::default(),
        })
    }

    async fn list_run_steps(&self, _thread_id: &str, run_id: &str) -> Result<Vec<RunStep>, Error> {
        self.record("list_run_steps");
        if *self.fail_steps.lock().unwrap() {
            return Err(Error::Api("HTTP 500: steps unavailable".into()));
        }
        Ok(vec![RunStep {
            id: "step_1".into(),
            run_id: run_id.into(),
            status: "in_progress".into(),
            step_type: "message_creation".into(),
            step_details: serde_json::Value::Null,
        }])
    }

    async fn list_messages(&self, _thread_id: &str) -> Result<Vec<Message>, Error> {
        self.record("list_messages");
        Ok(self.messages.lock().unwrap().clone())
    }
}
