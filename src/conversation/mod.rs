//! Conversation orchestration over an [`AssistantsApi`].
//!
//! A [`ConversationManager`] binds one assistant and one thread, submits
//! questions as runs, and reports each run's outcome on its [`EventBus`].

mod backoff;
mod events;
mod poll;
mod session;
#[cfg(test)]
mod testing;

pub use backoff::{BASE_DELAY, BackoffPolicy, MAX_DELAY, MAX_RETRIES};
pub use events::{ConversationEvent, EventBus, EventKind};
pub use poll::{PollOutcome, RunPhase, poll_run};
pub use session::SessionState;

use crate::api::{Assistant, AssistantConfig, AssistantsApi, Message};
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A run whose completion is being polled in the background.
#[derive(Debug)]
pub struct RunHandle {
    pub run_id: String,
    task: JoinHandle<PollOutcome>,
}

impl RunHandle {
    /// Wait for the poll cycle to finish.
    pub async fn wait(self) -> PollOutcome {
        self.task
            .await
            .unwrap_or_else(|e| PollOutcome::Failed(format!("Polling task failed: {e}")))
    }
}

type InflightSlot = Arc<Mutex<Option<CancellationToken>>>;

/// Clears the in-flight slot when the poll cycle (or a failed submission) ends.
struct InflightGuard {
    slot: InflightSlot,
    token: CancellationToken,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

pub struct ConversationManager {
    api: Arc<dyn AssistantsApi>,
    events: Arc<EventBus>,
    policy: BackoffPolicy,
    session: Mutex<SessionState>,
    inflight: InflightSlot,
}

impl ConversationManager {
    pub fn new(api: Arc<dyn AssistantsApi>) -> Self {
        Self {
            api,
            events: Arc::new(EventBus::new()),
            policy: BackoffPolicy::default(),
            session: Mutex::new(SessionState::default()),
            inflight: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Publish on a caller-supplied bus instead of a private one.
    #[must_use]
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn on<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&ConversationEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, listener);
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ConversationEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the bound assistant and thread.
    pub fn session(&self) -> SessionState {
        self.lock_session().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.lock_inflight().is_some()
    }

    /// Create a new assistant and open a thread for it.
    pub async fn initialize_assistant(&self, config: &AssistantConfig) -> Result<Assistant> {
        let created = async {
            let assistant = self.api.create_assistant(config).await?;
            let thread = self.api.create_thread().await?;
            Ok::<_, crate::api::Error>((assistant, thread))
        }
        .await;

        match created {
            Ok((assistant, thread)) => {
                info!(assistant_id = %assistant.id, thread_id = %thread.id, "Assistant initialized");
                self.lock_session()
                    .bind(assistant.id.clone(), thread.id);
                Ok(assistant)
            }
            Err(e) => Err(self.report_init_failure(e.into())),
        }
    }

    /// Attach to an existing assistant and open a thread for it.
    ///
    /// Returns `Ok(None)` without touching the session or emitting events when
    /// the service has no assistant with that id.
    pub async fn get_assistant(&self, assistant_id: &str) -> Result<Option<Assistant>> {
        let assistant = match self.api.get_assistant(assistant_id).await {
            Ok(Some(assistant)) => assistant,
            Ok(None) => {
                info!(assistant_id, "Assistant not found");
                return Ok(None);
            }
            Err(e) => return Err(self.report_init_failure(e.into())),
        };

        let thread = match self.api.create_thread().await {
            Ok(thread) => thread,
            Err(e) => return Err(self.report_init_failure(e.into())),
        };

        info!(assistant_id = %assistant.id, thread_id = %thread.id, "Attached to assistant");
        self.lock_session()
            .bind(assistant.id.clone(), thread.id);
        Ok(Some(assistant))
    }

    /// Send `question` to the thread and start a run for it.
    ///
    /// Returns as soon as the run exists; completion is reported through
    /// events. Failures are reported as an error event and yield `None`.
    pub async fn submit_question(&self, question: &str) -> Option<RunHandle> {
        match self.start_run(question).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                let msg = format!("Failed to submit question: {}", describe(&e));
                warn!("{msg}");
                self.events.emit(ConversationEvent::Error(msg));
                None
            }
        }
    }

    /// Stop polling the in-flight run, if any.
    pub fn cancel(&self) -> bool {
        match self.lock_inflight().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Every message on the thread, most recent first.
    pub async fn conversation_history(&self) -> Result<Vec<Message>> {
        let thread_id = self.thread_id()?;
        Ok(self.api.list_messages(&thread_id).await?)
    }

    pub async fn last_message(&self) -> Result<Option<Message>> {
        Ok(self.conversation_history().await?.into_iter().next())
    }

    async fn start_run(&self, question: &str) -> Result<RunHandle> {
        let (assistant_id, thread_id) = {
            let session = self.lock_session();
            let (assistant_id, thread_id) = session.ids().ok_or(Error::NotInitialized)?;
            (assistant_id.to_string(), thread_id.to_string())
        };
        let guard = self.claim()?;

        self.api.send_message(&thread_id, question).await?;
        let run = self.api.execute_thread(&thread_id, &assistant_id).await?;
        info!(run_id = %run.id, thread_id = %thread_id, "Run started");

        let api = Arc::clone(&self.api);
        let events = Arc::clone(&self.events);
        let policy = self.policy;
        let run_id = run.id;
        let task_run_id = run_id.clone();
        let task = tokio::spawn(async move {
            let token = guard.token.clone();
            let (outcome, terminal) =
                poll::drive_run(api.as_ref(), &events, policy, &thread_id, &task_run_id, &token)
                    .await;
            // Free the slot before listeners learn the run is over.
            drop(guard);
            events.emit(terminal);
            outcome
        });

        Ok(RunHandle { run_id, task })
    }

    fn claim(&self) -> Result<InflightGuard> {
        let mut slot = self.lock_inflight();
        if slot.is_some() {
            return Err(Error::Busy);
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        Ok(InflightGuard {
            slot: Arc::clone(&self.inflight),
            token,
        })
    }

    fn thread_id(&self) -> Result<String> {
        self.lock_session()
            .thread_id
            .clone()
            .ok_or(Error::NotInitialized)
    }

    fn report_init_failure(&self, err: Error) -> Error {
        let msg = format!("Failed to initialize assistant: {}", describe(&err));
        warn!("{msg}");
        self.events.emit(ConversationEvent::Error(msg));
        err
    }

    fn lock_session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_inflight(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn describe(err: &Error) -> String {
    match err {
        Error::Api(api) => api.display_message(),
        other => other.to_string(),
    }
}
