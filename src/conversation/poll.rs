//! Run completion polling.
//!
//! A run is observed until the remote service reports a terminal status, the
//! retry budget runs out, a fetch fails, or the caller cancels. Every outcome
//! is reported on the event bus exactly once.

use super::backoff::BackoffPolicy;
use super::events::{ConversationEvent, EventBus};
use crate::api::{AssistantsApi, Message, Run, RunStatus, RunStep};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Coarse state of a run as far as polling is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Pending,
    Completed,
    Errored,
}

impl From<&RunStatus> for RunPhase {
    fn from(status: &RunStatus) -> Self {
        match status {
            RunStatus::Completed => RunPhase::Completed,
            RunStatus::Failed | RunStatus::Cancelled | RunStatus::Expired => RunPhase::Errored,
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Unknown(_) => {
                RunPhase::Pending
            }
        }
    }
}

/// How a poll cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(Message),
    /// The service reported failed, cancelled or expired.
    Errored { status: RunStatus },
    /// Still pending after every retry.
    Exhausted { attempts: u32 },
    /// A fetch failed or the completed thread had nothing to return.
    Failed(String),
    Cancelled,
}

/// Drive `run_id` to a terminal outcome, emitting events along the way.
pub async fn poll_run(
    api: &dyn AssistantsApi,
    events: &EventBus,
    policy: BackoffPolicy,
    thread_id: &str,
    run_id: &str,
    cancel: &CancellationToken,
) -> PollOutcome {
    let (outcome, terminal) = drive_run(api, events, policy, thread_id, run_id, cancel).await;
    events.emit(terminal);
    outcome
}

/// Poll until a terminal outcome, emitting only `status` events.
///
/// The terminal event is returned instead of emitted so the caller can release
/// its own state before listeners observe the end of the run.
pub(crate) async fn drive_run(
    api: &dyn AssistantsApi,
    events: &EventBus,
    policy: BackoffPolicy,
    thread_id: &str,
    run_id: &str,
    cancel: &CancellationToken,
) -> (PollOutcome, ConversationEvent) {
    let mut retry_count = 0u32;

    loop {
        let observed = match until_cancelled(cancel, observe(api, thread_id, run_id)).await {
            Some(result) => result,
            None => return cancelled(run_id),
        };
        let (run, steps) = match observed {
            Ok(observed) => observed,
            Err(e) => return failed(run_id, &e),
        };

        debug!(run_id, status = %run.status, steps = steps.len(), attempt = retry_count, "Polled run");

        match RunPhase::from(&run.status) {
            RunPhase::Completed => {
                let latest = match until_cancelled(cancel, api.list_messages(thread_id)).await {
                    Some(result) => result,
                    None => return cancelled(run_id),
                };
                return match latest.map(|messages| messages.into_iter().next()) {
                    Ok(Some(message)) => {
                        info!(run_id, message_id = %message.id, "Run completed");
                        (
                            PollOutcome::Completed(message.clone()),
                            ConversationEvent::Response(message),
                        )
                    }
                    Ok(None) => {
                        let msg = format!("Run {run_id} completed but the thread has no messages");
                        warn!("{msg}");
                        (PollOutcome::Failed(msg.clone()), ConversationEvent::Error(msg))
                    }
                    Err(e) => failed(run_id, &e),
                };
            }
            RunPhase::Errored => {
                let msg = errored_message(run_id, &run);
                warn!("{msg}");
                return (
                    PollOutcome::Errored { status: run.status },
                    ConversationEvent::Error(msg),
                );
            }
            RunPhase::Pending => {
                if retry_count >= policy.max_retries {
                    let msg = format!(
                        "Maximum retries ({}) reached for run {run_id}",
                        policy.max_retries
                    );
                    warn!("{msg}");
                    return (
                        PollOutcome::Exhausted {
                            attempts: retry_count + 1,
                        },
                        ConversationEvent::Error(msg),
                    );
                }

                events.emit(ConversationEvent::Status {
                    status: run.status,
                    steps,
                });

                let delay = policy.delay(retry_count);
                debug!(run_id, delay_ms = delay.as_millis() as u64, "Run pending, backing off");
                if until_cancelled(cancel, tokio::time::sleep(delay))
                    .await
                    .is_none()
                {
                    return cancelled(run_id);
                }
                retry_count += 1;
            }
        }
    }
}

async fn observe(
    api: &dyn AssistantsApi,
    thread_id: &str,
    run_id: &str,
) -> Result<(Run, Vec<RunStep>), crate::api::Error> {
    let run = api.retrieve_execution(thread_id, run_id).await?;
    let steps = api.list_run_steps(thread_id, run_id).await?;
    Ok((run, steps))
}

/// Await `fut` unless `cancel` fires first.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

fn errored_message(run_id: &str, run: &Run) -> String {
    match &run.last_error {
        Some(err) => format!(
            "Run {run_id} ended with status {}: {} ({})",
            run.status, err.message, err.code
        ),
        None => format!("Run {run_id} ended with status {}", run.status),
    }
}

fn failed(run_id: &str, err: &crate::api::Error) -> (PollOutcome, ConversationEvent) {
    let msg = format!(
        "Failed to check status of run {run_id}: {}",
        err.display_message()
    );
    warn!("{msg}");
    (PollOutcome::Failed(msg.clone()), ConversationEvent::Error(msg))
}

fn cancelled(run_id: &str) -> (PollOutcome, ConversationEvent) {
    info!(run_id, "Polling cancelled");
    (
        PollOutcome::Cancelled,
        ConversationEvent::Error(format!("Run {run_id} cancelled")),
    )
}
