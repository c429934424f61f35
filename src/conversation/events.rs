use crate::api::{Message, RunStatus, RunStep};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Lifecycle notification from a conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    /// Most recent thread message after a run completed.
    Response(Message),
    /// A poll observed a non-terminal run.
    Status { status: RunStatus, steps: Vec<RunStep> },
    Error(String),
}

impl ConversationEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Response(_) => EventKind::Response,
            Self::Status { .. } => EventKind::Status,
            Self::Error(_) => EventKind::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Response,
    Status,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Response, EventKind::Status, EventKind::Error];
}

type Listener = Arc<dyn Fn(&ConversationEvent) + Send + Sync>;

/// Synchronous publish/subscribe bus owned by a conversation manager.
///
/// Listeners for a kind run in registration order on the emitting task.
/// Nothing is buffered: listeners only see events emitted after they register.
/// Channel subscribers are fed after the listeners and dropped once their
/// receiver is gone.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Vec<(EventKind, Listener)>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ConversationEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&ConversationEvent) + Send + Sync + 'static,
    {
        self.lock().push((kind, Arc::new(listener)));
    }

    /// Forward every event onto an unbounded channel.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ConversationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock_subscribers().push(tx);
        rx
    }

    pub fn emit(&self, event: ConversationEvent) {
        let kind = event.kind();
        // Snapshot so a listener may register further listeners without deadlocking.
        let targets: Vec<Listener> = self
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in targets {
            listener(&event);
        }
        self.lock_subscribers()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock().iter().filter(|(k, _)| *k == kind).count()
    }

    /// Live channel subscribers as of the last emit.
    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    fn lock_subscribers(
        &self,
    ) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<ConversationEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(EventKind, Listener)>> {
        self.listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.lock().len())
            .field("subscribers", &self.lock_subscribers().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_listeners_is_noop() {
        let bus = EventBus::new();
        bus.emit(ConversationEvent::Error("nobody listening".into()));
        assert_eq!(bus.listener_count(EventKind::Error), 0);
    }

    #[test]
    fn test_listeners_called_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let seen = Arc::clone(&seen);
            bus.on(EventKind::Error, move |event| {
                if let ConversationEvent::Error(msg) = event {
                    seen.lock().unwrap().push(format!("{n}:{msg}"));
                }
            });
        }

        bus.emit(ConversationEvent::Error("boom".into()));

        assert_eq!(*seen.lock().unwrap(), vec!["0:boom", "1:boom", "2:boom"]);
    }

    #[test]
    fn test_only_matching_kind_delivered() {
        let bus = EventBus::new();
        let errors = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&errors);
        bus.on(EventKind::Error, move |_| *counter.lock().unwrap() += 1);

        bus.emit(ConversationEvent::Status {
            status: RunStatus::Queued,
            steps: vec![],
        });
        assert_eq!(*errors.lock().unwrap(), 0);

        bus.emit(ConversationEvent::Error("x".into()));
        assert_eq!(*errors.lock().unwrap(), 1);
    }

    #[test]
    fn test_late_listener_gets_no_replay() {
        let bus = EventBus::new();
        bus.emit(ConversationEvent::Error("early".into()));

        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());

        bus.emit(ConversationEvent::Error("late".into()));
        assert_eq!(rx.try_recv().unwrap(), ConversationEvent::Error("late".into()));
    }

    #[test]
    fn test_listener_may_register_during_emit() {
        let bus = Arc::new(EventBus::new());
        let inner = Arc::clone(&bus);
        bus.on(EventKind::Error, move |_| {
            inner.on(EventKind::Status, |_| {});
        });

        bus.emit(ConversationEvent::Error("x".into()));
        assert_eq!(bus.listener_count(EventKind::Status), 1);
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let mut live = bus.subscribe();
        for _ in 0..3 {
            drop(bus.subscribe());
        }
        assert_eq!(bus.subscriber_count(), 4);

        bus.emit(ConversationEvent::Error("x".into()));

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(live.try_recv().unwrap(), ConversationEvent::Error("x".into()));
        for kind in EventKind::ALL {
            assert_eq!(bus.listener_count(kind), 0);
        }
    }
}
