/// Assistant and thread a conversation manager is bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub assistant_id: Option<String>,
    pub thread_id: Option<String>,
}

impl SessionState {
    pub fn is_initialized(&self) -> bool {
        self.assistant_id.is_some() && self.thread_id.is_some()
    }

    /// `(assistant_id, thread_id)` once both are set.
    pub fn ids(&self) -> Option<(&str, &str)> {
        Some((self.assistant_id.as_deref()?, self.thread_id.as_deref()?))
    }

    pub(crate) fn bind(&mut self, assistant_id: String, thread_id: String) {
        self.assistant_id = Some(assistant_id);
        self.thread_id = Some(thread_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_unset() {
        let state = SessionState::default();
        assert!(!state.is_initialized());
        assert_eq!(state.ids(), None);
    }

    #[test]
    fn test_partial_state_is_not_initialized() {
        let state = SessionState {
            assistant_id: Some("asst_1".into()),
            thread_id: None,
        };
        assert!(!state.is_initialized());
        assert_eq!(state.ids(), None);
    }

    #[test]
    fn test_bind() {
        let mut state = SessionState::default();
        state.bind("asst_1".into(), "thread_1".into());
        assert!(state.is_initialized());
        assert_eq!(state.ids(), Some(("asst_1", "thread_1")));
    }
}
