//! Named, ordered groups of handlers.

use super::Handler;
use crate::core::InvocationResponse;
use crate::errors::SoapflowError;
use crate::message::MessageContext;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Checks run when a phase is entered and when it completes.
pub trait PhaseCondition: Send + Sync {
    /// Runs before the first handler of the phase.
    ///
    /// # Errors
    ///
    /// An error stops the flow.
    fn check_pre_condition(&self, _msg: &MessageContext) -> Result<(), SoapflowError> {
        Ok(())
    }

    /// Runs after the last handler of the phase.
    ///
    /// # Errors
    ///
    /// An error stops the flow.
    fn check_post_condition(&self, _msg: &MessageContext) -> Result<(), SoapflowError> {
        Ok(())
    }
}

/// A named group of handlers run in order.
///
/// The phase keeps its position in the message's in-phase cursor, so a
/// handler that suspends is invoked again when the message resumes.
pub struct Phase {
    name: String,
    handlers: RwLock<Vec<Arc<dyn Handler>>>,
    condition: Option<Arc<dyn PhaseCondition>>,
}

impl Phase {
    /// Creates an empty phase.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: RwLock::new(Vec::new()),
            condition: None,
        }
    }

    /// Appends a handler.
    #[must_use]
    pub fn with_handler(self, handler: Arc<dyn Handler>) -> Self {
        self.handlers.write().push(handler);
        self
    }

    /// Attaches pre/post conditions.
    #[must_use]
    pub fn with_condition(mut self, condition: Arc<dyn PhaseCondition>) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Appends a handler to a live phase.
    pub fn add_handler(&self, handler: Arc<dyn Handler>) {
        self.handlers.write().push(handler);
    }

    /// The phase name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A copy of the handler list.
    #[must_use]
    pub fn handlers(&self) -> Vec<Arc<dyn Handler>> {
        self.handlers.read().clone()
    }

    /// Number of handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    fn handler_at(&self, index: i32) -> Option<Arc<dyn Handler>> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.handlers.read().get(i).cloned())
    }
}

#[async_trait]
impl Handler for Phase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, msg: &MessageContext) -> Result<InvocationResponse, SoapflowError> {
        let mut index = msg.current_phase_index();
        if index == 0 {
            if let Some(condition) = &self.condition {
                condition.check_pre_condition(msg)?;
            }
        }
        while let Some(handler) = self.handler_at(index) {
            trace!(phase = %self.name, handler = %handler.name(), index, "Invoking handler");
            let response = handler.invoke(msg).await?;
            if response != InvocationResponse::Continue {
                return Ok(response);
            }
            index += 1;
            msg.set_current_phase_index(index);
        }
        if let Some(condition) = &self.condition {
            condition.check_post_condition(msg)?;
        }
        msg.set_current_phase_index(0);
        Ok(InvocationResponse::Continue)
    }

    async fn flow_complete(&self, msg: &MessageContext) {
        let mut index = msg.current_phase_index();
        if index == 0 {
            index = i32::try_from(self.handler_count()).unwrap_or(i32::MAX);
        } else {
            msg.set_current_phase_index(0);
        }
        while index > 0 {
            if let Some(handler) = self.handler_at(index - 1) {
                handler.flow_complete(msg).await;
            }
            index -= 1;
        }
    }

    fn as_phase(&self) -> Option<&Phase> {
        Some(self)
    }
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.handlers.read().iter().map(|h| h.name().to_string()).collect();
        f.debug_struct("Phase")
            .field("name", &self.name)
            .field("handlers", &names)
            .field("has_condition", &self.condition.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingHandler, SuspendingHandler};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingCondition {
        pre: AtomicUsize,
        post: AtomicUsize,
    }

    impl PhaseCondition for CountingCondition {
        fn check_pre_condition(&self, _msg: &MessageContext) -> Result<(), SoapflowError> {
            self.pre.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn check_post_condition(&self, _msg: &MessageContext) -> Result<(), SoapflowError> {
            self.post.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_phase_runs_handlers_in_order() {
        let a = Arc::new(RecordingHandler::new("a"));
        let b = Arc::new(RecordingHandler::new("b"));
        let phase = Phase::new("p").with_handler(a.clone()).with_handler(b.clone());
        let msg = MessageContext::new();

        let response = phase.invoke(&msg).await.unwrap();

        assert_eq!(response, InvocationResponse::Continue);
        assert_eq!(a.invocations(), 1);
        assert_eq!(b.invocations(), 1);
        assert_eq!(msg.current_phase_index(), 0);
    }

    #[tokio::test]
    async fn test_suspended_handler_is_reinvoked_without_rerunning_predecessors() {
        let a = Arc::new(RecordingHandler::new("a"));
        let pause = Arc::new(SuspendingHandler::new("pause", 1));
        let phase = Phase::new("p").with_handler(a.clone()).with_handler(pause.clone());
        let msg = MessageContext::new();

        assert_eq!(phase.invoke(&msg).await.unwrap(), InvocationResponse::Suspend);
        assert_eq!(msg.current_phase_index(), 1);

        assert_eq!(phase.invoke(&msg).await.unwrap(), InvocationResponse::Continue);
        assert_eq!(a.invocations(), 1);
        assert_eq!(pause.invocations(), 2);
    }

    #[tokio::test]
    async fn test_conditions_run_once_per_pass() {
        let condition = Arc::new(CountingCondition::default());
        let phase = Phase::new("p")
            .with_handler(Arc::new(SuspendingHandler::new("pause", 1)))
            .with_condition(condition.clone());
        let msg = MessageContext::new();

        phase.invoke(&msg).await.unwrap();
        phase.invoke(&msg).await.unwrap();

        assert_eq!(condition.pre.load(Ordering::SeqCst), 1);
        assert_eq!(condition.post.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_flow_complete_after_interrupt_skips_unreached_handlers() {
        let a = Arc::new(RecordingHandler::new("a"));
        let b = Arc::new(RecordingHandler::new("b"));
        let c = Arc::new(RecordingHandler::new("c"));
        let phase = Phase::new("p")
            .with_handler(a.clone())
            .with_handler(b.clone())
            .with_handler(c.clone());
        let msg = MessageContext::new();
        msg.set_current_phase_index(2);

        phase.flow_complete(&msg).await;

        assert_eq!(a.completions(), 1);
        assert_eq!(b.completions(), 1);
        assert_eq!(c.completions(), 0);
        assert_eq!(msg.current_phase_index(), 0);
    }
}
