//! Operation contexts: the messages of one exchange.

use super::{Context, ContextCore, ContextRef, ServiceContext};
use crate::core::{Mep, MessageLabel, QName};
use crate::errors::{MepViolationError, SoapflowError};
use crate::events::event_types;
use crate::message::MessageContext;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Tracks the messages belonging to one operation invocation.
///
/// Slots are filled according to the exchange pattern's slot table. Once
/// complete the context accepts nothing further; completion is monotonic.
pub struct OperationContext {
    core: ContextCore,
    operation_name: QName,
    service_name: String,
    mep: Mep,
    messages: RwLock<HashMap<MessageLabel, Arc<MessageContext>>>,
    complete: AtomicBool,
    cleaned_up: AtomicBool,
    registration_key: RwLock<Option<String>>,
}

impl OperationContext {
    /// Creates a detached operation context.
    #[must_use]
    pub fn new(operation_name: QName, service_name: String, mep: Mep) -> Self {
        Self {
            core: ContextCore::new(),
            operation_name,
            service_name,
            mep,
            messages: RwLock::new(HashMap::new()),
            complete: AtomicBool::new(false),
            cleaned_up: AtomicBool::new(false),
            registration_key: RwLock::new(None),
        }
    }

    /// The described operation's name.
    #[must_use]
    pub fn operation_name(&self) -> &QName {
        &self.operation_name
    }

    /// The described service's name.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// The exchange pattern.
    #[must_use]
    pub fn mep(&self) -> Mep {
        self.mep
    }

    /// Adds a message under the label implied by its description or flow.
    ///
    /// # Errors
    ///
    /// Returns `MepViolation` when the slot is taken, the pattern has no such
    /// slot, or the exchange is already complete.
    pub fn add_message_context(&self, msg: &Arc<MessageContext>) -> Result<(), SoapflowError> {
        self.add_message_context_with_label(msg.message_label(), msg)
    }

    /// Adds a message under an explicit label.
    ///
    /// # Errors
    ///
    /// See [`OperationContext::add_message_context`].
    pub fn add_message_context_with_label(
        &self,
        label: MessageLabel,
        msg: &Arc<MessageContext>,
    ) -> Result<(), SoapflowError> {
        let completed_now = {
            let mut messages = self.messages.write();
            if self.is_complete() || messages.contains_key(&label) {
                return Err(
                    MepViolationError::completed(self.operation_name.to_string(), label.as_str())
                        .into(),
                );
            }
            if !self.mep.allows(label) {
                return Err(MepViolationError::unsupported_label(
                    self.operation_name.to_string(),
                    label.as_str(),
                )
                .into());
            }
            messages.insert(label, msg.clone());
            let filled: Vec<MessageLabel> = messages.keys().copied().collect();
            self.mep.is_satisfied_by(&filled) && !self.complete.swap(true, Ordering::SeqCst)
        };
        self.touch();
        if completed_now {
            self.announce_complete();
        }
        Ok(())
    }

    /// Completes an exchange that holds its required messages but is still
    /// waiting on an optional one (a robust fault or an optional reply).
    /// Returns true if this call completed it.
    pub fn settle(&self) -> bool {
        let settled_now = {
            let messages = self.messages.read();
            let filled: Vec<MessageLabel> = messages.keys().copied().collect();
            self.mep.can_settle(&filled) && !self.complete.swap(true, Ordering::SeqCst)
        };
        if settled_now {
            debug!(operation = %self.operation_name, "Settled without the optional message");
            self.announce_complete();
        }
        settled_now
    }

    fn announce_complete(&self) {
        debug!(operation = %self.operation_name, "Exchange complete");
        if let Some(root) = self.core.root() {
            root.emit(
                event_types::OPERATION_COMPLETED,
                serde_json::json!({
                    "operation": self.operation_name.to_string(),
                    "service": self.service_name,
                    "mep": self.mep.uri(),
                }),
            );
        }
    }

    /// Returns the message in `label`'s slot.
    #[must_use]
    pub fn get_message_context(&self, label: MessageLabel) -> Option<Arc<MessageContext>> {
        self.messages.read().get(&label).cloned()
    }

    /// All messages, ordered by label.
    #[must_use]
    pub fn message_contexts(&self) -> Vec<(MessageLabel, Arc<MessageContext>)> {
        let mut all: Vec<_> = self
            .messages
            .read()
            .iter()
            .map(|(l, m)| (*l, m.clone()))
            .collect();
        all.sort_by_key(|(l, _)| *l);
        all
    }

    /// Returns true once the pattern is satisfied, a fault arrived or the
    /// exchange was settled.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::SeqCst)
    }

    /// Marks the exchange complete.
    pub fn mark_complete(&self) {
        self.complete.store(true, Ordering::SeqCst);
    }

    /// The key this context is registered under, if any.
    #[must_use]
    pub fn registration_key(&self) -> Option<String> {
        self.registration_key.read().clone()
    }

    pub(crate) fn set_registration_key(&self, key: Option<String>) {
        *self.registration_key.write() = key;
    }

    /// Resolves the owning service context through the arena.
    #[must_use]
    pub fn service_context(&self) -> Option<Arc<ServiceContext>> {
        match self.parent()? {
            ContextRef::Service(service) => Some(service),
            _ => None,
        }
    }

    /// Releases the exchange: unregisters it, drops it from the arena and
    /// detaches its messages. A request-scoped service group left without
    /// exchanges goes with it. Runs once; later calls return false.
    pub fn cleanup(&self) -> bool {
        if self.cleaned_up.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(root) = self.core.root() {
            if let Some(key) = self.registration_key() {
                root.unregister_operation_context(&key);
            }
            let group = self.service_context().and_then(|s| s.service_group_context());
            root.remove_node(self.id());
            if let Some(group) = group {
                root.release_request_scoped_group(&group);
            }
        }
        let released = std::mem::take(&mut *self.messages.write());
        debug!(
            operation = %self.operation_name,
            messages = released.len(),
            "Operation context cleaned up"
        );
        true
    }

    /// Returns true once [`OperationContext::cleanup`] has run.
    #[must_use]
    pub fn is_cleaned_up(&self) -> bool {
        self.cleaned_up.load(Ordering::SeqCst)
    }

    pub(crate) fn restore_message(&self, label: MessageLabel, msg: Arc<MessageContext>) {
        self.messages.write().insert(label, msg);
    }
}

impl Context for OperationContext {
    fn core(&self) -> &ContextCore {
        &self.core
    }
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<MessageLabel> = self.messages.read().keys().copied().collect();
        f.debug_struct("OperationContext")
            .field("id", &self.core.id())
            .field("operation", &self.operation_name)
            .field("mep", &self.mep)
            .field("messages", &labels)
            .field("complete", &self.is_complete())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Flow;

    fn message(flow: Flow) -> Arc<MessageContext> {
        let msg = Arc::new(MessageContext::new());
        msg.set_flow(flow);
        msg
    }

    fn op(mep: Mep) -> OperationContext {
        OperationContext::new(QName::local("echo"), "Echo".to_string(), mep)
    }

    #[test]
    fn test_in_only_completes_on_first_message() {
        let ctx = op(Mep::InOnly);
        ctx.add_message_context(&message(Flow::In)).unwrap();
        assert!(ctx.is_complete());
    }

    #[test]
    fn test_in_out_needs_both_slots() {
        let ctx = op(Mep::InOut);
        ctx.add_message_context(&message(Flow::In)).unwrap();
        assert!(!ctx.is_complete());

        ctx.add_message_context(&message(Flow::Out)).unwrap();
        assert!(ctx.is_complete());
        assert_eq!(ctx.message_contexts().len(), 2);
    }

    #[test]
    fn test_second_out_message_fails() {
        let ctx = op(Mep::OutIn);
        ctx.add_message_context(&message(Flow::Out)).unwrap();

        let err = ctx.add_message_context(&message(Flow::Out)).unwrap_err();
        assert!(err.to_string().contains("MEP already completed"));
    }

    #[test]
    fn test_nothing_added_after_completion() {
        let ctx = op(Mep::InOnly);
        ctx.add_message_context(&message(Flow::In)).unwrap();

        let err = ctx
            .add_message_context_with_label(MessageLabel::Fault, &message(Flow::OutFault))
            .unwrap_err();
        assert!(matches!(err, SoapflowError::MepViolation(_)));
    }

    #[test]
    fn test_fault_completes_exchange() {
        let ctx = op(Mep::InOut);
        ctx.add_message_context(&message(Flow::In)).unwrap();
        ctx.add_message_context_with_label(MessageLabel::Fault, &message(Flow::OutFault))
            .unwrap();
        assert!(ctx.is_complete());
    }

    #[test]
    fn test_robust_in_only_takes_a_late_fault() {
        let ctx = op(Mep::RobustInOnly);
        ctx.add_message_context(&message(Flow::In)).unwrap();
        assert!(!ctx.is_complete());

        ctx.add_message_context_with_label(MessageLabel::Fault, &message(Flow::OutFault))
            .unwrap();
        assert!(ctx.is_complete());
        assert!(ctx.get_message_context(MessageLabel::Fault).is_some());
    }

    #[test]
    fn test_robust_out_only_takes_a_late_fault() {
        let ctx = op(Mep::RobustOutOnly);
        ctx.add_message_context(&message(Flow::Out)).unwrap();
        assert!(!ctx.is_complete());

        ctx.add_message_context_with_label(MessageLabel::Fault, &message(Flow::InFault))
            .unwrap();
        assert!(ctx.is_complete());
    }

    #[test]
    fn test_optional_reply_completes_the_exchange() {
        let ctx = op(Mep::OutOptionalIn);
        ctx.add_message_context(&message(Flow::Out)).unwrap();
        assert!(!ctx.is_complete());

        ctx.add_message_context(&message(Flow::In)).unwrap();
        assert!(ctx.is_complete());
    }

    #[test]
    fn test_settle_without_the_optional_message() {
        let ctx = op(Mep::InOptionalOut);
        assert!(!ctx.settle(), "nothing to settle before the request");

        ctx.add_message_context(&message(Flow::In)).unwrap();
        assert!(!ctx.is_complete());
        assert!(ctx.settle());
        assert!(ctx.is_complete());
        assert!(!ctx.settle());

        let err = ctx.add_message_context(&message(Flow::Out)).unwrap_err();
        assert!(matches!(err, SoapflowError::MepViolation(_)));
    }

    #[test]
    fn test_unsupported_label_rejected() {
        let ctx = op(Mep::InOnly);
        let err = ctx.add_message_context(&message(Flow::Out)).unwrap_err();
        assert!(err.to_string().contains("no 'Out' message"));
        assert!(!ctx.is_complete());
    }

    #[test]
    fn test_cleanup_runs_once() {
        let ctx = op(Mep::InOnly);
        ctx.add_message_context(&message(Flow::In)).unwrap();

        assert!(ctx.cleanup());
        assert!(!ctx.cleanup());
        assert!(ctx.is_cleaned_up());
        assert!(ctx.get_message_context(MessageLabel::In).is_none());
    }
}
