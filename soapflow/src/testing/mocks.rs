//! Mock handlers and senders.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::core::InvocationResponse;
use crate::engine::{Handler, SelfManagedDataManager, TransportSender};
use crate::errors::SoapflowError;
use crate::message::{MessageContext, SoapEnvelope};

/// A shared, ordered log of `invoke:<name>` and `complete:<name>` entries.
pub type Journal = Arc<Mutex<Vec<String>>>;

/// A handler that counts calls and returns a configurable response.
#[derive(Debug)]
pub struct RecordingHandler {
    name: String,
    response: Mutex<InvocationResponse>,
    invocations: Mutex<usize>,
    completions: Mutex<usize>,
    journal: Option<Journal>,
}

impl RecordingHandler {
    /// Creates a handler that always continues.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: Mutex::new(InvocationResponse::Continue),
            invocations: Mutex::new(0),
            completions: Mutex::new(0),
            journal: None,
        }
    }

    /// Sets the response to return.
    #[must_use]
    pub fn with_response(self, response: InvocationResponse) -> Self {
        *self.response.lock() = response;
        self
    }

    /// Appends calls to a shared journal.
    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Number of `invoke` calls.
    #[must_use]
    pub fn invocations(&self) -> usize {
        *self.invocations.lock()
    }

    /// Number of `flow_complete` calls.
    #[must_use]
    pub fn completions(&self) -> usize {
        *self.completions.lock()
    }

    fn log(&self, entry: &str) {
        if let Some(journal) = &self.journal {
            journal.lock().push(format!("{entry}:{}", self.name));
        }
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _msg: &MessageContext) -> Result<InvocationResponse, SoapflowError> {
        *self.invocations.lock() += 1;
        self.log("invoke");
        Ok(*self.response.lock())
    }

    async fn flow_complete(&self, _msg: &MessageContext) {
        *self.completions.lock() += 1;
        self.log("complete");
    }
}

/// A handler that suspends its first `times` invocations, then continues.
#[derive(Debug)]
pub struct SuspendingHandler {
    name: String,
    times: usize,
    invocations: Mutex<usize>,
}

impl SuspendingHandler {
    /// Creates the handler.
    #[must_use]
    pub fn new(name: impl Into<String>, times: usize) -> Self {
        Self {
            name: name.into(),
            times,
            invocations: Mutex::new(0),
        }
    }

    /// Number of `invoke` calls.
    #[must_use]
    pub fn invocations(&self) -> usize {
        *self.invocations.lock()
    }
}

#[async_trait]
impl Handler for SuspendingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _msg: &MessageContext) -> Result<InvocationResponse, SoapflowError> {
        let mut calls = self.invocations.lock();
        *calls += 1;
        if *calls <= self.times {
            Ok(InvocationResponse::Suspend)
        } else {
            Ok(InvocationResponse::Continue)
        }
    }
}

/// A handler that always fails.
#[derive(Debug)]
pub struct FailingHandler {
    name: String,
    message: String,
    completions: Mutex<usize>,
}

impl FailingHandler {
    /// Creates a handler failing with `message`.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            completions: Mutex::new(0),
        }
    }

    /// Number of `flow_complete` calls.
    #[must_use]
    pub fn completions(&self) -> usize {
        *self.completions.lock()
    }
}

#[async_trait]
impl Handler for FailingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _msg: &MessageContext) -> Result<InvocationResponse, SoapflowError> {
        Err(SoapflowError::Internal(self.message.clone()))
    }

    async fn flow_complete(&self, _msg: &MessageContext) {
        *self.completions.lock() += 1;
    }
}

/// A handler that counts its visits in the message's self-managed data and
/// persists that count through suspend/resume.
///
/// Several instances may share the type; each keys its data by its own name.
#[derive(Debug)]
pub struct StatefulHandler {
    name: String,
    suspend_first: bool,
    suspended: Mutex<bool>,
    restored: Mutex<Vec<Vec<u8>>>,
    transient_restores: Mutex<usize>,
}

impl StatefulHandler {
    /// Creates a handler that always continues.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            suspend_first: false,
            suspended: Mutex::new(false),
            restored: Mutex::new(Vec::new()),
            transient_restores: Mutex::new(0),
        }
    }

    /// Suspends the first message it sees, after recording its visit.
    #[must_use]
    pub fn suspending_once(mut self) -> Self {
        self.suspend_first = true;
        self
    }

    /// The visit count stored on `msg`.
    #[must_use]
    pub fn visits(&self, msg: &MessageContext) -> Option<u64> {
        msg.get_self_managed_data(self.class_name(), &self.name)
            .and_then(|v| v.as_u64())
    }

    /// Every blob handed back by a restore.
    #[must_use]
    pub fn restored(&self) -> Vec<Vec<u8>> {
        self.restored.lock().clone()
    }

    /// Number of transient-data restores.
    #[must_use]
    pub fn transient_restores(&self) -> usize {
        *self.transient_restores.lock()
    }
}

#[async_trait]
impl Handler for StatefulHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, msg: &MessageContext) -> Result<InvocationResponse, SoapflowError> {
        let visits = self.visits(msg).unwrap_or(0) + 1;
        msg.set_self_managed_data(self.class_name(), &self.name, serde_json::json!(visits));
        let mut suspended = self.suspended.lock();
        if self.suspend_first && !*suspended {
            *suspended = true;
            return Ok(InvocationResponse::Suspend);
        }
        Ok(InvocationResponse::Continue)
    }

    fn self_managed_data(&self) -> Option<&dyn SelfManagedDataManager> {
        Some(self)
    }
}

impl SelfManagedDataManager for StatefulHandler {
    fn serialize_self_managed_data(&self, msg: &MessageContext) -> Result<Option<Vec<u8>>, SoapflowError> {
        msg.get_self_managed_data(self.class_name(), &self.name)
            .map(|value| serde_json::to_vec(&value).map_err(SoapflowError::from))
            .transpose()
    }

    fn deserialize_self_managed_data(&self, data: &[u8], msg: &MessageContext) -> Result<(), SoapflowError> {
        let value: serde_json::Value = serde_json::from_slice(data)?;
        msg.set_self_managed_data(self.class_name(), &self.name, value);
        self.restored.lock().push(data.to_vec());
        Ok(())
    }

    fn restore_transient_data(&self, _msg: &MessageContext) {
        *self.transient_restores.lock() += 1;
    }
}

/// A transport sender that records each message instead of writing it.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(Option<String>, Option<SoapEnvelope>)>>,
}

impl RecordingSender {
    /// Creates the sender.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages sent.
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Message ids of the sent messages, in order.
    #[must_use]
    pub fn sent_message_ids(&self) -> Vec<Option<String>> {
        self.sent.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    /// The envelope of the last sent message.
    #[must_use]
    pub fn last_envelope(&self) -> Option<SoapEnvelope> {
        self.sent.lock().last().and_then(|(_, env)| env.clone())
    }
}

#[async_trait]
impl TransportSender for RecordingSender {
    async fn invoke(&self, msg: &MessageContext) -> Result<InvocationResponse, SoapflowError> {
        let envelope = msg.envelope().map(|env| env.read().clone());
        self.sent.lock().push((msg.message_id(), envelope));
        msg.set_response_written(true);
        Ok(InvocationResponse::Continue)
    }
}
