//! Writing a message to a stream and reading it back inactive.
//!
//! The stream starts with a `{suid, revision}` pair, then the sections below
//! in a fixed order. Each section after the envelope opens with a marker
//! string that the reader cross-checks.

use super::metadata::{
    entries_for, read_entry_list, read_optional_entry, write_entry_list, write_optional_entry,
    MetaDataEntry, SelfManagedDataHolder,
};
use super::operation_state::{read_operation_context, write_operation_context};
use super::{ObjectReader, ObjectWriter};
use crate::context::{Context, SessionContext, SessionSnapshot};
use crate::core::Flow;
use crate::errors::SoapflowError;
use crate::message::{flatten_handlers, Attachments, MessageContext, MessageFlags, SoapEnvelope};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Format identifier of a message stream.
pub const MESSAGE_CONTEXT_SUID: i64 = 0x534F_4150_464C_4F57;
/// Format revision of a message stream.
pub const REVISION: i32 = 2;

pub(crate) mod markers {
    pub const ENVELOPE: &str = "envelope";
    pub const EXECUTION_CHAIN: &str = "executionChain";
    pub const EXECUTED_PHASES: &str = "executedPhases";
    pub const LEGACY_INBOUND_EXECUTED_PHASES: &str = "inboundExecutedPhases";
    pub const LEGACY_OUTBOUND_EXECUTED_PHASES: &str = "outboundExecutedPhases";
    pub const OPTIONS: &str = "options";
    pub const AXIS_OPERATION: &str = "axisOperation";
    pub const OPERATION_CONTEXT: &str = "operationContext";
    pub const AXIS_SERVICE: &str = "axisService";
    pub const SERVICE_CONTEXT: &str = "serviceContext";
    pub const AXIS_SERVICE_GROUP: &str = "axisServiceGroup";
    pub const SERVICE_GROUP_CONTEXT: &str = "serviceGroupContext";
    pub const AXIS_MESSAGE: &str = "axisMessage";
    pub const SESSION_CONTEXT: &str = "sessionContext";
    pub const TRANSPORTS: &str = "transports";
    pub const PROPERTIES: &str = "properties";
    pub const SELF_MANAGED_DATA: &str = "selfManagedData";
}

/// Persisted properties of a service or service group context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct RuntimeContextState {
    pub(crate) properties: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub(crate) parent_of_operation_context: bool,
}

/// Everything read from a stream that needs a live engine to resolve.
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingActivation {
    pub(crate) handler_index: i32,
    pub(crate) phase_index: i32,
    pub(crate) execution_chain: Option<Vec<MetaDataEntry>>,
    pub(crate) executed_phases: Option<Vec<MetaDataEntry>>,
    pub(crate) axis_operation: Option<MetaDataEntry>,
    pub(crate) axis_service: Option<MetaDataEntry>,
    pub(crate) axis_service_group: Option<MetaDataEntry>,
    pub(crate) axis_message: Option<MetaDataEntry>,
    pub(crate) transport_in: Option<MetaDataEntry>,
    pub(crate) transport_out: Option<MetaDataEntry>,
    pub(crate) service_context: Option<RuntimeContextState>,
    pub(crate) service_group_context: Option<RuntimeContextState>,
    pub(crate) self_managed_data: Vec<SelfManagedDataHolder>,
}

impl MessageContext {
    /// Serializes the message, its exchange and its handlers'
    /// self-managed data.
    ///
    /// # Errors
    ///
    /// Fails if the message is still waiting for activation, or if a
    /// handler cannot serialize its data.
    pub fn write_external(&self) -> Result<Bytes, SoapflowError> {
        let mut writer = ObjectWriter::new();
        write_message(self, &mut writer, true)?;
        debug!(
            log_correlation_id = %self.log_correlation_id(),
            bytes = writer.len(),
            "Message externalized"
        );
        Ok(writer.into_bytes())
    }

    /// Reads a message written by [`MessageContext::write_external`].
    ///
    /// The result is inactive: descriptions, runtime contexts and the
    /// execution chain stay unresolved until [`MessageContext::activate`].
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedSerializationVersion` for an unknown format and
    /// `Serialization` for a malformed stream.
    pub fn read_external(bytes: impl Into<Bytes>) -> Result<Arc<MessageContext>, SoapflowError> {
        let mut reader = ObjectReader::new(bytes);
        read_message(&mut reader)
    }
}

pub(crate) fn write_message(
    msg: &MessageContext,
    writer: &mut ObjectWriter,
    include_operation_context: bool,
) -> Result<(), SoapflowError> {
    if msg.needs_to_be_activated() {
        return Err(SoapflowError::serialization(
            "message must be activated before it is written",
        ));
    }
    writer.write_i64(MESSAGE_CONTEXT_SUID);
    writer.write_i32(REVISION);

    let flags = msg.flags();
    writer.write_bool(flags.processing_fault);
    writer.write_bool(flags.paused);
    writer.write_bool(flags.doing_rest);
    writer.write_bool(flags.doing_mtom);
    writer.write_bool(flags.doing_swa);
    writer.write_bool(flags.response_written);
    writer.write_bool(flags.server_side);
    writer.write_bool(flags.soap11);
    writer.write_i64(msg.last_touched_time());
    writer.write_utf(msg.log_correlation_id())?;
    writer.write_i32(msg.flow().code());
    writer.write_optional_utf(msg.failure_reason().as_deref())?;

    writer.write_marker(markers::ENVELOPE)?;
    let optimize = msg
        .configuration_context()
        .is_some_and(|c| c.config().persistence.optimize_envelope);
    write_envelope(msg, writer, optimize)?;

    let (chain, handler_index, phase_index, executed) = msg.with_tracker(|t| {
        (
            t.execution_chain().to_vec(),
            t.current_handler_index(),
            t.current_phase_index(),
            t.executed_phases(),
        )
    });
    writer.write_marker(markers::EXECUTION_CHAIN)?;
    writer.write_bool(!chain.is_empty());
    if !chain.is_empty() {
        writer.write_i32(handler_index);
        writer.write_i32(phase_index);
        write_entry_list(writer, &entries_for(&chain))?;
    }
    write_executed_phases(writer, &entries_for(&executed))?;

    writer.write_marker(markers::OPTIONS)?;
    writer.write_json(&msg.options())?;

    let operation_ctx = if include_operation_context {
        msg.operation_context()
    } else {
        None
    };
    let service_ctx = msg.service_context();

    writer.write_marker(markers::AXIS_OPERATION)?;
    write_optional_entry(writer, msg.axis_operation().map(|o| MetaDataEntry::for_operation(&o)).as_ref())?;
    writer.write_marker(markers::OPERATION_CONTEXT)?;
    match &operation_ctx {
        Some(op) => {
            writer.write_bool(true);
            let blob = write_operation_context(op, msg)?;
            writer.write_blob(&blob)?;
        }
        None => writer.write_bool(false),
    }

    writer.write_marker(markers::AXIS_SERVICE)?;
    write_optional_entry(writer, msg.axis_service().map(|s| MetaDataEntry::for_service(&s)).as_ref())?;
    writer.write_optional_utf(msg.service_context_id().as_deref())?;
    writer.write_marker(markers::SERVICE_CONTEXT)?;
    match &service_ctx {
        Some(service) => {
            writer.write_bool(true);
            let parent_of_operation_context = msg
                .operation_context()
                .is_some_and(|op| op.core().parent_id() == Some(service.id()));
            writer.write_json(&RuntimeContextState {
                properties: service.core().properties().to_dict(),
                parent_of_operation_context,
            })?;
        }
        None => writer.write_bool(false),
    }

    writer.write_marker(markers::AXIS_SERVICE_GROUP)?;
    write_optional_entry(
        writer,
        msg.axis_service_group()
            .map(|g| MetaDataEntry::for_service_group(&g))
            .as_ref(),
    )?;
    writer.write_optional_utf(msg.service_group_context_id().as_deref())?;
    writer.write_marker(markers::SERVICE_GROUP_CONTEXT)?;
    match msg.service_group_context() {
        Some(group) => {
            writer.write_bool(true);
            writer.write_json(&RuntimeContextState {
                properties: group.core().properties().to_dict(),
                parent_of_operation_context: false,
            })?;
        }
        None => writer.write_bool(false),
    }

    writer.write_marker(markers::AXIS_MESSAGE)?;
    write_optional_entry(writer, msg.axis_message().map(|m| MetaDataEntry::for_message(&m)).as_ref())?;

    writer.write_marker(markers::SESSION_CONTEXT)?;
    match msg.session_context() {
        Some(session) => {
            writer.write_bool(true);
            writer.write_json(&session.snapshot())?;
        }
        None => writer.write_bool(false),
    }

    writer.write_marker(markers::TRANSPORTS)?;
    writer.write_optional_utf(msg.incoming_transport_name().as_deref())?;
    write_optional_entry(
        writer,
        msg.transport_in().map(|t| MetaDataEntry::for_transport_in(&t)).as_ref(),
    )?;
    write_optional_entry(
        writer,
        msg.transport_out().map(|t| MetaDataEntry::for_transport_out(&t)).as_ref(),
    )?;

    writer.write_marker(markers::PROPERTIES)?;
    writer.write_json(&msg.core().properties().to_dict())?;
    writer.write_json(&msg.core().non_replicable_properties().to_dict())?;

    writer.write_marker(markers::SELF_MANAGED_DATA)?;
    let holders = collect_self_managed_data(msg)?;
    writer.write_bool(!holders.is_empty());
    if !holders.is_empty() {
        writer.write_i32(i32::try_from(holders.len()).unwrap_or(i32::MAX));
        for holder in &holders {
            holder.write(writer)?;
        }
    }
    Ok(())
}

pub(crate) fn read_message(reader: &mut ObjectReader) -> Result<Arc<MessageContext>, SoapflowError> {
    let suid = reader.read_i64()?;
    let revision = reader.read_i32()?;
    if suid != MESSAGE_CONTEXT_SUID || revision != REVISION {
        return Err(SoapflowError::UnsupportedSerializationVersion { suid, revision });
    }
    let msg = Arc::new(MessageContext::new());
    msg.bind_handle();
    let mut pending = PendingActivation::default();

    let flags = MessageFlags {
        processing_fault: reader.read_bool()?,
        paused: reader.read_bool()?,
        doing_rest: reader.read_bool()?,
        doing_mtom: reader.read_bool()?,
        doing_swa: reader.read_bool()?,
        response_written: reader.read_bool()?,
        server_side: reader.read_bool()?,
        soap11: reader.read_bool()?,
    };
    let last_touched = reader.read_i64()?;
    msg.restore_log_correlation_id(reader.read_utf()?);
    let flow_code = reader.read_i32()?;
    let flow = Flow::from_code(flow_code)
        .ok_or_else(|| SoapflowError::serialization(format!("unknown flow code {flow_code}")))?;
    msg.set_flow(flow);
    msg.set_failure_reason(reader.read_optional_utf()?);

    reader.read_marker(markers::ENVELOPE)?;
    read_envelope(&msg, reader)?;
    msg.update_flags(|f| *f = flags);

    reader.read_marker(markers::EXECUTION_CHAIN)?;
    if reader.read_bool()? {
        pending.handler_index = reader.read_i32()?;
        pending.phase_index = reader.read_i32()?;
        pending.execution_chain = Some(read_entry_list(reader)?);
    } else {
        pending.handler_index = -1;
    }
    pending.executed_phases = read_executed_phases(reader)?;

    reader.read_marker(markers::OPTIONS)?;
    msg.set_options(reader.read_json()?);

    reader.read_marker(markers::AXIS_OPERATION)?;
    pending.axis_operation = read_optional_entry(reader)?;
    reader.read_marker(markers::OPERATION_CONTEXT)?;
    if let Some(blob) = reader.read_optional_blob()? {
        let op = read_operation_context(blob, &msg)?;
        msg.set_operation_context(Some(op))?;
    }

    reader.read_marker(markers::AXIS_SERVICE)?;
    pending.axis_service = read_optional_entry(reader)?;
    let service_context_id = reader.read_optional_utf()?;
    reader.read_marker(markers::SERVICE_CONTEXT)?;
    if reader.read_bool()? {
        pending.service_context = Some(reader.read_json()?);
    }

    reader.read_marker(markers::AXIS_SERVICE_GROUP)?;
    pending.axis_service_group = read_optional_entry(reader)?;
    let group_context_id = reader.read_optional_utf()?;
    reader.read_marker(markers::SERVICE_GROUP_CONTEXT)?;
    if reader.read_bool()? {
        pending.service_group_context = Some(reader.read_json()?);
    }
    msg.set_context_ids(service_context_id, group_context_id);

    reader.read_marker(markers::AXIS_MESSAGE)?;
    pending.axis_message = read_optional_entry(reader)?;

    reader.read_marker(markers::SESSION_CONTEXT)?;
    if reader.read_bool()? {
        let snapshot: SessionSnapshot = reader.read_json()?;
        msg.set_session_context(Some(Arc::new(SessionContext::from_snapshot(snapshot))));
    }

    reader.read_marker(markers::TRANSPORTS)?;
    msg.set_incoming_transport_name(reader.read_optional_utf()?);
    pending.transport_in = read_optional_entry(reader)?;
    pending.transport_out = read_optional_entry(reader)?;

    reader.read_marker(markers::PROPERTIES)?;
    msg.core().properties().replace_all(reader.read_json()?);
    msg.core().non_replicable_properties().replace_all(reader.read_json()?);

    reader.read_marker(markers::SELF_MANAGED_DATA)?;
    if reader.read_bool()? {
        let count = reader.read_i32()?;
        for _ in 0..count {
            pending.self_managed_data.push(SelfManagedDataHolder::read(reader)?);
        }
    }

    msg.set_last_touched_time(last_touched);
    msg.stage_pending(pending);
    debug!(log_correlation_id = %msg.log_correlation_id(), "Message read; awaiting activation");
    Ok(msg)
}

fn write_envelope(msg: &MessageContext, writer: &mut ObjectWriter, optimize: bool) -> Result<(), SoapflowError> {
    match msg.envelope() {
        Some(envelope) => {
            let envelope = envelope.read().clone();
            writer.write_bool(true);
            writer.write_json(&envelope)?;
        }
        None => writer.write_bool(false),
    }
    let has_attachments = msg.has_attachments();
    let optimized = has_attachments || optimize;
    writer.write_bool(optimized);
    if optimized {
        let entries = if has_attachments {
            msg.attachments().entries()
        } else {
            Vec::new()
        };
        writer.write_i32(i32::try_from(entries.len()).unwrap_or(i32::MAX));
        for (content_id, attachment) in &entries {
            writer.write_utf(content_id)?;
            writer.write_utf(&attachment.content_type)?;
            writer.write_blob(&attachment.data)?;
        }
    }
    Ok(())
}

fn read_envelope(msg: &MessageContext, reader: &mut ObjectReader) -> Result<(), SoapflowError> {
    if reader.read_bool()? {
        let envelope: SoapEnvelope = reader.read_json()?;
        msg.set_envelope(envelope)?;
    }
    if reader.read_bool()? {
        let count = reader.read_i32()?;
        if count > 0 {
            let attachments = Attachments::new();
            for _ in 0..count {
                let content_id = reader.read_utf()?;
                let content_type = reader.read_utf()?;
                attachments.add(content_id, content_type, reader.read_blob()?);
            }
            msg.set_attachments(Some(attachments));
        }
    }
    Ok(())
}

/// Writes the executed-phases section.
pub(crate) fn write_executed_phases(writer: &mut ObjectWriter, entries: &[MetaDataEntry]) -> Result<(), SoapflowError> {
    writer.write_marker(markers::EXECUTED_PHASES)?;
    writer.write_bool(!entries.is_empty());
    if entries.is_empty() {
        Ok(())
    } else {
        write_entry_list(writer, entries)
    }
}

/// Reads the executed-phases section, accepting the older layout that kept
/// inbound and outbound units in two lists. Those are merged with the
/// outbound units, which ran last, first.
pub(crate) fn read_executed_phases(
    reader: &mut ObjectReader,
) -> Result<Option<Vec<MetaDataEntry>>, SoapflowError> {
    if reader.peek_utf()? == markers::LEGACY_INBOUND_EXECUTED_PHASES {
        reader.read_utf()?;
        let inbound = read_optional_list(reader)?;
        reader.read_marker(markers::LEGACY_OUTBOUND_EXECUTED_PHASES)?;
        let outbound = read_optional_list(reader)?;
        debug!("Merging legacy executed-phase lists");
        let merged: Vec<MetaDataEntry> = outbound
            .into_iter()
            .flatten()
            .chain(inbound.into_iter().flatten())
            .collect();
        return Ok((!merged.is_empty()).then_some(merged));
    }
    reader.read_marker(markers::EXECUTED_PHASES)?;
    read_optional_list(reader)
}

fn read_optional_list(reader: &mut ObjectReader) -> Result<Option<Vec<MetaDataEntry>>, SoapflowError> {
    if reader.read_bool()? {
        read_entry_list(reader).map(Some)
    } else {
        Ok(None)
    }
}

fn collect_self_managed_data(msg: &MessageContext) -> Result<Vec<SelfManagedDataHolder>, SoapflowError> {
    let mut holders = Vec::new();
    for unit in flatten_handlers(&msg.execution_chain()) {
        let Some(manager) = unit.self_managed_data() else {
            continue;
        };
        match manager.serialize_self_managed_data(msg)? {
            Some(data) => holders.push(SelfManagedDataHolder::new(unit.as_ref(), data)),
            None => debug!(handler = %unit.name(), "No self-managed data to save"),
        }
    }
    Ok(holders)
}
