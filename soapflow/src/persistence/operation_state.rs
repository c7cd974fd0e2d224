//! Persisting an operation context with the messages it holds.
//!
//! The message being externalized is recorded only as a placeholder in its
//! own slot; every other message of the exchange is written in full inside
//! the operation blob.

use super::externalize::{read_message, write_message, REVISION};
use super::{ObjectReader, ObjectWriter};
use crate::context::{Context, OperationContext};
use crate::core::{Mep, MessageLabel, QName};
use crate::errors::SoapflowError;
use crate::message::MessageContext;
use bytes::Bytes;
use std::sync::Arc;

/// Format identifier of an operation context blob.
pub const OPERATION_CONTEXT_SUID: i64 = 0x4F50_4354_5846_4C57;

pub(crate) fn write_operation_context(
    op: &OperationContext,
    owner: &MessageContext,
) -> Result<Bytes, SoapflowError> {
    let mut writer = ObjectWriter::new();
    writer.write_i64(OPERATION_CONTEXT_SUID);
    writer.write_i32(REVISION);
    writer.write_utf(&op.operation_name().to_string())?;
    writer.write_utf(op.service_name())?;
    writer.write_utf(op.mep().uri())?;
    writer.write_bool(op.is_complete());
    writer.write_i64(op.last_touched_time());
    writer.write_optional_utf(op.registration_key().as_deref())?;
    writer.write_json(&op.core().properties().to_dict())?;

    let messages = op.message_contexts();
    writer.write_i32(i32::try_from(messages.len()).unwrap_or(i32::MAX));
    for (label, msg) in &messages {
        writer.write_utf(label.as_str())?;
        let is_owner = std::ptr::eq(Arc::as_ptr(msg), owner);
        writer.write_bool(is_owner);
        if !is_owner {
            write_message(msg, &mut writer, false)?;
        }
    }
    Ok(writer.into_bytes())
}

pub(crate) fn read_operation_context(
    blob: Bytes,
    owner: &Arc<MessageContext>,
) -> Result<Arc<OperationContext>, SoapflowError> {
    let mut reader = ObjectReader::new(blob);
    let suid = reader.read_i64()?;
    let revision = reader.read_i32()?;
    if suid != OPERATION_CONTEXT_SUID || revision != REVISION {
        return Err(SoapflowError::UnsupportedSerializationVersion { suid, revision });
    }
    let operation_name = QName::parse(&reader.read_utf()?);
    let service_name = reader.read_utf()?;
    let mep_uri = reader.read_utf()?;
    let mep = Mep::from_uri(&mep_uri)
        .ok_or_else(|| SoapflowError::serialization(format!("unknown exchange pattern '{mep_uri}'")))?;
    let op = Arc::new(OperationContext::new(operation_name, service_name, mep));
    if reader.read_bool()? {
        op.mark_complete();
    }
    op.set_last_touched_time(reader.read_i64()?);
    op.set_registration_key(reader.read_optional_utf()?);
    op.core().properties().replace_all(reader.read_json()?);

    let count = reader.read_i32()?;
    for _ in 0..count {
        let raw_label = reader.read_utf()?;
        let label = MessageLabel::parse(&raw_label)
            .ok_or_else(|| SoapflowError::serialization(format!("unknown message label '{raw_label}'")))?;
        if reader.read_bool()? {
            op.restore_message(label, owner.clone());
        } else {
            let nested = read_message(&mut reader)?;
            nested.set_operation_context(Some(op.clone()))?;
            op.restore_message(label, nested);
        }
    }
    Ok(op)
}
