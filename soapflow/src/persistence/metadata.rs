//! Surrogates for engine-owned objects.
//!
//! Handlers, phases and descriptions are never serialized. The stream
//! records a `{class name, qualified name}` pair for each, which activation
//! resolves against the live engine.

use super::{ObjectReader, ObjectWriter};
use crate::description::{
    AxisMessage, AxisOperation, AxisService, AxisServiceGroup, TransportInDescription,
    TransportOutDescription,
};
use crate::engine::Handler;
use crate::errors::SoapflowError;
use bytes::Bytes;
use std::sync::Arc;
use tracing::warn;

/// Class name of the sentinel terminating a surrogate list.
pub const LAST_ENTRY: &str = "LAST_ENTRY";

/// Class names of described objects.
pub mod class_names {
    /// [`AxisService`](crate::description::AxisService).
    pub const AXIS_SERVICE: &str = "AxisService";
    /// [`AxisServiceGroup`](crate::description::AxisServiceGroup).
    pub const AXIS_SERVICE_GROUP: &str = "AxisServiceGroup";
    /// [`AxisOperation`](crate::description::AxisOperation).
    pub const AXIS_OPERATION: &str = "AxisOperation";
    /// [`AxisMessage`](crate::description::AxisMessage).
    pub const AXIS_MESSAGE: &str = "AxisMessage";
    /// [`TransportInDescription`](crate::description::TransportInDescription).
    pub const TRANSPORT_IN: &str = "TransportInDescription";
    /// [`TransportOutDescription`](crate::description::TransportOutDescription).
    pub const TRANSPORT_OUT: &str = "TransportOutDescription";
}

/// A serializable stand-in for an engine-owned object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaDataEntry {
    /// The object's class name.
    pub class_name: String,
    /// The object's name within its class.
    pub qualified_name: String,
    /// Surrogates of a phase's handlers.
    pub children: Option<Vec<MetaDataEntry>>,
}

impl MetaDataEntry {
    /// Creates a leaf entry.
    #[must_use]
    pub fn new(class_name: impl Into<String>, qualified_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            qualified_name: qualified_name.into(),
            children: None,
        }
    }

    /// Describes a handler; phases carry their handlers as children.
    #[must_use]
    pub fn for_handler(handler: &dyn Handler) -> Self {
        let mut entry = Self::new(handler.class_name(), handler.name());
        if let Some(phase) = handler.as_phase() {
            entry.children = Some(
                phase
                    .handlers()
                    .iter()
                    .map(|h| Self::for_handler(h.as_ref()))
                    .collect(),
            );
        }
        entry
    }

    /// Describes a service.
    #[must_use]
    pub fn for_service(service: &AxisService) -> Self {
        Self::new(class_names::AXIS_SERVICE, service.name())
    }

    /// Describes a service group.
    #[must_use]
    pub fn for_service_group(group: &AxisServiceGroup) -> Self {
        Self::new(class_names::AXIS_SERVICE_GROUP, group.name())
    }

    /// Describes an operation by its qualified name.
    #[must_use]
    pub fn for_operation(operation: &AxisOperation) -> Self {
        Self::new(class_names::AXIS_OPERATION, operation.name().to_string())
    }

    /// Describes an operation message by its label.
    #[must_use]
    pub fn for_message(message: &AxisMessage) -> Self {
        Self::new(class_names::AXIS_MESSAGE, message.label().as_str())
    }

    /// Describes an inbound transport.
    #[must_use]
    pub fn for_transport_in(transport: &TransportInDescription) -> Self {
        Self::new(class_names::TRANSPORT_IN, transport.name())
    }

    /// Describes an outbound transport.
    #[must_use]
    pub fn for_transport_out(transport: &TransportOutDescription) -> Self {
        Self::new(class_names::TRANSPORT_OUT, transport.name())
    }

    /// Returns true if `handler` is the object this entry stands for.
    #[must_use]
    pub fn matches(&self, handler: &dyn Handler) -> bool {
        self.class_name == handler.class_name() && self.qualified_name == handler.name()
    }

    fn is_sentinel(&self) -> bool {
        self.class_name == LAST_ENTRY
    }
}

/// Writes one entry and, recursively, its children.
pub fn write_entry(writer: &mut ObjectWriter, entry: &MetaDataEntry) -> Result<(), SoapflowError> {
    writer.write_utf(&entry.class_name)?;
    writer.write_utf(&entry.qualified_name)?;
    writer.write_bool(entry.children.is_some());
    match &entry.children {
        Some(children) => write_entry_list(writer, children),
        None => Ok(()),
    }
}

/// Reads one entry written by [`write_entry`].
pub fn read_entry(reader: &mut ObjectReader) -> Result<MetaDataEntry, SoapflowError> {
    let class_name = reader.read_utf()?;
    let qualified_name = reader.read_utf()?;
    let children = if reader.read_bool()? {
        Some(read_entry_list(reader)?)
    } else {
        None
    };
    Ok(MetaDataEntry {
        class_name,
        qualified_name,
        children,
    })
}

/// Writes a presence flag and the entry, if any.
pub fn write_optional_entry(writer: &mut ObjectWriter, entry: Option<&MetaDataEntry>) -> Result<(), SoapflowError> {
    writer.write_bool(entry.is_some());
    match entry {
        Some(entry) => write_entry(writer, entry),
        None => Ok(()),
    }
}

/// Reads an entry written by [`write_optional_entry`].
pub fn read_optional_entry(reader: &mut ObjectReader) -> Result<Option<MetaDataEntry>, SoapflowError> {
    if reader.read_bool()? {
        read_entry(reader).map(Some)
    } else {
        Ok(None)
    }
}

/// Writes `[count][entries][sentinel][count]`.
pub fn write_entry_list(writer: &mut ObjectWriter, entries: &[MetaDataEntry]) -> Result<(), SoapflowError> {
    let count = i32::try_from(entries.len()).unwrap_or(i32::MAX);
    writer.write_i32(count);
    for entry in entries {
        write_entry(writer, entry)?;
    }
    write_entry(writer, &MetaDataEntry::new(LAST_ENTRY, LAST_ENTRY))?;
    writer.write_i32(count);
    Ok(())
}

/// Reads a list written by [`write_entry_list`].
///
/// Entries are read up to the sentinel. Both counts only cross-check the
/// result; a disagreement is logged.
pub fn read_entry_list(reader: &mut ObjectReader) -> Result<Vec<MetaDataEntry>, SoapflowError> {
    let declared = reader.read_i32()?;
    let mut entries = Vec::new();
    loop {
        let entry = read_entry(reader)?;
        if entry.is_sentinel() {
            break;
        }
        entries.push(entry);
    }
    let adjusted = reader.read_i32()?;
    let found = i32::try_from(entries.len()).unwrap_or(i32::MAX);
    if found != adjusted || found != declared {
        warn!(declared, adjusted, found, "Surrogate list count mismatch");
    }
    Ok(entries)
}

/// Surrogates for every top-level unit of a chain.
#[must_use]
pub fn entries_for(units: &[Arc<dyn Handler>]) -> Vec<MetaDataEntry> {
    units.iter().map(|u| MetaDataEntry::for_handler(u.as_ref())).collect()
}

/// Finds the live unit an entry stands for.
#[must_use]
pub fn resolve_entry(entry: &MetaDataEntry, live: &[Arc<dyn Handler>]) -> Option<Arc<dyn Handler>> {
    live.iter().find(|unit| entry.matches(unit.as_ref())).cloned()
}

/// Self-managed data of one unit, tagged with its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfManagedDataHolder {
    /// Owner class name.
    pub class_name: String,
    /// Owner name.
    pub qualified_name: String,
    /// The owner's serialized data.
    pub data: Bytes,
}

impl SelfManagedDataHolder {
    /// Tags `data` with `owner`.
    #[must_use]
    pub fn new(owner: &dyn Handler, data: impl Into<Bytes>) -> Self {
        Self {
            class_name: owner.class_name().to_string(),
            qualified_name: owner.name().to_string(),
            data: data.into(),
        }
    }

    /// Returns true if `handler` owns this data.
    #[must_use]
    pub fn is_owned_by(&self, handler: &dyn Handler) -> bool {
        self.class_name == handler.class_name() && self.qualified_name == handler.name()
    }

    /// Writes the holder.
    pub fn write(&self, writer: &mut ObjectWriter) -> Result<(), SoapflowError> {
        writer.write_utf(&self.class_name)?;
        writer.write_utf(&self.qualified_name)?;
        writer.write_blob(&self.data)
    }

    /// Reads a holder.
    pub fn read(reader: &mut ObjectReader) -> Result<Self, SoapflowError> {
        Ok(Self {
            class_name: reader.read_utf()?,
            qualified_name: reader.read_utf()?,
            data: reader.read_blob()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Phase;
    use crate::testing::RecordingHandler;
    use pretty_assertions::assert_eq;

    fn phase_with(names: &[&str]) -> Arc<dyn Handler> {
        let phase = Phase::new("Security");
        for name in names {
            phase.add_handler(Arc::new(RecordingHandler::new(*name)));
        }
        Arc::new(phase)
    }

    #[test]
    fn test_phase_entry_nests_its_handlers() {
        let phase = phase_with(&["sign", "encrypt"]);
        let entry = MetaDataEntry::for_handler(phase.as_ref());

        assert_eq!(entry.qualified_name, "Security");
        let children = entry.children.unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].qualified_name, "encrypt");
        assert!(children[1].class_name.ends_with("RecordingHandler"));
    }

    #[test]
    fn test_list_reads_back_with_children() {
        let entries = entries_for(&[phase_with(&["sign"]), Arc::new(RecordingHandler::new("log"))]);
        let mut writer = ObjectWriter::new();
        write_entry_list(&mut writer, &entries).unwrap();

        let mut reader = ObjectReader::new(writer.into_bytes());
        assert_eq!(read_entry_list(&mut reader).unwrap(), entries);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_sentinel_wins_over_counts() {
        let mut writer = ObjectWriter::new();
        writer.write_i32(5);
        write_entry(&mut writer, &MetaDataEntry::new("A", "a")).unwrap();
        write_entry(&mut writer, &MetaDataEntry::new(LAST_ENTRY, LAST_ENTRY)).unwrap();
        writer.write_i32(3);

        let mut reader = ObjectReader::new(writer.into_bytes());
        let entries = read_entry_list(&mut reader).unwrap();
        assert_eq!(entries, vec![MetaDataEntry::new("A", "a")]);
    }

    #[test]
    fn test_resolve_matches_class_and_name() {
        let live: Vec<Arc<dyn Handler>> = vec![
            Arc::new(RecordingHandler::new("a")),
            Arc::new(RecordingHandler::new("b")),
        ];
        let entry = MetaDataEntry::for_handler(live[1].as_ref());
        let resolved = resolve_entry(&entry, &live).unwrap();
        assert!(Arc::ptr_eq(&resolved, &live[1]));

        let foreign = MetaDataEntry::new("other::Handler", "b");
        assert!(resolve_entry(&foreign, &live).is_none());
    }

    #[test]
    fn test_self_managed_holder_reads_back() {
        let owner = RecordingHandler::new("audit");
        let holder = SelfManagedDataHolder::new(&owner, b"state".to_vec());
        let mut writer = ObjectWriter::new();
        holder.write(&mut writer).unwrap();

        let mut reader = ObjectReader::new(writer.into_bytes());
        let read = SelfManagedDataHolder::read(&mut reader).unwrap();
        assert_eq!(read, holder);
        assert!(read.is_owned_by(&owner));
    }
}
