//! The binary object stream used to externalize messages.
//!
//! Every value is written big-endian. Strings and blobs are prefixed with a
//! `u32` length; optional values with a presence flag.

use crate::errors::SoapflowError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

/// Appends primitive values to a growable buffer.
#[derive(Debug, Default)]
pub struct ObjectWriter {
    buf: BytesMut,
}

impl ObjectWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a signed 64-bit integer.
    pub fn write_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    /// Writes a signed 32-bit integer.
    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    /// Writes a boolean as one byte.
    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_utf(&mut self, value: &str) -> Result<(), SoapflowError> {
        self.write_blob(value.as_bytes())
    }

    /// Writes a presence flag followed by the string, if any.
    pub fn write_optional_utf(&mut self, value: Option<&str>) -> Result<(), SoapflowError> {
        self.write_bool(value.is_some());
        match value {
            Some(value) => self.write_utf(value),
            None => Ok(()),
        }
    }

    /// Writes length-prefixed raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` when `value` does not fit a `u32` length
    /// prefix; nothing is written in that case.
    pub fn write_blob(&mut self, value: &[u8]) -> Result<(), SoapflowError> {
        let len = length_prefix(value.len())?;
        self.buf.put_u32(len);
        self.buf.put_slice(value);
        Ok(())
    }

    /// Writes a presence flag followed by the bytes, if any.
    pub fn write_optional_blob(&mut self, value: Option<&[u8]>) -> Result<(), SoapflowError> {
        self.write_bool(value.is_some());
        match value {
            Some(value) => self.write_blob(value),
            None => Ok(()),
        }
    }

    /// Writes `value` as a JSON blob.
    pub fn write_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SoapflowError> {
        let encoded = serde_json::to_vec(value)?;
        self.write_blob(&encoded)
    }

    /// Writes a section marker.
    pub fn write_marker(&mut self, marker: &str) -> Result<(), SoapflowError> {
        self.write_utf(marker)
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finishes writing.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

fn length_prefix(len: usize) -> Result<u32, SoapflowError> {
    u32::try_from(len).map_err(|_| {
        SoapflowError::serialization(format!(
            "value of {len} bytes exceeds the {} byte length limit",
            u32::MAX
        ))
    })
}

/// Reads values written by an [`ObjectWriter`], in the same order.
#[derive(Debug, Clone)]
pub struct ObjectReader {
    buf: Bytes,
}

impl ObjectReader {
    /// Reads from `bytes`.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self { buf: bytes.into() }
    }

    fn ensure(&self, needed: usize, what: &str) -> Result<(), SoapflowError> {
        if self.buf.remaining() < needed {
            return Err(SoapflowError::serialization(format!(
                "stream truncated reading {what}: need {needed} bytes, {} left",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    /// Reads a signed 64-bit integer.
    pub fn read_i64(&mut self) -> Result<i64, SoapflowError> {
        self.ensure(8, "i64")?;
        Ok(self.buf.get_i64())
    }

    /// Reads a signed 32-bit integer.
    pub fn read_i32(&mut self) -> Result<i32, SoapflowError> {
        self.ensure(4, "i32")?;
        Ok(self.buf.get_i32())
    }

    /// Reads a boolean.
    pub fn read_bool(&mut self) -> Result<bool, SoapflowError> {
        self.ensure(1, "bool")?;
        match self.buf.get_u8() {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(SoapflowError::serialization(format!("invalid bool byte {other}"))),
        }
    }

    /// Reads length-prefixed raw bytes without copying.
    pub fn read_blob(&mut self) -> Result<Bytes, SoapflowError> {
        self.ensure(4, "length prefix")?;
        let len = self.buf.get_u32() as usize;
        self.ensure(len, "blob")?;
        Ok(self.buf.split_to(len))
    }

    /// Reads a presence flag and the bytes, if present.
    pub fn read_optional_blob(&mut self) -> Result<Option<Bytes>, SoapflowError> {
        if self.read_bool()? {
            self.read_blob().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_utf(&mut self) -> Result<String, SoapflowError> {
        let raw = self.read_blob()?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| SoapflowError::serialization(format!("invalid UTF-8 in stream: {e}")))
    }

    /// Reads a presence flag and the string, if present.
    pub fn read_optional_utf(&mut self) -> Result<Option<String>, SoapflowError> {
        if self.read_bool()? {
            self.read_utf().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Reads a JSON blob into `T`.
    pub fn read_json<T: DeserializeOwned>(&mut self) -> Result<T, SoapflowError> {
        let raw = self.read_blob()?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Reads a section marker. A different marker is logged and otherwise
    /// ignored; markers only cross-check the layout.
    pub fn read_marker(&mut self, expected: &str) -> Result<String, SoapflowError> {
        let found = self.read_utf()?;
        if found != expected {
            warn!(expected, found = %found, "Stream marker mismatch");
        }
        Ok(found)
    }

    /// Returns the next string without consuming it.
    pub fn peek_utf(&self) -> Result<String, SoapflowError> {
        self.clone().read_utf()
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_values_read_back_in_order() {
        let mut writer = ObjectWriter::new();
        writer.write_i64(-7);
        writer.write_i32(42);
        writer.write_bool(true);
        writer.write_utf("héllo").unwrap();
        writer.write_optional_utf(None).unwrap();
        writer.write_optional_blob(Some(b"raw")).unwrap();
        writer.write_json(&json!({"a": 1})).unwrap();

        let mut reader = ObjectReader::new(writer.into_bytes());
        assert_eq!(reader.read_i64().unwrap(), -7);
        assert_eq!(reader.read_i32().unwrap(), 42);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_utf().unwrap(), "héllo");
        assert_eq!(reader.read_optional_utf().unwrap(), None);
        assert_eq!(reader.read_optional_blob().unwrap().unwrap().as_ref(), b"raw");
        assert_eq!(reader.read_json::<serde_json::Value>().unwrap(), json!({"a": 1}));
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_truncated_stream_is_an_error() {
        let mut writer = ObjectWriter::new();
        writer.write_i32(1);
        let mut reader = ObjectReader::new(writer.into_bytes());

        let err = reader.read_i64().unwrap_err();
        assert!(matches!(err, SoapflowError::Serialization(_)));
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_blob_length_beyond_stream_is_an_error() {
        let mut writer = ObjectWriter::new();
        writer.write_i32(1_000);
        let mut reader = ObjectReader::new(writer.into_bytes());

        assert!(reader.read_blob().is_err());
    }

    #[test]
    fn test_marker_mismatch_is_tolerated() {
        let mut writer = ObjectWriter::new();
        writer.write_marker("options").unwrap();
        writer.write_i32(5);
        let mut reader = ObjectReader::new(writer.into_bytes());

        assert_eq!(reader.read_marker("properties").unwrap(), "options");
        assert_eq!(reader.read_i32().unwrap(), 5);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut writer = ObjectWriter::new();
        writer.write_utf("next").unwrap();
        let mut reader = ObjectReader::new(writer.into_bytes());

        assert_eq!(reader.peek_utf().unwrap(), "next");
        assert_eq!(reader.read_utf().unwrap(), "next");
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_oversized_length_is_an_error() {
        assert_eq!(length_prefix(3).unwrap(), 3);
        assert_eq!(length_prefix(u32::MAX as usize).unwrap(), u32::MAX);

        let err = length_prefix(u32::MAX as usize + 1).unwrap_err();
        assert!(matches!(err, SoapflowError::Serialization(_)));
        assert!(err.to_string().contains("length limit"));
    }

    #[test]
    fn test_invalid_bool_byte_rejected() {
        let mut reader = ObjectReader::new(Bytes::from_static(&[7]));
        assert!(reader.read_bool().is_err());
    }
}
