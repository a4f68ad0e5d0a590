//! Binary protocol codec.
//!
//! Stateless-per-call encode/decode engine for the compact binary wire
//! format. [`BinaryWriter`] appends to a caller-owned `BytesMut` (the framing
//! layer decides when those bytes hit the network); [`BinaryReader`] consumes
//! one frame's bytes and never outlives the decode pass.
//!
//! ## Wire layout
//! ```text
//! scalar:   fixed-width big-endian (bool/byte = 1 byte, double = f64 bits)
//! binary:   i32 BE length + bytes (strings are UTF-8-encoded binary)
//! field:    type tag (i8) + field id (i16 BE); struct ends with a STOP tag
//! list/set: element tag (i8) + count (i32 BE) + elements
//! map:      key tag + value tag + count (i32 BE) + alternating pairs
//! uuid:     16 bytes, RFC 4122 order
//! message:  0x8001_0000 | type (strict), name, sequence id
//! ```
//!
//! Every declared length is validated before any proportional allocation, and
//! recursion into nested structs/containers is depth-limited, so adversarial
//! frames fail fast instead of exhausting memory or stack.

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::config::CodecConfig;
use crate::error::{ProtocolError, Result};

use super::message::{MessageHeader, MessageType};
use super::spec::{StructSpec, TypeSpec};
use super::value::{StructValue, Value};
use super::wire_type::WireType;

/// Strict protocol version word, ORed with the message type.
pub const VERSION_1: u32 = 0x8001_0000;

/// Mask isolating the version bits of a strict message header.
pub const VERSION_MASK: u32 = 0xffff_0000;

/// Fail with `InvalidData` if `value` falls outside the signed range for the
/// given width. Available for protocols that need runtime range enforcement
/// before emitting fixed-width integers; widths other than 8/16/32/64 are
/// not checked.
pub fn check_integer_limits(value: i64, bits: u32) -> Result<()> {
    let out_of_range = match bits {
        8 => value < i64::from(i8::MIN) || value > i64::from(i8::MAX),
        16 => value < i64::from(i16::MIN) || value > i64::from(i16::MAX),
        32 => value < i64::from(i32::MIN) || value > i64::from(i32::MAX),
        64 => false,
        _ => false,
    };
    if out_of_range {
        return Err(ProtocolError::InvalidData(format!(
            "value {value} out of range for i{bits}"
        ))
        .into());
    }
    Ok(())
}

/// Encoder half of the codec. Borrows the output buffer for the duration of
/// one encode pass.
pub struct BinaryWriter<'a> {
    buf: &'a mut BytesMut,
    strict: bool,
}

impl<'a> BinaryWriter<'a> {
    pub fn new(buf: &'a mut BytesMut) -> Self {
        Self { buf, strict: true }
    }

    pub fn with_config(buf: &'a mut BytesMut, config: &CodecConfig) -> Self {
        Self {
            buf,
            strict: config.strict_write,
        }
    }

    pub fn write_message_begin(&mut self, header: &MessageHeader) -> Result<()> {
        if self.strict {
            self.buf
                .put_u32(VERSION_1 | header.message_type.code() as u32);
            self.write_string(&header.name)?;
            self.write_i32(header.sequence_id);
        } else {
            self.write_string(&header.name)?;
            self.write_byte(header.message_type.code() as i8);
            self.write_i32(header.sequence_id);
        }
        Ok(())
    }

    pub fn write_message_end(&mut self) {}

    pub fn write_field_begin(&mut self, ty: WireType, id: i16) {
        self.buf.put_i8(ty.tag());
        self.buf.put_i16(id);
    }

    pub fn write_field_end(&mut self) {}

    pub fn write_field_stop(&mut self) {
        self.buf.put_i8(WireType::Stop.tag());
    }

    pub fn write_map_begin(&mut self, key: WireType, value: WireType, size: usize) -> Result<()> {
        self.buf.put_i8(key.tag());
        self.buf.put_i8(value.tag());
        self.write_size(size)
    }

    pub fn write_list_begin(&mut self, element: WireType, size: usize) -> Result<()> {
        self.buf.put_i8(element.tag());
        self.write_size(size)
    }

    pub fn write_set_begin(&mut self, element: WireType, size: usize) -> Result<()> {
        self.write_list_begin(element, size)
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.put_u8(u8::from(v));
    }

    pub fn write_byte(&mut self, v: i8) {
        self.buf.put_i8(v);
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.put_i16(v);
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    pub fn write_double(&mut self, v: f64) {
        self.buf.put_f64(v);
    }

    pub fn write_uuid(&mut self, v: &Uuid) {
        self.buf.put_slice(v.as_bytes());
    }

    pub fn write_string(&mut self, v: &str) -> Result<()> {
        self.write_binary(v.as_bytes())
    }

    pub fn write_binary(&mut self, v: &[u8]) -> Result<()> {
        self.write_size(v.len())?;
        self.buf.put_slice(v);
        Ok(())
    }

    fn write_size(&mut self, size: usize) -> Result<()> {
        let size = i32::try_from(size).map_err(|_| {
            ProtocolError::SizeLimit {
                length: size as u64,
                limit: i32::MAX as u64,
            }
        })?;
        self.buf.put_i32(size);
        Ok(())
    }

    /// Encode a struct against its spec: fields in declaration order, absent
    /// fields never written, STOP marker at the end.
    pub fn write_struct(&mut self, value: &StructValue, spec: &StructSpec) -> Result<()> {
        for field in &spec.fields {
            let Some(field_value) = value.get(field.id) else {
                continue;
            };
            self.write_field_begin(field.spec.wire_type(), field.id);
            self.write_value(field_value, &field.spec)?;
            self.write_field_end();
        }
        self.write_field_stop();
        Ok(())
    }

    /// Encode one value, checked against its spec. A value whose shape
    /// disagrees with the spec is a caller bug and fails with `InvalidData`.
    pub fn write_value(&mut self, value: &Value, spec: &TypeSpec) -> Result<()> {
        match (spec, value) {
            (TypeSpec::Bool, Value::Bool(v)) => self.write_bool(*v),
            (TypeSpec::Byte, Value::Byte(v)) => self.write_byte(*v),
            (TypeSpec::Double, Value::Double(v)) => self.write_double(*v),
            (TypeSpec::I16, Value::I16(v)) => self.write_i16(*v),
            (TypeSpec::I32, Value::I32(v)) => self.write_i32(*v),
            (TypeSpec::I64, Value::I64(v)) => self.write_i64(*v),
            (TypeSpec::String | TypeSpec::Binary, Value::String(v)) => self.write_string(v)?,
            (TypeSpec::String | TypeSpec::Binary, Value::Binary(v)) => self.write_binary(v)?,
            (TypeSpec::Uuid, Value::Uuid(v)) => self.write_uuid(v),
            (TypeSpec::Struct(struct_spec), Value::Struct(v)) => {
                self.write_struct(v, struct_spec)?;
            }
            (TypeSpec::List(container), Value::List(items)) => {
                self.write_list_begin(container.element.wire_type(), items.len())?;
                for item in items {
                    self.write_value(item, &container.element)?;
                }
            }
            (TypeSpec::Set(container), Value::Set(items)) => {
                self.write_set_begin(container.element.wire_type(), items.len())?;
                for item in items {
                    self.write_value(item, &container.element)?;
                }
            }
            (TypeSpec::Map(map_spec), Value::Map(entries)) => {
                self.write_map_begin(
                    map_spec.key.wire_type(),
                    map_spec.value.wire_type(),
                    entries.len(),
                )?;
                for (key, val) in entries {
                    self.write_value(key, &map_spec.key)?;
                    self.write_value(val, &map_spec.value)?;
                }
            }
            (spec, value) => {
                return Err(ProtocolError::InvalidData(format!(
                    "value of type {} does not match spec {}",
                    value.wire_type().name(),
                    spec.wire_type().name()
                ))
                .into());
            }
        }
        Ok(())
    }
}

/// Decoder half of the codec. Borrows one frame's bytes for a single decode
/// pass and tracks remaining recursion depth.
pub struct BinaryReader<'a> {
    buf: &'a [u8],
    strict: bool,
    max_string_size: usize,
    max_container_size: usize,
    depth: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(frame: &'a [u8]) -> Self {
        Self::with_config(frame, &CodecConfig::default())
    }

    pub fn with_config(frame: &'a [u8], config: &CodecConfig) -> Self {
        Self {
            buf: frame,
            strict: config.strict_read,
            max_string_size: config.max_string_size,
            max_container_size: config.max_container_size,
            depth: config.max_recursion_depth,
        }
    }

    /// Bytes left in the frame.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(ProtocolError::InvalidData(format!(
                "frame truncated: wanted {n} bytes, {} remain",
                self.buf.len()
            ))
            .into());
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(head)
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth == 0 {
            return Err(ProtocolError::DepthLimit.into());
        }
        self.depth -= 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth += 1;
    }

    pub fn read_message_begin(&mut self) -> Result<MessageHeader> {
        let first = self.read_i32()?;
        if first < 0 {
            let version = (first as u32) & VERSION_MASK;
            if version != VERSION_1 {
                return Err(ProtocolError::BadVersion(first as u32).into());
            }
            let message_type = MessageType::from_code(first & 0xff).ok_or_else(|| {
                ProtocolError::InvalidData(format!("invalid message type {}", first & 0xff))
            })?;
            let name = self.read_string()?;
            let sequence_id = self.read_i32()?;
            Ok(MessageHeader {
                name,
                message_type,
                sequence_id,
            })
        } else {
            if self.strict {
                return Err(ProtocolError::BadVersion(first as u32).into());
            }
            // Old-style header: bare name length came first.
            if first as usize > self.max_string_size {
                return Err(ProtocolError::SizeLimit {
                    length: first as u64,
                    limit: self.max_string_size as u64,
                }
                .into());
            }
            let name = std::str::from_utf8(self.take(first as usize)?)
                .map_err(|e| ProtocolError::InvalidData(format!("invalid UTF-8: {e}")))?
                .to_owned();
            let type_code = self.read_byte()?;
            let message_type = MessageType::from_code(i32::from(type_code)).ok_or_else(|| {
                ProtocolError::InvalidData(format!("invalid message type {type_code}"))
            })?;
            let sequence_id = self.read_i32()?;
            Ok(MessageHeader {
                name,
                message_type,
                sequence_id,
            })
        }
    }

    pub fn read_message_end(&mut self) {}

    /// Next field header, or `None` at the STOP marker.
    pub fn read_field_begin(&mut self) -> Result<Option<(WireType, i16)>> {
        let tag = self.read_byte()?;
        if tag == WireType::Stop.tag() {
            return Ok(None);
        }
        let ty = WireType::try_from_tag(tag)?;
        let id = self.read_i16()?;
        Ok(Some((ty, id)))
    }

    pub fn read_field_end(&mut self) {}

    pub fn read_map_begin(&mut self) -> Result<(WireType, WireType, usize)> {
        let key = WireType::try_from_tag(self.read_byte()?)?;
        let value = WireType::try_from_tag(self.read_byte()?)?;
        let size = self.read_size(self.max_container_size)?;
        Ok((key, value, size))
    }

    pub fn read_list_begin(&mut self) -> Result<(WireType, usize)> {
        let element = WireType::try_from_tag(self.read_byte()?)?;
        let size = self.read_size(self.max_container_size)?;
        Ok((element, size))
    }

    pub fn read_set_begin(&mut self) -> Result<(WireType, usize)> {
        self.read_list_begin()
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.take(1)?[0] != 0)
    }

    pub fn read_byte(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let bytes = self.take(2)?;
        Ok(i16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(i64::from_be_bytes(raw))
    }

    pub fn read_double(&mut self) -> Result<f64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_be_bytes(raw))
    }

    pub fn read_uuid(&mut self) -> Result<Uuid> {
        let bytes = self.take(16)?;
        Uuid::from_slice(bytes)
            .map_err(|e| ProtocolError::InvalidData(format!("invalid uuid: {e}")).into())
    }

    pub fn read_binary(&mut self) -> Result<Bytes> {
        let len = self.read_size(self.max_string_size)?;
        Ok(Bytes::copy_from_slice(self.take(len)?))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_size(self.max_string_size)?;
        std::str::from_utf8(self.take(len)?)
            .map(str::to_owned)
            .map_err(|e| ProtocolError::InvalidData(format!("invalid UTF-8: {e}")).into())
    }

    fn read_size(&mut self, limit: usize) -> Result<usize> {
        let size = self.read_i32()?;
        if size < 0 {
            return Err(ProtocolError::NegativeSize(i64::from(size)).into());
        }
        let size = size as usize;
        if size > limit {
            return Err(ProtocolError::SizeLimit {
                length: size as u64,
                limit: limit as u64,
            }
            .into());
        }
        Ok(size)
    }

    /// Decode a struct against its spec. Unknown field ids and fields whose
    /// wire type disagrees with the spec are skipped, which is what keeps
    /// differing struct versions mutually readable.
    pub fn read_struct(&mut self, spec: &StructSpec) -> Result<StructValue> {
        self.enter()?;
        let mut out = StructValue::new();
        while let Some((wire_type, id)) = self.read_field_begin()? {
            match spec.field_by_id(id) {
                Some(field) if field.spec.wire_type() == wire_type => {
                    let value = self.read_value(&field.spec)?;
                    out.set(id, value);
                }
                _ => self.skip(wire_type)?,
            }
            self.read_field_end();
        }
        self.leave();
        Ok(out)
    }

    /// Decode one value of the spec's type. Container decode reads exactly
    /// the declared element count even if more bytes remain in the frame.
    pub fn read_value(&mut self, spec: &TypeSpec) -> Result<Value> {
        Ok(match spec {
            TypeSpec::Bool => Value::Bool(self.read_bool()?),
            TypeSpec::Byte => Value::Byte(self.read_byte()?),
            TypeSpec::Double => Value::Double(self.read_double()?),
            TypeSpec::I16 => Value::I16(self.read_i16()?),
            TypeSpec::I32 => Value::I32(self.read_i32()?),
            TypeSpec::I64 => Value::I64(self.read_i64()?),
            TypeSpec::String => Value::String(self.read_string()?),
            TypeSpec::Binary => Value::Binary(self.read_binary()?),
            TypeSpec::Uuid => Value::Uuid(self.read_uuid()?),
            TypeSpec::Struct(struct_spec) => Value::Struct(self.read_struct(struct_spec)?),
            TypeSpec::List(container) => {
                let (_element, size) = self.read_list_begin()?;
                self.enter()?;
                let mut items = Vec::with_capacity(size.min(self.remaining()));
                for _ in 0..size {
                    items.push(self.read_value(&container.element)?);
                }
                self.leave();
                Value::List(items)
            }
            TypeSpec::Set(container) => {
                let (_element, size) = self.read_set_begin()?;
                self.enter()?;
                let mut items = Vec::with_capacity(size.min(self.remaining()));
                for _ in 0..size {
                    items.push(self.read_value(&container.element)?);
                }
                self.leave();
                Value::Set(items)
            }
            TypeSpec::Map(map_spec) => {
                let (_key, _value, size) = self.read_map_begin()?;
                self.enter()?;
                let mut entries = Vec::with_capacity(size.min(self.remaining()));
                for _ in 0..size {
                    let key = self.read_value(&map_spec.key)?;
                    let value = self.read_value(&map_spec.value)?;
                    entries.push((key, value));
                }
                self.leave();
                Value::Map(entries)
            }
        })
    }

    /// Consume exactly the bytes of one value of the given type, discarding
    /// it. Recurses through nested structs and containers under the same
    /// depth limit as materializing reads.
    pub fn skip(&mut self, ty: WireType) -> Result<()> {
        match ty {
            WireType::Bool | WireType::Byte => {
                self.take(1)?;
            }
            WireType::I16 => {
                self.take(2)?;
            }
            WireType::I32 => {
                self.take(4)?;
            }
            WireType::I64 | WireType::Double => {
                self.take(8)?;
            }
            WireType::Uuid => {
                self.take(16)?;
            }
            WireType::Binary => {
                let len = self.read_size(self.max_string_size)?;
                self.take(len)?;
            }
            WireType::Struct => {
                self.enter()?;
                while let Some((field_type, _id)) = self.read_field_begin()? {
                    self.skip(field_type)?;
                    self.read_field_end();
                }
                self.leave();
            }
            WireType::Map => {
                let (key, value, size) = self.read_map_begin()?;
                self.enter()?;
                for _ in 0..size {
                    self.skip(key)?;
                    self.skip(value)?;
                }
                self.leave();
            }
            WireType::Set | WireType::List => {
                let (element, size) = self.read_list_begin()?;
                self.enter()?;
                for _ in 0..size {
                    self.skip(element)?;
                }
                self.leave();
            }
            WireType::Stop => {
                return Err(
                    ProtocolError::InvalidData("cannot skip a STOP tag".to_owned()).into(),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn scalar_byte_layout() {
        let mut buf = BytesMut::new();
        let mut writer = BinaryWriter::new(&mut buf);
        writer.write_i32(1);
        writer.write_i16(-2);
        writer.write_bool(true);
        assert_eq!(&buf[..], &[0, 0, 0, 1, 0xff, 0xfe, 1]);
    }

    #[test]
    fn field_header_layout() {
        let mut buf = BytesMut::new();
        let mut writer = BinaryWriter::new(&mut buf);
        writer.write_field_begin(WireType::I32, 5);
        writer.write_i32(7);
        writer.write_field_stop();
        assert_eq!(&buf[..], &[8, 0, 5, 0, 0, 0, 7, 0]);
    }

    #[test]
    fn string_is_length_prefixed_utf8() {
        let mut buf = BytesMut::new();
        let mut writer = BinaryWriter::new(&mut buf);
        writer.write_string("ab").unwrap();
        assert_eq!(&buf[..], &[0, 0, 0, 2, b'a', b'b']);

        let mut reader = BinaryReader::new(&buf);
        assert_eq!(reader.read_string().unwrap(), "ab");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn strict_message_header_layout() {
        let mut buf = BytesMut::new();
        let mut writer = BinaryWriter::new(&mut buf);
        writer
            .write_message_begin(&MessageHeader {
                name: "f".to_owned(),
                message_type: MessageType::Call,
                sequence_id: 9,
            })
            .unwrap();
        assert_eq!(
            &buf[..],
            &[0x80, 0x01, 0x00, 0x01, 0, 0, 0, 1, b'f', 0, 0, 0, 9]
        );
    }

    #[test]
    fn strict_reader_rejects_unversioned_header() {
        // Old-style header: name length first, no version word.
        let bytes = [0u8, 0, 0, 1, b'f', 1, 0, 0, 0, 9];
        let mut reader = BinaryReader::new(&bytes);
        match reader.read_message_begin() {
            Err(Error::Protocol(ProtocolError::BadVersion(_))) => {}
            other => panic!("expected BadVersion, got {other:?}"),
        }

        let lenient = CodecConfig {
            strict_read: false,
            ..CodecConfig::default()
        };
        let mut reader = BinaryReader::with_config(&bytes, &lenient);
        let header = reader.read_message_begin().unwrap();
        assert_eq!(header.name, "f");
        assert_eq!(header.message_type, MessageType::Call);
        assert_eq!(header.sequence_id, 9);
    }

    #[test]
    fn negative_length_fails_before_allocation() {
        let bytes = (-1i32).to_be_bytes();
        let mut reader = BinaryReader::new(&bytes);
        match reader.read_binary() {
            Err(Error::Protocol(ProtocolError::NegativeSize(-1))) => {}
            other => panic!("expected NegativeSize, got {other:?}"),
        }
    }

    #[test]
    fn oversize_length_fails_fast() {
        let config = CodecConfig {
            max_string_size: 16,
            ..CodecConfig::default()
        };
        let bytes = 1024i32.to_be_bytes();
        let mut reader = BinaryReader::with_config(&bytes, &config);
        match reader.read_string() {
            Err(Error::Protocol(ProtocolError::SizeLimit { length: 1024, limit: 16 })) => {}
            other => panic!("expected SizeLimit, got {other:?}"),
        }
    }

    #[test]
    fn integer_limit_checks() {
        assert!(check_integer_limits(127, 8).is_ok());
        assert!(check_integer_limits(-128, 8).is_ok());
        assert!(check_integer_limits(128, 8).is_err());
        assert!(check_integer_limits(-32769, 16).is_err());
        assert!(check_integer_limits(i64::from(i32::MAX), 32).is_ok());
        assert!(check_integer_limits(i64::from(i32::MAX) + 1, 32).is_err());
        assert!(check_integer_limits(i64::MIN, 64).is_ok());
    }

    #[test]
    fn deep_nesting_hits_depth_limit() {
        // A run of LIST headers, each declaring one nested list.
        let config = CodecConfig {
            max_recursion_depth: 4,
            ..CodecConfig::default()
        };
        let mut bytes = Vec::new();
        for _ in 0..8 {
            bytes.push(WireType::List.tag() as u8);
            bytes.extend_from_slice(&1i32.to_be_bytes());
        }
        let mut reader = BinaryReader::with_config(&bytes, &config);
        match reader.skip(WireType::List) {
            Err(Error::Protocol(ProtocolError::DepthLimit)) => {}
            other => panic!("expected DepthLimit, got {other:?}"),
        }
    }

    #[test]
    fn truncated_frame_is_invalid_data() {
        let bytes = [0u8, 0];
        let mut reader = BinaryReader::new(&bytes);
        match reader.read_i64() {
            Err(Error::Protocol(ProtocolError::InvalidData(_))) => {}
            other => panic!("expected InvalidData, got {other:?}"),
        }
    }
}
