//! RPC message envelope.
//!
//! Every frame carrying an RPC exchange starts with a message header naming
//! the method, the message kind, and a sequence id that pairs replies with
//! calls on a shared connection.

use crate::error::{ApplicationError, ApplicationErrorKind, Result};

use super::binary::{BinaryReader, BinaryWriter};
use super::wire_type::WireType;

/// Message kinds, stable on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum MessageType {
    Call = 1,
    Reply = 2,
    Exception = 3,
    Oneway = 4,
}

impl MessageType {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(MessageType::Call),
            2 => Some(MessageType::Reply),
            3 => Some(MessageType::Exception),
            4 => Some(MessageType::Oneway),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Decoded message header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub name: String,
    pub message_type: MessageType,
    pub sequence_id: i32,
}

impl MessageHeader {
    pub fn new(name: impl Into<String>, message_type: MessageType, sequence_id: i32) -> Self {
        Self {
            name: name.into(),
            message_type,
            sequence_id,
        }
    }
}

// Wire form of an application fault, shipped inside an EXCEPTION message as a
// two-field struct: 1 = message (STRING), 2 = type code (I32). Unknown fields
// are skipped so newer peers can extend the payload.
impl ApplicationError {
    pub fn write_to(&self, writer: &mut BinaryWriter<'_>) -> Result<()> {
        writer.write_field_begin(WireType::Binary, 1);
        writer.write_string(&self.message)?;
        writer.write_field_end();
        writer.write_field_begin(WireType::I32, 2);
        writer.write_i32(self.kind.code());
        writer.write_field_end();
        writer.write_field_stop();
        Ok(())
    }

    pub fn read_from(reader: &mut BinaryReader<'_>) -> Result<Self> {
        let mut message = String::new();
        let mut kind = ApplicationErrorKind::Unknown;
        while let Some((wire_type, id)) = reader.read_field_begin()? {
            match (id, wire_type) {
                (1, WireType::Binary) => message = reader.read_string()?,
                (2, WireType::I32) => kind = ApplicationErrorKind::from_code(reader.read_i32()?),
                _ => reader.skip(wire_type)?,
            }
            reader.read_field_end();
        }
        Ok(ApplicationError { kind, message })
    }
}
