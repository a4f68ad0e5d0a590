//! Wire type tags.
//!
//! Every value on the wire is introduced by a one-byte type tag. The numeric
//! values are a compatibility contract with every other implementation of the
//! protocol and must never change; the gaps (5, 7, 9) are historical and stay
//! reserved.

use crate::error::ProtocolError;

/// Closed enumeration of on-wire value shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum WireType {
    /// Terminates a struct's field list. Never carries a value.
    Stop = 0,
    Bool = 2,
    Byte = 3,
    Double = 4,
    I16 = 6,
    I32 = 8,
    I64 = 10,
    /// Length-prefixed bytes. Strings are UTF-8-encoded binary; the wire does
    /// not distinguish the two.
    Binary = 11,
    Struct = 12,
    Map = 13,
    Set = 14,
    List = 15,
    Uuid = 16,
}

impl WireType {
    /// Decode a raw tag byte. Unknown tags (including the reserved gaps and
    /// the legacy VOID/UTF16 values) return `None`; callers decide whether
    /// that is skippable or fatal.
    pub fn from_tag(tag: i8) -> Option<WireType> {
        match tag {
            0 => Some(WireType::Stop),
            2 => Some(WireType::Bool),
            3 => Some(WireType::Byte),
            4 => Some(WireType::Double),
            6 => Some(WireType::I16),
            8 => Some(WireType::I32),
            10 => Some(WireType::I64),
            11 => Some(WireType::Binary),
            12 => Some(WireType::Struct),
            13 => Some(WireType::Map),
            14 => Some(WireType::Set),
            15 => Some(WireType::List),
            16 => Some(WireType::Uuid),
            _ => None,
        }
    }

    /// Like [`from_tag`](Self::from_tag) but maps an unknown tag to the
    /// canonical decode error.
    pub fn try_from_tag(tag: i8) -> Result<WireType, ProtocolError> {
        WireType::from_tag(tag)
            .ok_or_else(|| ProtocolError::InvalidData(format!("invalid type tag {tag}")))
    }

    /// The raw tag byte.
    pub fn tag(self) -> i8 {
        self as i8
    }

    /// True when decoding this type recurses into nested values.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            WireType::Struct | WireType::Map | WireType::Set | WireType::List
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            WireType::Stop => "STOP",
            WireType::Bool => "BOOL",
            WireType::Byte => "BYTE",
            WireType::Double => "DOUBLE",
            WireType::I16 => "I16",
            WireType::I32 => "I32",
            WireType::I64 => "I64",
            WireType::Binary => "BINARY",
            WireType::Struct => "STRUCT",
            WireType::Map => "MAP",
            WireType::Set => "SET",
            WireType::List => "LIST",
            WireType::Uuid => "UUID",
        }
    }
}
