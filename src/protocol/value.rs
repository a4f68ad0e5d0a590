//! Dynamic value model.
//!
//! Decoded values are materialized into [`Value`], a closed enum mirroring the
//! wire types. Struct decode accumulates fields into a [`StructValue`] keyed
//! by field id; a field missing from the incoming bytes is simply absent,
//! never zero-initialized, and an absent field is never written back out.
//!
//! Maps and sets preserve wire order as plain sequences rather than forcing
//! `Ord`/`Hash` bounds onto `Value` (doubles are legal keys on the wire).

use bytes::Bytes;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::wire_type::WireType;

/// One decoded (or to-be-encoded) wire value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Byte(i8),
    Double(f64),
    I16(i16),
    I32(i32),
    I64(i64),
    String(String),
    Binary(Bytes),
    Uuid(Uuid),
    Struct(StructValue),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn wire_type(&self) -> WireType {
        match self {
            Value::Bool(_) => WireType::Bool,
            Value::Byte(_) => WireType::Byte,
            Value::Double(_) => WireType::Double,
            Value::I16(_) => WireType::I16,
            Value::I32(_) => WireType::I32,
            Value::I64(_) => WireType::I64,
            Value::String(_) | Value::Binary(_) => WireType::Binary,
            Value::Uuid(_) => WireType::Uuid,
            Value::Struct(_) => WireType::Struct,
            Value::List(_) => WireType::List,
            Value::Set(_) => WireType::Set,
            Value::Map(_) => WireType::Map,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Field-id-keyed struct value. Acts as the builder during decode and the
/// immutable result afterwards.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructValue {
    fields: BTreeMap<i16, Value>,
}

impl StructValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, id: i16, value: impl Into<Value>) -> Self {
        self.set(id, value.into());
        self
    }

    pub fn set(&mut self, id: i16, value: Value) {
        self.fields.insert(id, value);
    }

    pub fn get(&self, id: i16) -> Option<&Value> {
        self.fields.get(&id)
    }

    pub fn is_set(&self, id: i16) -> bool {
        self.fields.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in id order.
    pub fn iter(&self) -> impl Iterator<Item = (i16, &Value)> {
        self.fields.iter().map(|(id, v)| (*id, v))
    }
}
