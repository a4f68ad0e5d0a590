//! Declarative type specifications.
//!
//! The codec does not consume generated per-interface classes; it consumes a
//! declarative description of each struct (field id, wire type, name, nested
//! spec) and drives encode/decode from that. Field ids may have gaps, and a
//! decoder seeing an id its spec does not know simply skips the value.

use std::sync::Arc;

use super::wire_type::WireType;

/// Full description of a value's type, including nested element specs for
/// containers. This is the closed-enum rendition of the wire type handler
/// table: every variant maps to exactly one [`WireType`], but `String` and
/// `Binary` share a tag and differ only in whether decode validates UTF-8.
#[derive(Debug, Clone)]
pub enum TypeSpec {
    Bool,
    Byte,
    Double,
    I16,
    I32,
    I64,
    String,
    Binary,
    Uuid,
    Struct(Arc<StructSpec>),
    List(Box<ContainerSpec>),
    Set(Box<ContainerSpec>),
    Map(Box<MapSpec>),
}

impl TypeSpec {
    /// The tag this type carries on the wire.
    pub fn wire_type(&self) -> WireType {
        match self {
            TypeSpec::Bool => WireType::Bool,
            TypeSpec::Byte => WireType::Byte,
            TypeSpec::Double => WireType::Double,
            TypeSpec::I16 => WireType::I16,
            TypeSpec::I32 => WireType::I32,
            TypeSpec::I64 => WireType::I64,
            TypeSpec::String | TypeSpec::Binary => WireType::Binary,
            TypeSpec::Uuid => WireType::Uuid,
            TypeSpec::Struct(_) => WireType::Struct,
            TypeSpec::List(_) => WireType::List,
            TypeSpec::Set(_) => WireType::Set,
            TypeSpec::Map(_) => WireType::Map,
        }
    }

    pub fn list(element: TypeSpec) -> TypeSpec {
        TypeSpec::List(Box::new(ContainerSpec { element }))
    }

    pub fn set(element: TypeSpec) -> TypeSpec {
        TypeSpec::Set(Box::new(ContainerSpec { element }))
    }

    pub fn map(key: TypeSpec, value: TypeSpec) -> TypeSpec {
        TypeSpec::Map(Box::new(MapSpec { key, value }))
    }
}

/// Element description for LIST and SET.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub element: TypeSpec,
}

/// Key/value description for MAP.
#[derive(Debug, Clone)]
pub struct MapSpec {
    pub key: TypeSpec,
    pub value: TypeSpec,
}

/// One field of a struct.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub id: i16,
    pub name: &'static str,
    pub spec: TypeSpec,
}

impl FieldSpec {
    pub fn new(id: i16, name: &'static str, spec: TypeSpec) -> Self {
        Self { id, name, spec }
    }
}

/// Ordered field list for one struct type. Encode emits fields in declaration
/// order; decode looks fields up by id.
#[derive(Debug, Clone)]
pub struct StructSpec {
    pub name: &'static str,
    pub fields: Vec<FieldSpec>,
}

impl StructSpec {
    pub fn new(name: &'static str, fields: Vec<FieldSpec>) -> Self {
        Self { name, fields }
    }

    /// Shared handle, since struct specs nest inside field and container
    /// specs and are typically built once per interface.
    pub fn shared(name: &'static str, fields: Vec<FieldSpec>) -> Arc<Self> {
        Arc::new(Self::new(name, fields))
    }

    pub fn field_by_id(&self, id: i16) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_type_mapping() {
        assert_eq!(TypeSpec::Bool.wire_type(), WireType::Bool);
        assert_eq!(TypeSpec::String.wire_type(), WireType::Binary);
        assert_eq!(TypeSpec::Binary.wire_type(), WireType::Binary);
        assert_eq!(TypeSpec::Uuid.wire_type(), WireType::Uuid);
        assert_eq!(TypeSpec::list(TypeSpec::I32).wire_type(), WireType::List);
        assert_eq!(
            TypeSpec::map(TypeSpec::String, TypeSpec::I64).wire_type(),
            WireType::Map
        );
    }

    #[test]
    fn field_lookup_with_gaps() {
        let spec = StructSpec::new(
            "Sparse",
            vec![
                FieldSpec::new(1, "a", TypeSpec::I32),
                FieldSpec::new(7, "b", TypeSpec::String),
            ],
        );
        assert_eq!(spec.field_by_id(1).map(|f| f.name), Some("a"));
        assert_eq!(spec.field_by_id(7).map(|f| f.name), Some("b"));
        assert!(spec.field_by_id(3).is_none());
    }
}
