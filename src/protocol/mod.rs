//! # Wire Protocol
//!
//! Type-tagged binary codec and the declarative specifications that drive it.
//!
//! ## Components
//! - **WireType**: closed enumeration of on-wire type tags
//! - **TypeSpec / StructSpec**: declarative field specifications (consumed in
//!   place of generated classes)
//! - **Value / StructValue**: dynamic value model produced by decode
//! - **BinaryReader / BinaryWriter**: the codec itself, with skip-based
//!   forward/backward compatibility and adversarial-input limits
//! - **MessageHeader**: RPC call/reply/exception envelope
//!
//! The codec is synchronous and CPU-only: it assumes frame boundaries are
//! already established by the transport layer.

pub mod binary;
pub mod message;
pub mod spec;
pub mod value;
pub mod wire_type;

pub use binary::{check_integer_limits, BinaryReader, BinaryWriter, VERSION_1, VERSION_MASK};
pub use message::{MessageHeader, MessageType};
pub use spec::{ContainerSpec, FieldSpec, MapSpec, StructSpec, TypeSpec};
pub use value::{StructValue, Value};
pub use wire_type::WireType;
