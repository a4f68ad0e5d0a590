//! Byte-stream transports: length-prefixed framing, the FIFO connection
//! lock that serializes shared-connection access, and the SASL-negotiated
//! transport that layers authentication (and optionally encryption) under
//! the same framing contract.

pub mod framed;
pub mod lock;
pub mod sasl;

pub use framed::{FrameCodec, FramedTransport};
pub use lock::{ConnectionLock, LockGuard};
pub use sasl::{
    PlainMechanism, PskMechanism, SaslMechanism, SaslNegotiator, SaslState, SaslStatus,
    SaslTransport,
};
