//! Cross-language RPC runtime: a type-tagged binary wire codec, length-based
//! framing over async byte streams, fair FIFO serialization of shared
//! connections, and SASL session negotiation with an optional encrypted
//! security layer.
//!
//! The layers compose bottom-up:
//!
//! - [`protocol`]: the binary codec. [`protocol::BinaryWriter`] encodes
//!   dynamic [`protocol::Value`]s against [`protocol::TypeSpec`]s into a
//!   frame buffer; [`protocol::BinaryReader`] decodes a received frame,
//!   skipping unknown fields and enforcing size and depth limits.
//! - [`transport`]: [`transport::FramedTransport`] moves whole frames with
//!   a 4-byte big-endian length prefix; [`transport::ConnectionLock`] grants
//!   access to the shared read and write halves in strict arrival order;
//!   [`transport::SaslTransport`] runs a challenge/response handshake before
//!   any frame flows and can seal every frame afterwards.
//! - [`service`]: [`service::RpcClient`] and the [`service::Processor`]
//!   connection loop put the call/reply envelope on top.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wire_rpc::protocol::{FieldSpec, StructSpec, StructValue, TypeSpec};
//! use wire_rpc::service::RpcClient;
//! use wire_rpc::transport::FramedTransport;
//!
//! # async fn run() -> wire_rpc::Result<()> {
//! let stream = tokio::net::TcpStream::connect("127.0.0.1:9090").await?;
//! let transport = Arc::new(FramedTransport::new(stream));
//! let client = RpcClient::new(transport);
//!
//! let args_spec = StructSpec::new("ping_args", vec![]);
//! let reply_spec = StructSpec::new(
//!     "ping_result",
//!     vec![FieldSpec::new(0, "success", TypeSpec::String)],
//! );
//! let _reply = client
//!     .call("ping", &StructValue::new(), &args_spec, &reply_spec)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;

pub use config::{CodecConfig, LoggingConfig, RpcConfig, TransportConfig};
pub use error::{
    ApplicationError, ApplicationErrorKind, Error, ProtocolError, Result, TransportError,
};
