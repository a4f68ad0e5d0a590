//! # Error Types
//!
//! Error taxonomy for the RPC runtime, split by the layer that produces the
//! failure:
//!
//! - **`TransportError`**: connection and I/O failures (not open, clean close,
//!   timeout, everything else).
//! - **`ProtocolError`**: malformed or hostile wire content (bad tags, bad
//!   lengths, version mismatch, recursion depth).
//! - **`ApplicationError`**: structured faults surfaced to RPC callers, itself
//!   serializable on the wire so a server can ship it back inside an
//!   EXCEPTION message.
//!
//! None of these are retried internally; they propagate to the caller, who
//! decides whether to reconnect. A clean [`TransportError::EndOfFile`] during
//! a blocking frame read is normal connection closure for a server loop, but
//! a failure for a client still expecting a reply.

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Connection-level failures below the codec.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Operation attempted on a transport that is not (or no longer) open.
    #[error("transport not open")]
    NotOpen,

    /// The peer closed the stream cleanly before a frame header byte arrived.
    #[error("end of file")]
    EndOfFile,

    /// An I/O operation exceeded its deadline.
    #[error("operation timed out")]
    TimedOut,

    /// Any other transport fault, including EOF in the middle of a frame.
    #[error("transport error: {0}")]
    Unknown(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// True for the clean-close variant, which server loops treat as a
    /// normal shutdown rather than a fault.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, TransportError::EndOfFile)
    }
}

/// Malformed wire content detected by the codec or framing layer.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Unexpected or invalid type tag, out-of-range scalar, bad UTF-8.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A declared string/container/frame length was negative.
    #[error("negative length: {0}")]
    NegativeSize(i64),

    /// A declared length exceeded the configured maximum. Raised before any
    /// allocation proportional to the claimed size.
    #[error("length {length} exceeded max allowed {limit}")]
    SizeLimit { length: u64, limit: u64 },

    /// Message version word did not match the strict binary protocol version.
    #[error("bad protocol version: 0x{0:08x}")]
    BadVersion(u32),

    /// Nested structure exceeded the configured recursion depth.
    #[error("depth limit exceeded")]
    DepthLimit,

    /// Valid but unsupported tag combination.
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

/// Numeric codes for [`ApplicationError`], stable on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ApplicationErrorKind {
    Unknown = 0,
    UnknownMethod = 1,
    InvalidMessageType = 2,
    WrongMethodName = 3,
    BadSequenceId = 4,
    MissingResult = 5,
    InternalError = 6,
    ProtocolError = 7,
    InvalidTransform = 8,
    InvalidProtocol = 9,
    UnsupportedClientType = 10,
}

impl ApplicationErrorKind {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => ApplicationErrorKind::UnknownMethod,
            2 => ApplicationErrorKind::InvalidMessageType,
            3 => ApplicationErrorKind::WrongMethodName,
            4 => ApplicationErrorKind::BadSequenceId,
            5 => ApplicationErrorKind::MissingResult,
            6 => ApplicationErrorKind::InternalError,
            7 => ApplicationErrorKind::ProtocolError,
            8 => ApplicationErrorKind::InvalidTransform,
            9 => ApplicationErrorKind::InvalidProtocol,
            10 => ApplicationErrorKind::UnsupportedClientType,
            _ => ApplicationErrorKind::Unknown,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Structured fault surfaced to RPC callers, distinct from transport and
/// protocol failures. Serializable as a two-field struct (message, type) via
/// the binary codec; see `protocol::message`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct ApplicationError {
    pub kind: ApplicationErrorKind,
    pub message: String,
}

impl ApplicationError {
    pub fn new(kind: ApplicationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Umbrella error for all crate operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Application(#[from] ApplicationError),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Transport(TransportError::Io(e))
    }
}

/// Type alias for Results using the umbrella [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
