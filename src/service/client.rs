//! RPC client over a shared framed transport.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, instrument};

use crate::config::CodecConfig;
use crate::error::{ApplicationError, ApplicationErrorKind, Result};
use crate::protocol::{
    BinaryReader, BinaryWriter, MessageHeader, MessageType, StructSpec, StructValue,
};
use crate::transport::FramedTransport;

/// Dynamic RPC client: encodes calls and decodes replies against struct
/// specs supplied per method.
///
/// All methods take `&self`; the transport's FIFO locks let a single client
/// (or the transport beneath several clients) be shared across tasks, with
/// concurrent callers served in arrival order.
pub struct RpcClient<S> {
    transport: Arc<FramedTransport<S>>,
    codec: CodecConfig,
    sequence: AtomicI32,
}

impl<S: AsyncRead + AsyncWrite> RpcClient<S> {
    pub fn new(transport: Arc<FramedTransport<S>>) -> Self {
        Self::with_config(transport, &CodecConfig::default())
    }

    pub fn with_config(transport: Arc<FramedTransport<S>>, codec: &CodecConfig) -> Self {
        Self {
            transport,
            codec: codec.clone(),
            sequence: AtomicI32::new(0),
        }
    }

    /// Invoke `method` and wait for its reply, decoded against `reply_spec`.
    #[instrument(skip(self, args, args_spec, reply_spec))]
    pub async fn call(
        &self,
        method: &str,
        args: &StructValue,
        args_spec: &StructSpec,
        reply_spec: &StructSpec,
    ) -> Result<StructValue> {
        let sequence_id = self.next_sequence_id();
        self.send(method, MessageType::Call, sequence_id, args, args_spec)
            .await?;
        self.receive(method, sequence_id, reply_spec).await
    }

    /// Fire-and-forget invocation: the frame is flushed and no reply is read.
    #[instrument(skip(self, args, args_spec))]
    pub async fn oneway(
        &self,
        method: &str,
        args: &StructValue,
        args_spec: &StructSpec,
    ) -> Result<()> {
        let sequence_id = self.next_sequence_id();
        self.send(method, MessageType::Oneway, sequence_id, args, args_spec)
            .await
    }

    fn next_sequence_id(&self) -> i32 {
        self.sequence.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    async fn send(
        &self,
        method: &str,
        message_type: MessageType,
        sequence_id: i32,
        args: &StructValue,
        args_spec: &StructSpec,
    ) -> Result<()> {
        let mut buf = BytesMut::new();
        let mut writer = BinaryWriter::with_config(&mut buf, &self.codec);
        writer.write_message_begin(&MessageHeader {
            name: method.to_owned(),
            message_type,
            sequence_id,
        })?;
        writer.write_struct(args, args_spec)?;
        self.transport.write(&buf);
        self.transport.flush().await?;
        debug!(method, sequence_id, "call sent");
        Ok(())
    }

    async fn receive(
        &self,
        method: &str,
        sequence_id: i32,
        reply_spec: &StructSpec,
    ) -> Result<StructValue> {
        let frame = self.transport.read_frame().await?;
        let mut reader = BinaryReader::with_config(&frame, &self.codec);
        let header = reader.read_message_begin()?;

        match header.message_type {
            MessageType::Exception => {
                let error = ApplicationError::read_from(&mut reader)?;
                Err(error.into())
            }
            MessageType::Reply => {
                if header.name != method {
                    return Err(ApplicationError::new(
                        ApplicationErrorKind::WrongMethodName,
                        format!("expected reply for {method:?}, got {:?}", header.name),
                    )
                    .into());
                }
                if header.sequence_id != sequence_id {
                    return Err(ApplicationError::new(
                        ApplicationErrorKind::BadSequenceId,
                        format!(
                            "expected sequence id {sequence_id}, got {}",
                            header.sequence_id
                        ),
                    )
                    .into());
                }
                reader.read_struct(reply_spec)
            }
            other => Err(ApplicationError::new(
                ApplicationErrorKind::InvalidMessageType,
                format!("unexpected message type {other:?} in reply to {method:?}"),
            )
            .into()),
        }
    }
}
