//! Server-side frame dispatch.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, instrument};

use crate::config::CodecConfig;
use crate::error::{ApplicationError, Error, Result};
use crate::protocol::{
    BinaryReader, BinaryWriter, MessageHeader, MessageType, StructSpec, StructValue,
};
use crate::transport::FramedTransport;

/// Handles one decoded request frame.
///
/// Implementations read the call header and arguments from `input` and
/// encode any reply into `output`. Leaving `output` empty sends nothing,
/// which is how oneway calls are answered.
pub trait Processor: Send + Sync {
    fn process(&self, input: &mut BinaryReader<'_>, output: &mut BytesMut) -> Result<()>;
}

/// Encode a REPLY message carrying `result`.
pub fn write_reply(
    output: &mut BytesMut,
    method: &str,
    sequence_id: i32,
    result: &StructValue,
    result_spec: &StructSpec,
) -> Result<()> {
    let mut writer = BinaryWriter::new(output);
    writer.write_message_begin(&MessageHeader {
        name: method.to_owned(),
        message_type: MessageType::Reply,
        sequence_id,
    })?;
    writer.write_struct(result, result_spec)
}

/// Encode an EXCEPTION message carrying `error`.
pub fn write_exception(
    output: &mut BytesMut,
    method: &str,
    sequence_id: i32,
    error: &ApplicationError,
) -> Result<()> {
    let mut writer = BinaryWriter::new(output);
    writer.write_message_begin(&MessageHeader {
        name: method.to_owned(),
        message_type: MessageType::Exception,
        sequence_id,
    })?;
    error.write_to(&mut writer)
}

/// Serve one connection: read frames in arrival order, hand each to
/// `processor`, flush whatever it produced. A clean close by the peer ends
/// the loop normally; every other error propagates.
#[instrument(skip_all)]
pub async fn run_connection<S, P>(
    transport: &FramedTransport<S>,
    processor: &P,
    codec: &CodecConfig,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite,
    P: Processor + ?Sized,
{
    loop {
        let frame = match transport.read_frame().await {
            Ok(frame) => frame,
            Err(Error::Transport(ref e)) if e.is_clean_close() => {
                debug!("peer closed the connection");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let mut reader = BinaryReader::with_config(&frame, codec);
        let mut output = BytesMut::new();
        processor.process(&mut reader, &mut output)?;

        if !output.is_empty() {
            transport.write(&output);
            transport.flush().await?;
        }
    }
}
