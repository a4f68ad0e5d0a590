//! SASL negotiation and the authenticated transport it produces.
//!
//! Before any application frame flows, client and server exchange
//! `status:u8, length:u32 BE, payload` messages in strict alternation:
//!
//! ```text
//! client: START(mechanism name), OK(initial response)
//! server: OK(challenge)            -> client: OK(response)   (repeat)
//! server: COMPLETE                 -> negotiated
//! either: BAD / ERROR(message)     -> failed, connection unusable
//! ```
//!
//! [`SaslNegotiator`] is the pure state machine; [`SaslTransport`] drives it
//! over a byte stream and, once negotiation completes, applies the
//! mechanism's security layer to every frame: outbound buffered bytes are
//! wrapped and the wrapped bytes length-prefixed again, inbound frames are
//! length-read and then unwrapped before the codec sees them.

use bytes::{BufMut, Bytes, BytesMut};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::error::{Error, ProtocolError, Result, TransportError};

use super::lock::ConnectionLock;

/// One-byte status codes prefixing every negotiation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SaslStatus {
    Start = 1,
    Ok = 2,
    Bad = 3,
    Error = 4,
    Complete = 5,
}

impl SaslStatus {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(SaslStatus::Start),
            2 => Some(SaslStatus::Ok),
            3 => Some(SaslStatus::Bad),
            4 => Some(SaslStatus::Error),
            5 => Some(SaslStatus::Complete),
            _ => None,
        }
    }

    pub fn byte(self) -> u8 {
        self as u8
    }
}

/// Negotiation session state. `Complete` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslState {
    NotStarted,
    Negotiating,
    Complete,
    Failed,
}

/// A pluggable SASL mechanism: the challenge/response computation plus the
/// optional per-frame security layer negotiated with it.
pub trait SaslMechanism: Send + Sync {
    /// Mechanism name sent in the START message.
    fn name(&self) -> &str;

    /// Response sent immediately after START.
    fn initial_response(&mut self) -> Result<Vec<u8>>;

    /// Response to a server challenge.
    fn evaluate_challenge(&mut self, challenge: &[u8]) -> Result<Vec<u8>>;

    /// True once the local side considers the exchange finished.
    fn is_complete(&self) -> bool;

    /// Whether a per-frame security layer was negotiated.
    fn has_security_layer(&self) -> bool {
        false
    }

    /// Encode one outbound frame under the security layer.
    fn wrap(&self, frame: &[u8]) -> Result<Vec<u8>> {
        Ok(frame.to_vec())
    }

    /// Decode one inbound frame under the security layer.
    fn unwrap(&self, frame: &[u8]) -> Result<Vec<u8>> {
        Ok(frame.to_vec())
    }
}

/// PLAIN mechanism: `authzid NUL authcid NUL password`, no security layer.
pub struct PlainMechanism {
    authzid: String,
    username: String,
    password: String,
    sent: bool,
}

impl PlainMechanism {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            authzid: String::new(),
            username: username.into(),
            password: password.into(),
            sent: false,
        }
    }

    pub fn with_authzid(mut self, authzid: impl Into<String>) -> Self {
        self.authzid = authzid.into();
        self
    }
}

impl SaslMechanism for PlainMechanism {
    fn name(&self) -> &str {
        "PLAIN"
    }

    fn initial_response(&mut self) -> Result<Vec<u8>> {
        self.sent = true;
        let mut out = Vec::new();
        out.extend_from_slice(self.authzid.as_bytes());
        out.push(0);
        out.extend_from_slice(self.username.as_bytes());
        out.push(0);
        out.extend_from_slice(self.password.as_bytes());
        Ok(out)
    }

    fn evaluate_challenge(&mut self, _challenge: &[u8]) -> Result<Vec<u8>> {
        Err(TransportError::Unknown("PLAIN received an unexpected challenge".to_owned()).into())
    }

    fn is_complete(&self) -> bool {
        self.sent
    }
}

/// Pre-shared-key mechanism with a ChaCha20-Poly1305 security layer.
///
/// The client proves key possession by sealing the server's random challenge;
/// after completion every frame travels as `nonce(12) || ciphertext`, so the
/// envelope is both confidential and tamper-evident.
pub struct PskMechanism {
    identity: String,
    cipher: ChaCha20Poly1305,
    answered: bool,
}

impl PskMechanism {
    pub fn new(identity: impl Into<String>, key: &[u8; 32]) -> Self {
        Self {
            identity: identity.into(),
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
            answered: false,
        }
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| TransportError::Unknown("frame encryption failed".to_owned()))?;
        let mut out = Vec::with_capacity(12 + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < 12 {
            return Err(
                ProtocolError::InvalidData("sealed frame shorter than its nonce".to_owned()).into(),
            );
        }
        let (nonce, ciphertext) = sealed.split_at(12);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                ProtocolError::InvalidData("frame failed authenticated decryption".to_owned())
                    .into()
            })
    }
}

impl SaslMechanism for PskMechanism {
    fn name(&self) -> &str {
        "PSK-CHACHA20-POLY1305"
    }

    fn initial_response(&mut self) -> Result<Vec<u8>> {
        Ok(self.identity.as_bytes().to_vec())
    }

    fn evaluate_challenge(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        self.answered = true;
        self.seal(challenge)
    }

    fn is_complete(&self) -> bool {
        self.answered
    }

    fn has_security_layer(&self) -> bool {
        true
    }

    fn wrap(&self, frame: &[u8]) -> Result<Vec<u8>> {
        self.seal(frame)
    }

    fn unwrap(&self, frame: &[u8]) -> Result<Vec<u8>> {
        self.open(frame)
    }
}

/// The negotiation state machine, independent of any I/O.
pub struct SaslNegotiator {
    state: SaslState,
    mechanism: Box<dyn SaslMechanism>,
}

impl SaslNegotiator {
    pub fn new(mechanism: Box<dyn SaslMechanism>) -> Self {
        Self {
            state: SaslState::NotStarted,
            mechanism,
        }
    }

    pub fn state(&self) -> SaslState {
        self.state
    }

    /// NOT_STARTED -> NEGOTIATING. Returns the mechanism name for START and
    /// the initial response for the OK that immediately follows it.
    pub fn start(&mut self) -> Result<(Vec<u8>, Vec<u8>)> {
        if self.state != SaslState::NotStarted {
            return Err(
                TransportError::Unknown("negotiation already started".to_owned()).into(),
            );
        }
        let name = self.mechanism.name().as_bytes().to_vec();
        let initial = self.mechanism.initial_response()?;
        self.state = SaslState::Negotiating;
        debug!(mechanism = self.mechanism.name(), "negotiation started");
        Ok((name, initial))
    }

    /// Server sent OK(challenge) while negotiating: compute the response,
    /// stay NEGOTIATING.
    pub fn challenge(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        if self.state != SaslState::Negotiating {
            self.state = SaslState::Failed;
            return Err(TransportError::Unknown(
                "challenge received outside negotiation".to_owned(),
            )
            .into());
        }
        match self.mechanism.evaluate_challenge(challenge) {
            Ok(response) => Ok(response),
            Err(e) => {
                self.state = SaslState::Failed;
                Err(e)
            }
        }
    }

    /// Server claimed COMPLETE. Valid only while negotiating and only if the
    /// mechanism agrees the exchange is finished.
    pub fn complete(&mut self) -> Result<()> {
        if self.state != SaslState::Negotiating {
            self.state = SaslState::Failed;
            return Err(TransportError::Unknown(
                "COMPLETE received outside negotiation".to_owned(),
            )
            .into());
        }
        if !self.mechanism.is_complete() {
            self.state = SaslState::Failed;
            return Err(TransportError::Unknown(
                "server claimed completion before the mechanism finished".to_owned(),
            )
            .into());
        }
        self.state = SaslState::Complete;
        Ok(())
    }

    /// BAD or ERROR received: terminal failure. Returns the error to surface;
    /// the connection must be closed.
    pub fn fail(&mut self, status: SaslStatus, payload: &[u8]) -> Error {
        self.state = SaslState::Failed;
        let detail = String::from_utf8_lossy(payload);
        warn!(?status, %detail, "negotiation failed");
        TransportError::Unknown(format!("negotiation failed ({status:?}): {detail}")).into()
    }

    pub fn has_security_layer(&self) -> bool {
        self.mechanism.has_security_layer()
    }

    /// Apply the security layer to one outbound frame. Fails in any state
    /// other than `Complete`.
    pub fn wrap(&self, frame: &[u8]) -> Result<Vec<u8>> {
        self.check_complete()?;
        if self.mechanism.has_security_layer() {
            self.mechanism.wrap(frame)
        } else {
            Ok(frame.to_vec())
        }
    }

    /// Remove the security layer from one inbound frame. Fails in any state
    /// other than `Complete`.
    pub fn unwrap(&self, frame: &[u8]) -> Result<Vec<u8>> {
        self.check_complete()?;
        if self.mechanism.has_security_layer() {
            self.mechanism.unwrap(frame)
        } else {
            Ok(frame.to_vec())
        }
    }

    fn check_complete(&self) -> Result<()> {
        match self.state {
            SaslState::Complete => Ok(()),
            SaslState::Failed => {
                Err(TransportError::Unknown("negotiation has failed".to_owned()).into())
            }
            _ => Err(TransportError::Unknown("negotiation not complete".to_owned()).into()),
        }
    }
}

/// Framed transport whose frames pass through a negotiated security layer.
///
/// Constructed only by [`SaslTransport::negotiate`], so a value of this type
/// is proof that negotiation completed: application frames cannot flow
/// through a session that is still negotiating or has failed.
pub struct SaslTransport<S> {
    reader: ConnectionLock<SaslReader<S>>,
    write_half: ConnectionLock<WriteHalf<S>>,
    wbuf: std::sync::Mutex<BytesMut>,
    negotiator: SaslNegotiator,
    max_frame_size: usize,
}

impl<S> std::fmt::Debug for SaslTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaslTransport")
            .field("max_frame_size", &self.max_frame_size)
            .finish_non_exhaustive()
    }
}

struct SaslReader<S> {
    stream: ReadHalf<S>,
    max_frame_size: usize,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SaslTransport<S> {
    /// Run the client side of the negotiation on `stream`. On any terminal
    /// failure the stream is dropped (closed); a returned transport is
    /// already in the `Complete` state.
    pub async fn negotiate(
        mut stream: S,
        mechanism: Box<dyn SaslMechanism>,
        config: &TransportConfig,
    ) -> Result<Self> {
        let mut negotiator = SaslNegotiator::new(mechanism);
        let (name, initial) = negotiator.start()?;
        send_sasl_message(&mut stream, SaslStatus::Start, &name).await?;
        send_sasl_message(&mut stream, SaslStatus::Ok, &initial).await?;

        loop {
            let (status, payload) =
                receive_sasl_message(&mut stream, config.max_frame_size).await?;
            match status {
                SaslStatus::Ok => {
                    let response = negotiator.challenge(&payload)?;
                    send_sasl_message(&mut stream, SaslStatus::Ok, &response).await?;
                }
                SaslStatus::Complete => {
                    negotiator.complete()?;
                    break;
                }
                SaslStatus::Bad | SaslStatus::Error => {
                    return Err(negotiator.fail(status, &payload));
                }
                SaslStatus::Start => {
                    return Err(negotiator.fail(status, b"unexpected START from server"));
                }
            }
        }

        info!(
            security_layer = negotiator.has_security_layer(),
            "negotiation complete"
        );

        let (read_half, write_half) = tokio::io::split(stream);
        Ok(Self {
            reader: ConnectionLock::new(SaslReader {
                stream: read_half,
                max_frame_size: config.max_frame_size,
            }),
            write_half: ConnectionLock::new(write_half),
            wbuf: std::sync::Mutex::new(BytesMut::new()),
            negotiator,
            max_frame_size: config.max_frame_size,
        })
    }

    /// Append to the write buffer; no I/O until [`flush`](Self::flush).
    pub fn write(&self, bytes: &[u8]) {
        self.wbuf
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend_from_slice(bytes);
    }

    /// Wrap the buffered bytes under the security layer and emit them as one
    /// length-prefixed frame. As with the plain framed transport, the buffer
    /// is rotated out before any I/O is attempted.
    pub async fn flush(&self) -> Result<()> {
        let frame = {
            let mut buf = self
                .wbuf
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            std::mem::take(&mut *buf)
        };

        let wrapped = self.negotiator.wrap(&frame)?;
        if wrapped.len() > self.max_frame_size {
            return Err(ProtocolError::SizeLimit {
                length: wrapped.len() as u64,
                limit: self.max_frame_size as u64,
            }
            .into());
        }
        let mut message = BytesMut::with_capacity(4 + wrapped.len());
        message.put_u32(wrapped.len() as u32);
        message.extend_from_slice(&wrapped);

        let mut stream = self.write_half.acquire().await;
        stream.write_all(&message).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Read and unwrap the next frame, FIFO-serialized across callers.
    pub async fn read_frame(&self) -> Result<Bytes> {
        let sealed = {
            let mut reader = self.reader.acquire().await;
            reader.read_sealed().await?
        };
        Ok(Bytes::from(self.negotiator.unwrap(&sealed)?))
    }

    pub fn state(&self) -> SaslState {
        self.negotiator.state()
    }

    pub fn has_security_layer(&self) -> bool {
        self.negotiator.has_security_layer()
    }
}

impl<S: AsyncRead> SaslReader<S> {
    async fn read_sealed(&mut self) -> Result<Vec<u8>> {
        let mut header = [0u8; 4];
        read_exact_or_eof(&mut self.stream, &mut header).await?;
        let len = u32::from_be_bytes(header) as usize;
        if len > self.max_frame_size {
            return Err(ProtocolError::SizeLimit {
                length: len as u64,
                limit: self.max_frame_size as u64,
            }
            .into());
        }
        let mut payload = vec![0u8; len];
        self.stream
            .read_exact(&mut payload)
            .await
            .map_err(|e| TransportError::Unknown(format!("sealed frame truncated: {e}")))?;
        Ok(payload)
    }
}

async fn send_sasl_message<S: AsyncWrite + Unpin>(
    stream: &mut S,
    status: SaslStatus,
    payload: &[u8],
) -> Result<()> {
    let mut message = BytesMut::with_capacity(5 + payload.len());
    message.put_u8(status.byte());
    message.put_u32(payload.len() as u32);
    message.extend_from_slice(payload);
    stream.write_all(&message).await?;
    stream.flush().await?;
    Ok(())
}

async fn receive_sasl_message<S: AsyncRead + Unpin>(
    stream: &mut S,
    max_len: usize,
) -> Result<(SaslStatus, Vec<u8>)> {
    let mut header = [0u8; 5];
    read_exact_or_eof(stream, &mut header).await?;
    let status = SaslStatus::from_byte(header[0]).ok_or_else(|| {
        ProtocolError::InvalidData(format!("invalid negotiation status {}", header[0]))
    })?;
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if len > max_len {
        return Err(ProtocolError::SizeLimit {
            length: len as u64,
            limit: max_len as u64,
        }
        .into());
    }
    let mut payload = vec![0u8; len];
    stream
        .read_exact(&mut payload)
        .await
        .map_err(|e| TransportError::Unknown(format!("negotiation message truncated: {e}")))?;
    Ok((status, payload))
}

/// Like `read_exact`, but a clean close before the first byte is
/// [`TransportError::EndOfFile`] rather than a generic fault.
async fn read_exact_or_eof<S: AsyncRead + Unpin>(stream: &mut S, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Err(TransportError::EndOfFile.into());
            }
            return Err(TransportError::Unknown(format!(
                "stream closed mid-message ({filled} of {} bytes)",
                buf.len()
            ))
            .into());
        }
        filled += n;
    }
    Ok(())
}
