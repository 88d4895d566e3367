//! Length-prefixed frame codec
//!
//! Every message between host and plugin travels as one frame: a fixed
//! 12-byte big-endian header followed by a JSON payload.
//!
//! ```text
//! 0      2     3      4            8            12
//! ┌──────┬─────┬──────┬────────────┬────────────┬─────────────┐
//! │magic │ ver │ type │ request id │ payload len│ payload ... │
//! └──────┴─────┴──────┴────────────┴────────────┴─────────────┘
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;

/// First two bytes of every frame
pub const MAGIC: u16 = 0xBEEF;

/// Protocol version carried in every header
pub const PROTOCOL_VERSION: u8 = 1;

/// Header size in bytes (2 + 1 + 1 + 4 + 4)
pub const HEADER_LEN: usize = 12;

/// Largest payload either side accepts (1 MiB)
pub const MAX_PAYLOAD: u32 = 1024 * 1024;

/// Message type byte
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    Hello = 1,
    HelloOk = 2,
    Call = 3,
    Result = 4,
    Log = 5,
    Heartbeat = 6,
    Error = 7,
    Shutdown = 8,
}

impl MsgType {
    /// Name used in logs and error messages
    pub fn name(self) -> &'static str {
        match self {
            Self::Hello => "Hello",
            Self::HelloOk => "HelloOk",
            Self::Call => "Call",
            Self::Result => "Result",
            Self::Log => "Log",
            Self::Heartbeat => "Heartbeat",
            Self::Error => "Error",
            Self::Shutdown => "Shutdown",
        }
    }
}

impl TryFrom<u8> for MsgType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        Ok(match value {
            1 => Self::Hello,
            2 => Self::HelloOk,
            3 => Self::Call,
            4 => Self::Result,
            5 => Self::Log,
            6 => Self::Heartbeat,
            7 => Self::Error,
            8 => Self::Shutdown,
            other => return Err(ProtocolError::UnknownType(other)),
        })
    }
}

/// A single protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_type: MsgType,
    pub request_id: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(msg_type: MsgType, request_id: u32, payload: Vec<u8>) -> Self {
        Self {
            msg_type,
            request_id,
            payload,
        }
    }

    /// Frame with no payload
    pub fn empty(msg_type: MsgType) -> Self {
        Self::new(msg_type, 0, Vec::new())
    }

    /// Serialize header and payload into one buffer
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.payload.len();
        if len > MAX_PAYLOAD as usize {
            return Err(ProtocolError::PayloadTooLarge {
                len,
                max: MAX_PAYLOAD,
            });
        }

        let mut buf = Vec::with_capacity(HEADER_LEN + len);
        buf.extend_from_slice(&MAGIC.to_be_bytes());
        buf.push(PROTOCOL_VERSION);
        buf.push(self.msg_type as u8);
        buf.extend_from_slice(&self.request_id.to_be_bytes());
        buf.extend_from_slice(&(len as u32).to_be_bytes());
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }
}

/// Parsed header fields: type, request id, payload length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub msg_type: MsgType,
    pub request_id: u32,
    pub len: u32,
}

impl Header {
    pub fn parse(raw: &[u8; HEADER_LEN]) -> Result<Self, ProtocolError> {
        let magic = u16::from_be_bytes([raw[0], raw[1]]);
        if magic != MAGIC {
            return Err(ProtocolError::BadMagic(magic));
        }
        if raw[2] != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion {
                expected: PROTOCOL_VERSION,
                found: raw[2],
            });
        }
        let msg_type = MsgType::try_from(raw[3])?;
        let request_id = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
        let len = u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]);
        if len > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge {
                len: len as usize,
                max: MAX_PAYLOAD,
            });
        }
        Ok(Self {
            msg_type,
            request_id,
            len,
        })
    }
}

/// Reads frames from an async byte stream
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly on a frame boundary;
    /// an EOF inside a frame is [`ProtocolError::Truncated`].
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        let mut raw = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            let n = self.inner.read(&mut raw[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(ProtocolError::Truncated {
                    read: filled,
                    expected: HEADER_LEN,
                });
            }
            filled += n;
        }

        let header = Header::parse(&raw)?;
        let mut payload = vec![0u8; header.len as usize];
        if let Err(e) = self.inner.read_exact(&mut payload).await {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                return Err(ProtocolError::Truncated {
                    read: HEADER_LEN,
                    expected: HEADER_LEN + payload.len(),
                });
            }
            return Err(e.into());
        }

        Ok(Some(Frame::new(header.msg_type, header.request_id, payload)))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Writes frames to an async byte stream, flushing after each one
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        let buf = frame.encode()?;
        self.inner.write_all(&buf).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Close the write half so the peer observes EOF
    pub async fn shutdown(&mut self) -> Result<(), ProtocolError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
