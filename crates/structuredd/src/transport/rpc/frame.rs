//! RPC wire framing.
//!
//! Every frame is a four-byte big-endian length followed by that many bytes
//! of postcard. Requests name their binding as `Service.Method`; responses
//! echo the request sequence number and carry either a payload or a fault.

use std::fmt;
use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use structured_proto::Method;
use thiserror::Error;

/// Service namespace under which every structured method is bound.
pub const RPC_SERVICE: &str = "Server";

/// Returns the binding name of `method`, e.g. `Server.GetTableRow`.
pub fn binding_name(method: Method) -> String {
    format!("{RPC_SERVICE}.{method}")
}

/// One call sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequestFrame {
    /// Caller-chosen sequence number echoed in the response.
    pub seq: u64,
    /// Binding name.
    pub method: String,
    /// Postcard-encoded request record.
    pub payload: Vec<u8>,
}

/// The answer to one [`RpcRequestFrame`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponseFrame {
    /// Sequence number of the request.
    pub seq: u64,
    /// Call-level failure; `None` when `payload` holds the reply.
    pub fault: Option<RpcFault>,
    /// Postcard-encoded response record.
    pub payload: Vec<u8>,
}

/// Kind of call-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcFaultKind {
    /// No binding exists under the requested name.
    NotFound,
    /// The arguments did not decode or did not verify.
    BadRequest,
    /// The adapter failed around the pipeline.
    Internal,
}

impl fmt::Display for RpcFaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotFound => "not found",
            Self::BadRequest => "bad request",
            Self::Internal => "internal",
        })
    }
}

/// Call-level failure reported instead of a reply.
///
/// Application failures never become faults; they travel in the reply
/// header like on every other surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct RpcFault {
    /// Classification of the fault.
    pub kind: RpcFaultKind,
    /// Human-readable description.
    pub message: String,
}

impl RpcFault {
    /// Creates a not-found fault.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: RpcFaultKind::NotFound,
            message: message.into(),
        }
    }

    /// Creates a bad-request fault.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            kind: RpcFaultKind::BadRequest,
            message: message.into(),
        }
    }

    /// Creates an internal fault.
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: RpcFaultKind::Internal,
            message: message.into(),
        }
    }
}

/// Failures while moving frames over a stream.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Reading or writing the stream failed.
    #[error("frame I/O failed: {0}")]
    Io(#[from] io::Error),
    /// The frame exceeds the size limit.
    #[error("frame of {size} bytes exceeds the {max_size} byte limit")]
    TooLarge { size: usize, max_size: usize },
    /// The frame body is not valid postcard.
    #[error("malformed frame: {0}")]
    Codec(#[from] postcard::Error),
}

/// Writes `frame` with its length prefix and flushes the stream.
///
/// # Errors
///
/// Returns [`FrameError`] when encoding or writing fails.
pub fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<(), FrameError>
where
    W: Write + ?Sized,
    T: Serialize,
{
    let bytes = postcard::to_stdvec(frame)?;
    let length = u32::try_from(bytes.len()).map_err(|_| FrameError::TooLarge {
        size: bytes.len(),
        max_size: u32::MAX as usize,
    })?;
    writer.write_all(&length.to_be_bytes())?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Reads the next frame, or `None` when the peer closed the stream cleanly
/// between frames.
///
/// # Errors
///
/// Returns [`FrameError`] for truncated, oversized or malformed frames.
pub fn read_frame<R, T>(reader: &mut R, max_bytes: usize) -> Result<Option<T>, FrameError>
where
    R: Read + ?Sized,
    T: DeserializeOwned,
{
    let mut prefix = [0_u8; 4];
    if !read_prefix(reader, &mut prefix)? {
        return Ok(None);
    }
    let size = usize::try_from(u32::from_be_bytes(prefix)).unwrap_or(usize::MAX);
    if size > max_bytes {
        return Err(FrameError::TooLarge {
            size,
            max_size: max_bytes,
        });
    }
    let mut bytes = vec![0_u8; size];
    reader.read_exact(&mut bytes)?;
    Ok(Some(postcard::from_bytes(&bytes)?))
}

fn read_prefix<R: Read + ?Sized>(reader: &mut R, prefix: &mut [u8; 4]) -> Result<bool, FrameError> {
    let mut filled = 0;
    while filled < prefix.len() {
        match reader.read(&mut prefix[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(FrameError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream closed inside a frame length",
                )));
            }
            Ok(read) => filled += read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error.into()),
        }
    }
    Ok(true)
}
