//! Blocking RPC client.

use std::io;
use std::net::TcpStream;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

use structured_config::{SocketEndpoint, default_max_request_bytes};
use structured_proto::{CodecError, Encoding, TableRequest};
use thiserror::Error;

use crate::transport::ConnectionStream;

use super::frame::{
    FrameError, RpcFault, RpcRequestFrame, RpcResponseFrame, binding_name, read_frame, write_frame,
};

/// Failures seen by an [`RpcClient`].
#[derive(Debug, Error)]
pub enum RpcClientError {
    /// The endpoint could not be reached.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    /// Moving a frame failed.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// The request or reply record did not encode.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The server answered with a call-level fault.
    #[error(transparent)]
    Fault(#[from] RpcFault),
    /// The server closed the connection before answering.
    #[error("connection closed before the reply arrived")]
    Closed,
    /// The reply answers another call.
    #[error("reply sequence {actual} does not match request sequence {expected}")]
    Sequence { expected: u64, actual: u64 },
}

/// Issues calls over one connection, one at a time.
pub struct RpcClient {
    stream: ConnectionStream,
    next_seq: u64,
    max_frame_bytes: usize,
}

impl RpcClient {
    /// Connects to the RPC surface at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcClientError::Connect`] when the endpoint is unreachable.
    pub fn connect(endpoint: &SocketEndpoint) -> Result<Self, RpcClientError> {
        let connect_error = |source| RpcClientError::Connect {
            endpoint: endpoint.to_string(),
            source,
        };
        let stream = match endpoint {
            SocketEndpoint::Tcp { host, port } => {
                ConnectionStream::Tcp(TcpStream::connect((host.as_str(), *port)).map_err(connect_error)?)
            }
            #[cfg(unix)]
            SocketEndpoint::Unix { path } => {
                ConnectionStream::Unix(UnixStream::connect(path.as_std_path()).map_err(connect_error)?)
            }
            #[cfg(not(unix))]
            SocketEndpoint::Unix { .. } => {
                return Err(connect_error(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "unix sockets are unsupported on this platform",
                )));
            }
        };
        Ok(Self {
            stream,
            next_seq: 0,
            max_frame_bytes: default_max_request_bytes(),
        })
    }

    /// Sets the largest reply frame the client accepts.
    #[must_use]
    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// Calls the binding of `R`'s method and decodes the typed reply.
    ///
    /// # Errors
    ///
    /// Returns [`RpcClientError`] when the call fails at the transport level.
    /// Application failures are in the reply header instead.
    pub fn call<R: TableRequest>(&mut self, args: &R) -> Result<R::Reply, RpcClientError> {
        let payload = Encoding::Binary.encode(args)?;
        let reply = self.call_raw(&binding_name(R::METHOD), payload)?;
        Ok(Encoding::Binary.decode(&reply)?)
    }

    /// Calls the binding named `method` with an encoded payload.
    ///
    /// # Errors
    ///
    /// Returns [`RpcClientError`] when the call fails at the transport level.
    pub fn call_raw(&mut self, method: &str, payload: Vec<u8>) -> Result<Vec<u8>, RpcClientError> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let request = RpcRequestFrame {
            seq,
            method: method.to_owned(),
            payload,
        };
        write_frame(&mut self.stream, &request)?;
        let response: RpcResponseFrame =
            read_frame(&mut self.stream, self.max_frame_bytes)?.ok_or(RpcClientError::Closed)?;
        if response.seq != seq {
            return Err(RpcClientError::Sequence {
                expected: seq,
                actual: response.seq,
            });
        }
        match response.fault {
            Some(fault) => Err(fault.into()),
            None => Ok(response.payload),
        }
    }
}
