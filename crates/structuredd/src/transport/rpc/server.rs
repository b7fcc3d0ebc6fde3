//! Method-registered RPC server.
//!
//! Bindings are registered by name before serving starts; the set is fixed
//! once the server is shared with the listener. Each connection carries any
//! number of calls, answered in the order they arrive.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use structured_proto::Encoding;
use tracing::{debug, warn};

use crate::transport::{ConnectionHandler, ConnectionStream, LISTENER_TARGET, ListenerError};

use super::frame::{
    FrameError, RpcFault, RpcRequestFrame, RpcResponseFrame, read_frame, write_frame,
};

type Binding = Box<dyn Fn(&[u8]) -> Result<Vec<u8>, RpcFault> + Send + Sync>;

/// Routes framed calls to registered bindings.
pub struct RpcServer {
    bindings: BTreeMap<String, Binding>,
    max_frame_bytes: usize,
}

impl RpcServer {
    /// Builds a server with no bindings, refusing frames over
    /// `max_frame_bytes`.
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            bindings: BTreeMap::new(),
            max_frame_bytes,
        }
    }

    /// Binds `handler` as `service.method`.
    ///
    /// The binding decodes its arguments, hands `handler` an empty reply to
    /// fill, and encodes the reply once `handler` returns.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::DuplicateBinding`] when the name is taken.
    pub fn register<Req, Resp, F>(
        &mut self,
        service: &str,
        method: &str,
        handler: F,
    ) -> Result<(), ListenerError>
    where
        Req: DeserializeOwned,
        Resp: Serialize + Default,
        F: Fn(&Req, &mut Resp) -> Result<(), RpcFault> + Send + Sync + 'static,
    {
        let name = format!("{service}.{method}");
        if self.bindings.contains_key(&name) {
            return Err(ListenerError::DuplicateBinding { name });
        }
        let label = name.clone();
        let binding = move |payload: &[u8]| {
            let args: Req = Encoding::Binary.decode(payload).map_err(|error| {
                RpcFault::bad_request(format!("failed to decode {label} arguments: {error}"))
            })?;
            let mut reply = Resp::default();
            handler(&args, &mut reply)?;
            Encoding::Binary.encode(&reply).map_err(|error| {
                RpcFault::internal(format!("failed to encode {label} reply: {error}"))
            })
        };
        self.bindings.insert(name, Box::new(binding));
        Ok(())
    }

    /// Iterates the registered binding names in order.
    pub fn bindings(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// Invokes the binding registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns a not-found [`RpcFault`] for unknown names and the binding's
    /// own fault otherwise.
    pub fn call(&self, name: &str, payload: &[u8]) -> Result<Vec<u8>, RpcFault> {
        let binding = self
            .bindings
            .get(name)
            .ok_or_else(|| RpcFault::not_found(format!("rpc: can't find method {name}")))?;
        binding(payload)
    }

    fn serve_connection(&self, stream: &mut ConnectionStream) -> Result<(), FrameError> {
        while let Some(frame) = read_frame::<_, RpcRequestFrame>(stream, self.max_frame_bytes)? {
            let response = match self.call(&frame.method, &frame.payload) {
                Ok(payload) => RpcResponseFrame {
                    seq: frame.seq,
                    fault: None,
                    payload,
                },
                Err(fault) => {
                    debug!(
                        target: LISTENER_TARGET,
                        method = %frame.method,
                        %fault,
                        "RPC call faulted"
                    );
                    RpcResponseFrame {
                        seq: frame.seq,
                        fault: Some(fault),
                        payload: Vec::new(),
                    }
                }
            };
            write_frame(stream, &response)?;
        }
        Ok(())
    }
}

impl ConnectionHandler for RpcServer {
    fn handle(&self, mut stream: ConnectionStream) {
        let peer = stream.peer();
        debug!(target: LISTENER_TARGET, %peer, "RPC connection opened");
        match self.serve_connection(&mut stream) {
            Ok(()) => debug!(target: LISTENER_TARGET, %peer, "RPC connection closed"),
            Err(error) => warn!(target: LISTENER_TARGET, %peer, %error, "RPC connection failed"),
        }
    }
}
