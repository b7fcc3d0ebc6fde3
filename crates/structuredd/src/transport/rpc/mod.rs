//! Binary RPC surface.
//!
//! Every enabled method is bound as `Server.<MethodName>`. Bindings receive
//! their concrete request already decoded and fill the concrete response.
//! Faults are reserved for calls that cannot be routed, decoded or verified.

mod client;
mod frame;
mod server;
mod service;

use std::sync::Arc;

use crate::dispatch::Dispatcher;

use super::ListenerError;

pub use self::client::{RpcClient, RpcClientError};
pub use self::frame::{
    FrameError, RPC_SERVICE, RpcFault, RpcFaultKind, RpcRequestFrame, RpcResponseFrame,
    binding_name, read_frame, write_frame,
};
pub use self::server::RpcServer;
pub use self::service::RpcDbServer;

/// Builds an RPC server with every enabled method of `dispatcher` bound.
///
/// # Errors
///
/// Returns [`ListenerError::DuplicateBinding`] if the binding table is
/// inconsistent.
pub fn build_server(
    dispatcher: Arc<Dispatcher>,
    max_frame_bytes: usize,
) -> Result<RpcServer, ListenerError> {
    let mut server = RpcServer::new(max_frame_bytes);
    Arc::new(RpcDbServer::new(dispatcher)).register(&mut server)?;
    Ok(server)
}
