//! Typed RPC front end of the dispatcher.

use std::sync::Arc;

use structured_proto::{
    BatchTableRequest, BatchTableResponse, ConditionalPutTableRowRequest,
    ConditionalPutTableRowResponse, CreateTableRequest, CreateTableResponse,
    DeleteTableRowRangeRequest, DeleteTableRowRangeResponse, DeleteTableRowRequest,
    DeleteTableRowResponse, GetTableRowRequest, GetTableRowResponse, IncrementTableRowRequest,
    IncrementTableRowResponse, Method, PutTableRowRequest, PutTableRowResponse, ScanTableRequest,
    ScanTableResponse, TableRequest,
};

use crate::dispatch::{Dispatcher, VerificationError};
use crate::transport::ListenerError;

use super::frame::{RPC_SERVICE, RpcFault};
use super::server::RpcServer;

/// Exposes every structured method as a typed call.
///
/// Arguments arrive already decoded. Refused requests become faults; once a
/// call executes, the outcome is in the reply header and the call itself
/// succeeds.
pub struct RpcDbServer {
    dispatcher: Arc<Dispatcher>,
}

impl RpcDbServer {
    /// Builds the service over `dispatcher`.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Creates a table.
    ///
    /// # Errors
    ///
    /// Returns an [`RpcFault`] when the request is refused.
    pub fn create_table(
        &self,
        args: &CreateTableRequest,
        reply: &mut CreateTableResponse,
    ) -> Result<(), RpcFault> {
        self.execute_cmd(args, reply)
    }

    /// Reads one row.
    ///
    /// # Errors
    ///
    /// Returns an [`RpcFault`] when the request is refused.
    pub fn get_table_row(
        &self,
        args: &GetTableRowRequest,
        reply: &mut GetTableRowResponse,
    ) -> Result<(), RpcFault> {
        self.execute_cmd(args, reply)
    }

    /// Writes one row.
    ///
    /// # Errors
    ///
    /// Returns an [`RpcFault`] when the request is refused.
    pub fn put_table_row(
        &self,
        args: &PutTableRowRequest,
        reply: &mut PutTableRowResponse,
    ) -> Result<(), RpcFault> {
        self.execute_cmd(args, reply)
    }

    /// Writes one row if its current columns match.
    ///
    /// # Errors
    ///
    /// Returns an [`RpcFault`] when the request is refused.
    pub fn conditional_put_table_row(
        &self,
        args: &ConditionalPutTableRowRequest,
        reply: &mut ConditionalPutTableRowResponse,
    ) -> Result<(), RpcFault> {
        self.execute_cmd(args, reply)
    }

    /// Adds deltas to integer columns of one row.
    ///
    /// # Errors
    ///
    /// Returns an [`RpcFault`] when the request is refused.
    pub fn increment_table_row(
        &self,
        args: &IncrementTableRowRequest,
        reply: &mut IncrementTableRowResponse,
    ) -> Result<(), RpcFault> {
        self.execute_cmd(args, reply)
    }

    /// Deletes one row.
    ///
    /// # Errors
    ///
    /// Returns an [`RpcFault`] when the request is refused.
    pub fn delete_table_row(
        &self,
        args: &DeleteTableRowRequest,
        reply: &mut DeleteTableRowResponse,
    ) -> Result<(), RpcFault> {
        self.execute_cmd(args, reply)
    }

    /// Deletes a key range.
    ///
    /// # Errors
    ///
    /// Returns an [`RpcFault`] when the request is refused.
    pub fn delete_table_row_range(
        &self,
        args: &DeleteTableRowRangeRequest,
        reply: &mut DeleteTableRowRangeResponse,
    ) -> Result<(), RpcFault> {
        self.execute_cmd(args, reply)
    }

    /// Reads a key range.
    ///
    /// # Errors
    ///
    /// Returns an [`RpcFault`] when the request is refused.
    pub fn scan_table(
        &self,
        args: &ScanTableRequest,
        reply: &mut ScanTableResponse,
    ) -> Result<(), RpcFault> {
        self.execute_cmd(args, reply)
    }

    /// Runs a batch of sub-commands concurrently.
    ///
    /// # Errors
    ///
    /// Returns an [`RpcFault`] when the batch is refused.
    pub fn batch_table(
        &self,
        args: &BatchTableRequest,
        reply: &mut BatchTableResponse,
    ) -> Result<(), RpcFault> {
        self.execute_cmd(args, reply)
    }

    fn execute_cmd<R: TableRequest>(&self, args: &R, reply: &mut R::Reply) -> Result<(), RpcFault> {
        self.dispatcher
            .run_typed(args, reply)
            .map_err(|error| refusal_fault(&error))
    }

    /// Binds every enabled method on `server` under [`RPC_SERVICE`].
    ///
    /// Disabled methods get no binding, so calls to them fault as unknown.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::DuplicateBinding`] when a name is already
    /// bound on `server`.
    pub fn register(self: &Arc<Self>, server: &mut RpcServer) -> Result<(), ListenerError> {
        macro_rules! bind {
            ($($method:ident => $handler:ident($request:ty, $response:ty);)+) => {
                $(
                    if self.dispatcher.is_enabled(Method::$method) {
                        let service = Arc::clone(self);
                        server.register::<$request, $response, _>(
                            RPC_SERVICE,
                            Method::$method.as_str(),
                            move |args, reply| service.$handler(args, reply),
                        )?;
                    }
                )+
            };
        }

        bind! {
            CreateTable => create_table(CreateTableRequest, CreateTableResponse);
            GetTableRow => get_table_row(GetTableRowRequest, GetTableRowResponse);
            PutTableRow => put_table_row(PutTableRowRequest, PutTableRowResponse);
            ConditionalPutTableRow => conditional_put_table_row(
                ConditionalPutTableRowRequest,
                ConditionalPutTableRowResponse
            );
            IncrementTableRow => increment_table_row(
                IncrementTableRowRequest,
                IncrementTableRowResponse
            );
            DeleteTableRow => delete_table_row(DeleteTableRowRequest, DeleteTableRowResponse);
            DeleteTableRowRange => delete_table_row_range(
                DeleteTableRowRangeRequest,
                DeleteTableRowRangeResponse
            );
            ScanTable => scan_table(ScanTableRequest, ScanTableResponse);
            BatchTable => batch_table(BatchTableRequest, BatchTableResponse);
        }
        Ok(())
    }
}

fn refusal_fault(error: &VerificationError) -> RpcFault {
    if error.is_client_error() {
        RpcFault::bad_request(error.to_string())
    } else {
        RpcFault::internal(error.to_string())
    }
}
