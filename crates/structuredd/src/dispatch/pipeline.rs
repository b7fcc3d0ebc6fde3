//! Execution of verified calls.
//!
//! The executor hands each call to the storage [`Sender`] and folds every
//! outcome into the reply header. Nothing that happens here becomes a
//! transport fault.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use structured_proto::{ApiError, StructuredCall, StructuredRequest, StructuredResponse};
use tracing::{debug, error, warn};

use crate::storage::Sender;

use super::DISPATCH_TARGET;
use super::batch;

/// Runs calls against the storage layer.
#[derive(Clone)]
pub struct Executor {
    sender: Arc<dyn Sender>,
}

impl Executor {
    /// Builds an executor delegating to `sender`.
    pub fn new(sender: Arc<dyn Sender>) -> Self {
        Self { sender }
    }

    /// Executes `call`, leaving any failure in its reply header.
    pub fn execute(&self, call: &mut StructuredCall) {
        self.execute_parts(&call.args, &mut call.reply);
    }

    /// Executes `args`, filling `reply`.
    ///
    /// The reply header error is `None` afterwards exactly when the call
    /// succeeded.
    pub fn execute_parts(&self, args: &StructuredRequest, reply: &mut StructuredResponse) {
        reply.header_mut().clear_error();
        if let (StructuredRequest::BatchTable(batch_args), StructuredResponse::BatchTable(batch_reply)) =
            (args, &mut *reply)
        {
            batch::execute(self, batch_args, batch_reply);
            return;
        }

        let method = args.method();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.sender.send(args, reply)));
        match outcome {
            Ok(Ok(())) => match reply.verify(args) {
                Ok(()) => debug!(target: DISPATCH_TARGET, %method, "call executed"),
                Err(mismatch) => {
                    warn!(target: DISPATCH_TARGET, %method, %mismatch, "storage reply rejected");
                    reply.header_mut().set_error(ApiError::internal(format!(
                        "storage reply does not fit the request: {mismatch}"
                    )));
                }
            },
            Ok(Err(failure)) => {
                debug!(target: DISPATCH_TARGET, %method, error = %failure, "storage call failed");
                reply.header_mut().set_error(ApiError::from(&failure));
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(target: DISPATCH_TARGET, %method, panic = %message, "storage sender panicked");
                *reply = args.create_reply();
                reply
                    .header_mut()
                    .set_error(ApiError::internal(format!("storage sender panicked: {message}")));
            }
        }
    }
}

pub(super) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
