//! Structured call dispatch shared by both transports.
//!
//! A transport resolves a method name through the [`MethodRegistry`], decodes
//! the payload into the allocated call and hands it to the [`Dispatcher`].
//! The dispatcher verifies the request and, if it passes, executes it.
//!
//! ## Error contract
//!
//! Verification failures are returned to the transport, which reports them
//! through its own channel. Everything that goes wrong during execution is
//! written to the reply header instead, so both transports present
//! application failures identically.

mod batch;
mod errors;
mod permissions;
mod pipeline;
mod registry;
mod verify;

use std::mem;
use std::sync::Arc;

use structured_config::Config;
use structured_proto::{
    ApiError, Method, StructuredCall, StructuredRequest, StructuredResponse, TableRequest,
    TableResponse, UnknownMethod,
};
use tracing::debug;

use crate::storage::{ConfigReader, Sender};

pub use self::errors::{DispatchError, FailureClass};
pub use self::permissions::{
    Access, Authorizer, PERMISSION_PREFIX, PermConfig, PermissionAuthorizer, permission_key,
};
pub use self::pipeline::Executor;
pub use self::registry::{Allocator, MethodRegistry, PUBLIC_METHODS};
pub use self::verify::{VerificationError, Verifier};

/// Tracing target for dispatch events.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Verifies and executes structured calls.
///
/// Shared by reference between every transport and every connection.
#[derive(Clone)]
pub struct Dispatcher {
    registry: MethodRegistry,
    verifier: Verifier,
    executor: Executor,
}

impl Dispatcher {
    /// Assembles a dispatcher from its stages.
    pub fn new(registry: MethodRegistry, verifier: Verifier, executor: Executor) -> Self {
        Self {
            registry,
            verifier,
            executor,
        }
    }

    /// Builds a dispatcher from daemon configuration.
    ///
    /// Permissions are read through `reader` when the configuration enforces
    /// them.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownMethod`] when a disabled method name is not a method.
    pub fn from_config(
        config: &Config,
        sender: Arc<dyn Sender>,
        reader: Arc<dyn ConfigReader>,
    ) -> Result<Self, UnknownMethod> {
        let registry = MethodRegistry::from_names(config.disabled_methods())?;
        let mut verifier = Verifier::new(config.max_batch_size());
        if config.enforce_permissions() {
            verifier = verifier.with_authorizer(Arc::new(PermissionAuthorizer::new(reader)));
        }
        Ok(Self::new(registry, verifier, Executor::new(sender)))
    }

    /// Returns the method registry.
    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Allocates a call for the named method if it is served.
    pub fn lookup(&self, name: &str) -> Option<StructuredCall> {
        self.registry.lookup(name)
    }

    /// Reports whether `method` is served.
    pub fn is_enabled(&self, method: Method) -> bool {
        self.registry.is_enabled(method)
    }

    /// Verifies and executes `call`.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError`] when the request is refused; the storage
    /// layer is not contacted in that case.
    pub fn run(&self, call: &mut StructuredCall) -> Result<(), VerificationError> {
        self.run_parts(&call.args, &mut call.reply)
    }

    /// Verifies `args` and executes it into `reply`.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError`] when the request is refused.
    pub fn run_parts(
        &self,
        args: &StructuredRequest,
        reply: &mut StructuredResponse,
    ) -> Result<(), VerificationError> {
        let method = args.method();
        self.check_batch_methods(args)?;
        if let Err(error) = self.verifier.verify(args) {
            debug!(target: DISPATCH_TARGET, %method, %error, "request refused");
            return Err(error);
        }
        self.executor.execute_parts(args, reply);
        Ok(())
    }

    /// Verifies and executes a typed request.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError`] when the request is refused.
    pub fn run_typed<R: TableRequest>(
        &self,
        args: &R,
        reply: &mut R::Reply,
    ) -> Result<(), VerificationError> {
        let request: StructuredRequest = args.clone().into();
        let mut response: StructuredResponse = mem::take(reply).into();
        self.run_parts(&request, &mut response)?;
        match R::Reply::try_from(response) {
            Ok(typed) => *reply = typed,
            Err(other) => reply.header_mut().set_error(ApiError::internal(format!(
                "pipeline produced a {} reply for a {} request",
                other.method(),
                R::METHOD
            ))),
        }
        Ok(())
    }

    // Disabled methods stay unreachable when wrapped in a batch.
    fn check_batch_methods(&self, args: &StructuredRequest) -> Result<(), VerificationError> {
        let StructuredRequest::BatchTable(batch) = args else {
            return Ok(());
        };
        for (index, command) in batch.commands.iter().enumerate() {
            let method = command.method();
            if !self.registry.is_enabled(method) {
                return Err(VerificationError::batch_command(
                    index,
                    VerificationError::invalid(method, "method is not served"),
                ));
            }
        }
        Ok(())
    }
}
