//! Concurrent execution of batch sub-commands.
//!
//! Each sub-command runs on its own scoped thread and the batch waits for all
//! of them. A failing sub-command never stops its siblings; the batch reply
//! keeps one result per command in submission order and summarises any
//! failures in its own header.

use std::thread;

use structured_proto::{
    ApiError, BatchTableRequest, BatchTableResponse, ErrorClass, StructuredResponse,
};
use tracing::{debug, error, warn};

use super::DISPATCH_TARGET;
use super::pipeline::{Executor, panic_message};

pub(super) fn execute(
    executor: &Executor,
    request: &BatchTableRequest,
    reply: &mut BatchTableResponse,
) {
    let total = request.commands.len();
    debug!(target: DISPATCH_TARGET, commands = total, "dispatching batch");

    let results: Vec<StructuredResponse> = thread::scope(|scope| {
        let workers: Vec<_> = request
            .commands
            .iter()
            .map(|command| {
                scope.spawn(move || {
                    let mut result = command.create_reply();
                    executor.execute_parts(command, &mut result);
                    result
                })
            })
            .collect();

        workers
            .into_iter()
            .zip(&request.commands)
            .enumerate()
            .map(|(index, (worker, command))| {
                worker.join().unwrap_or_else(|payload| {
                    let message = panic_message(payload.as_ref());
                    error!(target: DISPATCH_TARGET, index, panic = %message, "batch worker panicked");
                    let mut result = command.create_reply();
                    result
                        .header_mut()
                        .set_error(ApiError::internal(format!("batch worker panicked: {message}")));
                    result
                })
            })
            .collect()
    });

    reply.header.timestamp = results
        .iter()
        .map(|result| result.header().timestamp)
        .max()
        .unwrap_or_default();
    if let Some(summary) = summarise(&results) {
        warn!(target: DISPATCH_TARGET, %summary, "batch partially failed");
        reply.header.set_error(summary);
    }
    reply.results = results;
}

fn summarise(results: &[StructuredResponse]) -> Option<ApiError> {
    let mut failures = results
        .iter()
        .enumerate()
        .filter_map(|(index, result)| result.header().error().map(|error| (index, error)));
    let (first_index, first_error) = failures.next()?;
    let failed = 1 + failures.count();
    Some(ApiError::new(
        ErrorClass::BatchPartial,
        format!(
            "{failed} of {total} batch commands failed; first failure at index {first_index}: {first_error}",
            total = results.len()
        ),
    ))
}
