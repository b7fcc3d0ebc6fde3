//! Test helpers for the transport module.

use std::io::{self, Read, Write};
use std::time::Duration;

use super::{ConnectionHandler, ConnectionStream};

/// Greeting written by [`GreetingHandler`] to every accepted client.
pub(crate) const GREETING: &[u8] = b"ready\n";

/// Client read timeout so a stalled accept loop fails the test.
pub(crate) const READ_TIMEOUT: Option<Duration> = Some(Duration::from_secs(2));

/// Writes [`GREETING`] to each connection and closes it.
pub(crate) struct GreetingHandler;

impl ConnectionHandler for GreetingHandler {
    fn handle(&self, mut stream: ConnectionStream) {
        let _ = stream.write_all(GREETING).and_then(|()| stream.flush());
    }
}

/// Reads everything the server writes before closing the connection.
pub(crate) fn read_greeting(mut client: impl Read) -> io::Result<Vec<u8>> {
    let mut greeting = Vec::new();
    client.read_to_end(&mut greeting)?;
    Ok(greeting)
}
