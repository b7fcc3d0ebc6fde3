//! Path-routed HTTP surface.
//!
//! A call is `POST <prefix><MethodName>` with the encoded request as the body.
//! The request encoding comes from `Content-Type`; the reply encoding comes
//! from `Accept` and otherwise mirrors the request. Transport failures are
//! answered with a status code and a one-line `text/plain` body. Once a call
//! has been executed the status is always 200 and any application failure
//! travels in the reply header.

use std::error::Error as StdError;
use std::sync::Arc;
use std::thread;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use http_body_util::LengthLimitError;
use structured_config::{Config, SocketEndpoint};
use structured_proto::Encoding;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::dispatch::{DispatchError, Dispatcher, FailureClass};

use super::listener::BoundSocket;
#[cfg(unix)]
use super::listener::cleanup_unix_socket;
use super::{LISTENER_TARGET, ListenerError, SocketListener};

const PLAIN_TEXT: &str = "text/plain; charset=utf-8";

/// Reply produced by the HTTP adapter before it is written to the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// Response status.
    pub status: StatusCode,
    /// Value of the `Content-Type` header.
    pub content_type: &'static str,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpReply {
    fn failure(error: &DispatchError) -> Self {
        let status = match error.class() {
            FailureClass::NotFound => StatusCode::NOT_FOUND,
            FailureClass::Client => StatusCode::BAD_REQUEST,
            FailureClass::Server => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            content_type: PLAIN_TEXT,
            body: format!("{error}\n").into_bytes(),
        }
    }
}

impl IntoResponse for HttpReply {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(self.content_type));
        response
    }
}

/// Translates HTTP requests into structured calls.
pub struct HttpAdapter {
    dispatcher: Arc<Dispatcher>,
    prefix: String,
    max_request_bytes: usize,
}

impl HttpAdapter {
    /// Builds an adapter serving methods under `prefix`.
    pub fn new(dispatcher: Arc<Dispatcher>, prefix: impl Into<String>, max_request_bytes: usize) -> Self {
        Self {
            dispatcher,
            prefix: prefix.into(),
            max_request_bytes,
        }
    }

    /// Builds an adapter from the daemon configuration.
    pub fn from_config(dispatcher: Arc<Dispatcher>, config: &Config) -> Self {
        Self::new(dispatcher, config.api_prefix(), config.max_request_bytes())
    }

    /// Returns the path prefix stripped from request paths.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Wraps the adapter in a router that sends every request to it.
    pub fn into_router(self) -> Router {
        Router::new()
            .fallback(serve_request)
            .with_state(Arc::new(self))
    }

    /// Runs one call synchronously.
    ///
    /// Blocks for the whole pipeline, so async callers should run it on a
    /// blocking worker.
    pub fn handle(&self, path: &str, headers: &HeaderMap, body: &[u8]) -> HttpReply {
        self.serve(path, headers, body).unwrap_or_else(|error| {
            match error.class() {
                FailureClass::Server => {
                    warn!(target: LISTENER_TARGET, path, %error, "HTTP call failed");
                }
                FailureClass::NotFound | FailureClass::Client => {
                    debug!(target: LISTENER_TARGET, path, %error, "HTTP call rejected");
                }
            }
            HttpReply::failure(&error)
        })
    }

    fn serve(&self, path: &str, headers: &HeaderMap, body: &[u8]) -> Result<HttpReply, DispatchError> {
        let name = path
            .strip_prefix(self.prefix.as_str())
            .ok_or_else(|| DispatchError::no_route(path))?;
        let mut call = self
            .dispatcher
            .lookup(name)
            .ok_or_else(|| DispatchError::unknown_method(name))?;
        let method = call.method();

        let request_encoding = request_encoding(headers)?;
        let reply_encoding = reply_encoding(headers, request_encoding)?;
        if body.len() > self.max_request_bytes {
            return Err(DispatchError::request_too_large(body.len(), self.max_request_bytes));
        }

        call.args
            .decode_in_place(request_encoding, body)
            .map_err(|source| DispatchError::decode(method, source))?;
        self.dispatcher.run(&mut call)?;
        let body = call
            .reply
            .encode(reply_encoding)
            .map_err(|source| DispatchError::encode(method, source))?;

        Ok(HttpReply {
            status: StatusCode::OK,
            content_type: reply_encoding.media_type(),
            body,
        })
    }
}

fn request_encoding(headers: &HeaderMap) -> Result<Encoding, DispatchError> {
    let raw = headers
        .get(CONTENT_TYPE)
        .map(|value| value.to_str().unwrap_or("<binary>"))
        .unwrap_or_default();
    Encoding::from_media_type(raw).ok_or_else(|| DispatchError::unsupported_content_type(raw))
}

fn reply_encoding(headers: &HeaderMap, request: Encoding) -> Result<Encoding, DispatchError> {
    let Some(value) = headers.get(ACCEPT) else {
        return Ok(request);
    };
    let accept = value
        .to_str()
        .map_err(|_| DispatchError::not_acceptable("<binary>"))?;
    if accept.trim().is_empty() {
        return Ok(request);
    }
    for entry in accept.split(',') {
        let essence = entry.split(';').next().unwrap_or_default().trim();
        if essence == "*/*" {
            return Ok(request);
        }
        if let Some(encoding) = Encoding::from_media_type(essence) {
            return Ok(encoding);
        }
    }
    Err(DispatchError::not_acceptable(accept))
}

async fn serve_request(State(adapter): State<Arc<HttpAdapter>>, request: Request<Body>) -> HttpReply {
    let (parts, body) = request.into_parts();
    let declared = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if let Some(size) = declared
        && size > adapter.max_request_bytes
    {
        return HttpReply::failure(&DispatchError::request_too_large(
            size,
            adapter.max_request_bytes,
        ));
    }

    let bytes = match axum::body::to_bytes(body, adapter.max_request_bytes).await {
        Ok(bytes) => bytes,
        Err(error) if exceeded_limit(&error) => {
            return HttpReply::failure(&DispatchError::body_too_large(adapter.max_request_bytes));
        }
        Err(error) => return HttpReply::failure(&DispatchError::read_body(error.to_string())),
    };
    let path = parts.uri.path().to_owned();
    let worker = tokio::task::spawn_blocking(move || adapter.handle(&path, &parts.headers, &bytes));
    match worker.await {
        Ok(reply) => reply,
        Err(error) => HttpReply::failure(&DispatchError::internal(format!(
            "HTTP worker failed: {error}"
        ))),
    }
}

/// Whether a body read stopped at the size cap rather than on an I/O fault.
fn exceeded_limit(error: &axum::Error) -> bool {
    let mut cause: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(current) = cause {
        if current.is::<LengthLimitError>() {
            return true;
        }
        cause = current.source();
    }
    false
}

/// Serves `router` on an already bound socket.
///
/// The server runs on a dedicated thread with its own multi-threaded tokio
/// runtime.
///
/// # Errors
///
/// Returns [`ListenerError::Runtime`] when the runtime cannot be built.
pub fn serve(listener: SocketListener, router: Router) -> Result<HttpHandle, ListenerError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name(concat!(env!("CARGO_PKG_NAME"), "-http"))
        .build()
        .map_err(|source| ListenerError::Runtime { source })?;
    let (endpoint, socket) = listener.into_parts();
    let (stop, stopped) = watch::channel(false);
    let thread = thread::spawn(move || {
        info!(target: LISTENER_TARGET, %endpoint, "HTTP surface active");
        let outcome = runtime.block_on(run_server(socket, router, stopped));
        info!(target: LISTENER_TARGET, %endpoint, "HTTP surface stopped");
        release(&endpoint);
        outcome
    });
    Ok(HttpHandle {
        stop,
        thread: Some(thread),
    })
}

async fn run_server(
    socket: BoundSocket,
    router: Router,
    mut stopped: watch::Receiver<bool>,
) -> Result<(), ListenerError> {
    let signal = async move {
        let _ = stopped.wait_for(|stop| *stop).await;
    };
    socket
        .set_nonblocking()
        .map_err(|source| ListenerError::NonBlocking { source })?;
    let serve_error = |source| ListenerError::Serve { source };
    match socket {
        BoundSocket::Tcp(listener) => {
            let listener = tokio::net::TcpListener::from_std(listener).map_err(serve_error)?;
            axum::serve(listener, router)
                .with_graceful_shutdown(signal)
                .await
                .map_err(serve_error)
        }
        #[cfg(unix)]
        BoundSocket::Unix(listener) => {
            let listener = tokio::net::UnixListener::from_std(listener).map_err(serve_error)?;
            axum::serve(listener, router)
                .with_graceful_shutdown(signal)
                .await
                .map_err(serve_error)
        }
    }
}

#[cfg(unix)]
fn release(endpoint: &SocketEndpoint) {
    cleanup_unix_socket(endpoint);
}

#[cfg(not(unix))]
fn release(_endpoint: &SocketEndpoint) {}

/// Handle to a running HTTP surface.
///
/// Dropping the handle requests shutdown without waiting for it.
pub struct HttpHandle {
    stop: watch::Sender<bool>,
    thread: Option<thread::JoinHandle<Result<(), ListenerError>>>,
}

impl HttpHandle {
    /// Asks the server to stop accepting and drain open connections.
    pub fn shutdown(&self) {
        self.stop.send_replace(true);
    }

    /// Waits for the server thread to finish.
    ///
    /// # Errors
    ///
    /// Returns the server's failure, or [`ListenerError::ThreadPanic`] when
    /// the thread panicked.
    pub fn join(mut self) -> Result<(), ListenerError> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| ListenerError::ThreadPanic)?,
            None => Ok(()),
        }
    }
}

impl Drop for HttpHandle {
    fn drop(&mut self) {
        self.stop.send_replace(true);
    }
}
