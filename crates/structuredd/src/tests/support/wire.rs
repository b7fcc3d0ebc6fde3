//! Minimal HTTP/1.1 client for driving the HTTP surface over a real socket.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use structured_config::SocketEndpoint;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// A parsed HTTP response.
#[derive(Debug, Clone)]
pub struct HttpExchange {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Posts `body` to `path` on a TCP endpoint and reads the whole response.
pub fn post(
    endpoint: &SocketEndpoint,
    path: &str,
    content_type: &str,
    accept: Option<&str>,
    body: &[u8],
) -> Result<HttpExchange, String> {
    let SocketEndpoint::Tcp { host, port } = endpoint else {
        return Err(format!("HTTP tests need a TCP endpoint, got {endpoint}"));
    };
    let mut stream = TcpStream::connect((host.as_str(), *port))
        .map_err(|error| format!("connect to {endpoint}: {error}"))?;
    stream
        .set_read_timeout(Some(IO_TIMEOUT))
        .map_err(|error| error.to_string())?;

    let mut request = format!(
        "POST {path} HTTP/1.1\r\nHost: {host}\r\nContent-Type: {content_type}\r\n\
         Content-Length: {}\r\nConnection: close\r\n",
        body.len()
    );
    if let Some(accept) = accept {
        request.push_str(&format!("Accept: {accept}\r\n"));
    }
    request.push_str("\r\n");
    let mut wire = request.into_bytes();
    wire.extend_from_slice(body);
    stream
        .write_all(&wire)
        .map_err(|error| format!("write request: {error}"))?;

    let mut response = Vec::new();
    stream
        .read_to_end(&mut response)
        .map_err(|error| format!("read response: {error}"))?;
    parse(&response)
}

fn parse(response: &[u8]) -> Result<HttpExchange, String> {
    let split = response
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .ok_or("response has no header terminator")?;
    let head = std::str::from_utf8(&response[..split]).map_err(|error| error.to_string())?;
    let mut lines = head.split("\r\n");
    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| format!("malformed status line in {head:?}"))?;
    let content_type = lines.find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.eq_ignore_ascii_case("content-type")
            .then(|| value.trim().to_owned())
    });
    Ok(HttpExchange {
        status,
        content_type,
        body: response[split + 4..].to_vec(),
    })
}
