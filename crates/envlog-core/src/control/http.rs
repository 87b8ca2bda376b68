//! Minimal HTTP/1.1 front end for the control surface.
//!
//! One request per connection. Only the request line matters: the method and
//! every header are ignored, and the connection is closed after the response.

use core::fmt::Write as _;

use embedded_io_async::{ErrorType, Read, Write};
use log::{debug, warn};

use super::{ControlSurface, Operation, ResponseSink};
use crate::sampling::MeasurementSource;
use crate::storage::{LogVolume, StorageMedium};

/// Largest request head that is buffered. Longer heads are cut off, which is
/// harmless as long as the request line fits.
pub const MAX_REQUEST_HEAD: usize = 512;

const NOT_FOUND_BODY: &str = "Not found.";
const BAD_REQUEST_BODY: &str = "Bad request.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Operation(Operation),
    NotFound,
    BadRequest,
}

/// Resolve the request line of `head`.
fn route(head: &[u8]) -> Route {
    let Ok(head) = core::str::from_utf8(head) else {
        // A cut-off multi-byte character in a header is not the request line's problem
        return match head.iter().position(|&b| b == b'\n') {
            Some(end) => route(&head[..end]),
            None => Route::BadRequest,
        };
    };

    let request_line = head.lines().next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (Some(_method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Route::BadRequest;
    };

    if !version.starts_with("HTTP/") || !target.starts_with('/') {
        return Route::BadRequest;
    }

    let path = target.split(['?', '#']).next().unwrap_or_default();
    match Operation::from_path(path) {
        Some(operation) => Route::Operation(operation),
        None => Route::NotFound,
    }
}

/// Read until the end of the head, the buffer fills up or the peer stops sending.
async fn read_head<C: Read>(conn: &mut C, buf: &mut [u8]) -> Result<usize, C::Error> {
    let mut len = 0;

    while len < buf.len() {
        let read = conn.read(&mut buf[len..]).await?;
        if read == 0 {
            break;
        }
        len += read;

        if buf[..len].windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    Ok(len)
}

/// Writes one HTTP response with a known body length.
pub struct HttpResponse<'c, C> {
    conn: &'c mut C,
    status: &'static str,
}

impl<'c, C: Write> HttpResponse<'c, C> {
    fn ok(conn: &'c mut C) -> Self {
        Self {
            conn,
            status: "200 OK",
        }
    }
}

impl<C: Write> ResponseSink for HttpResponse<'_, C> {
    type Error = C::Error;

    async fn begin(&mut self, len: usize) -> Result<(), Self::Error> {
        let mut head: heapless::String<160> = heapless::String::new();
        // Status line and three short headers always fit
        let _ = write!(
            head,
            "HTTP/1.1 {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            len
        );

        self.conn.write_all(head.as_bytes()).await
    }

    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), Self::Error> {
        self.conn.write_all(chunk).await
    }

    async fn finish(self) -> Result<(), Self::Error> {
        self.conn.flush().await
    }
}

/// Answer one HTTP request on `conn`.
///
/// The caller owns the connection and closes it afterwards.
pub async fn serve_connection<C, T, V, M>(
    conn: &mut C,
    surface: &ControlSurface<'_, T, V, M>,
) -> Result<(), <C as ErrorType>::Error>
where
    C: Read + Write,
    T: MeasurementSource,
    V: LogVolume,
    M: StorageMedium,
{
    let mut buf = [0u8; MAX_REQUEST_HEAD];
    let len = read_head(conn, &mut buf).await?;

    match route(&buf[..len]) {
        Route::Operation(operation) => {
            debug!("Control request: {}", operation.name());
            surface.handle(operation, HttpResponse::ok(conn)).await
        }
        Route::NotFound => {
            let response = HttpResponse {
                conn,
                status: "404 Not Found",
            };
            response.respond(NOT_FOUND_BODY).await
        }
        Route::BadRequest => {
            warn!("Rejecting malformed HTTP request ({} bytes)", len);
            let response = HttpResponse {
                conn,
                status: "400 Bad Request",
            };
            response.respond(BAD_REQUEST_BODY).await
        }
    }
}
