//! Network-triggered control operations.
//!
//! Each invocation produces exactly one text response. Storage problems are
//! folded into the response text and never propagate to the transport. The
//! log is streamed to the transport in [`READ_CHUNK`] pieces rather than
//! buffered.

pub mod http;

use core::future::Future;

use log::{error, info};

use crate::reading::{LogEntry, ReadingStore};
use crate::sampling::MeasurementSource;
use crate::storage::{
    ClearOutcome, LogVolume, NO_STORAGE_MESSAGE, PersistentLog, READ_CHUNK, StorageMedium,
};

/// Confirmation sent for every clear request, whether or not storage was present.
pub const LOG_CLEARED_MESSAGE: &str = "Log cleared.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetReading,
    GetLog,
    ClearLog,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Self::GetReading, Self::GetLog, Self::ClearLog];

    /// Resolve an endpoint name. Leading and trailing slashes are ignored.
    pub fn from_path(path: &str) -> Option<Self> {
        match path.trim_matches('/') {
            "getreading" => Some(Self::GetReading),
            "getlog" => Some(Self::GetLog),
            "clearlog" => Some(Self::ClearLog),
            _ => None,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::GetReading => "getreading",
            Self::GetLog => "getlog",
            Self::ClearLog => "clearlog",
        }
    }
}

/// Where the single response of an invocation goes.
///
/// A response is `begin`, any number of `write_chunk` calls adding up to the
/// announced length, then `finish`. `finish` and `respond` take the sink by
/// value, so a handler cannot answer twice.
pub trait ResponseSink: Sized {
    type Error;

    /// Start a response whose body is exactly `len` bytes.
    fn begin(&mut self, len: usize) -> impl Future<Output = Result<(), Self::Error>>;

    fn write_chunk(&mut self, chunk: &[u8]) -> impl Future<Output = Result<(), Self::Error>>;

    fn finish(self) -> impl Future<Output = Result<(), Self::Error>>;

    /// Send `body` as the whole response.
    fn respond(mut self, body: &str) -> impl Future<Output = Result<(), Self::Error>> {
        async move {
            self.begin(body.len()).await?;
            self.write_chunk(body.as_bytes()).await?;
            self.finish().await
        }
    }
}

pub struct ControlSurface<'a, T, V, M> {
    source: &'a T,
    store: &'a ReadingStore,
    log: &'a PersistentLog<V, M>,
}

impl<'a, T, V, M> ControlSurface<'a, T, V, M>
where
    T: MeasurementSource,
    V: LogVolume,
    M: StorageMedium,
{
    pub fn new(source: &'a T, store: &'a ReadingStore, log: &'a PersistentLog<V, M>) -> Self {
        Self { source, store, log }
    }

    /// Run `operation` and hand its response to `sink`.
    pub async fn handle<R: ResponseSink>(&self, operation: Operation, sink: R) -> Result<(), R::Error> {
        match operation {
            Operation::GetReading => {
                self.source.request_measurement();
                // Reports the last completed reading, not the one just requested
                let entry = LogEntry::from(&self.store.snapshot());
                sink.respond(entry.as_str()).await
            }
            Operation::GetLog => self.send_log(sink).await,
            Operation::ClearLog => {
                match self.log.clear().await {
                    Ok(ClearOutcome::Cleared) => info!("Log cleared on request"),
                    Ok(ClearOutcome::Skipped) => {}
                    Err(e) => error!("Failed to clear log for control request: {}", e),
                }
                sink.respond(LOG_CLEARED_MESSAGE).await
            }
        }
    }

    /// Stream the log file to `sink` while holding the log lock.
    async fn send_log<R: ResponseSink>(&self, mut sink: R) -> Result<(), R::Error> {
        let mut reader = match self.log.reader().await {
            Ok(Some(reader)) => reader,
            Ok(None) => return sink.respond(NO_STORAGE_MESSAGE).await,
            Err(e) => {
                error!("Failed to read log for control request: {}", e);
                return sink.respond(NO_STORAGE_MESSAGE).await;
            }
        };

        let len = reader.len();
        sink.begin(len).await?;

        let mut buf = [0u8; READ_CHUNK];
        let mut sent = 0;
        while sent < len {
            match reader.read_at(sent, &mut buf) {
                Ok(0) => {
                    error!("Log ended {} bytes short of its size", len - sent);
                    break;
                }
                Ok(read) => {
                    sink.write_chunk(&buf[..read]).await?;
                    sent += read;
                }
                // The length is already announced, so the body just ends early
                Err(e) => {
                    error!("Failed to read log at byte {}: {}", sent, e);
                    break;
                }
            }
        }

        sink.finish().await
    }
}

/// Sink that stores the response for inspection.
#[cfg(test)]
pub(crate) struct CapturedResponse<'a> {
    cell: &'a core::cell::RefCell<Option<alloc::string::String>>,
    chunks: Option<&'a core::cell::Cell<usize>>,
    announced: Option<usize>,
    body: alloc::vec::Vec<u8>,
}

#[cfg(test)]
impl<'a> CapturedResponse<'a> {
    pub(crate) fn new(cell: &'a core::cell::RefCell<Option<alloc::string::String>>) -> Self {
        Self {
            cell,
            chunks: None,
            announced: None,
            body: alloc::vec::Vec::new(),
        }
    }

    /// Also count the `write_chunk` calls into `chunks`.
    pub(crate) fn counting_chunks(mut self, chunks: &'a core::cell::Cell<usize>) -> Self {
        self.chunks = Some(chunks);
        self
    }
}

#[cfg(test)]
impl ResponseSink for CapturedResponse<'_> {
    type Error = core::convert::Infallible;

    async fn begin(&mut self, len: usize) -> Result<(), Self::Error> {
        assert!(self.announced.replace(len).is_none(), "began twice");
        Ok(())
    }

    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), Self::Error> {
        assert!(self.announced.is_some(), "wrote before begin");
        self.body.extend_from_slice(chunk);
        if let Some(chunks) = self.chunks {
            chunks.set(chunks.get() + 1);
        }
        Ok(())
    }

    async fn finish(self) -> Result<(), Self::Error> {
        assert_eq!(self.announced, Some(self.body.len()), "length mismatch");
        let body = alloc::string::String::from_utf8(self.body).unwrap();
        let previous = self.cell.borrow_mut().replace(body);
        assert!(previous.is_none(), "responded twice");
        Ok(())
    }
}
