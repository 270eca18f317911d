//! The RPC channel: one write-then-block-read exchange at a time.
//!
//! The channel owns the two streams and is the only component that touches
//! them. The protocol is strictly half-duplex: a write is always followed by
//! a blocking read for the matching response (or, when serving, a blocking
//! read for the next call), and no second write is issued before that read
//! completes. That discipline is enforced by the session, not here.
//!
//! End-of-stream on the inbound side means the host has terminated the
//! session. It is reported as an explicit variant ([`Inbound::GoingDown`],
//! or [`Error::GoingDown`] when a response was still owed), never conflated
//! with an empty line: only a zero-byte read counts as end-of-stream.

use std::io::{BufRead, Write};

use tracing::debug;

use crate::codec::{self, Document, Value};
use crate::error::{Error, Result};
use crate::protocol::DocumentBuffer;

/// Result of one blocking read on the serve path.
#[derive(Debug)]
pub enum Inbound {
    /// The host invoked a procedure on us.
    Call {
        /// Procedure name.
        method: String,
        /// Ordered parameter list.
        params: Vec<Value>,
    },
    /// The host closed its end of the stream; time to shut down cleanly.
    GoingDown,
}

/// Synchronous call/response channel over a reader/writer pair.
pub struct Channel<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> Channel<R, W> {
    /// Create a channel over the given streams.
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Issue one outbound call and block until its response arrives.
    ///
    /// # Errors
    ///
    /// [`Error::GoingDown`] if the host closes the stream before answering,
    /// [`Error::Fault`] if it answers with a fault document, and the usual
    /// framing/parse errors for malformed input.
    pub fn call(&mut self, method: &str, params: &[Value]) -> Result<Value> {
        let doc = codec::encode_call(method, params);
        debug!(method, "calling host procedure");
        self.write_document(&doc)?;

        debug!(method, "reading response from host");
        let Some(text) = self.read_document()? else {
            debug!("host is going down, and so are we");
            return Err(Error::GoingDown);
        };
        match codec::decode(&text)? {
            Document::Response(value) => {
                debug!(method, %value, "host procedure returned");
                Ok(value)
            }
            Document::Fault { code, message } => Err(Error::Fault { code, message }),
            Document::Call { method, .. } => Err(Error::Protocol(format!(
                "expected a response, got a call to `{method}`"
            ))),
        }
    }

    /// Block until the host sends the next procedure call, or goes down.
    pub fn receive(&mut self) -> Result<Inbound> {
        debug!("waiting for procedure calls from host");
        let Some(text) = self.read_document()? else {
            debug!("host is going down, and so are we");
            return Ok(Inbound::GoingDown);
        };
        match codec::decode(&text)? {
            Document::Call { method, params } => {
                debug!(method, "received procedure call from host");
                Ok(Inbound::Call { method, params })
            }
            Document::Response(_) | Document::Fault { .. } => Err(Error::Protocol(
                "expected a call, got an unsolicited response".to_string(),
            )),
        }
    }

    /// Answer the current inbound call with a single return value.
    pub fn respond(&mut self, value: &Value) -> Result<()> {
        self.write_document(&codec::encode_response(value))
    }

    /// Answer the current inbound call with a fault document.
    pub fn respond_fault(&mut self, code: i32, message: &str) -> Result<()> {
        self.write_document(&codec::encode_fault(code, message))
    }

    /// Write one document atomically and flush it out.
    fn write_document(&mut self, doc: &str) -> Result<()> {
        self.writer.write_all(doc.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    /// Blocking line-reads into the boundary detector until one document
    /// completes. `Ok(None)` means the stream is closed.
    fn read_document(&mut self) -> Result<Option<String>> {
        let mut buffer = DocumentBuffer::new();
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line)?;
            if n == 0 {
                // Zero-byte read: the peer exited. An empty line would have
                // read at least the newline.
                return Ok(None);
            }
            if let Some(doc) = buffer.feed(&line)? {
                return Ok(Some(doc));
            }
        }
    }
}
