//! Document boundary detection for the line-buffered XML stream.
//!
//! Documents on this channel carry no length prefix or terminator; a
//! document is delimited purely by balanced nested tags, so the receiver
//! tracks nesting depth itself. [`DocumentBuffer`] accumulates chunks of
//! text (one line per read, but any split is tolerated, including a tag cut
//! in half) and yields the full text of exactly one top-level document once
//! its root element closes.
//!
//! The transport contract is one document per line-terminated write. A peer
//! that starts a second document before the first one closes has violated
//! framing, and the framing state can no longer be trusted; that surfaces
//! as [`Error::Pipelining`] rather than being silently concatenated.

use crate::error::{Error, Result};

/// Incremental detector for one complete top-level XML document.
///
/// Internal state is fully reset each time a document is extracted, so one
/// buffer instance can frame an arbitrary sequence of documents.
pub struct DocumentBuffer {
    /// Accumulated raw text, returned verbatim on completion.
    buf: String,
    /// Scan offset: everything before this has been tokenized.
    pos: usize,
    /// Names of currently open elements.
    stack: Vec<String>,
    /// Whether the document's root element has been seen.
    seen_root: bool,
}

impl DocumentBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            buf: String::new(),
            pos: 0,
            stack: Vec::new(),
            seen_root: false,
        }
    }

    /// Feed one chunk of text.
    ///
    /// Returns `Ok(Some(document))` once the root element has closed; the
    /// returned text is everything accumulated since the last extraction,
    /// so it includes any trailing text of the completing chunk (typically
    /// the line terminator). Text fed after the extraction — a line
    /// terminator split into its own chunk, or blank lines between
    /// documents — is retained and carried into the next document instead.
    /// Returns `Ok(None)` while more input is needed. Partial input, down
    /// to a tag split across chunks, is retained for the next call.
    ///
    /// # Errors
    ///
    /// [`Error::Parse`] on a mismatched or unmatched closing tag, or on a
    /// second root element after the first closed. [`Error::Pipelining`] if
    /// a new document's XML declaration appears before the current document
    /// is consumed.
    pub fn feed(&mut self, chunk: &str) -> Result<Option<String>> {
        self.buf.push_str(chunk);
        self.scan()?;
        if self.complete() {
            let doc = std::mem::take(&mut self.buf);
            self.reset();
            return Ok(Some(doc));
        }
        Ok(None)
    }

    /// A document is complete exactly when the root has been seen and every
    /// opened element has closed again.
    fn complete(&self) -> bool {
        self.seen_root && self.stack.is_empty()
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.pos = 0;
        self.stack.clear();
        self.seen_root = false;
    }

    /// Tokenize everything buffered so far, stopping at a partial tag.
    ///
    /// The wire protocol uses no attributes outside the XML declaration, so
    /// a `>` never occurs inside a tag and scanning for it is safe.
    fn scan(&mut self) -> Result<()> {
        while let Some(open) = self.buf[self.pos..].find('<') {
            let tag_start = self.pos + open;
            let rest = &self.buf[tag_start..];

            if rest.starts_with("<?") {
                let Some(end) = rest.find("?>") else {
                    break; // declaration not complete yet
                };
                if self.seen_root {
                    return Err(Error::Pipelining);
                }
                self.pos = tag_start + end + 2;
                continue;
            }

            let Some(end) = rest.find('>') else {
                break; // tag not complete yet
            };
            let tag = &rest[1..end];
            self.pos = tag_start + end + 1;

            if let Some(name) = tag.strip_prefix('/') {
                let name = name.trim();
                match self.stack.pop() {
                    Some(top) if top == name => {}
                    Some(top) => {
                        return Err(Error::Parse(format!(
                            "expected {top} closing tag, got {name}"
                        )));
                    }
                    None => {
                        return Err(Error::Parse(format!("unexpected closing tag {name}")));
                    }
                }
            } else {
                if self.seen_root && self.stack.is_empty() {
                    // Second root element in the same unconsumed input.
                    return Err(Error::Parse(
                        "junk after document element".to_string(),
                    ));
                }
                let self_closing = tag.ends_with('/');
                let body = tag.trim_end_matches('/');
                let name = body
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_string();
                if name.is_empty() {
                    return Err(Error::Parse("empty tag name".to_string()));
                }
                self.seen_root = true;
                if !self_closing {
                    self.stack.push(name);
                }
            }
        }
        Ok(())
    }
}

impl Default for DocumentBuffer {
    fn default() -> Self {
        Self::new()
    }
}
