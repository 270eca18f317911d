//! Protocol module: framing of XML documents over the line-buffered stream.

mod boundary;

pub use boundary::DocumentBuffer;
