//! Error types for hostbridge.

use thiserror::Error;

/// Main error type for all bridge operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the underlying streams.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed XML on the wire (mismatched or unbalanced tags).
    #[error("parse error: {0}")]
    Parse(String),

    /// A second document began before the first one closed.
    #[error("need a new line between XML documents")]
    Pipelining,

    /// Well-formed XML that is not a valid call or response document.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer answered with an XML-RPC fault document.
    #[error("fault {code}: {message}")]
    Fault {
        /// Numeric fault code from the fault struct.
        code: i32,
        /// Human-readable fault description.
        message: String,
    },

    /// `hook` or `inject` was called after the import handshake ran.
    #[error("hooks and functions must be registered before the import handshake")]
    AlreadyImported,

    /// A hook callback returned the reserved null sentinel.
    #[error("hook functions are not allowed to return the null sentinel")]
    InvalidReturnValue,

    /// No handler is registered under the requested name.
    #[error("no handler registered for method `{0}`")]
    NoSuchMethod(String),

    /// The peer closed its end of the stream mid-exchange.
    ///
    /// This is the normal shutdown path, not a fault: the serve loop treats
    /// it exactly like [`Inbound::GoingDown`](crate::channel::Inbound) and
    /// exits cleanly.
    #[error("peer is going down")]
    GoingDown,

    /// A callback reported an unrecoverable failure.
    ///
    /// Hook and injected-function bodies construct this to abort the
    /// session; the serve loop reports the message to the host and
    /// shuts down.
    #[error("{0}")]
    Callback(String),
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
