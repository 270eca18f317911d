//! # hostbridge
//!
//! Synchronous XML-RPC bridge for writing out-of-process wiki plugins.
//!
//! The host spawns the plugin and drives an ad-hoc application protocol
//! over the plugin's stdin/stdout: one XML-RPC document per line-terminated
//! write, delimited purely by balanced tags, strictly one exchange in
//! flight at a time. A plugin registers hooks and injected functions on a
//! [`Session`], the host triggers the one-time `import` handshake, and the
//! session then serves calls until the host closes the stream.
//!
//! ## Example
//!
//! ```no_run
//! use hostbridge::{SessionBuilder, Value};
//!
//! # fn main() -> hostbridge::Result<()> {
//! let mut session = SessionBuilder::new("myplugin").over_stdio();
//! session.hook("pagetemplate", "myhook", |host, params| {
//!     let page = params.first().and_then(Value::as_str).unwrap_or_default();
//!     host.setvar("pagestate", page, Some(Value::from("seen")))?;
//!     Ok(None)
//! })?;
//! session.run_to_exit()
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod protocol;
pub mod registry;
pub mod session;

mod error;

pub use channel::{Channel, Inbound};
pub use codec::Value;
pub use error::{Error, Result};
pub use registry::{Invocable, MethodRegistry};
pub use session::{
    Arg, HookRegistration, InjectedFunction, RpcContext, Session, SessionBuilder, SessionState,
    EX_SOFTWARE, IMPORT_METHOD,
};
