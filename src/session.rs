//! The session a plugin author interacts with.
//!
//! A [`Session`] accumulates hook and function registrations, answers the
//! host's reserved `import` call by publishing them, and then serves inbound
//! procedure calls until the host goes down. It owns both streams; nothing
//! else reads or writes them. All construction goes through
//! [`SessionBuilder`] — there is no process-wide state.
//!
//! Absent values: internal code uses `Option<Value>` (the [`Arg`] alias).
//! The wire encoding has no native null, so the session substitutes the
//! reserved sentinel struct for `None` just before encoding and reverses
//! the substitution on decoded results. The sentinel itself is therefore
//! not a legal callback return value; hook wrappers reject it.

use std::io::{self, BufRead, Stdin, Stdout, Write};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::channel::{Channel, Inbound};
use crate::codec::Value;
use crate::error::{Error, Result};
use crate::registry::MethodRegistry;

/// Reserved procedure name the host calls to trigger the handshake.
pub const IMPORT_METHOD: &str = "import";

/// Standard "internal software error" exit status (sysexits).
pub const EX_SOFTWARE: i32 = 70;

/// Cooperative yield between serve-loop iterations. Bounds CPU use while
/// ping-ponging with the host, not a correctness requirement.
const LOOP_DELAY: Duration = Duration::from_millis(100);

/// Fault code used when the host calls a name we never registered.
const NO_SUCH_METHOD_FAULT: i32 = 1;

/// An argument or return value that may be absent.
pub type Arg = Option<Value>;

/// Outbound calls available to callback bodies.
///
/// A hook or injected function runs while the host is blocked reading our
/// response, so it may issue nested calls back to the host over the same
/// channel without violating the one-outstanding-exchange discipline.
///
/// The convenience methods are thin wrappers over [`rpc`](Self::rpc).
pub trait RpcContext {
    /// Issue one outbound call with positional and named arguments.
    ///
    /// Named arguments are flattened onto the positional list as
    /// alternating name/value pairs, the layout the host expects. Every
    /// `None` argument travels as the null sentinel; a sentinel result
    /// comes back as `None`.
    fn rpc_named(&mut self, cmd: &str, args: &[Arg], named: &[(&str, Arg)]) -> Result<Arg>;

    /// Issue one outbound call with positional arguments only.
    fn rpc(&mut self, cmd: &str, args: &[Arg]) -> Result<Arg> {
        self.rpc_named(cmd, args, &[])
    }

    /// Fetch the host's argument vector.
    fn getargv(&mut self) -> Result<Arg> {
        self.rpc("getargv", &[])
    }

    /// Replace the host's argument vector.
    fn setargv(&mut self, argv: Vec<Value>) -> Result<Arg> {
        self.rpc("setargv", &[Some(Value::Array(argv))])
    }

    /// Read a keyed variable from the host.
    fn getvar(&mut self, table: &str, key: &str) -> Result<Arg> {
        self.rpc("getvar", &[Some(table.into()), Some(key.into())])
    }

    /// Set a keyed variable on the host.
    fn setvar(&mut self, table: &str, key: &str, value: Arg) -> Result<Arg> {
        self.rpc("setvar", &[Some(table.into()), Some(key.into()), value])
    }

    /// Read page-scoped keyed state.
    fn getstate(&mut self, page: &str, id: &str, key: &str) -> Result<Arg> {
        self.rpc(
            "getstate",
            &[Some(page.into()), Some(id.into()), Some(key.into())],
        )
    }

    /// Write page-scoped keyed state.
    fn setstate(&mut self, page: &str, id: &str, key: &str, value: Arg) -> Result<Arg> {
        self.rpc(
            "setstate",
            &[Some(page.into()), Some(id.into()), Some(key.into()), value],
        )
    }

    /// Ask the host to match a page specification.
    fn pagespec_match(&mut self, spec: &str) -> Result<Arg> {
        self.rpc("pagespec_match", &[Some(spec.into())])
    }

    /// Report a fatal error to the host, then terminate this process with
    /// [`EX_SOFTWARE`].
    ///
    /// The report is best-effort: if the host is already gone the failure
    /// to deliver it is discarded. Unrelated I/O failures are logged, not
    /// silently swallowed.
    fn error(&mut self, msg: &str) -> ! {
        match self.rpc("error", &[Some(msg.into())]) {
            Ok(_) | Err(Error::GoingDown) => {}
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe => {}
            Err(e) => warn!(error = %e, "could not report error to host"),
        }
        std::process::exit(EX_SOFTWARE)
    }
}

/// "Register callback `name` into the host's `hook_type` chain."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookRegistration {
    /// Plugin id the hook is tagged with.
    pub id: String,
    /// Name of the host processing chain.
    pub hook_type: String,
    /// Name the callback is registered (and dispatched) under.
    pub name: String,
    /// Force the hook to run last in its chain.
    pub last: bool,
}

/// "Expose local callable `local_name` as host procedure `remote_name`."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedFunction {
    /// Name the host publishes the function under.
    pub remote_name: String,
    /// Name the host calls back on this session.
    pub local_name: String,
    /// Whether the host may cache results.
    pub memoize: bool,
}

/// Session lifecycle. Registration is only legal in `Registering`; the
/// transition to `Imported` is irreversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting `hook`/`inject` registrations; handshake not yet run.
    Registering,
    /// The import handshake completed.
    Imported,
    /// The serve loop is blocking on inbound calls.
    Serving,
    /// The host went down and the serve loop exited.
    Terminated,
}

/// Builder for a [`Session`]: plugin id plus the two streams.
pub struct SessionBuilder {
    id: String,
}

impl SessionBuilder {
    /// Start building a session for the plugin named `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Finish the build over an explicit reader/writer pair.
    pub fn over<R: BufRead, W: Write>(self, reader: R, writer: W) -> Session<R, W> {
        Session {
            id: self.id,
            peer: Peer {
                channel: Channel::new(reader, writer),
            },
            registry: MethodRegistry::new(),
            hooks: Vec::new(),
            functions: Vec::new(),
            state: SessionState::Registering,
        }
    }

    /// Finish the build over this process's stdin and stdout, the streams
    /// the host wires up when it spawns the plugin.
    pub fn over_stdio(self) -> Session<io::BufReader<Stdin>, Stdout> {
        self.over(io::BufReader::new(io::stdin()), io::stdout())
    }
}

/// The host side of the channel; implements [`RpcContext`] for callbacks.
struct Peer<R, W> {
    channel: Channel<R, W>,
}

impl<R: BufRead, W: Write> RpcContext for Peer<R, W> {
    fn rpc_named(&mut self, cmd: &str, args: &[Arg], named: &[(&str, Arg)]) -> Result<Arg> {
        let mut params: Vec<Value> = args.iter().map(to_wire).collect();
        for (name, value) in named {
            params.push(Value::from(*name));
            params.push(to_wire(value));
        }
        let ret = self.channel.call(cmd, &params)?;
        Ok(from_wire(ret))
    }
}

fn to_wire(arg: &Arg) -> Value {
    arg.clone().unwrap_or_else(Value::null_sentinel)
}

fn from_wire(value: Value) -> Arg {
    if value.is_null_sentinel() {
        None
    } else {
        Some(value)
    }
}

/// One plugin session over a pair of byte streams.
pub struct Session<R, W> {
    id: String,
    peer: Peer<R, W>,
    registry: MethodRegistry,
    hooks: Vec<HookRegistration>,
    functions: Vec<InjectedFunction>,
    state: SessionState,
}

impl<R: BufRead, W: Write> Session<R, W> {
    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Hooks registered so far, in registration order.
    pub fn hooks(&self) -> &[HookRegistration] {
        &self.hooks
    }

    /// Injected functions registered so far, in registration order.
    pub fn functions(&self) -> &[InjectedFunction] {
        &self.functions
    }

    /// Register `callback` into the host's `hook_type` chain under `name`,
    /// tagged with this session's plugin id and not forced last.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyImported`] once the handshake has run; the
    /// registration sets are left untouched.
    pub fn hook<F>(&mut self, hook_type: &str, name: &str, callback: F) -> Result<()>
    where
        F: FnMut(&mut dyn RpcContext, &[Value]) -> Result<Arg> + 'static,
    {
        self.hook_opts(hook_type, name, None, false, callback)
    }

    /// [`hook`](Self::hook) with an explicit tag id and last-flag.
    pub fn hook_opts<F>(
        &mut self,
        hook_type: &str,
        name: &str,
        id: Option<&str>,
        last: bool,
        mut callback: F,
    ) -> Result<()>
    where
        F: FnMut(&mut dyn RpcContext, &[Value]) -> Result<Arg> + 'static,
    {
        if self.state != SessionState::Registering {
            return Err(Error::AlreadyImported);
        }
        let registration = HookRegistration {
            id: id.unwrap_or(&self.id).to_string(),
            hook_type: hook_type.to_string(),
            name: name.to_string(),
            last,
        };
        // The sentinel is reserved to mean "no return value"; a callback
        // returning it literally would be ambiguous with returning nothing.
        let guarded = move |host: &mut dyn RpcContext, params: &[Value]| -> Result<Arg> {
            let ret = callback(host, params)?;
            if ret.as_ref().is_some_and(Value::is_null_sentinel) {
                return Err(Error::InvalidReturnValue);
            }
            Ok(ret)
        };
        self.registry.register(name, guarded);
        self.hooks.push(registration);
        Ok(())
    }

    /// Expose `callback` to the host as procedure `remote_name`, dispatched
    /// locally under `local_name`, with memoization allowed.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyImported`] once the handshake has run.
    pub fn inject<F>(&mut self, remote_name: &str, local_name: &str, callback: F) -> Result<()>
    where
        F: FnMut(&mut dyn RpcContext, &[Value]) -> Result<Arg> + 'static,
    {
        self.inject_opts(remote_name, local_name, true, callback)
    }

    /// [`inject`](Self::inject) with an explicit memoize flag.
    pub fn inject_opts<F>(
        &mut self,
        remote_name: &str,
        local_name: &str,
        memoize: bool,
        callback: F,
    ) -> Result<()>
    where
        F: FnMut(&mut dyn RpcContext, &[Value]) -> Result<Arg> + 'static,
    {
        if self.state != SessionState::Registering {
            return Err(Error::AlreadyImported);
        }
        self.registry.register(local_name, callback);
        self.functions.push(InjectedFunction {
            remote_name: remote_name.to_string(),
            local_name: local_name.to_string(),
            memoize,
        });
        Ok(())
    }

    /// Issue one outbound call; see [`RpcContext::rpc`].
    pub fn rpc(&mut self, cmd: &str, args: &[Arg]) -> Result<Arg> {
        self.peer.rpc(cmd, args)
    }

    /// Borrow the session as an [`RpcContext`], for the convenience call
    /// surface (`getvar`, `setstate`, `pagespec_match`, ...).
    pub fn host(&mut self) -> &mut dyn RpcContext {
        &mut self.peer
    }

    /// Serve inbound calls until the host goes down.
    ///
    /// Returns `Ok(())` on clean shutdown (end-of-stream, observed either
    /// between requests or mid-dispatch by a nested call). Any other
    /// failure is first reported to the host via a best-effort `error`
    /// call, then returned; [`run_to_exit`](Self::run_to_exit) maps it to
    /// [`EX_SOFTWARE`].
    pub fn run(&mut self) -> Result<()> {
        match self.serve() {
            Ok(()) | Err(Error::GoingDown) => {
                self.state = SessionState::Terminated;
                Ok(())
            }
            Err(e) => {
                self.report_error(&format!("uncaught exception: {e}\n{e:?}"));
                Err(e)
            }
        }
    }

    /// Serve inbound calls and exit the process when done: 0 on clean
    /// shutdown, [`EX_SOFTWARE`] on failure.
    pub fn run_to_exit(mut self) -> ! {
        match self.run() {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                tracing::error!(error = %e, "session failed");
                std::process::exit(EX_SOFTWARE)
            }
        }
    }

    fn serve(&mut self) -> Result<()> {
        loop {
            if self.state == SessionState::Imported {
                self.state = SessionState::Serving;
            }
            match self.peer.channel.receive()? {
                Inbound::GoingDown => return Ok(()),
                Inbound::Call { method, params } => {
                    match self.dispatch(&method, &params) {
                        Ok(ret) => {
                            self.peer.channel.respond(&to_wire(&ret))?;
                        }
                        Err(Error::NoSuchMethod(name)) => {
                            debug!(method = %name, "host called an unregistered method");
                            self.peer.channel.respond_fault(
                                NO_SUCH_METHOD_FAULT,
                                &format!("no handler registered for method `{name}`"),
                            )?;
                        }
                        Err(e) => return Err(e),
                    }
                    thread::sleep(LOOP_DELAY);
                }
            }
        }
    }

    /// Route one inbound call: the reserved import entry point, or a
    /// registered hook/function.
    fn dispatch(&mut self, method: &str, params: &[Value]) -> Result<Arg> {
        if method == IMPORT_METHOD {
            return self.handle_import();
        }
        self.registry.dispatch(method, &mut self.peer, params)
    }

    /// The registration burst: one `hook` call per hook, one `inject` call
    /// per function, each acknowledged before the next is sent. Replies to
    /// the host with nothing (the sentinel, on the wire).
    fn handle_import(&mut self) -> Result<Arg> {
        debug!("importing");
        for hook in &self.hooks {
            debug!(
                id = %hook.id,
                name = %hook.name,
                chain = %hook.hook_type,
                "hooking into host chain"
            );
            self.peer.channel.call(
                "hook",
                &[
                    Value::from("id"),
                    Value::from(hook.id.as_str()),
                    Value::from("type"),
                    Value::from(hook.hook_type.as_str()),
                    Value::from("call"),
                    Value::from(hook.name.as_str()),
                    Value::from("last"),
                    Value::Bool(hook.last),
                ],
            )?;
        }
        for function in &self.functions {
            debug!(
                local = %function.local_name,
                remote = %function.remote_name,
                "injecting function"
            );
            self.peer.channel.call(
                "inject",
                &[
                    Value::from("name"),
                    Value::from(function.remote_name.as_str()),
                    Value::from("call"),
                    Value::from(function.local_name.as_str()),
                    Value::from("memoize"),
                    Value::Bool(function.memoize),
                ],
            )?;
        }
        self.state = SessionState::Imported;
        Ok(None)
    }

    /// Best-effort failure report to the host. Swallows delivery failures
    /// when the peer is already gone; logs anything else.
    fn report_error(&mut self, msg: &str) {
        match self.peer.rpc("error", &[Some(msg.into())]) {
            Ok(_) | Err(Error::GoingDown) => {}
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe => {}
            Err(e) => warn!(error = %e, "could not report error to host"),
        }
    }
}
