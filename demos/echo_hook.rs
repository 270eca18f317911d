//! Echo plugin - minimal hook and injected-function example.
//!
//! This example demonstrates:
//! - Building a session over stdin/stdout with the builder pattern
//! - Registering a hook into the host's `pagetemplate` chain
//! - Injecting a function the host can call by name
//! - Issuing a nested call back to the host from inside a callback
//!
//! The host spawns this binary, drives the `import` handshake, and then
//! calls the registered names. Diagnostics go to stderr so they never mix
//! with the protocol stream on stdout.

use hostbridge::{SessionBuilder, Value};

fn main() -> hostbridge::Result<()> {
    // Protocol documents travel on stdout; logs must stay on stderr.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut session = SessionBuilder::new("echo_hook").over_stdio();

    // Runs once per page render; echoes the page name into a host variable.
    session.hook("pagetemplate", "echo_pagetemplate", |host, params| {
        let page = params.first().and_then(Value::as_str).unwrap_or_default();
        host.setvar("pagestate", page, Some(Value::from(page)))?;
        Ok(None)
    })?;

    // Callable from the host as IkiWiki::echo.
    session.inject("IkiWiki::echo", "echo", |_host, params| {
        Ok(params.first().cloned())
    })?;

    session.run_to_exit()
}
