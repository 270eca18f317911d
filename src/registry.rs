//! Method registry for dispatching inbound calls by name.
//!
//! Handlers are stored behind the [`Invocable`] trait rather than as bare
//! duck-typed callables, so dispatch stays statically checkable. Closures of
//! the right shape get the trait for free via a blanket impl.

use std::collections::HashMap;

use crate::codec::Value;
use crate::error::{Error, Result};
use crate::session::{Arg, RpcContext};

/// A locally registered procedure the host may invoke.
///
/// Receives the host connection (so the body can issue nested outbound
/// calls under the half-duplex discipline) and the decoded parameter list.
/// Returning `None` means "no return value" and is translated to the null
/// sentinel on the wire by the session.
pub trait Invocable {
    /// Invoke the procedure.
    fn invoke(&mut self, host: &mut dyn RpcContext, params: &[Value]) -> Result<Arg>;
}

impl<F> Invocable for F
where
    F: FnMut(&mut dyn RpcContext, &[Value]) -> Result<Arg>,
{
    fn invoke(&mut self, host: &mut dyn RpcContext, params: &[Value]) -> Result<Arg> {
        self(host, params)
    }
}

/// Name-keyed table of [`Invocable`]s.
pub struct MethodRegistry {
    methods: HashMap<String, Box<dyn Invocable>>,
}

impl MethodRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// Store one invocable under `name`. The last registration for a given
    /// name wins; duplicates are not a fault.
    pub fn register<I>(&mut self, name: &str, invocable: I)
    where
        I: Invocable + 'static,
    {
        self.methods.insert(name.to_string(), Box::new(invocable));
    }

    /// Whether a handler is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Look up and invoke a handler.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchMethod`] if no handler is registered under `name`;
    /// the serve loop turns that into a fault document for the host rather
    /// than a local crash.
    pub fn dispatch(
        &mut self,
        name: &str,
        host: &mut dyn RpcContext,
        params: &[Value],
    ) -> Result<Arg> {
        let handler = self
            .methods
            .get_mut(name)
            .ok_or_else(|| Error::NoSuchMethod(name.to_string()))?;
        handler.invoke(host, params)
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}
