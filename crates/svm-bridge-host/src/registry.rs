//! Process-wide table of host functions, keyed by integer handles.
//!
//! Native code cannot hold a Rust closure, so every host function is
//! registered here and only its [`Handle`] crosses the boundary. Dispatch
//! looks the handle up again on each call.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use svm_bridge_core::{Value, ValueType, value};
use tracing::{debug, warn};

use crate::error::{HostError, HostResult};

/// Identifier of a registered host function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    /// The raw handle value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type HostFn = dyn Fn(&[Value]) -> anyhow::Result<Vec<Value>> + Send + Sync;

/// A host function and its signature.
pub struct HostFunction {
    namespace: String,
    name: String,
    params: Vec<ValueType>,
    returns: Vec<ValueType>,
    func: Box<HostFn>,
}

impl HostFunction {
    /// Create a host function.
    pub fn new<F>(
        namespace: impl Into<String>,
        name: impl Into<String>,
        params: Vec<ValueType>,
        returns: Vec<ValueType>,
        func: F,
    ) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<Vec<Value>> + Send + Sync + 'static,
    {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            params,
            returns,
            func: Box::new(func),
        }
    }

    /// The import namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `namespace::name`
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.namespace, self.name)
    }

    /// Parameter types.
    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    /// Result types.
    pub fn returns(&self) -> &[ValueType] {
        &self.returns
    }

    /// Call the function, checking arguments and results against the
    /// signature.
    pub fn call(&self, args: &[Value]) -> HostResult<Vec<Value>> {
        if !value::matches_signature(args, &self.params) {
            return Err(self.mismatch("arguments", &self.params, args));
        }

        let results = (self.func)(args).map_err(|error| HostError::Callback {
            function: self.qualified_name(),
            error,
        })?;

        if !value::matches_signature(&results, &self.returns) {
            return Err(self.mismatch("results", &self.returns, &results));
        }
        Ok(results)
    }

    fn mismatch(&self, direction: &'static str, expected: &[ValueType], found: &[Value]) -> HostError {
        HostError::SignatureMismatch {
            function: self.qualified_name(),
            direction,
            expected: join(expected.iter()),
            found: join(found.iter().map(Value::ty)),
        }
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .finish()
    }
}

fn join<T: fmt::Display>(items: impl Iterator<Item = T>) -> String {
    items.map(|item| item.to_string()).collect::<Vec<_>>().join(", ")
}

/// Handle-keyed table of host functions.
///
/// Safe to use from any thread. Lookups clone the entry out of the lock
/// before calling it, so a host function may itself register or invoke
/// functions.
#[derive(Debug)]
pub struct Registry {
    functions: RwLock<HashMap<Handle, Arc<HostFunction>>>,
    next: AtomicU64,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            functions: RwLock::new(HashMap::new()),
            next: AtomicU64::new(1),
        }
    }

    /// Register a function and return its new handle.
    pub fn register(&self, function: HostFunction) -> Handle {
        self.register_shared(Arc::new(function))
    }

    /// Register a function the caller keeps a reference to.
    pub fn register_shared(&self, function: Arc<HostFunction>) -> Handle {
        let handle = Handle(self.next.fetch_add(1, Ordering::Relaxed));
        debug!(%handle, function = %function.qualified_name(), "Registered host function");
        self.functions.write().insert(handle, function);
        handle
    }

    /// Remove a function. Returns whether it was present.
    pub fn unregister(&self, handle: Handle) -> bool {
        let removed = self.functions.write().remove(&handle).is_some();
        if removed {
            debug!(%handle, "Unregistered host function");
        }
        removed
    }

    /// Whether `handle` is registered.
    pub fn contains(&self, handle: Handle) -> bool {
        self.functions.read().contains_key(&handle)
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.functions.read().len()
    }

    /// Whether no functions are registered.
    pub fn is_empty(&self) -> bool {
        self.functions.read().is_empty()
    }

    /// Look up a function.
    pub fn get(&self, handle: Handle) -> HostResult<Arc<HostFunction>> {
        self.functions
            .read()
            .get(&handle)
            .cloned()
            .ok_or(HostError::HandleNotFound(handle))
    }

    /// Invoke the function registered under `handle`.
    pub fn invoke(&self, handle: Handle, args: &[Value]) -> HostResult<Vec<Value>> {
        let function = self.get(handle).inspect_err(|_| {
            warn!(%handle, "Invoked unknown host function handle");
        })?;
        debug!(%handle, function = %function.qualified_name(), args = args.len(), "Invoking host function");
        function.call(args)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// The registry shared by every import table in the process.
pub fn registry() -> &'static Registry {
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    fn add() -> HostFunction {
        HostFunction::new(
            "host",
            "add",
            vec![ValueType::I32, ValueType::I32],
            vec![ValueType::I32],
            |args| {
                let a = args[0].as_i32().unwrap_or_default();
                let b = args[1].as_i32().unwrap_or_default();
                Ok(vec![Value::I32(a + b)])
            },
        )
    }

    #[test]
    fn test_register_and_invoke() {
        let registry = Registry::new();
        let handle = registry.register(add());

        let results = registry
            .invoke(handle, &[Value::I32(3), Value::I32(5)])
            .unwrap();
        assert_eq!(results, vec![Value::I32(8)]);
    }

    #[test]
    fn test_unregister_then_not_found() {
        let registry = Registry::new();
        let handle = registry.register(add());

        assert!(registry.unregister(handle));
        assert!(!registry.unregister(handle));
        assert!(!registry.contains(handle));

        let err = registry.invoke(handle, &[Value::I32(1), Value::I32(2)]).unwrap_err();
        assert!(matches!(err, HostError::HandleNotFound(h) if h == handle));
    }

    #[test]
    fn test_argument_signature_checked() {
        let registry = Registry::new();
        let handle = registry.register(add());

        let err = registry.invoke(handle, &[Value::I64(3)]).unwrap_err();
        let HostError::SignatureMismatch { direction, expected, found, .. } = err else {
            panic!("Expected signature mismatch, got {err:?}");
        };
        assert_eq!(direction, "arguments");
        assert_eq!(expected, "i32, i32");
        assert_eq!(found, "i64");
    }

    #[test]
    fn test_result_signature_checked() {
        let registry = Registry::new();
        let handle = registry.register(HostFunction::new(
            "host",
            "liar",
            vec![],
            vec![ValueType::I64],
            |_| Ok(vec![Value::I32(0)]),
        ));

        let err = registry.invoke(handle, &[]).unwrap_err();
        assert!(matches!(
            err,
            HostError::SignatureMismatch { direction: "results", .. }
        ));
    }

    #[test]
    fn test_callback_error_keeps_chain() {
        let registry = Registry::new();
        let handle = registry.register(HostFunction::new("host", "fails", vec![], vec![], |_| {
            Err(anyhow::anyhow!("disk full").context("writing state"))
        }));

        let err = registry.invoke(handle, &[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Host function 'host::fails' failed: writing state: disk full"
        );
    }

    #[test]
    fn test_callback_may_reenter_registry() {
        let registry = Arc::new(Registry::new());
        let inner = registry.register(add());

        let outer_registry = Arc::clone(&registry);
        let outer = registry.register(HostFunction::new(
            "host",
            "double_add",
            vec![ValueType::I32],
            vec![ValueType::I32],
            move |args| {
                let once = outer_registry.invoke(inner, &[args[0], args[0]])?;
                let twice = outer_registry.invoke(inner, &[once[0], once[0]])?;
                outer_registry.register(add());
                Ok(twice)
            },
        ));

        let results = registry.invoke(outer, &[Value::I32(2)]).unwrap();
        assert_eq!(results, vec![Value::I32(8)]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_concurrent_registrations_get_distinct_handles() {
        let threads: Vec<_> = (0..8)
            .map(|_| {
                thread::spawn(|| {
                    (0..50)
                        .map(|_| registry().register(add()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let handles: Vec<Handle> = threads
            .into_iter()
            .flat_map(|thread| thread.join().unwrap())
            .collect();
        let distinct: HashSet<_> = handles.iter().copied().collect();
        assert_eq!(distinct.len(), 400);

        for handle in handles {
            assert!(registry().unregister(handle));
        }
    }
}
