//! Registered procedures.

use crate::domain::{ProcedureError, RpcError, RESERVED_NAMES};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// A callable procedure: positional args and keyword args in, JSON out.
pub type Procedure =
    Arc<dyn Fn(Vec<Value>, Map<String, Value>) -> BoxFuture<'static, Result<Value, ProcedureError>> + Send + Sync>;

/// Wrap an async function as a `Procedure`.
pub fn procedure<F, Fut>(f: F) -> Procedure
where
    F: Fn(Vec<Value>, Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ProcedureError>> + Send + 'static,
{
    Arc::new(move |args, kwargs| f(args, kwargs).boxed())
}

/// Shared name → procedure table.
#[derive(Clone, Default)]
pub struct ProcedureTable {
    procedures: Arc<RwLock<HashMap<String, Procedure>>>,
}

impl ProcedureTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a procedure.
    pub fn register(&self, name: &str, procedure: Procedure) -> Result<(), RpcError> {
        if RESERVED_NAMES.contains(&name) {
            return Err(RpcError::ReservedName(name.to_string()));
        }
        self.procedures.write().insert(name.to_string(), procedure);
        Ok(())
    }

    /// Remove a procedure. Returns whether it was present.
    pub fn unregister(&self, name: &str) -> bool {
        self.procedures.write().remove(name).is_some()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Procedure> {
        self.procedures.read().get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.procedures.read().contains_key(name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.procedures.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ProcedureTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcedureTable").field("procedures", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reserved_names_are_rejected() {
        let table = ProcedureTable::new();
        for name in RESERVED_NAMES {
            let err = table
                .register(name, procedure(|_, _| async { Ok(Value::Null) }))
                .unwrap_err();
            assert!(matches!(err, RpcError::ReservedName(_)));
        }
        assert!(table.names().is_empty());
    }

    #[test]
    fn test_unregister_is_silent_when_absent() {
        let table = ProcedureTable::new();
        table.register("a", procedure(|_, _| async { Ok(json!(1)) })).unwrap();
        assert!(table.unregister("a"));
        assert!(!table.unregister("a"));
        assert!(!table.contains("a"));
    }

    #[tokio::test]
    async fn test_procedure_wrapper_calls_through() {
        let add = procedure(|args, _| async move {
            let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
            Ok(json!(sum))
        });
        assert_eq!(add(vec![json!(2), json!(3)], Map::new()).await.unwrap(), json!(5));
    }
}
