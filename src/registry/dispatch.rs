use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::config::HttpMethod;
use crate::core::{RegistryError, RegistryResult};
use crate::service::ServiceCatalog;
use crate::store::ApplicationStore;

use super::synth::HandlerRef;
use super::table::EndpointTable;

/// Request dispatch adapter.
///
/// One explicitly constructed instance owns the resolution logic from a
/// matched rule back to the concrete service invocation, invoked directly
/// by the router. The application record is re-resolved on every call, so
/// a stale client hitting a vanished application gets a not-found outcome
/// rather than a dangling reference.
pub struct DispatchAdapter {
    table: Arc<EndpointTable>,
    catalog: Arc<ServiceCatalog>,
    store: Arc<dyn ApplicationStore>,
}

impl DispatchAdapter {
    pub fn new(
        table: Arc<EndpointTable>,
        catalog: Arc<ServiceCatalog>,
        store: Arc<dyn ApplicationStore>,
    ) -> Self {
        Self {
            table,
            catalog,
            store,
        }
    }

    /// Matches an inbound (path, verb) against the dispatch table and
    /// invokes the bound service method. Path parameters are merged into
    /// the keyword payload.
    pub fn dispatch(&self, path: &str, method: HttpMethod, payload: Value) -> RegistryResult<Value> {
        log::debug!("Dispatching request: {method} {path}");

        let (params, rule) = self
            .table
            .match_request(path, method)
            .ok_or_else(|| RegistryError::NotFound(format!("No route for {method} {path}")))?;

        self.process(&rule.handler, params, payload)
    }

    /// Resolves the handler reference and performs the call with the
    /// application record as implicit context.
    pub fn process(
        &self,
        handler: &HandlerRef,
        params: BTreeMap<String, String>,
        payload: Value,
    ) -> RegistryResult<Value> {
        let app = self.store.get(&handler.app_id).ok_or_else(|| {
            RegistryError::NotFound(format!(
                "Application '{}' no longer exists",
                handler.app_id
            ))
        })?;

        let service = self.catalog.get(&handler.service_usage).ok_or_else(|| {
            RegistryError::NotFound(format!(
                "Service '{}' is not available",
                handler.service_usage
            ))
        })?;

        service.invoke(&app, &handler.method_name, merge_params(payload, params))
    }
}

// Positional path parameters join the keyword arguments; a non-object
// payload is passed through untouched.
fn merge_params(payload: Value, params: BTreeMap<String, String>) -> Value {
    if params.is_empty() {
        return payload;
    }

    match payload {
        Value::Object(mut map) => {
            for (key, value) in params {
                map.entry(key).or_insert(Value::String(value));
            }
            Value::Object(map)
        }
        other => other,
    }
}
