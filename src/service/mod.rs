//! Service metadata registry.
//!
//! Services enumerate their routable methods declaratively through
//! [`AppService::methods`]; the catalog normalizes that metadata so the
//! route synthesizer never sees missing routing data. Before the catalog
//! is marked ready, [`ServiceCatalog::list_services`] yields nothing, so
//! registration during bootstrap is a no-op rather than a failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::Value;

use crate::config::{Application, AuthType, HttpMethod, APP_ROUTE_GROUP_KIND};
use crate::core::RegistryResult;

/// Routing metadata for one callable service method.
///
/// Empty `verbs` or `path_suffixes` are legal at declaration time; the
/// catalog fills the defaults during normalization.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MethodDescriptor {
    pub name: String,
    pub verbs: Vec<HttpMethod>,
    pub path_suffixes: Vec<String>,
    /// Method-level override of the application's authentication mode.
    pub auth: Option<AuthType>,
    pub cors: Option<bool>,
    pub csrf: Option<bool>,
    pub keep_session: Option<bool>,
}

/// Normalized snapshot of a service consumed by the route synthesizer.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub usage: String,
    pub methods: Vec<MethodDescriptor>,
}

/// A backend component exposing callable methods with routing metadata.
pub trait AppService: Send + Sync {
    /// Technical name embedded in synthesized route names.
    fn name(&self) -> &str;

    /// Path segment under the application's base route.
    fn usage(&self) -> &str;

    /// Entity kind this service attaches to.
    fn kind(&self) -> &str {
        APP_ROUTE_GROUP_KIND
    }

    /// Declared routable methods, in declaration order.
    fn methods(&self) -> Vec<MethodDescriptor>;

    /// Invokes the named method with the application as implicit context.
    fn invoke(&self, app: &Application, method: &str, payload: Value) -> RegistryResult<Value>;
}

/// Ordered catalog of available services with a bootstrap readiness gate.
pub struct ServiceCatalog {
    services: ArcSwap<Vec<Arc<dyn AppService>>>,
    ready: AtomicBool,
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceCatalog {
    pub fn new() -> Self {
        Self {
            services: ArcSwap::from_pointee(Vec::new()),
            ready: AtomicBool::new(false),
        }
    }

    /// Registers a service, preserving declaration order. A service with
    /// the same usage segment replaces the previous registration.
    pub fn register(&self, service: Arc<dyn AppService>) {
        let current = self.services.load();
        let mut next: Vec<Arc<dyn AppService>> = current.iter().cloned().collect();

        if let Some(existing) = next.iter_mut().find(|s| s.usage() == service.usage()) {
            log::warn!(
                "Replacing service registration for usage '{}'",
                service.usage()
            );
            *existing = service;
        } else {
            log::info!("Registering service: {}", service.name());
            next.push(service);
        }

        self.services.store(Arc::new(next));
    }

    /// Opens the catalog for route registration. Until this is called,
    /// `list_services` reports nothing.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Services attached to the given entity kind, in declaration order.
    /// Empty (not an error) while the catalog is not ready.
    pub fn list_services(&self, kind: &str) -> Vec<Arc<dyn AppService>> {
        if !self.is_ready() {
            log::debug!("Service catalog not ready, no services available");
            return Vec::new();
        }

        self.services
            .load()
            .iter()
            .filter(|s| s.kind() == kind)
            .cloned()
            .collect()
    }

    /// Resolves a service by its usage segment, for request dispatch.
    pub fn get(&self, usage: &str) -> Option<Arc<dyn AppService>> {
        self.services
            .load()
            .iter()
            .find(|s| s.usage() == usage)
            .cloned()
    }

    /// Fills in default routing metadata for methods lacking explicit
    /// declarations: default path is the method name, default verb is POST,
    /// and every suffix is anchored with a leading slash.
    pub fn normalize(&self, service: &dyn AppService) -> ServiceDescriptor {
        let methods = service
            .methods()
            .into_iter()
            .map(normalize_method)
            .collect();

        ServiceDescriptor {
            name: service.name().to_string(),
            usage: service.usage().to_string(),
            methods,
        }
    }
}

fn normalize_method(mut method: MethodDescriptor) -> MethodDescriptor {
    if method.verbs.is_empty() {
        method.verbs.push(HttpMethod::POST);
    }
    if method.path_suffixes.is_empty() {
        method.path_suffixes.push(format!("/{}", method.name));
    }
    method.path_suffixes = method
        .path_suffixes
        .iter()
        .map(|s| {
            if s.starts_with('/') {
                s.clone()
            } else {
                format!("/{s}")
            }
        })
        .collect();
    method
}
