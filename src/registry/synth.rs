//! Route synthesis.
//!
//! A pure function from (application, normalized service descriptor) to a
//! list of route definitions. The same inputs always yield the same route
//! set, which is what makes diff-free "replace all" re-registration safe.

use crate::config::{Application, AuthType, HttpMethod};
use crate::service::ServiceDescriptor;

/// Opaque reference to the service method a rule dispatches to.
///
/// Applications never hold rule objects; rules hold this reference back to
/// the entity world, so the table can reshuffle storage freely.
#[derive(Clone, Debug, PartialEq)]
pub struct HandlerRef {
    pub app_id: String,
    pub service_usage: String,
    pub method_name: String,
}

/// A single synthesized binding of paths and verb to a service method,
/// scoped to one application.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteDef {
    /// Unique name: `{tech_name}::{service}/{method}__{verb}`. Stable
    /// across regenerations for the same logical endpoint, so a re-install
    /// supersedes rather than duplicates.
    pub name: String,
    /// Concrete paths; the first entry is the default route, the rest are
    /// aliases. Aliases live inside one definition, never as extra entries.
    pub paths: Vec<String>,
    pub method: HttpMethod,
    pub auth: AuthType,
    /// Group tag (`app:{tech_name}`), the sole key for bulk enumeration
    /// and removal.
    pub group: String,
    pub handler: HandlerRef,
    pub cors: Option<bool>,
    pub csrf: Option<bool>,
    pub keep_session: Option<bool>,
}

impl RouteDef {
    pub fn default_path(&self) -> &str {
        &self.paths[0]
    }
}

/// Synthesizes one route definition per (method, verb) tuple of the
/// service, in method-declaration order then verb-declaration order.
pub fn synthesize(app: &Application, service: &ServiceDescriptor) -> Vec<RouteDef> {
    let root_path = format!("{}/{}", app.api_route(), service.usage);
    let mut defs = Vec::new();

    for method in &service.methods {
        if method.path_suffixes.is_empty() {
            // Normalization guarantees suffixes; an empty set here means the
            // descriptor bypassed the catalog, so there is nothing to bind.
            log::debug!(
                "Skipping method '{}' of service '{}': no path suffixes",
                method.name,
                service.name
            );
            continue;
        }

        for verb in &method.verbs {
            let paths: Vec<String> = method
                .path_suffixes
                .iter()
                .map(|suffix| format!("{root_path}{suffix}"))
                .collect();

            defs.push(RouteDef {
                name: format!(
                    "{}::{}/{}__{}",
                    app.tech_name,
                    service.name,
                    method.name,
                    verb.lower()
                ),
                paths,
                method: *verb,
                auth: method.auth.clone().unwrap_or_else(|| app.auth_type.clone()),
                group: app.route_group(),
                handler: HandlerRef {
                    app_id: app.id.clone(),
                    service_usage: service.usage.clone(),
                    method_name: method.name.clone(),
                },
                cors: method.cors,
                csrf: method.csrf,
                keep_session: method.keep_session,
            });
        }
    }

    defs
}
