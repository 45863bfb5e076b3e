use std::sync::Arc;

use crate::config::Application;
use crate::core::{RegistryError, RegistryResult};
use crate::service::ServiceCatalog;

use super::synth::synthesize;
use super::table::EndpointTable;

/// Dedup and installation engine.
///
/// Synthesizes the full route set for an application and reconciles it with
/// the dispatch table. Installation is keyed by rule name, so re-registering
/// the same application supersedes stale bindings without a diff step.
pub struct EndpointInstaller {
    table: Arc<EndpointTable>,
    catalog: Arc<ServiceCatalog>,
}

impl EndpointInstaller {
    pub fn new(table: Arc<EndpointTable>, catalog: Arc<ServiceCatalog>) -> Self {
        Self { table, catalog }
    }

    /// Installs every route synthesized for the application, in
    /// service-declaration order then method-declaration order.
    ///
    /// A catalog that is not ready (or holds no services for the entity
    /// kind) yields zero routes and succeeds; the cold-start pass retries
    /// later. If one install fails, the remaining installs of this pass are
    /// aborted but rules already installed stay in place; the caller gets a
    /// partial-registration error.
    pub fn register(&self, app: &Application) -> RegistryResult<()> {
        let services = self.catalog.list_services(crate::config::APP_ROUTE_GROUP_KIND);
        if services.is_empty() {
            log::debug!(
                "No services available for application '{}', nothing to register",
                app.tech_name
            );
            return Ok(());
        }

        let mut installed = 0usize;
        for service in &services {
            let descriptor = self.catalog.normalize(service.as_ref());
            for route in synthesize(app, &descriptor) {
                let name = route.name.clone();
                if let Err(e) = self.table.add_rule(&name, route) {
                    log::error!(
                        "Aborting registration for application '{}' at rule '{}': {}",
                        app.tech_name,
                        name,
                        e
                    );
                    return Err(RegistryError::PartialRegistration {
                        app: app.tech_name.clone(),
                        installed,
                        reason: e.to_string(),
                    });
                }
                installed += 1;
            }
        }

        log::info!(
            "Registered {} rule(s) for application '{}'",
            installed,
            app.tech_name
        );
        Ok(())
    }

    /// Drops every rule in the application's route group. Safe to call on
    /// an application with zero installed rules.
    pub fn unregister(&self, app: &Application) -> usize {
        self.unregister_group(&app.route_group())
    }

    /// Group-scoped removal; the group tag is the sole bulk-removal key, so
    /// this also covers generations installed under a previous technical key.
    pub fn unregister_group(&self, group: &str) -> usize {
        let rules = self.table.enumerate_group(group);
        for (key, _) in &rules {
            self.table.drop_rule(key);
        }

        if !rules.is_empty() {
            log::info!("Unregistered {} rule(s) for group '{}'", rules.len(), group);
        }
        rules.len()
    }
}
