//! Application lifecycle controller.
//!
//! Wired to the entity store's create/update/delete notifications, it
//! decides whether route regeneration is required and drives the installer.
//! Reconciliation is always a full unregister-then-register of the
//! application's group: a method dropped from a service's declared metadata
//! disappears at the next lifecycle transition instead of lingering as an
//! orphan behind a same-name overwrite.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::Application;
use crate::core::RegistryResult;
use crate::service::ServiceCatalog;

use super::install::EndpointInstaller;
use super::table::EndpointTable;

pub struct LifecycleController {
    table: Arc<EndpointTable>,
    installer: EndpointInstaller,
    /// Group tag last installed per application id. A technical-key change
    /// shifts the group tag, so the previous generation can only be found
    /// through what was actually registered, not the current record.
    registered: DashMap<String, String>,
}

impl LifecycleController {
    pub fn new(table: Arc<EndpointTable>, catalog: Arc<ServiceCatalog>) -> Self {
        Self {
            installer: EndpointInstaller::new(table.clone(), catalog),
            table,
            registered: DashMap::new(),
        }
    }

    /// Entity created: full route registration.
    pub fn on_create(&self, app: &Application) -> RegistryResult<()> {
        if !app.active {
            log::debug!(
                "Application '{}' created inactive, no routes to register",
                app.tech_name
            );
            return Ok(());
        }

        self.installer.register(app)?;
        self.registered.insert(app.id.clone(), app.route_group());
        Ok(())
    }

    /// Entity updated: regenerate routes only when a key-impacting field
    /// (technical key, authentication mode) changed.
    pub fn on_update(&self, app: &Application, changed_fields: &[&str]) -> RegistryResult<()> {
        let impacting = changed_fields.iter().any(|field| {
            Application::endpoint_impacting_fields()
                .iter()
                .any(|impacting| impacting == field)
        });

        if !impacting {
            log::debug!(
                "Update of application '{}' touched no endpoint-impacting field",
                app.tech_name
            );
            return Ok(());
        }

        self.refresh(app)
    }

    /// Full unregister-then-register, never a partial patch. Guarantees the
    /// name-derivation scheme cannot leave orphaned names under a changed
    /// key.
    pub fn refresh(&self, app: &Application) -> RegistryResult<()> {
        match self.registered.remove(&app.id) {
            Some((_, old_group)) => {
                self.installer.unregister_group(&old_group);
            }
            None => {
                self.installer.unregister(app);
            }
        }

        if !app.active {
            log::info!(
                "Application '{}' is inactive, routes stay unregistered",
                app.tech_name
            );
            return Ok(());
        }

        self.installer.register(app)?;
        self.registered.insert(app.id.clone(), app.route_group());
        Ok(())
    }

    /// Entity about to be deleted: unregistration runs to completion before
    /// the record itself is removed from storage.
    pub fn on_delete(&self, app: &Application) {
        let group = match self.registered.remove(&app.id) {
            Some((_, group)) => group,
            None => app.route_group(),
        };
        let dropped = self.installer.unregister_group(&group);
        log::info!(
            "Deleted application '{}', dropped {} rule(s)",
            app.tech_name,
            dropped
        );
    }

    /// Cold-start pass: registers every existing active application exactly
    /// once, for the case where the dispatch table is freshly initialized
    /// and holds no rules yet. One failing application does not block the
    /// rest of the pass; the first failure is reported once every
    /// application has had its attempt.
    pub fn register_all(&self, apps: &[Application]) -> RegistryResult<()> {
        let mut first_failure = None;

        for app in apps {
            if !app.active {
                continue;
            }
            if self.registered.contains_key(&app.id) {
                log::debug!(
                    "Application '{}' already registered, skipping",
                    app.tech_name
                );
                continue;
            }
            if let Err(e) = self.on_create(app) {
                log::error!(
                    "Cold-start registration failed for application '{}': {}",
                    app.tech_name,
                    e
                );
                if first_failure.is_none() {
                    first_failure = Some(e);
                }
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Sorted human-readable listing of the rules installed for an app.
    /// Developer-facing surface for inspecting the live table.
    pub fn registered_routes(&self, app: &Application) -> Vec<String> {
        let mut lines: Vec<String> = self
            .table
            .enumerate_group(&app.route_group())
            .into_iter()
            .map(|(_, rule)| format!("{} ({})", rule.paths.join(", "), rule.method))
            .collect();
        lines.sort();
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    use crate::config::{AuthType, HttpMethod};
    use crate::core::RegistryError;
    use crate::registry::synth::{HandlerRef, RouteDef};
    use crate::service::{AppService, MethodDescriptor};

    struct PingService;

    impl AppService for PingService {
        fn name(&self) -> &str {
            "svc"
        }

        fn usage(&self) -> &str {
            "svc"
        }

        fn methods(&self) -> Vec<MethodDescriptor> {
            vec![MethodDescriptor {
                name: "ping".to_string(),
                verbs: vec![HttpMethod::GET],
                path_suffixes: vec!["/ping".to_string()],
                ..Default::default()
            }]
        }

        fn invoke(&self, app: &Application, method: &str, _payload: Value) -> RegistryResult<Value> {
            Ok(json!({ "app": app.tech_name, "method": method }))
        }
    }

    fn app(id: &str, tech_name: &str) -> Application {
        Application {
            id: id.to_string(),
            name: tech_name.to_string(),
            short_name: tech_name.to_string(),
            tech_name: tech_name.to_string(),
            active: true,
            auth_type: AuthType::default(),
            profile_ids: vec![],
        }
    }

    fn harness() -> (Arc<EndpointTable>, LifecycleController) {
        let table = Arc::new(EndpointTable::new());
        let catalog = Arc::new(ServiceCatalog::new());
        catalog.register(Arc::new(PingService));
        catalog.mark_ready();
        let controller = LifecycleController::new(table.clone(), catalog);
        (table, controller)
    }

    #[test]
    fn test_create_then_delete() {
        let (table, controller) = harness();
        let wh1 = app("1", "wh1");

        controller.on_create(&wh1).unwrap();
        assert_eq!(1, table.enumerate_group("app:wh1").len());

        controller.on_delete(&wh1);
        assert!(table.enumerate_group("app:wh1").is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_delete_without_routes_is_a_noop() {
        let (table, controller) = harness();
        controller.on_delete(&app("9", "ghost"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_update_of_non_impacting_fields_keeps_routes() {
        let (table, controller) = harness();
        let mut wh1 = app("1", "wh1");
        controller.on_create(&wh1).unwrap();
        let before: Vec<String> = table
            .enumerate_group("app:wh1")
            .into_iter()
            .map(|(k, _)| k)
            .collect();

        wh1.name = "Renamed".to_string();
        controller
            .on_update(&wh1, &["name", "profile_ids"])
            .unwrap();

        let after: Vec<String> = table
            .enumerate_group("app:wh1")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_auth_mode_change_regenerates_routes() {
        let (table, controller) = harness();
        let mut wh1 = app("1", "wh1");
        controller.on_create(&wh1).unwrap();

        wh1.auth_type = AuthType::ApiKey;
        controller.on_update(&wh1, &["auth_type"]).unwrap();

        let rules = table.enumerate_group("app:wh1");
        assert_eq!(1, rules.len());
        assert_eq!(AuthType::ApiKey, rules[0].1.auth);
    }

    #[test]
    fn test_technical_key_change_reprovisions() {
        let (table, controller) = harness();
        let mut wh = app("1", "k1");
        controller.on_create(&wh).unwrap();
        assert_eq!(1, table.enumerate_group("app:k1").len());

        wh.tech_name = "k2".to_string();
        controller.on_update(&wh, &["tech_name"]).unwrap();

        // Zero routes remain under k1; a full set exists under k2.
        assert!(table.enumerate_group("app:k1").is_empty());
        let rules = table.enumerate_group("app:k2");
        assert_eq!(1, rules.len());
        assert_eq!("k2::svc/ping__get", rules[0].0);
        assert!(table
            .match_request("/app/k2/svc/ping", HttpMethod::GET)
            .is_some());
        assert!(table
            .match_request("/app/k1/svc/ping", HttpMethod::GET)
            .is_none());
    }

    #[test]
    fn test_deactivating_refresh_unregisters() {
        let (table, controller) = harness();
        let mut wh1 = app("1", "wh1");
        controller.on_create(&wh1).unwrap();

        wh1.active = false;
        controller.refresh(&wh1).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_register_all_is_exactly_once() {
        let (table, controller) = harness();
        let apps = vec![app("1", "a"), app("2", "b"), {
            let mut inactive = app("3", "c");
            inactive.active = false;
            inactive
        }];

        controller.register_all(&apps).unwrap();
        assert_eq!(2, table.len());
        assert!(table.enumerate_group("app:c").is_empty());

        // Second cold-start pass changes nothing.
        controller.register_all(&apps).unwrap();
        assert_eq!(2, table.len());
    }

    #[test]
    fn test_register_all_visits_every_application_despite_failures() {
        let (table, controller) = harness();

        // Another group already owns the path "bad" would claim.
        table
            .add_rule(
                "squatter",
                RouteDef {
                    name: "squatter".to_string(),
                    paths: vec!["/app/bad/svc/ping".to_string()],
                    method: HttpMethod::GET,
                    auth: AuthType::default(),
                    group: "app:other".to_string(),
                    handler: HandlerRef {
                        app_id: "9".to_string(),
                        service_usage: "svc".to_string(),
                        method_name: "ping".to_string(),
                    },
                    cors: None,
                    csrf: None,
                    keep_session: None,
                },
            )
            .unwrap();

        let apps = vec![app("1", "bad"), app("2", "good")];
        let err = controller.register_all(&apps).unwrap_err();
        assert!(matches!(err, RegistryError::PartialRegistration { .. }));

        // The failing application does not block the later one.
        assert_eq!(1, table.enumerate_group("app:good").len());
        assert!(table
            .match_request("/app/good/svc/ping", HttpMethod::GET)
            .is_some());
    }

    #[test]
    fn test_registered_routes_listing() {
        let (_table, controller) = harness();
        let wh1 = app("1", "wh1");
        controller.on_create(&wh1).unwrap();

        assert_eq!(
            vec!["/app/wh1/svc/ping (GET)".to_string()],
            controller.registered_routes(&wh1)
        );
    }
}
