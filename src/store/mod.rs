//! Application entity store.
//!
//! The registry core only consumes create/update/delete notifications; any
//! conventional entity store can sit behind [`ApplicationStore`]. The
//! in-memory implementation here wires those notifications to the lifecycle
//! controller with the ordering the controller relies on: configuration
//! errors are refused before any route action, and unregistration completes
//! before a record is removed.

use std::sync::Arc;

use dashmap::DashMap;
use validator::Validate;

use crate::config::{Application, Config};
use crate::core::{RegistryError, RegistryResult};
use crate::registry::LifecycleController;

/// Read surface the dispatch adapter resolves application records through.
pub trait ApplicationStore: Send + Sync {
    fn get(&self, id: &str) -> Option<Application>;
    fn get_by_tech_name(&self, tech_name: &str) -> Option<Application>;
    fn all_active(&self) -> Vec<Application>;
}

pub struct MemoryAppStore {
    apps: DashMap<String, Application>,
    controller: Arc<LifecycleController>,
}

impl MemoryAppStore {
    pub fn new(controller: Arc<LifecycleController>) -> Self {
        Self {
            apps: DashMap::new(),
            controller,
        }
    }

    /// Creates an application and registers its routes.
    ///
    /// Validation and the duplicate-key check run before the record is
    /// stored and before any route action; a partial-registration error
    /// afterwards leaves the record in place and propagates.
    pub fn create(&self, app: Application) -> RegistryResult<()> {
        app.validate()
            .map_err(|e| RegistryError::Validation(e.to_string()))?;
        self.refuse_duplicates(&app)?;

        log::info!("Creating application: {}", app.tech_name);
        self.apps.insert(app.id.clone(), app.clone());
        self.controller.on_create(&app)
    }

    /// Updates an application, regenerating routes when a key-impacting
    /// field changed.
    pub fn update(&self, app: Application) -> RegistryResult<()> {
        app.validate()
            .map_err(|e| RegistryError::Validation(e.to_string()))?;

        let prev = self
            .apps
            .get(&app.id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                RegistryError::NotFound(format!("Application '{}' does not exist", app.id))
            })?;
        self.refuse_duplicates(&app)?;

        let changed = changed_fields(&prev, &app);
        log::info!(
            "Updating application '{}', changed fields: {:?}",
            app.tech_name,
            changed
        );

        self.apps.insert(app.id.clone(), app.clone());
        self.controller.on_update(&app, &changed)
    }

    /// Deletes an application. Routes are unregistered to completion before
    /// the record disappears, so no rule can reference a missing entity.
    pub fn delete(&self, id: &str) -> RegistryResult<()> {
        let app = self
            .apps
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                RegistryError::NotFound(format!("Application '{id}' does not exist"))
            })?;

        self.controller.on_delete(&app);
        self.apps.remove(id);
        Ok(())
    }

    /// Loads the applications declared in a config document and runs the
    /// cold-start registration pass over every active one.
    pub fn load_static_applications(&self, config: &Config) -> RegistryResult<()> {
        for app in &config.applications {
            log::info!("Loading application: {}", app.tech_name);
            self.refuse_duplicates(app)?;
            self.apps.insert(app.id.clone(), app.clone());
        }

        self.controller.register_all(&self.all_active())
    }

    // Technical keys are globally unique among active applications.
    fn refuse_duplicates(&self, app: &Application) -> RegistryResult<()> {
        let clash = self.apps.iter().any(|entry| {
            entry.key() != &app.id && entry.value().active && entry.value().tech_name == app.tech_name
        });

        if app.active && clash {
            return Err(RegistryError::Configuration(format!(
                "Duplicate tech_name '{}'",
                app.tech_name
            )));
        }
        Ok(())
    }
}

impl ApplicationStore for MemoryAppStore {
    fn get(&self, id: &str) -> Option<Application> {
        self.apps.get(id).map(|entry| entry.value().clone())
    }

    fn get_by_tech_name(&self, tech_name: &str) -> Option<Application> {
        self.apps
            .iter()
            .find(|entry| entry.value().tech_name == tech_name)
            .map(|entry| entry.value().clone())
    }

    fn all_active(&self) -> Vec<Application> {
        self.apps
            .iter()
            .filter(|entry| entry.value().active)
            .map(|entry| entry.value().clone())
            .collect()
    }
}

fn changed_fields(prev: &Application, next: &Application) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if prev.tech_name != next.tech_name {
        changed.push("tech_name");
    }
    if prev.auth_type != next.auth_type {
        changed.push("auth_type");
    }
    if prev.name != next.name {
        changed.push("name");
    }
    if prev.short_name != next.short_name {
        changed.push("short_name");
    }
    if prev.active != next.active {
        changed.push("active");
    }
    if prev.profile_ids != next.profile_ids {
        changed.push("profile_ids");
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    use crate::config::{AuthType, HttpMethod};
    use crate::registry::EndpointTable;
    use crate::service::{AppService, MethodDescriptor, ServiceCatalog};

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

    fn harness() -> (Arc<EndpointTable>, MemoryAppStore) {
        let table = Arc::new(EndpointTable::new());
        let catalog = Arc::new(ServiceCatalog::new());
        catalog.register(Arc::new(PingService));
        catalog.mark_ready();
        let controller = Arc::new(LifecycleController::new(table.clone(), catalog));
        (table.clone(), MemoryAppStore::new(controller))
    }

    #[test]
    fn test_create_registers_routes() {
        let (table, store) = harness();
        store.create(app("1", "wh1")).unwrap();

        assert!(store.get("1").is_some());
        assert!(store.get_by_tech_name("wh1").is_some());
        assert_eq!(1, table.enumerate_group("app:wh1").len());
    }

    #[test]
    fn test_duplicate_tech_name_refused_before_any_route_action() {
        let (table, store) = harness();
        store.create(app("1", "wh1")).unwrap();

        let err = store.create(app("2", "wh1")).unwrap_err();
        assert!(matches!(err, RegistryError::Configuration(_)));

        // The refused entity left no record and no routes behind.
        assert!(store.get("2").is_none());
        assert_eq!(1, table.len());
    }

    #[test]
    fn test_invalid_entity_refused() {
        let (_table, store) = harness();
        let err = store.create(app("1", "Not A Slug")).unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
    }

    #[test]
    fn test_update_key_change_reprovisions() {
        let (table, store) = harness();
        store.create(app("1", "k1")).unwrap();

        store.update(app("1", "k2")).unwrap();

        assert!(table.enumerate_group("app:k1").is_empty());
        assert_eq!(1, table.enumerate_group("app:k2").len());
        assert_eq!("k2", store.get("1").unwrap().tech_name);
    }

    #[test]
    fn test_update_unknown_application() {
        let (_table, store) = harness();
        let err = store.update(app("404", "ghost")).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[test]
    fn test_delete_unregisters_before_record_removal() {
        let (table, store) = harness();
        store.create(app("1", "wh1")).unwrap();

        store.delete("1").unwrap();
        assert!(store.get("1").is_none());
        assert!(table.is_empty());

        let err = store.delete("1").unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[test]
    fn test_load_static_applications() {
        let (table, store) = harness();
        let conf = Config::from_yaml(
            r#"
---
applications:
  - id: "1"
    name: One
    short_name: A
    tech_name: wh1
  - id: "2"
    name: Two
    short_name: B
    tech_name: wh2
    active: false
        "#,
        )
        .unwrap();

        store.load_static_applications(&conf).unwrap();

        assert_eq!(1, table.len());
        assert_eq!(1, table.enumerate_group("app:wh1").len());
        assert!(table.enumerate_group("app:wh2").is_empty());
        assert_eq!(1, store.all_active().len());
    }

    #[test]
    fn test_changed_fields_detection() {
        let prev = app("1", "wh1");
        let mut next = app("1", "wh1");
        next.auth_type = AuthType::Public;
        next.short_name = "W".to_string();

        assert_eq!(vec!["auth_type", "short_name"], changed_fields(&prev, &next));
        assert!(changed_fields(&prev, &prev.clone()).is_empty());
    }
}
