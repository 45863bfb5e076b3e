use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use matchit::{InsertError, Router as MatchRouter};

use crate::config::HttpMethod;
use crate::core::{RegistryError, RegistryResult};

use super::synth::RouteDef;

/// Live dispatch table mapping installed rule keys to route definitions.
///
/// Rules are keyed by their unique name; the path-level matcher is rebuilt
/// behind an `ArcSwap` after every mutation, so request-side readers only
/// ever observe complete generations. Mutations are serialized behind an
/// internal lock; readers never take it. Inject the table explicitly (one
/// per process at startup, a fresh one per test harness); it is never a
/// global.
pub struct EndpointTable {
    rules: DashMap<String, Arc<RouteDef>>,
    /// Ownership index `"{VERB} {path}" -> rule key`, used to refuse a
    /// path+verb claim by a rule with a different name.
    bindings: DashMap<String, String>,
    matcher: ArcSwap<MatchEntry>,
    write_lock: Mutex<()>,
}

#[derive(Default)]
pub struct MatchEntry {
    router: MatchRouter<Vec<Arc<RouteDef>>>,
}

impl MatchEntry {
    fn insert_into_router(
        router: &mut MatchRouter<Vec<Arc<RouteDef>>>,
        path: &str,
        rule: Arc<RouteDef>,
    ) -> Result<(), InsertError> {
        match router.insert(path, vec![rule.clone()]) {
            Ok(()) => Ok(()),
            // The exact same pattern is already registered (another verb of
            // it, or an alias of the same rule): merge under the existing
            // entry. Any other conflict, e.g. "/x/{id}" against
            // "/x/{name}", is a real grammar clash and stays an error.
            Err(InsertError::Conflict { with }) if with == path => match router.at_mut(path) {
                Ok(found) => {
                    found.value.push(rule);
                    Ok(())
                }
                Err(_) => Err(InsertError::Conflict { with }),
            },
            Err(e) => Err(e),
        }
    }

    /// Inserts a rule under every one of its path aliases.
    pub fn insert_rule(&mut self, rule: Arc<RouteDef>) -> Result<(), InsertError> {
        for path in &rule.paths {
            Self::insert_into_router(&mut self.router, path, rule.clone())?;
        }
        Ok(())
    }

    /// Matches a request path and verb to an installed rule.
    pub fn match_request(
        &self,
        path: &str,
        method: HttpMethod,
    ) -> Option<(BTreeMap<String, String>, Arc<RouteDef>)> {
        let matched = self.router.at(path).ok()?;
        let params: BTreeMap<String, String> = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        matched
            .value
            .iter()
            .find(|rule| rule.method == method)
            .map(|rule| (params, rule.clone()))
    }
}

impl Default for EndpointTable {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointTable {
    pub fn new() -> Self {
        Self {
            rules: DashMap::new(),
            bindings: DashMap::new(),
            matcher: ArcSwap::from_pointee(MatchEntry::default()),
            write_lock: Mutex::new(()),
        }
    }

    fn binding_key(method: HttpMethod, path: &str) -> String {
        format!("{method} {path}")
    }

    /// Installs a rule under the given key. A rule already present under
    /// the same key is overwritten (last write wins); a path+verb already
    /// claimed by a *different* key, or a path that clashes with an
    /// installed rule in the route grammar, is a conflict and nothing is
    /// mutated.
    pub fn add_rule(&self, key: &str, rule: RouteDef) -> RegistryResult<()> {
        let _guard = self.lock_writes();

        let new_bindings: Vec<String> = rule
            .paths
            .iter()
            .map(|path| Self::binding_key(rule.method, path))
            .collect();

        for binding in &new_bindings {
            if let Some(owner) = self.bindings.get(binding) {
                if owner.value() != key {
                    return Err(RegistryError::Conflict(format!(
                        "'{binding}' already claimed by rule '{}'",
                        owner.value()
                    )));
                }
            }
        }

        // Prove the rule fits the route grammar next to every other
        // installed rule before committing anything. The bindings index is
        // textual and misses overlaps like "/x/{id}" vs "/x/{name}".
        let rule = Arc::new(rule);
        let mut matcher = MatchEntry::default();
        for entry in self.rules.iter() {
            if entry.key() == key {
                continue;
            }
            if let Err(e) = matcher.insert_rule(entry.value().clone()) {
                log::error!("Failed to index rule {}: {}", entry.key(), e);
            }
        }
        if let Err(e) = matcher.insert_rule(rule.clone()) {
            return Err(RegistryError::Conflict(format!(
                "Paths of rule '{key}' clash with an installed rule: {e}"
            )));
        }

        // Release the previous generation's bindings before re-claiming.
        if let Some(old) = self.rules.get(key).map(|entry| entry.value().clone()) {
            for path in &old.paths {
                self.bindings.remove(&Self::binding_key(old.method, path));
            }
        }

        for binding in new_bindings {
            self.bindings.insert(binding, key.to_string());
        }

        log::debug!("Installing rule '{key}' ({} path(s))", rule.paths.len());
        self.rules.insert(key.to_string(), rule);
        // The trial matcher already contains every surviving rule, so it
        // becomes the published generation as-is.
        self.matcher.store(Arc::new(matcher));

        Ok(())
    }

    /// Drops a rule by its key. Unknown keys are a no-op.
    pub fn drop_rule(&self, key: &str) -> Option<Arc<RouteDef>> {
        let _guard = self.lock_writes();

        let removed = self.rules.remove(key).map(|(_, rule)| rule)?;

        for path in &removed.paths {
            self.bindings
                .remove(&Self::binding_key(removed.method, path));
        }

        log::debug!("Dropped rule '{key}'");
        self.rebuild_matcher();
        Some(removed)
    }

    /// All installed rules whose group tag equals `group`, keyed by rule
    /// name. Consistent at the instant it is read.
    pub fn enumerate_group(&self, group: &str) -> Vec<(String, Arc<RouteDef>)> {
        self.rules
            .iter()
            .filter(|entry| entry.value().group == group)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn get_rule(&self, key: &str) -> Option<Arc<RouteDef>> {
        self.rules.get(key).map(|entry| entry.value().clone())
    }

    pub fn match_request(
        &self,
        path: &str,
        method: HttpMethod,
    ) -> Option<(BTreeMap<String, String>, Arc<RouteDef>)> {
        self.matcher.load().match_request(path, method)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Drains the table. Test-harness lifecycle hook.
    pub fn reset(&self) {
        let _guard = self.lock_writes();
        self.rules.clear();
        self.bindings.clear();
        self.matcher.store(Arc::new(MatchEntry::default()));
    }

    // Mutations hold this lock across the rules/bindings change and the
    // matcher publish, so two interleaved writers cannot publish a matcher
    // built from a stale rules snapshot. Readers go through the ArcSwap.
    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn rebuild_matcher(&self) {
        let mut matcher = MatchEntry::default();

        for entry in self.rules.iter() {
            if let Err(e) = matcher.insert_rule(entry.value().clone()) {
                // Every installed rule was proven insertable by add_rule;
                // this only fires if that invariant breaks.
                log::error!("Failed to index rule {}: {}", entry.key(), e);
            }
        }

        self.matcher.store(Arc::new(matcher));
    }
}
