use std::collections::HashSet;
use std::fmt;
use std::fs;

use log::{debug, trace};
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::core::{ErrorContext, RegistryError, RegistryResult};

/// Entity type segment of every route group tag (`app:{tech_name}`).
pub const APP_ROUTE_GROUP_KIND: &str = "app";

/// Version stamped into every [`AppInfo`] projection.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const API_ROUTE_PATH: &str = "/app/";
const APP_URL_PATH: &str = "/web/";
const API_DOCS_URL_PATH: &str = "/api-docs/";

#[derive(Default, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Config::validate_unique_applications"))]
pub struct Config {
    #[serde(default)]
    pub log: Log,

    #[validate(nested)]
    #[serde(default)]
    pub applications: Vec<Application>,
}

// Config file load and validation
impl Config {
    pub fn load_from_yaml<P>(path: P) -> RegistryResult<Self>
    where
        P: AsRef<std::path::Path> + fmt::Display,
    {
        let conf_str = fs::read_to_string(&path)
            .with_context(&format!("Unable to read conf file from {path}"))?;
        debug!("Conf file read from {path}");
        Self::from_yaml(&conf_str)
    }

    pub fn from_yaml(conf_str: &str) -> RegistryResult<Self> {
        trace!("Read conf file: {conf_str}");
        let conf: Config = serde_yaml::from_str(conf_str).map_err(|e| {
            RegistryError::Configuration(format!("Unable to parse yaml conf: {e}"))
        })?;

        trace!("Loaded conf: {conf:?}");

        // use validator to validate conf file
        conf.validate()
            .map_err(|e| RegistryError::Validation(e.to_string()))?;

        Ok(conf)
    }

    #[allow(dead_code)]
    pub fn to_yaml(&self) -> String {
        serde_yaml::to_string(self).unwrap()
    }

    // Technical keys must be unique among active applications; a duplicate
    // refuses the whole document before any route action.
    fn validate_unique_applications(&self) -> Result<(), ValidationError> {
        let mut ids = HashSet::new();
        let mut tech_names = HashSet::new();

        for app in &self.applications {
            if !ids.insert(app.id.as_str()) {
                let mut err = ValidationError::new("duplicate_application_id");
                err.add_param("id".into(), &app.id);
                return Err(err);
            }
            if app.active && !tech_names.insert(app.tech_name.as_str()) {
                let mut err = ValidationError::new("duplicate_tech_name");
                err.add_param("tech_name".into(), &app.tech_name);
                return Err(err);
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Log {
    #[serde(default = "Log::default_level")]
    pub level: String,
}

impl Log {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// A named configuration exposing a curated set of backend services as
/// HTTP endpoints.
///
/// The technical key (`tech_name`) is immutable by convention; changing it
/// is treated as a full re-provision of every route derived from it.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Application::validate_tech_name"))]
pub struct Application {
    /// Stable storage identity, distinct from the technical key.
    #[validate(length(min = 1))]
    pub id: String,

    #[validate(length(min = 1))]
    pub name: String,

    /// Needed for the app manifest.
    #[validate(length(min = 1))]
    pub short_name: String,

    /// Unique technical key, embedded in every derived path and route name.
    #[validate(length(min = 1))]
    pub tech_name: String,

    #[serde(default = "Application::default_active")]
    pub active: bool,

    #[serde(default)]
    pub auth_type: AuthType,

    /// Profiles used by this app; opaque to the registry core.
    #[serde(default)]
    pub profile_ids: Vec<String>,
}

impl Application {
    fn default_active() -> bool {
        true
    }

    fn validate_tech_name(&self) -> Result<(), ValidationError> {
        let re = Regex::new(r"^[a-z0-9][a-z0-9_-]*$").unwrap();
        if !re.is_match(&self.tech_name) {
            let mut err = ValidationError::new("invalid_tech_name");
            err.add_param("tech_name".into(), &self.tech_name);
            return Err(err);
        }
        Ok(())
    }

    /// Fields whose mutation requires a full route re-registration.
    pub fn endpoint_impacting_fields() -> &'static [&'static str] {
        &["tech_name", "auth_type"]
    }

    /// Base route for endpoints attached to this app.
    pub fn api_route(&self) -> String {
        format!("{API_ROUTE_PATH}{}", self.tech_name)
    }

    /// Public URL to use the app.
    pub fn url(&self) -> String {
        format!("{APP_URL_PATH}{}", self.tech_name)
    }

    /// Public URL for the api docs.
    pub fn api_docs_url(&self) -> String {
        format!("{API_DOCS_URL_PATH}{}", self.tech_name)
    }

    /// Group tag identifying every dispatch rule owned by this app.
    pub fn route_group(&self) -> String {
        format!("{APP_ROUTE_GROUP_KIND}:{}", self.tech_name)
    }

    pub fn profile_required(&self) -> bool {
        !self.profile_ids.is_empty()
    }

    /// Handy method to generate services' API URLs for the current app.
    pub fn api_url_for_service(&self, service_usage: &str, endpoint: Option<&str>) -> String {
        format!(
            "{}/{}/{}",
            self.api_route(),
            service_usage,
            endpoint.unwrap_or("")
        )
        .trim_end_matches('/')
        .to_string()
    }

    /// Read-only projection handed to manifest/bootstrap consumers.
    pub fn app_info(&self) -> AppInfo {
        AppInfo {
            name: self.name.clone(),
            short_name: self.short_name.clone(),
            base_url: format!("{}/", self.api_route()),
            manifest_url: format!("{}/manifest.json", self.url()),
            auth_type: self.auth_type.clone(),
            profile_required: self.profile_required(),
            version: APP_VERSION.to_string(),
            running_env: std::env::var("RUNNING_ENV").unwrap_or_else(|_| "prod".to_string()),
        }
    }
}

/// Authentication mode carried by an application and stamped onto its
/// routes. Tags the route only; credential validation happens elsewhere.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthType {
    #[default]
    UserSession,
    ApiKey,
    Public,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
}

impl HttpMethod {
    /// Lowercase form used in synthesized route names.
    pub fn lower(&self) -> &'static str {
        match self {
            HttpMethod::GET => "get",
            HttpMethod::POST => "post",
            HttpMethod::PUT => "put",
            HttpMethod::DELETE => "delete",
            HttpMethod::PATCH => "patch",
            HttpMethod::HEAD => "head",
            HttpMethod::OPTIONS => "options",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let method = match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
        };
        write!(f, "{}", method)
    }
}

/// Per-application descriptor for external documentation and bootstrap
/// consumers. A projection, never mutable state.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppInfo {
    pub name: String,
    pub short_name: String,
    pub base_url: String,
    pub manifest_url: String,
    pub auth_type: AuthType,
    pub profile_required: bool,
    pub version: String,
    pub running_env: String,
}
