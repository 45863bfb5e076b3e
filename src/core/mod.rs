//! Shared building blocks used across the registry modules.

mod error;

pub use error::{ErrorContext, RegistryError, RegistryResult};
