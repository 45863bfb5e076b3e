//! This crate contains the core logic of the appgate endpoint registry.
//!
//! Operator-defined applications expose their backend services as
//! authenticated HTTP endpoints without hand-written route tables: the
//! registry synthesizes route definitions from service metadata, installs
//! them into a live dispatch table and keeps that installation consistent
//! across application create/update/delete lifecycles.

pub mod config;
pub mod core;
pub mod logging;
pub mod registry;
pub mod service;
pub mod store;
