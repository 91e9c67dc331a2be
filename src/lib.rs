//! Confgate - a control-plane sidecar for nginx virtual hosts
//!
//! This library provides the pieces of a config-management sidecar that:
//! - Compiles structured virtual-host descriptions into nginx config text
//! - Validates every candidate with `nginx -t` before it can go live
//! - Promotes validated candidates into the live directory with an atomic rename
//! - Exposes a small HTTP API for config CRUD, re-checks, and reloads

pub mod api;
pub mod config;
pub mod deploy;
pub mod directives;
pub mod error;
pub mod nginx;
pub mod store;
pub mod template;
pub mod vhost;
