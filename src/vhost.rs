//! Virtual-host description submitted by callers
//!
//! `VhostSpec` is the declarative intent one JSON payload describes: which
//! domain to answer for, which upstreams to balance across, and which
//! optional proxy behavior to switch on. `validate()` is the pre-condition
//! gate the compiler and pipeline rely on; nothing downstream re-checks
//! shape beyond defending the filesystem against unsafe names.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Declarative description of one virtual host.
///
/// The wire format is camelCase JSON. Only `name`, `fqdn`, and `backends`
/// are required; everything else defaults to the most conservative
/// behavior (plain HTTP on port 80, logging on, no extras).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VhostSpec {
    /// Unique identifier; doubles as the on-disk base name of the
    /// deployed config, so it must be a safe path segment.
    pub name: String,

    /// Domain the host answers for.
    pub fqdn: String,

    /// Ordered upstream targets, each `host:port`. Must be non-empty.
    pub backends: Vec<String>,

    /// Terminate TLS on this host.
    #[serde(default)]
    pub tls: bool,

    /// Listen port (default 80).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Emit a plaintext server that 301s everything to HTTPS.
    #[serde(default)]
    pub http_to_https: bool,

    /// Add the protocol-upgrade handshake headers for websocket traffic.
    #[serde(default)]
    pub websocket: bool,

    /// Extra response headers, emitted in insertion order.
    #[serde(default)]
    pub headers: IndexMap<String, String>,

    /// Override for `client_max_body_size` (e.g. "50m").
    #[serde(default)]
    pub client_max_body_size: Option<String>,

    /// Override for read/connect proxy timeouts (e.g. "90s").
    #[serde(default)]
    pub proxy_timeout: Option<String>,

    /// Optional proxy buffer tuning.
    #[serde(default)]
    pub buffers: Option<Buffers>,

    /// Raw trailing text injected verbatim at the end of the server
    /// block. Trusted escape hatch; not sanitized.
    #[serde(default)]
    pub extra_directives: String,

    /// Explicit route overrides. Empty means a single default catch-all
    /// route proxying to `backends`.
    #[serde(default)]
    pub locations: Vec<Location>,

    /// Basic-auth requirement.
    #[serde(default)]
    pub auth: Option<Auth>,

    /// CIDR/IP allow rules, evaluated before `ip_deny`.
    #[serde(default)]
    pub ip_allow: Vec<String>,

    /// CIDR/IP deny rules. Either list being non-empty appends a
    /// trailing deny-all.
    #[serde(default)]
    pub ip_deny: Vec<String>,

    /// Write an access log (default true). Off emits `access_log off;`,
    /// never silence.
    #[serde(default = "default_true")]
    pub access_log: bool,

    /// Write an error log (default true).
    #[serde(default = "default_true")]
    pub error_log: bool,

    /// Explicit log file paths; absent paths are derived from `name`.
    #[serde(default)]
    pub log_paths: Option<LogPaths>,
}

/// Proxy buffer size overrides; absent fields emit no directive.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Buffers {
    #[serde(default)]
    pub proxy_buffers: Option<String>,
    #[serde(default)]
    pub proxy_buffer_size: Option<String>,
    #[serde(default)]
    pub proxy_busy_buffers_size: Option<String>,
}

/// One route override inside the host block.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// nginx location matcher, e.g. `/` or `/api/`.
    pub path: String,

    /// Explicit proxy target for this route.
    #[serde(default)]
    pub proxy_pass: Option<String>,

    /// Raw directive text appended verbatim inside the route block.
    /// Trusted escape hatch; not sanitized.
    #[serde(default)]
    pub extra: Option<String>,
}

/// Authentication requirements for the host.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Auth {
    /// HTTP basic auth; credentials file is derived from the host name.
    #[serde(default)]
    pub basic: Option<BasicAuth>,
}

/// Basic-auth settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BasicAuth {
    /// Realm shown in the browser's credential prompt.
    pub realm: String,
}

/// Explicit log destinations; either side may be left to the default.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LogPaths {
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_port() -> u16 {
    80
}

fn default_true() -> bool {
    true
}

/// True if `name` is usable as a single path segment: non-empty,
/// ASCII alphanumerics plus `-`, `_`, and interior dots, with no way to
/// traverse out of the config directory.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// True if `value` has the `host:port` shape backends must carry.
fn is_host_port(value: &str) -> bool {
    match value.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty() && !host.contains(':') && port.parse::<u16>().is_ok()
        }
        None => false,
    }
}

/// True if `value` can sit inside a double-quoted directive argument
/// without terminating it or the enclosing line.
fn is_quotable(value: &str) -> bool {
    !value.contains('"') && !value.contains('\n') && !value.contains('\r')
}

impl VhostSpec {
    /// Validate the description before it reaches the compiler.
    ///
    /// All problems are collected and reported together rather than one
    /// at a time. Passing this gate means compilation cannot fail and
    /// the emitted quoted arguments cannot be broken out of.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if !is_safe_name(&self.name) {
            errors.push(format!(
                "name '{}' must be a non-empty path-safe segment (alphanumerics, '-', '_', '.')",
                self.name
            ));
        }

        if self.fqdn.trim().is_empty() {
            errors.push("fqdn must not be empty".to_string());
        }

        if self.backends.is_empty() {
            errors.push("at least one backend is required".to_string());
        }
        for backend in &self.backends {
            if !is_host_port(backend) {
                errors.push(format!("backend '{backend}' must match host:port"));
            }
        }

        for (key, value) in &self.headers {
            if key.trim().is_empty() || !is_quotable(key) {
                errors.push(format!("header name '{key}' is not a valid directive argument"));
            }
            if !is_quotable(value) {
                errors.push(format!(
                    "header '{key}' value must not contain quotes or line breaks"
                ));
            }
        }

        if let Some(basic) = self.auth.as_ref().and_then(|a| a.basic.as_ref()) {
            if !is_quotable(&basic.realm) {
                errors.push("auth realm must not contain quotes or line breaks".to_string());
            }
        }

        for location in &self.locations {
            if location.path.trim().is_empty() {
                errors.push("location path must not be empty".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidInput(errors.join("; ")))
        }
    }
}
