//! Builders for individual nginx directive fragments
//!
//! Every function here is a pure mapping from schema fields to directive
//! lines; ordering inside each fragment is part of the compiled contract
//! (nginx evaluates access rules top to bottom, first match wins), and
//! none of them know how the host block is assembled around them.

use crate::vhost::{Auth, Buffers};
use indexmap::IndexMap;

/// Proxy headers every route carries, with the websocket upgrade
/// handshake appended when requested.
pub fn base_proxy_headers(websocket: bool) -> Vec<String> {
    let mut headers = vec![
        "proxy_set_header Host $host;".to_string(),
        "proxy_set_header X-Real-IP $remote_addr;".to_string(),
        "proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;".to_string(),
    ];

    if websocket {
        headers.push("proxy_http_version 1.1;".to_string());
        headers.push("proxy_set_header Upgrade $http_upgrade;".to_string());
        headers.push("proxy_set_header Connection \"upgrade\";".to_string());
    }

    headers
}

/// One `add_header` line per entry, in insertion order, value quoted
/// as given. The schema gate has already rejected values that could
/// escape the quotes.
pub fn header_directives(headers: &IndexMap<String, String>) -> Vec<String> {
    headers
        .iter()
        .map(|(name, value)| format!("add_header {name} \"{value}\";"))
        .collect()
}

/// Basic-auth pair referencing the per-host credentials file, present
/// only when a realm was supplied.
pub fn auth_directives(name: &str, auth: Option<&Auth>) -> Vec<String> {
    match auth.and_then(|a| a.basic.as_ref()) {
        Some(basic) => vec![
            format!("auth_basic \"{}\";", basic.realm),
            format!("auth_basic_user_file /etc/nginx/auth/{name}.htpasswd;"),
        ],
        None => Vec::new(),
    }
}

/// Allow rules, then deny rules, in their given orders; any rule at all
/// implies a trailing `deny all;` so unmatched clients are shut out.
pub fn ip_filter_directives(allow: &[String], deny: &[String]) -> Vec<String> {
    let mut rules: Vec<String> = allow.iter().map(|ip| format!("allow {ip};")).collect();
    rules.extend(deny.iter().map(|ip| format!("deny {ip};")));
    if !rules.is_empty() {
        rules.push("deny all;".to_string());
    }
    rules
}

/// Buffer tuning directives for whichever fields are present; absent
/// fields emit nothing rather than an empty directive.
pub fn buffer_directives(buffers: Option<&Buffers>) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(buffers) = buffers {
        if let Some(v) = &buffers.proxy_buffers {
            out.push(format!("proxy_buffers {v};"));
        }
        if let Some(v) = &buffers.proxy_buffer_size {
            out.push(format!("proxy_buffer_size {v};"));
        }
        if let Some(v) = &buffers.proxy_busy_buffers_size {
            out.push(format!("proxy_busy_buffers_size {v};"));
        }
    }
    out
}

/// Read and connect timeouts, both pinned to the same value when set.
pub fn timeout_directives(proxy_timeout: Option<&str>) -> Vec<String> {
    match proxy_timeout {
        Some(timeout) => vec![
            format!("proxy_read_timeout {timeout};"),
            format!("proxy_connect_timeout {timeout};"),
        ],
        None => Vec::new(),
    }
}

/// Access-log directive: an explicit destination or an explicit off,
/// never omitted.
pub fn access_log_directive(enabled: bool, path: &str) -> String {
    if enabled {
        format!("access_log {path};")
    } else {
        "access_log off;".to_string()
    }
}

/// Error-log directive, same toggle contract as the access log.
pub fn error_log_directive(enabled: bool, path: &str) -> String {
    if enabled {
        format!("error_log {path};")
    } else {
        "error_log off;".to_string()
    }
}
