//! Compilation of a host description into nginx configuration text
//!
//! `render` is a total function over validated input: same description in,
//! byte-identical document out. Directive order inside the route body is
//! load-bearing because nginx applies last-wins semantics for repeated
//! directive kinds, so the sequence here is a contract, not formatting.

use crate::directives;
use crate::vhost::{Location, VhostSpec};

/// Upstream pool identifier derived from the domain, with dots flattened
/// to underscores so it parses as a plain nginx identifier.
pub fn upstream_name(fqdn: &str) -> String {
    fqdn.replace('.', "_")
}

/// Render the complete configuration document for one host.
///
/// Output is the upstream block, the plaintext redirect server when
/// `http_to_https` is set, and then the main server block, separated by
/// blank lines with no leading or trailing whitespace.
pub fn render(spec: &VhostSpec) -> String {
    let upstream = upstream_name(&spec.fqdn);

    let mut parts = vec![upstream_block(spec, &upstream)];
    if spec.http_to_https {
        parts.push(redirect_block(&spec.fqdn));
    }
    parts.push(server_block(spec, &upstream));

    parts.join("\n\n")
}

fn upstream_block(spec: &VhostSpec, upstream: &str) -> String {
    let servers: Vec<String> = spec
        .backends
        .iter()
        .map(|backend| format!("    server {backend};"))
        .collect();
    format!("upstream {upstream} {{\n{}\n}}", servers.join("\n"))
}

fn redirect_block(fqdn: &str) -> String {
    format!(
        "server {{\n    listen 80;\n    server_name {fqdn};\n    return 301 https://{fqdn}$request_uri;\n}}"
    )
}

fn server_block(spec: &VhostSpec, upstream: &str) -> String {
    let tls_tag = if spec.tls { " ssl" } else { "" };
    let mut sections = vec![format!(
        "    listen {}{tls_tag};\n    server_name {};",
        spec.port, spec.fqdn
    )];

    if spec.tls {
        sections.push(indent(&tls_lines(&spec.fqdn), "    "));
    }

    let (access_path, error_path) = resolved_log_paths(spec);
    sections.push(indent(
        &[
            directives::access_log_directive(spec.access_log, &access_path),
            directives::error_log_directive(spec.error_log, &error_path),
        ],
        "    ",
    ));

    if spec.locations.is_empty() {
        sections.push(default_route(spec, upstream));
    } else {
        for location in &spec.locations {
            sections.push(location_block(location));
        }
    }

    let extra = spec.extra_directives.trim();
    if !extra.is_empty() {
        let lines: Vec<String> = extra.lines().map(str::to_string).collect();
        sections.push(indent(&lines, "    "));
    }

    format!("server {{\n{}\n}}", sections.join("\n\n"))
}

/// The single catch-all route used when no explicit locations are given.
/// Body order: proxy target, proxy headers, body-size limit, timeouts,
/// response headers, buffers, auth, IP filter.
fn default_route(spec: &VhostSpec, upstream: &str) -> String {
    let mut lines = vec![format!("proxy_pass http://{upstream};")];
    lines.extend(directives::base_proxy_headers(spec.websocket));
    if let Some(size) = &spec.client_max_body_size {
        lines.push(format!("client_max_body_size {size};"));
    }
    lines.extend(directives::timeout_directives(spec.proxy_timeout.as_deref()));
    lines.extend(directives::header_directives(&spec.headers));
    lines.extend(directives::buffer_directives(spec.buffers.as_ref()));
    lines.extend(directives::auth_directives(&spec.name, spec.auth.as_ref()));
    lines.extend(directives::ip_filter_directives(&spec.ip_allow, &spec.ip_deny));

    format!("    location / {{\n{}\n    }}", indent(&lines, "        "))
}

/// An explicit route carries only what the caller asked for: the proxy
/// target if one was given and the raw extension text as-is. An entry
/// with neither yields an empty body, which nginx accepts.
fn location_block(location: &Location) -> String {
    let mut lines = Vec::new();
    if let Some(target) = &location.proxy_pass {
        lines.push(format!("proxy_pass {target};"));
    }
    if let Some(extra) = &location.extra {
        lines.extend(extra.trim().lines().map(str::to_string));
    }

    if lines.is_empty() {
        format!("    location {} {{\n    }}", location.path)
    } else {
        format!(
            "    location {} {{\n{}\n    }}",
            location.path,
            indent(&lines, "        ")
        )
    }
}

fn tls_lines(fqdn: &str) -> Vec<String> {
    vec![
        format!("ssl_certificate     /etc/nginx/ssl/{fqdn}.crt;"),
        format!("ssl_certificate_key /etc/nginx/ssl/{fqdn}.key;"),
        "ssl_protocols       TLSv1.2 TLSv1.3;".to_string(),
        "ssl_ciphers         HIGH:!aNULL:!MD5;".to_string(),
    ]
}

/// Log destinations fall back to conventional per-host paths under
/// /var/log/nginx when the caller does not override them.
fn resolved_log_paths(spec: &VhostSpec) -> (String, String) {
    let overrides = spec.log_paths.as_ref();
    let access = overrides
        .and_then(|paths| paths.access.clone())
        .unwrap_or_else(|| format!("/var/log/nginx/{}_access.log", spec.name));
    let error = overrides
        .and_then(|paths| paths.error.clone())
        .unwrap_or_else(|| format!("/var/log/nginx/{}_error.log", spec.name));
    (access, error)
}

fn indent(lines: &[String], pad: &str) -> String {
    lines
        .iter()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
