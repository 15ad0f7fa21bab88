//! Turns the route table into HAProxy configuration text.
//!
//! Rendering is deterministic: addresses and routes are emitted in ascending
//! order, so an unchanged route table always produces byte-identical output
//! and the publisher can detect changes with a plain string comparison.

use crate::route_table::{RouteGroup, RouteTable, service_name};

const SERVER_MAXCONN: u32 = 32;

const HEADER: &[&str] = &[
    "# Managed by haproxy-sidecar from directory route announcements.",
    "# Manual changes are overwritten on the next route update.",
];

const BASE_TEMPLATE: &[&str] = &[
    "global",
    "    daemon",
    "    maxconn 4096",
    "",
    "defaults",
    "    mode http",
    "    option httplog",
    "    option forwardfor",
    "    timeout connect 5s",
    "    timeout client 30s",
    "    timeout server 30s",
    "",
    "frontend http-in",
    "    bind *:80",
];

pub fn render(table: &RouteTable) -> String {
    let mut frontend = Vec::new();
    let mut backends = Vec::new();

    for (address, group) in table.iter().filter(|(_, group)| !group.is_empty()) {
        let name = service_name(address);
        let backend_name = format!("BE_{name}");
        let acl_name = format!("IS_{name}");

        frontend.push(format!("    acl {acl_name} path_beg /{name}"));
        frontend.push(format!("    use_backend {backend_name} if {acl_name}"));

        backends.push(String::new());
        backends.push(format!("backend {backend_name}"));
        backends.push(rewrite_rule(name, group));
        for route in group.routes() {
            backends.push(format!(
                "    server {} {}:{} maxconn {SERVER_MAXCONN}",
                route.server_name(),
                route.host,
                route.port
            ));
        }
    }

    HEADER
        .iter()
        .chain(BASE_TEMPLATE)
        .map(|line| line.to_string())
        .chain(frontend)
        .chain(backends)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strips `/<name>` from the request path and puts the service's own path in
/// its place. The query string is not part of the path and is kept as-is.
///
/// Routes are sorted, so the first one decides the target path. Groups whose
/// routes disagree on the path get a rule that is wrong for some servers.
fn rewrite_rule(name: &str, group: &RouteGroup) -> String {
    let rewrite_path = group
        .routes()
        .first()
        .map(|route| route.path.as_str())
        .filter(|path| !path.is_empty())
        .unwrap_or("/");
    let prefix = escape_regex(name);

    match rewrite_path.trim_end_matches('/') {
        "" => format!("    http-request replace-path ^/{prefix}/?(.*)$ /\\1"),
        target => format!("    http-request replace-path ^/{prefix}(.*)$ {target}\\1"),
    }
}

fn escape_regex(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
