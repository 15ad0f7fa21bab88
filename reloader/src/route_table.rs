//! In-memory view of every service the directory has announced.

use directory::RawRoute;
use std::collections::BTreeMap;

const DEFAULT_PORT: u16 = 80;

/// Opaque per-service policy, stored and never interpreted.
pub type Policy = serde_json::Value;

/// Returns the path component of a URL-shaped service address, without any
/// query or fragment. Addresses that do not parse as URLs are returned as-is.
pub fn address_path(address: &str) -> &str {
    let rest = match address.split_once(':') {
        Some((scheme, rest)) if is_scheme(scheme) => rest,
        _ => address,
    };

    let path = match rest.strip_prefix("//") {
        Some(authority_and_path) => authority_and_path
            .find('/')
            .map_or("", |i| &authority_and_path[i..]),
        None => rest,
    };

    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

/// The proxy-facing name of a service: its address path minus the leading `/`.
pub fn service_name(address: &str) -> &str {
    let path = address_path(address);
    path.strip_prefix('/').unwrap_or(path)
}

fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// One HTTP-capable instance of a service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteEntry {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl RouteEntry {
    /// Accepts only routes whose scheme tag starts with `http`, ignoring case.
    pub fn from_raw(raw: &RawRoute) -> Option<Self> {
        let is_http = raw
            .scheme
            .get(..4)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("http"));
        if !is_http || raw.host.is_empty() {
            return None;
        }

        let path = if raw.path.is_empty() || raw.path.starts_with('/') {
            raw.path.clone()
        } else {
            format!("/{}", raw.path)
        };

        Some(RouteEntry {
            scheme: raw.scheme.to_ascii_lowercase(),
            host: raw.host.clone(),
            port: raw.port.unwrap_or(DEFAULT_PORT),
            path,
        })
    }

    pub fn url(&self) -> String {
        format!("{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
    }

    pub fn server_name(&self) -> String {
        format!("{}_{}", self.host, self.port)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouteGroup {
    /// Sorted by URL, no duplicates.
    routes: Vec<RouteEntry>,
    policy: Policy,
}

impl RouteGroup {
    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RouteTable {
    groups: BTreeMap<String, RouteGroup>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces everything known about `address` with the HTTP routes in
    /// `raw_routes`. Addresses are kept even when no route survives filtering.
    pub fn update(&mut self, address: &str, raw_routes: &[RawRoute], policy: Policy) {
        let mut routes: Vec<RouteEntry> =
            raw_routes.iter().filter_map(RouteEntry::from_raw).collect();
        routes.sort_by_cached_key(RouteEntry::url);
        routes.dedup_by(|a, b| a.url() == b.url());

        if routes.windows(2).any(|pair| pair[0].path != pair[1].path) {
            tracing::warn!(
                address,
                "Routes for service have different paths, rewriting to the first one"
            );
        }

        let duplicates = duplicate_server_names(&routes);
        if !duplicates.is_empty() {
            tracing::warn!(
                address,
                servers = ?duplicates,
                "Several routes share a host and port, the proxy will reject duplicate servers"
            );
        }

        tracing::debug!(
            address,
            announced = raw_routes.len(),
            routable = routes.len(),
            "Updated route group"
        );

        self.groups.insert(address.to_string(), RouteGroup { routes, policy });
    }

    pub fn get(&self, address: &str) -> Option<&RouteGroup> {
        self.groups.get(address)
    }

    /// Groups in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RouteGroup)> {
        self.groups.iter().map(|(address, group)| (address.as_str(), group))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of addresses that currently have at least one route.
    pub fn routed_services(&self) -> usize {
        self.groups.values().filter(|g| !g.is_empty()).count()
    }
}

/// Server names that appear more than once, e.g. the same host and port
/// announced under two schemes. Expects `routes` sorted by URL.
fn duplicate_server_names(routes: &[RouteEntry]) -> Vec<String> {
    let mut seen = BTreeMap::new();
    for route in routes {
        *seen.entry(route.server_name()).or_insert(0usize) += 1;
    }
    seen.into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(name, _)| name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_service_name() {
        assert_eq!(service_name("//dir/svc1"), "svc1");
        assert_eq!(service_name("dir://directory.internal/svc1"), "svc1");
        assert_eq!(service_name("dir://directory.internal:7000/svc1?x=1#top"), "svc1");
        assert_eq!(service_name("//dir/team/svc"), "team/svc");
        assert_eq!(service_name("/svc1"), "svc1");
        assert_eq!(service_name("svc1"), "svc1");
        assert_eq!(service_name("//dir"), "");
    }

    #[test]
    fn test_scheme_filter() {
        let routes = [
            RawRoute::new("a", Some(80), "http"),
            RawRoute::new("b", Some(81), "HTTP"),
            RawRoute::new("c", Some(82), "http2"),
            RawRoute::new("d", Some(83), "Https"),
            RawRoute::new("e", Some(84), "tcp"),
            RawRoute::new("f", Some(85), "htt"),
            RawRoute::new("g", Some(86), ""),
            RawRoute::new("", Some(87), "http"),
        ];

        let mut table = RouteTable::new();
        table.update("//dir/svc1", &routes, json!(null));

        let hosts: Vec<&str> = table
            .get("//dir/svc1")
            .unwrap()
            .routes()
            .iter()
            .map(|r| r.host.as_str())
            .collect();
        // `http2://` sorts before `http://` since '2' < ':'.
        assert_eq!(hosts, vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn test_route_entry_defaults() {
        let entry = RouteEntry::from_raw(&RawRoute::new("a", None, "HTTP").with_path("x")).unwrap();
        assert_eq!(entry.port, 80);
        assert_eq!(entry.url(), "http://a:80/x");
        assert_eq!(entry.server_name(), "a_80");
    }

    #[test]
    fn test_update_replaces_group() {
        let mut table = RouteTable::new();
        table.update(
            "//dir/svc1",
            &[RawRoute::new("a", Some(80), "http"), RawRoute::new("b", Some(80), "http")],
            json!({"v": 1}),
        );
        table.update("//dir/svc1", &[RawRoute::new("c", Some(80), "http")], json!({"v": 2}));

        let group = table.get("//dir/svc1").unwrap();
        assert_eq!(group.routes().len(), 1);
        assert_eq!(group.routes()[0].host, "c");
        assert_eq!(group.policy(), &json!({"v": 2}));
    }

    #[test]
    fn test_empty_groups_are_retained() {
        let mut table = RouteTable::new();
        table.update("//dir/svc1", &[RawRoute::new("a", Some(80), "http")], json!(null));
        table.update("//dir/svc2", &[RawRoute::new("b", Some(5432), "tcp")], json!(null));
        table.update("//dir/svc1", &[], json!(null));

        assert_eq!(table.len(), 2);
        assert!(table.get("//dir/svc1").unwrap().is_empty());
        assert!(table.get("//dir/svc2").unwrap().is_empty());
        assert_eq!(table.routed_services(), 0);
    }

    #[test]
    fn test_routes_sorted_and_deduplicated() {
        let mut table = RouteTable::new();
        table.update(
            "//dir/svc1",
            &[
                RawRoute::new("b", Some(80), "http"),
                RawRoute::new("a", Some(8080), "http"),
                RawRoute::new("a", Some(8080), "HTTP"),
                RawRoute::new("a", None, "http"),
            ],
            json!(null),
        );

        let urls: Vec<String> = table
            .get("//dir/svc1")
            .unwrap()
            .routes()
            .iter()
            .map(RouteEntry::url)
            .collect();
        assert_eq!(urls, vec!["http://a:80", "http://a:8080", "http://b:80"]);
    }

    #[test]
    fn test_iter_is_ordered() {
        let mut table = RouteTable::new();
        for address in ["//dir/c", "//dir/a", "//dir/b"] {
            table.update(address, &[], json!(null));
        }
        let addresses: Vec<&str> = table.iter().map(|(a, _)| a).collect();
        assert_eq!(addresses, vec!["//dir/a", "//dir/b", "//dir/c"]);
    }

    #[test]
    fn test_duplicate_server_names() {
        let mut table = RouteTable::new();
        table.update(
            "//dir/svc1",
            &[
                RawRoute::new("a", Some(80), "http"),
                RawRoute::new("a", Some(80), "http2"),
                RawRoute::new("a", None, "http").with_path("/v1"),
                RawRoute::new("b", Some(80), "http"),
            ],
            json!(null),
        );

        let routes = table.get("//dir/svc1").unwrap().routes();
        assert_eq!(routes.len(), 4);
        assert_eq!(duplicate_server_names(routes), vec!["a_80".to_string()]);
        assert!(duplicate_server_names(&routes[3..]).is_empty());
    }
}
