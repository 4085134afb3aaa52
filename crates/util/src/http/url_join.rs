use url::Url;

use super::DispatchError;

/// Resolve `route` against `host` the way a browser resolves a relative link.
///
/// An absolute route replaces the host's path; a relative one is resolved against the
/// host's last path segment.
pub fn join_url(host: &str, route: &str) -> Result<String, DispatchError> {
    let base = Url::parse(host).map_err(|error| DispatchError::InvalidUrl {
        url: host.to_string(),
        reason: error.to_string(),
    })?;
    let joined = base.join(route).map_err(|error| DispatchError::InvalidUrl {
        url: format!("{host} + {route}"),
        reason: error.to_string(),
    })?;
    Ok(joined.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_route_replaces_path() {
        assert_eq!(join_url("http://localhost:8080/api", "/items").unwrap(), "http://localhost:8080/items");
    }

    #[test]
    fn relative_route_extends_directory() {
        assert_eq!(join_url("http://localhost/api/", "items/1").unwrap(), "http://localhost/api/items/1");
    }

    #[test]
    fn bare_host_with_root_route() {
        assert_eq!(join_url("http://localhost", "/").unwrap(), "http://localhost/");
    }

    #[test]
    fn garbage_host_is_rejected() {
        assert!(matches!(join_url("not a url", "/"), Err(DispatchError::InvalidUrl { .. })));
    }
}
