use crate::prelude::*;

/// Picks the virtual host for a request: among the listening port's
/// candidates, the server whose name matches the `Host` header (port suffix
/// stripped, case-folded); otherwise the port's first server, which acts as
/// the default.
pub fn resolve_server(
    candidates: &[Arc<ServerConfig>],
    host_header: Option<&str>,
) -> Option<Arc<ServerConfig>> {
    if let Some(host) = host_header {
        let hostname = host.split(':').next().unwrap_or("");
        for config in candidates {
            if config.server_name.eq_ignore_ascii_case(hostname) {
                return Some(Arc::clone(config));
            }
        }
    }
    candidates.first().cloned()
}

/// Longest-prefix location match. Equal-length prefixes resolve to the first
/// defined; the query string never participates in matching.
pub fn find_location<'a>(config: &'a ServerConfig, target: &str) -> Option<&'a LocationConfig> {
    let path = target.split('?').next().unwrap_or(target);
    let mut best: Option<&LocationConfig> = None;
    for location in &config.locations {
        if !path.starts_with(&location.path_prefix) {
            continue;
        }
        match best {
            Some(current) if location.path_prefix.len() <= current.path_prefix.len() => {}
            _ => best = Some(location),
        }
    }
    best
}
