use weblog::info;

use super::HttpConfig;
use crate::http::Method;

impl HttpConfig {
    /// Startup summary of every loaded virtual host.
    pub fn display_config(&self) {
        info!(
            "loaded {} server(s), poll timeout {}ms",
            self.servers.len(),
            self.poll_timeout_ms
        );
        for server in &self.servers {
            info!(
                "server '{}' on port {} (root {}, index {}, max body {} bytes, \
                 keep-alive {}s, send {}s, listing {})",
                server.server_name,
                server.listen_port,
                server.root_directory.display(),
                server.index_file,
                server.client_max_body_size,
                server.keep_alive_timeout,
                server.send_timeout,
                server.directory_listing
            );
            for location in &server.locations {
                let methods: Vec<&str> =
                    location.allowed_methods.iter().map(Method::as_str).collect();
                match &location.redirection {
                    Some(target) => info!(
                        "  location {} [{}] -> {}",
                        location.path_prefix,
                        methods.join(" "),
                        target
                    ),
                    None => info!("  location {} [{}]", location.path_prefix, methods.join(" ")),
                }
            }
        }
    }
}
