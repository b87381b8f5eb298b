pub mod display;
pub mod lexer;
pub mod parser;

use std::path::PathBuf;
use std::sync::Arc;

use self::parser::{ConfigError, ConfigParser};
use crate::http::Method;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.config";

pub const DEFAULT_MAX_BODY_SIZE: usize = 1_048_576; // 1MB
pub const DEFAULT_KEEPALIVE_TIMEOUT: u64 = 15;
pub const DEFAULT_SEND_TIMEOUT: u64 = 30;

/// One rule inside a server block, keyed by a URL path prefix.
#[derive(Debug, Clone)]
pub struct LocationConfig {
    pub path_prefix: String,
    pub allowed_methods: Vec<Method>,
    pub redirection: Option<String>,
}

/// One virtual host. Immutable after load, shared behind `Arc`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_port: u16,
    pub server_name: String,
    pub root_directory: PathBuf,
    pub index_file: String,
    pub directory_listing: bool,
    pub client_max_body_size: usize,
    pub keep_alive_timeout: u64,
    pub send_timeout: u64,
    pub locations: Vec<LocationConfig>,
}

#[derive(Debug)]
pub struct HttpConfig {
    pub servers: Vec<Arc<ServerConfig>>,
    pub poll_timeout_ms: i32,
}

impl HttpConfig {
    pub fn load(path: &str) -> Result<HttpConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::message(format!("failed to open config file '{}': {}", path, e))
        })?;
        Self::parse_str(&content)
    }

    pub fn parse_str(content: &str) -> Result<HttpConfig, ConfigError> {
        let tokens = lexer::Lexer::new(content).tokenize()?;
        ConfigParser::new(tokens).parse()
    }

    /// Every port with at least one server, in definition order, deduplicated.
    pub fn listen_ports(&self) -> Vec<u16> {
        let mut ports = Vec::new();
        for server in &self.servers {
            if !ports.contains(&server.listen_port) {
                ports.push(server.listen_port);
            }
        }
        ports
    }

    /// The virtual-host candidates for one listening port, in definition
    /// order. The first entry is the port's default server.
    pub fn servers_for_port(&self, port: u16) -> Vec<Arc<ServerConfig>> {
        self.servers
            .iter()
            .filter(|s| s.listen_port == port)
            .cloned()
            .collect()
    }
}
