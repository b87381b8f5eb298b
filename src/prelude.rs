pub use crate::config::{HttpConfig, LocationConfig, ServerConfig, DEFAULT_CONFIG_PATH};
pub use crate::error::Result;
pub use crate::http::*;

pub use crate::cgi::CgiHandle;
pub use crate::router::{find_location, resolve_server};
pub use crate::server::Server;

pub use mio::{
    event::Event,
    net::{TcpListener, TcpStream},
    Events, Interest, Poll, Token,
};
pub use weblog::{debug, errors, info, trace, warn};

pub use std::collections::HashMap;
pub use std::fs::{self, File};
pub use std::io::{ErrorKind, Read, Write};
pub use std::net::SocketAddr;
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;
pub use std::time::{Duration, Instant};

pub const READ_BUF_SIZE: usize = 4096;

pub const HTTP_OK: u16 = 200;
pub const HTTP_CREATED: u16 = 201;
pub const HTTP_FOUND: u16 = 302;

// 4xx client errors
pub const HTTP_BAD_REQUEST: u16 = 400;
pub const HTTP_FORBIDDEN: u16 = 403;
pub const HTTP_NOT_FOUND: u16 = 404;
pub const HTTP_METHOD_NOT_ALLOWED: u16 = 405;
pub const HTTP_PAYLOAD_TOO_LARGE: u16 = 413;

// 5xx server errors
pub const HTTP_INTERNAL_SERVER_ERROR: u16 = 500;
pub const HTTP_NOT_IMPLEMENTED: u16 = 501;
