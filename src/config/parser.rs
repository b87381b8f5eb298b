use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::lexer::{Loc, Token, TokenType};
use super::{
    HttpConfig, LocationConfig, ServerConfig, DEFAULT_KEEPALIVE_TIMEOUT, DEFAULT_MAX_BODY_SIZE,
    DEFAULT_SEND_TIMEOUT,
};
use crate::http::Method;

// --- Error handling ---

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub loc: Option<Loc>,
}

impl ConfigError {
    pub fn message(message: impl Into<String>) -> Self {
        ConfigError {
            message: message.into(),
            loc: None,
        }
    }

    fn at(message: String, loc: Option<Loc>) -> Self {
        ConfigError { message, loc }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\x1b[1;31mConfiguration Error\x1b[0m: {}", self.message)?;
        if let Some(loc) = self.loc {
            write!(
                f,
                " \x1b[38;5;244m(at line {}, col {})\x1b[0m",
                loc.line, loc.col
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigError {}

pub type ParseResult<T> = Result<T, ConfigError>;

// --- Config parser ---

const REQUIRED_SERVER_KEYS: [&str; 4] = ["listen", "server_name", "root", "index"];

pub struct ConfigParser {
    tokens: Vec<Token>,
    cursor: usize,
}

impl ConfigParser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, cursor: 0 }
    }

    // ====== Token access ======

    fn peek_kind(&self) -> Option<&TokenType> {
        self.tokens.get(self.cursor).map(|t| &t.kind)
    }

    fn peek_loc(&self) -> Option<Loc> {
        self.tokens.get(self.cursor).map(|t| t.loc)
    }

    fn bump(&mut self) {
        self.cursor += 1;
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek_kind(), Some(TokenType::Newline)) {
            self.cursor += 1;
        }
    }

    // ====== Consumption & validation ======

    fn expect_lbrace(&mut self, section: &str) -> ParseResult<()> {
        let loc = self.peek_loc();
        match self.peek_kind() {
            Some(TokenType::LBrace) => {
                self.bump();
                Ok(())
            }
            Some(kind) => Err(ConfigError::at(
                format!("Expected '{{' to open {} section, found {:?}", section, kind),
                loc,
            )),
            None => Err(ConfigError::at(
                format!("Expected '{{' to open {} section, found EOF", section),
                loc,
            )),
        }
    }

    fn next_word(&mut self, what: &str) -> ParseResult<String> {
        let loc = self.peek_loc();
        match self.peek_kind() {
            Some(TokenType::Word(s)) => {
                let s = s.clone();
                self.bump();
                Ok(s)
            }
            Some(TokenType::Number(n)) => {
                let s = n.to_string();
                self.bump();
                Ok(s)
            }
            Some(kind) => Err(ConfigError::at(
                format!("Value is missing for '{}', found {:?}", what, kind),
                loc,
            )),
            None => Err(ConfigError::at(
                format!("Value is missing for '{}'", what),
                loc,
            )),
        }
    }

    fn next_number(&mut self, what: &str) -> ParseResult<u64> {
        let loc = self.peek_loc();
        match self.peek_kind() {
            Some(TokenType::Number(n)) => {
                let n = *n;
                self.bump();
                Ok(n)
            }
            Some(kind) => Err(ConfigError::at(
                format!("Expected a number for '{}', found {:?}", what, kind),
                loc,
            )),
            None => Err(ConfigError::at(
                format!("Expected a number for '{}', found EOF", what),
                loc,
            )),
        }
    }

    // A scalar directive takes its values and nothing else until end of line.
    fn end_of_line(&mut self, directive: &str) -> ParseResult<()> {
        let loc = self.peek_loc();
        match self.peek_kind() {
            Some(TokenType::Newline) => {
                self.bump();
                Ok(())
            }
            Some(TokenType::RBrace) | None => Ok(()),
            Some(kind) => Err(ConfigError::at(
                format!("Unexpected {:?} after '{}' directive", kind, directive),
                loc,
            )),
        }
    }

    fn note_defined(
        defined: &mut HashSet<String>,
        key: &str,
        loc: Option<Loc>,
    ) -> ParseResult<()> {
        if !defined.insert(key.to_string()) {
            return Err(ConfigError::at(format!("Duplicate directive '{}'", key), loc));
        }
        Ok(())
    }

    // ====== Sections ======

    pub fn parse(mut self) -> ParseResult<HttpConfig> {
        self.skip_newlines();
        let loc = self.peek_loc();
        match self.peek_kind() {
            Some(TokenType::Word(w)) if w == "http" => self.bump(),
            Some(kind) => {
                return Err(ConfigError::at(
                    format!("Expected 'http' section, found {:?}", kind),
                    loc,
                ))
            }
            None => return Err(ConfigError::message("Config file is empty")),
        }
        self.expect_lbrace("http")?;

        let mut servers: Vec<ServerConfig> = Vec::new();
        let mut poll_timeout: Option<i32> = None;

        loop {
            self.skip_newlines();
            let loc = self.peek_loc();
            match self.peek_kind().cloned() {
                Some(TokenType::RBrace) => {
                    self.bump();
                    break;
                }
                Some(TokenType::Word(key)) if key == "server_timeout_time" => {
                    self.bump();
                    if poll_timeout.is_some() {
                        return Err(ConfigError::at(
                            "Duplicate directive 'server_timeout_time'".to_string(),
                            loc,
                        ));
                    }
                    let value = self.next_number("server_timeout_time")?;
                    if value > i32::MAX as u64 {
                        return Err(ConfigError::at(
                            format!("Invalid server_timeout_time {}", value),
                            loc,
                        ));
                    }
                    poll_timeout = Some(value as i32);
                    self.end_of_line("server_timeout_time")?;
                }
                Some(TokenType::Word(key)) if key == "server" => {
                    self.bump();
                    self.expect_lbrace("server")?;
                    servers.push(self.parse_server()?);
                }
                Some(kind) => {
                    return Err(ConfigError::at(
                        format!("Unknown http directive {:?}", kind),
                        loc,
                    ))
                }
                None => {
                    return Err(ConfigError::message(
                        "Configuration file is missing closing brace '}' for a section",
                    ))
                }
            }
        }

        self.skip_newlines();
        if let Some(kind) = self.peek_kind() {
            return Err(ConfigError::at(
                format!("Unexpected {:?} after http section", kind),
                self.peek_loc(),
            ));
        }

        let poll_timeout_ms = poll_timeout
            .ok_or_else(|| ConfigError::message("http section is missing 'server_timeout_time'"))?;
        if servers.is_empty() {
            return Err(ConfigError::message(
                "http section does not define any server",
            ));
        }

        Ok(HttpConfig {
            servers: servers.into_iter().map(Arc::new).collect(),
            poll_timeout_ms,
        })
    }

    fn parse_server(&mut self) -> ParseResult<ServerConfig> {
        let mut defined: HashSet<String> = HashSet::new();
        let mut listen_port: Option<u16> = None;
        let mut server_name: Option<String> = None;
        let mut root_directory: Option<PathBuf> = None;
        let mut index_file: Option<String> = None;
        let mut directory_listing = false;
        let mut client_max_body_size = DEFAULT_MAX_BODY_SIZE;
        let mut keep_alive_timeout = DEFAULT_KEEPALIVE_TIMEOUT;
        let mut send_timeout = DEFAULT_SEND_TIMEOUT;
        let mut locations: Vec<LocationConfig> = Vec::new();

        loop {
            self.skip_newlines();
            let loc = self.peek_loc();
            match self.peek_kind().cloned() {
                Some(TokenType::RBrace) => {
                    self.bump();
                    break;
                }
                Some(TokenType::Word(key)) => {
                    self.bump();
                    match key.as_str() {
                        "listen" => {
                            Self::note_defined(&mut defined, &key, loc)?;
                            let port = self.next_number("listen")?;
                            if port == 0 || port > u16::MAX as u64 {
                                return Err(ConfigError::at(
                                    format!("Invalid port {}", port),
                                    loc,
                                ));
                            }
                            listen_port = Some(port as u16);
                            self.end_of_line(&key)?;
                        }
                        "server_name" => {
                            Self::note_defined(&mut defined, &key, loc)?;
                            server_name = Some(self.next_word(&key)?);
                            self.end_of_line(&key)?;
                        }
                        "root" => {
                            Self::note_defined(&mut defined, &key, loc)?;
                            root_directory = Some(PathBuf::from(self.next_word(&key)?));
                            self.end_of_line(&key)?;
                        }
                        "index" => {
                            Self::note_defined(&mut defined, &key, loc)?;
                            index_file = Some(self.next_word(&key)?);
                            self.end_of_line(&key)?;
                        }
                        "max_body_size" => {
                            Self::note_defined(&mut defined, &key, loc)?;
                            client_max_body_size = self.next_number(&key)? as usize;
                            self.end_of_line(&key)?;
                        }
                        "directory_listing" => {
                            Self::note_defined(&mut defined, &key, loc)?;
                            directory_listing = match self.next_word(&key)?.as_str() {
                                "true" => true,
                                "false" => false,
                                other => {
                                    return Err(ConfigError::at(
                                        format!(
                                            "directory_listing must be true or false, found '{}'",
                                            other
                                        ),
                                        loc,
                                    ))
                                }
                            };
                            self.end_of_line(&key)?;
                        }
                        "keepalive_timeout" => {
                            Self::note_defined(&mut defined, &key, loc)?;
                            keep_alive_timeout = self.next_number(&key)?;
                            self.end_of_line(&key)?;
                        }
                        "send_timeout" => {
                            Self::note_defined(&mut defined, &key, loc)?;
                            send_timeout = self.next_number(&key)?;
                            self.end_of_line(&key)?;
                        }
                        "location" => {
                            let prefix = self.next_word("location")?;
                            if locations.iter().any(|l| l.path_prefix == prefix) {
                                return Err(ConfigError::at(
                                    format!("Duplicate location prefix '{}'", prefix),
                                    loc,
                                ));
                            }
                            self.expect_lbrace("location")?;
                            locations.push(self.parse_location(prefix)?);
                        }
                        _ => {
                            return Err(ConfigError::at(
                                format!("Unknown server directive '{}'", key),
                                loc,
                            ))
                        }
                    }
                }
                Some(kind) => {
                    return Err(ConfigError::at(
                        format!("Unexpected {:?} in server section", kind),
                        loc,
                    ))
                }
                None => {
                    return Err(ConfigError::message(
                        "Configuration file is missing closing brace '}' for a section",
                    ))
                }
            }
        }

        let missing: Vec<&str> = REQUIRED_SERVER_KEYS
            .iter()
            .filter(|key| !defined.contains(**key))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::message(format!(
                "Server config missing required elements: {}",
                missing.join(" ")
            )));
        }

        Ok(ServerConfig {
            listen_port: listen_port.unwrap_or_default(),
            server_name: server_name.unwrap_or_default(),
            root_directory: root_directory.unwrap_or_default(),
            index_file: index_file.unwrap_or_default(),
            directory_listing,
            client_max_body_size,
            keep_alive_timeout,
            send_timeout,
            locations,
        })
    }

    fn parse_location(&mut self, path_prefix: String) -> ParseResult<LocationConfig> {
        let mut defined: HashSet<String> = HashSet::new();
        let mut allowed_methods: Vec<Method> = Vec::new();
        let mut redirection: Option<String> = None;

        loop {
            self.skip_newlines();
            let loc = self.peek_loc();
            match self.peek_kind().cloned() {
                Some(TokenType::RBrace) => {
                    self.bump();
                    break;
                }
                Some(TokenType::Word(key)) if key == "request_types" => {
                    self.bump();
                    Self::note_defined(&mut defined, &key, loc)?;
                    while let Some(TokenType::Word(_)) = self.peek_kind() {
                        let word = self.next_word("request_types")?;
                        match Method::from(word.as_str()) {
                            Method::Other(name) => {
                                return Err(ConfigError::at(
                                    format!("Unsupported request type: {}", name),
                                    loc,
                                ))
                            }
                            method => allowed_methods.push(method),
                        }
                    }
                    if allowed_methods.is_empty() {
                        return Err(ConfigError::at(
                            "Value is missing for 'request_types'".to_string(),
                            loc,
                        ));
                    }
                    self.end_of_line(&key)?;
                }
                Some(TokenType::Word(key)) if key == "redirection" => {
                    self.bump();
                    Self::note_defined(&mut defined, &key, loc)?;
                    redirection = Some(self.next_word(&key)?);
                    self.end_of_line(&key)?;
                }
                Some(kind) => {
                    return Err(ConfigError::at(
                        format!("Unknown key in location section: {:?}", kind),
                        loc,
                    ))
                }
                None => {
                    return Err(ConfigError::message(
                        "Configuration file is missing closing brace '}' for a section",
                    ))
                }
            }
        }

        Ok(LocationConfig {
            path_prefix,
            allowed_methods,
            redirection,
        })
    }
}
