use std::fmt;

use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Other(name) => name,
        }
    }

    pub fn is_allowed(&self, allowed_methods: &[Method]) -> bool {
        allowed_methods.contains(self)
    }
}

impl Default for Method {
    fn default() -> Self {
        Method::Get
    }
}

impl From<&str> for Method {
    fn from(s: &str) -> Self {
        match s {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "DELETE" => Method::Delete,
            other => Method::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    MalformedRequestLine,
    MalformedHeader,
    MissingBoundary,
    MalformedMultipart,
    BodyLengthMismatch,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MalformedRequestLine => write!(f, "Malformed request line"),
            ParseError::MalformedHeader => write!(f, "Malformed header line"),
            ParseError::MissingBoundary => write!(f, "Multipart body without a boundary"),
            ParseError::MalformedMultipart => write!(f, "Malformed multipart body"),
            ParseError::BodyLengthMismatch => write!(f, "Body shorter than Content-Length"),
        }
    }
}

impl std::error::Error for ParseError {}

/// A fully received request. The parser only ever sees complete requests:
/// the connection layer withholds the bytes until the headers are terminated
/// and `Content-Length` bytes of body have arrived.
#[derive(Debug, Default)]
pub struct HttpRequest {
    pub method: Method,
    pub target: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub uploaded_filename: Option<String>,
    pub uploaded_content_type: Option<String>,
}

impl HttpRequest {
    pub fn parse(bytes: &[u8]) -> core::result::Result<HttpRequest, ParseError> {
        let header_end =
            find_subsequence(bytes, b"\r\n\r\n", 0).ok_or(ParseError::MalformedRequestLine)?;
        let head = std::str::from_utf8(&bytes[..header_end])
            .map_err(|_| ParseError::MalformedRequestLine)?;

        let mut lines = head.split("\r\n");
        let request_line = lines.next().ok_or(ParseError::MalformedRequestLine)?;
        let mut request = parse_request_line(request_line)?;

        for line in lines {
            let sep = line.find(':').ok_or(ParseError::MalformedHeader)?;
            let name = &line[..sep];
            if name.is_empty() {
                return Err(ParseError::MalformedHeader);
            }
            let value = line[sep + 1..].trim_matches(|c| c == ' ' || c == '\t');
            // last occurrence wins
            request
                .headers
                .insert(name.to_string(), value.to_string());
        }

        let declared = request
            .header("Content-Length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        let body = &bytes[header_end + 4..];
        if body.len() < declared {
            return Err(ParseError::BodyLengthMismatch);
        }
        let body = &body[..declared];

        let content_type = request.header("Content-Type").unwrap_or("").to_string();
        if content_type.starts_with("multipart/form-data") {
            let boundary = content_type
                .split("boundary=")
                .nth(1)
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .ok_or(ParseError::MissingBoundary)?
                .to_string();
            request.parse_multipart(body, &boundary)?;
        } else {
            request.body = body.to_vec();
        }

        Ok(request)
    }

    /// Exact-name header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// `Host` is the one header looked up case-insensitively.
    pub fn host(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("host"))
            .map(|(_, value)| value.as_str())
    }

    // A single file part: skip up to the first boundary line, read the part
    // headers, then take the raw bytes up to the closing `\r\n--boundary`.
    fn parse_multipart(
        &mut self,
        body: &[u8],
        boundary: &str,
    ) -> core::result::Result<(), ParseError> {
        let delimiter = format!("--{}", boundary);
        let first = find_subsequence(body, delimiter.as_bytes(), 0)
            .ok_or(ParseError::MalformedMultipart)?;
        let boundary_line_end =
            find_subsequence(body, b"\r\n", first).ok_or(ParseError::MalformedMultipart)?;
        let part_start = boundary_line_end + 2;

        let header_sep = find_subsequence(body, b"\r\n\r\n", part_start)
            .ok_or(ParseError::MalformedMultipart)?;
        let header_block = std::str::from_utf8(&body[part_start..header_sep])
            .map_err(|_| ParseError::MalformedMultipart)?;
        let data_start = header_sep + 4;

        let terminator = format!("\r\n--{}", boundary);
        let data_end = find_subsequence(body, terminator.as_bytes(), data_start)
            .ok_or(ParseError::MalformedMultipart)?;

        let part = parse_part_headers(header_block);
        self.uploaded_filename = part.filename;
        self.uploaded_content_type = part.content_type;
        self.body = body[data_start..data_end].to_vec();
        Ok(())
    }
}

// The request line is `METHOD SP TARGET SP VERSION`, exactly one space
// between fields.
fn parse_request_line(line: &str) -> core::result::Result<HttpRequest, ParseError> {
    let mut parts = line.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::MalformedRequestLine);
    };
    if method.is_empty() || target.is_empty() || version.is_empty() {
        return Err(ParseError::MalformedRequestLine);
    }
    Ok(HttpRequest {
        method: Method::from(method),
        target: target.to_string(),
        version: version.to_string(),
        ..Default::default()
    })
}

#[derive(Debug, Default)]
pub struct PartHeaders {
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

pub fn parse_part_headers(headers: &str) -> PartHeaders {
    let mut part = PartHeaders::default();

    for line in headers.split("\r\n") {
        if line.starts_with("Content-Disposition:") {
            if let Some(field) = line.split(';').find(|s| s.trim().starts_with("filename=")) {
                let value = field.split('=').nth(1).unwrap_or("").trim().trim_matches('"');
                if !value.is_empty() {
                    part.filename = Some(value.to_string());
                }
            }
        } else if let Some(value) = line.strip_prefix("Content-Type:") {
            part.content_type = Some(value.trim().to_string());
        }
    }
    part
}

pub fn find_subsequence(buffer: &[u8], needle: &[u8], start_offset: usize) -> Option<usize> {
    if needle.is_empty() || start_offset > buffer.len() {
        return None;
    }
    buffer[start_offset..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| start_offset + pos)
}

// ---- header-block probes ----
//
// The connection layer needs a few header values before the request is
// complete (framing, virtual-host resolution, body-size enforcement). These
// scan a finished header block without building an HttpRequest.

pub fn content_length_of(head: &[u8]) -> usize {
    header_value_of(head, "Content-Length", false)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

pub fn host_of(head: &[u8]) -> Option<String> {
    header_value_of(head, "Host", true)
}

pub fn wants_keep_alive(head: &[u8]) -> bool {
    header_value_of(head, "Connection", false)
        .map(|v| v.eq_ignore_ascii_case("keep-alive"))
        .unwrap_or(false)
}

fn header_value_of(head: &[u8], name: &str, case_insensitive: bool) -> Option<String> {
    let text = String::from_utf8_lossy(head);
    let mut found = None;
    for line in text.split("\r\n").skip(1) {
        if let Some((key, value)) = line.split_once(':') {
            let hit = if case_insensitive {
                key.eq_ignore_ascii_case(name)
            } else {
                key == name
            };
            if hit {
                found = Some(value.trim_matches(|c| c == ' ' || c == '\t').to_string());
            }
        }
    }
    found
}
