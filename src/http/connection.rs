use crate::prelude::*;

// Cap on buffered bytes while hunting for the end of the headers. A peer
// that never terminates its header block is answered 400 and dropped.
pub const MAX_HEADER_BYTES: usize = 16 * READ_BUF_SIZE;

#[derive(Debug, PartialEq)]
pub enum FramingOutcome {
    /// More bytes are needed before the current request is complete.
    Incomplete,
    /// Headers and the declared body are fully buffered.
    Complete,
    /// Declared body exceeds the virtual host's limit.
    TooLarge { declared: usize, limit: usize },
    /// Header block never terminated within the allowed window.
    HeadersTooLong,
}

/// Per-socket state, exclusively owned by the event loop. Created on accept,
/// destroyed when `close_after_write` is latched and the write buffer drains,
/// on I/O errors, or when a timeout fires.
#[derive(Debug)]
pub struct Connection {
    pub stream: TcpStream,
    pub read_buffer: Vec<u8>,
    pub write_buffer: Vec<u8>,
    pub headers_complete: bool,
    pub header_end_index: usize,
    pub content_length: usize,
    pub total_body_read: usize,
    pub keep_alive: bool,
    pub close_after_write: bool,
    pub responding: bool,
    pub discard_body: bool,
    pub last_activity: Instant,
    pub listen_port: u16,
    pub server_configs: Vec<Arc<ServerConfig>>,
    pub assigned_config: Option<Arc<ServerConfig>>,
    pub cgi: Option<CgiHandle>,
}

impl Connection {
    pub fn new(stream: TcpStream, listen_port: u16, server_configs: Vec<Arc<ServerConfig>>) -> Self {
        Self {
            stream,
            read_buffer: Vec::new(),
            write_buffer: Vec::new(),
            headers_complete: false,
            header_end_index: 0,
            content_length: 0,
            total_body_read: 0,
            keep_alive: false,
            close_after_write: false,
            responding: false,
            discard_body: false,
            last_activity: Instant::now(),
            listen_port,
            server_configs,
            assigned_config: None,
            cgi: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn should_close(&self) -> bool {
        self.close_after_write && self.write_buffer.is_empty()
    }

    /// Drains the socket into the read buffer. Returns true when the peer
    /// closed or the read failed.
    pub fn read_into_buffer(&mut self) -> bool {
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return true, // EOF
                Ok(n) => {
                    self.read_buffer.extend_from_slice(&buf[..n]);
                    self.touch();
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return true,
            }
        }
        false
    }

    /// Sends as much of the write buffer as the socket accepts. Each sent
    /// prefix is erased; whatever the kernel refuses waits for the next
    /// writable event. Returns true when the write failed.
    pub fn flush_write_buffer(&mut self) -> bool {
        while !self.write_buffer.is_empty() {
            match self.stream.write(&self.write_buffer) {
                Ok(0) => return true,
                Ok(n) => {
                    self.write_buffer.drain(..n);
                    self.touch();
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return true,
            }
        }
        false
    }

    /// Restores the parse fields to their post-accept shape so the next
    /// request on a keep-alive connection starts clean. The assigned virtual
    /// host stays; the next header block overwrites it.
    pub fn reset_parse_state(&mut self) {
        self.headers_complete = false;
        self.header_end_index = 0;
        self.content_length = 0;
        self.total_body_read = 0;
        self.discard_body = false;
    }

    /// Drives the framing of the current request as far as the buffered
    /// bytes allow. On header completion this also resolves the virtual host
    /// and enforces the body-size limit.
    pub fn advance_framing(&mut self) -> FramingOutcome {
        if !self.headers_complete {
            let Some(pos) = find_subsequence(&self.read_buffer, b"\r\n\r\n", 0) else {
                if self.read_buffer.len() > MAX_HEADER_BYTES {
                    return FramingOutcome::HeadersTooLong;
                }
                return FramingOutcome::Incomplete;
            };
            self.header_end_index = pos + 4;
            self.headers_complete = true;

            let head = &self.read_buffer[..self.header_end_index];
            self.content_length = content_length_of(head);
            self.keep_alive = wants_keep_alive(head);

            let host = host_of(head);
            self.assigned_config = resolve_server(&self.server_configs, host.as_deref());

            if let Some(config) = &self.assigned_config {
                if self.content_length > config.client_max_body_size {
                    let declared = self.content_length;
                    let limit = config.client_max_body_size;
                    self.start_discard();
                    return FramingOutcome::TooLarge { declared, limit };
                }
            }
        }

        self.total_body_read = self.read_buffer.len() - self.header_end_index;
        if self.total_body_read >= self.content_length {
            FramingOutcome::Complete
        } else {
            FramingOutcome::Incomplete
        }
    }

    /// Removes the completed request from the read buffer and resets the
    /// parse state. Bytes beyond the declared body stay buffered for the
    /// next request.
    pub fn take_request_bytes(&mut self) -> Vec<u8> {
        let total = self.header_end_index + self.content_length;
        let bytes: Vec<u8> = self.read_buffer.drain(..total).collect();
        self.reset_parse_state();
        bytes
    }

    // 413 path: the declared body is still read off the socket so a
    // keep-alive peer stays in sync, but the bytes are dropped instead of
    // buffered.
    fn start_discard(&mut self) {
        self.discard_body = true;
        self.total_body_read = 0;
        self.drain_discarded();
    }

    pub fn drain_discarded(&mut self) {
        if !self.discard_body {
            return;
        }
        let available = self.read_buffer.len() - self.header_end_index;
        let eat = available.min(self.content_length - self.total_body_read);
        self.read_buffer
            .drain(self.header_end_index..self.header_end_index + eat);
        self.total_body_read += eat;

        if self.total_body_read >= self.content_length {
            self.read_buffer.drain(..self.header_end_index);
            self.reset_parse_state();
        }
    }
}
