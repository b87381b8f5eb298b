use std::sync::atomic::{AtomicBool, Ordering};

use crate::cgi::{self, is_cgi_request};
use crate::handlers::{
    handle_delete, handle_get, handle_upload, has_dotdot, join_under_root, strip_query,
};
use crate::prelude::*;
use crate::timeouts;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn request_shutdown(_signal: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// The event loop. Sole owner of every descriptor in the poll set: the
/// listeners, the accepted sockets (inside `Connection`s), and the CGI pipe
/// read ends (inside `CgiHandle`s).
pub struct Server {
    pub listeners: HashMap<Token, (TcpListener, u16)>,
    pub port_configs: HashMap<u16, Vec<Arc<ServerConfig>>>,
    pub connections: HashMap<Token, Connection>,
    pub cgi_to_client: HashMap<Token, Token>,
    pub next_token: usize,
    pub poll_timeout: Duration,
}

impl Server {
    /// Binds one listener per configured port. A port that fails to bind is
    /// skipped with a diagnostic; startup only fails when nothing could be
    /// bound at all.
    pub fn new(config: HttpConfig, poll: &Poll) -> Result<Server> {
        let mut listeners = HashMap::new();
        let mut next_token = 0;

        for port in config.listen_ports() {
            let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
            match TcpListener::bind(addr) {
                Ok(mut listener) => {
                    let token = Token(next_token);
                    next_token += 1;
                    poll.registry()
                        .register(&mut listener, token, Interest::READABLE)?;
                    info!("listening on port {}", port);
                    listeners.insert(token, (listener, port));
                }
                Err(e) => errors!("failed to bind port {}: {}", port, e),
            }
        }
        if listeners.is_empty() {
            return Err("no listening socket could be bound".into());
        }

        let mut port_configs = HashMap::new();
        for port in config.listen_ports() {
            port_configs.insert(port, config.servers_for_port(port));
        }

        Ok(Server {
            listeners,
            port_configs,
            connections: HashMap::new(),
            cgi_to_client: HashMap::new(),
            next_token,
            poll_timeout: Duration::from_millis(config.poll_timeout_ms as u64),
        })
    }

    /// One iteration: poll, service every ready descriptor, sweep the
    /// timers, release closed connections. The poll wait is the only place
    /// the process suspends.
    pub fn run(&mut self, mut poll: Poll) -> Result<()> {
        let handler = request_shutdown as extern "C" fn(libc::c_int);
        unsafe {
            libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        }
        let mut events = Events::with_capacity(1024);

        loop {
            if SHUTDOWN.load(Ordering::SeqCst) {
                info!("received SIGINT, shutting down");
                break;
            }
            if let Err(e) = poll.poll(&mut events, Some(self.poll_timeout)) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(e.into());
            }

            for event in events.iter() {
                let token = event.token();
                if self.listeners.contains_key(&token) {
                    self.accept_pending(&poll, token);
                } else if let Some(&client_token) = self.cgi_to_client.get(&token) {
                    self.handle_cgi_event(&poll, client_token);
                } else {
                    self.handle_client_event(&poll, event, token);
                }
            }

            timeouts::process(self, &poll);
            self.close_finished(&poll);
        }

        info!("closing all sockets");
        self.connections.clear();
        self.cgi_to_client.clear();
        self.listeners.clear();
        Ok(())
    }

    // Accepts every pending connection on a ready listener. Fresh sockets
    // enter the poll set with read interest and carry their port's
    // virtual-host candidates.
    fn accept_pending(&mut self, poll: &Poll, token: Token) {
        let port = match self.listeners.get(&token) {
            Some((_, port)) => *port,
            None => return,
        };
        loop {
            let accepted = match self.listeners.get(&token) {
                Some((listener, _)) => listener.accept(),
                None => return,
            };
            match accepted {
                Ok((mut stream, addr)) => {
                    let client_token = Token(self.next_token);
                    self.next_token += 1;
                    if let Err(e) =
                        poll.registry()
                            .register(&mut stream, client_token, Interest::READABLE)
                    {
                        errors!("failed to register client socket: {}", e);
                        continue;
                    }
                    let configs = self.port_configs.get(&port).cloned().unwrap_or_default();
                    trace!("accepted connection from {} on port {}", addr, port);
                    self.connections
                        .insert(client_token, Connection::new(stream, port, configs));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("accept failed on port {}: {}", port, e);
                    break;
                }
            }
        }
    }

    fn handle_client_event(&mut self, poll: &Poll, event: &Event, token: Token) {
        if !self.connections.contains_key(&token) {
            return;
        }

        if event.is_error() {
            if let Some(conn) = self.connections.get_mut(&token) {
                conn.close_after_write = true;
            }
        }
        if event.is_readable() {
            if let Some(conn) = self.connections.get_mut(&token) {
                if conn.read_into_buffer() {
                    conn.close_after_write = true;
                }
                conn.drain_discarded();
            }
            self.try_process(poll, token);
        }
        if event.is_writable() {
            self.handle_writable(poll, token);
        }
    }

    // Advances the current request's framing and, once complete, hands it to
    // the dispatcher. Strict serialisation: nothing new starts while a
    // response is in flight or a CGI child is running.
    fn try_process(&mut self, poll: &Poll, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        if conn.responding || conn.cgi.is_some() || conn.discard_body {
            return;
        }

        match conn.advance_framing() {
            FramingOutcome::Incomplete => {}
            FramingOutcome::HeadersTooLong => {
                warn!("header block exceeded the allowed size, rejecting");
                conn.keep_alive = false;
                let res = generic_page(HTTP_BAD_REQUEST, "Header block never ended");
                Self::queue_response(poll, token, conn, res);
            }
            FramingOutcome::TooLarge { declared, limit } => {
                warn!("declared body of {} bytes exceeds limit {}", declared, limit);
                let message = format!(
                    "Request body of {} bytes exceeds client_max_body_size of {} bytes",
                    declared, limit
                );
                let res = generic_page(HTTP_PAYLOAD_TOO_LARGE, &message);
                Self::queue_response(poll, token, conn, res);
            }
            FramingOutcome::Complete => {
                let bytes = conn.take_request_bytes();
                self.dispatch(poll, token, &bytes);
            }
        }
    }

    // Parses the complete request and routes it. Every outcome except a
    // spawned CGI child queues a response immediately.
    fn dispatch(&mut self, poll: &Poll, token: Token, bytes: &[u8]) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        let Some(config) = conn.assigned_config.clone() else {
            conn.close_after_write = true;
            return;
        };

        let request = match HttpRequest::parse(bytes) {
            Ok(request) => request,
            Err(e) => {
                warn!("rejecting request: {}", e);
                conn.keep_alive = false;
                let res = generic_page(HTTP_BAD_REQUEST, &e.to_string());
                Self::queue_response(poll, token, conn, res);
                return;
            }
        };

        conn.keep_alive = request
            .header("Connection")
            .map(|v| v.eq_ignore_ascii_case("keep-alive"))
            .unwrap_or(false);
        info!(
            "{} {} for server '{}'",
            request.method, request.target, config.server_name
        );

        let routed = Self::route_request(
            poll,
            conn,
            token,
            &request,
            &config,
            &mut self.next_token,
            &mut self.cgi_to_client,
        );
        if let Some(res) = routed {
            Self::queue_response(poll, token, conn, res);
        }
    }

    /// Produces a response, or `None` when a CGI child now owns the request.
    #[allow(clippy::too_many_arguments)]
    fn route_request(
        poll: &Poll,
        conn: &mut Connection,
        client_token: Token,
        request: &HttpRequest,
        config: &Arc<ServerConfig>,
        next_token: &mut usize,
        cgi_to_client: &mut HashMap<Token, Token>,
    ) -> Option<HttpResponse> {
        if has_dotdot(&request.target) {
            warn!("rejecting traversal attempt: {}", request.target);
            return Some(generic_page(HTTP_FORBIDDEN, "Path traversal is not allowed"));
        }

        let allowed = find_location(config, &request.target)
            .filter(|location| request.method.is_allowed(&location.allowed_methods));
        let Some(location) = allowed else {
            errors!(
                "method '{}' not allowed for server '{}{}'",
                request.method, config.server_name, request.target
            );
            return Some(generic_page(HTTP_METHOD_NOT_ALLOWED, ""));
        };

        if let Some(redirection) = location.redirection.as_deref().filter(|r| !r.is_empty()) {
            warn!("redirecting client to: {}", redirection);
            let target = if redirection.starts_with("http://") || redirection.starts_with("https://")
            {
                redirection.to_string()
            } else {
                format!("http://{}", redirection)
            };
            let mut res = HttpResponse::new(HTTP_FOUND);
            res.set_header("Location", &target);
            return Some(res);
        }

        if is_cgi_request(&request.target) {
            return Self::start_cgi(poll, conn, client_token, request, config, next_token, cgi_to_client);
        }

        Some(match &request.method {
            Method::Get => handle_get(request, config),
            Method::Post => handle_upload(request, config),
            Method::Delete => handle_delete(request, config),
            Method::Other(name) => {
                errors!("method '{}' not implemented", name);
                generic_page(
                    HTTP_NOT_IMPLEMENTED,
                    &format!("Method '{}' not implemented", name),
                )
            }
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn start_cgi(
        poll: &Poll,
        conn: &mut Connection,
        client_token: Token,
        request: &HttpRequest,
        config: &Arc<ServerConfig>,
        next_token: &mut usize,
        cgi_to_client: &mut HashMap<Token, Token>,
    ) -> Option<HttpResponse> {
        if !matches!(request.method, Method::Get | Method::Post) {
            errors!("cgi refuses method '{}'", request.method);
            return Some(generic_page(
                HTTP_FORBIDDEN,
                "CGI scripts accept GET and POST only",
            ));
        }

        let script_path = join_under_root(&config.root_directory, strip_query(&request.target));
        let cgi_token = Token(*next_token);
        *next_token += 1;

        match CgiHandle::spawn(&script_path, request, cgi_token) {
            Ok(mut handle) => {
                if let Err(e) =
                    poll.registry()
                        .register(&mut handle.stream, cgi_token, Interest::READABLE)
                {
                    // dropping the handle kills and reaps the child
                    errors!("failed to register cgi pipe: {}", e);
                    return Some(generic_page(
                        HTTP_INTERNAL_SERVER_ERROR,
                        "Internal server error",
                    ));
                }
                cgi_to_client.insert(cgi_token, client_token);
                conn.cgi = Some(handle);
                conn.responding = true;
                None
            }
            Err(e) => {
                errors!("failed to spawn cgi for {}: {}", script_path.display(), e);
                Some(generic_page(
                    HTTP_INTERNAL_SERVER_ERROR,
                    "Internal server error",
                ))
            }
        }
    }

    fn handle_cgi_event(&mut self, poll: &Poll, client_token: Token) {
        if let Some(conn) = self.connections.get_mut(&client_token) {
            if let Some(handle) = conn.cgi.as_mut() {
                handle.read_output();
            }
        }
        self.finish_cgi_if_done(poll, client_token);
    }

    /// Completes a CGI exchange once the pipe hit EOF and the child has been
    /// reaped. A child that closed stdout but has not exited yet is left for
    /// the timer sweep to retry.
    pub(crate) fn finish_cgi_if_done(&mut self, poll: &Poll, client_token: Token) {
        let Some(conn) = self.connections.get_mut(&client_token) else {
            return;
        };
        let reaped = match conn.cgi.as_mut() {
            Some(handle) if handle.eof => match handle.child.try_wait() {
                Ok(Some(status)) => Some(Ok(status)),
                Ok(None) => return,
                Err(e) => Some(Err(e)),
            },
            _ => return,
        };

        let Some(mut handle) = conn.cgi.take() else {
            return;
        };
        self.cgi_to_client.remove(&handle.token);
        poll.registry().deregister(&mut handle.stream).ok();

        let res = match reaped {
            Some(Ok(status)) => {
                cgi::completion_response(status, std::mem::take(&mut handle.output))
            }
            _ => {
                errors!("cgi wait returned an unexpected error");
                generic_page(HTTP_INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        Self::queue_response(poll, client_token, conn, res);
    }

    /// Kills a running CGI child and answers 500 with the given message.
    /// Used by the timer sweep for deadline overruns.
    pub(crate) fn abort_cgi(&mut self, poll: &Poll, client_token: Token, message: &str) {
        let Some(conn) = self.connections.get_mut(&client_token) else {
            return;
        };
        let Some(mut handle) = conn.cgi.take() else {
            return;
        };
        self.cgi_to_client.remove(&handle.token);
        poll.registry().deregister(&mut handle.stream).ok();
        handle.kill_and_reap();
        errors!("cgi child {} aborted: {}", handle.child.id(), message);

        let res = generic_page(HTTP_INTERNAL_SERVER_ERROR, message);
        Self::queue_response(poll, client_token, conn, res);
        conn.close_after_write = true;
        conn.touch();
    }

    fn handle_writable(&mut self, poll: &Poll, token: Token) {
        {
            let Some(conn) = self.connections.get_mut(&token) else {
                return;
            };
            if conn.flush_write_buffer() {
                conn.close_after_write = true;
            }
            if !conn.write_buffer.is_empty() {
                return;
            }
            conn.responding = false;
            if conn.close_after_write {
                return; // the close pass releases it
            }
            if let Err(e) = poll
                .registry()
                .reregister(&mut conn.stream, token, Interest::READABLE)
            {
                errors!("failed to rearm read interest: {}", e);
                conn.close_after_write = true;
                return;
            }
        }
        // keep-alive: the next request may already be buffered
        self.try_process(poll, token);
    }

    fn queue_response(poll: &Poll, token: Token, conn: &mut Connection, mut res: HttpResponse) {
        let status = res.status_code;
        let timeout = conn.assigned_config.as_ref().map(|c| c.keep_alive_timeout);
        res.set_keep_alive(conn.keep_alive, timeout);
        if !conn.keep_alive {
            conn.close_after_write = true;
        }
        conn.responding = true;
        conn.write_buffer.extend_from_slice(&res.to_bytes());
        trace!(
            "queued {} response ({} bytes buffered)",
            status,
            conn.write_buffer.len()
        );

        if let Err(e) = poll.registry().reregister(
            &mut conn.stream,
            token,
            Interest::READABLE | Interest::WRITABLE,
        ) {
            errors!("failed to arm write interest: {}", e);
            conn.close_after_write = true;
        }
    }

    fn close_finished(&mut self, poll: &Poll) {
        let finished: Vec<Token> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.should_close())
            .map(|(token, _)| *token)
            .collect();
        for token in finished {
            self.close_connection(poll, token);
        }
    }

    pub(crate) fn close_connection(&mut self, poll: &Poll, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            if let Some(mut handle) = conn.cgi.take() {
                self.cgi_to_client.remove(&handle.token);
                poll.registry().deregister(&mut handle.stream).ok();
                // dropping the handle kills and reaps the child
            }
            poll.registry().deregister(&mut conn.stream).ok();
            trace!("closing connection {:?}", token);
        }
    }
}
