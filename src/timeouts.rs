use crate::prelude::*;

/// Timer sweep, run once per loop iteration.
///
/// CGI deadlines come first so an overrun turns into a 500 before the socket
/// timers see the connection. Then the socket timers: the send timeout while
/// a response is in flight, the keep-alive idle timeout between requests.
pub fn process(server: &mut Server, poll: &Poll) {
    let now = Instant::now();

    let mut expired: Vec<Token> = Vec::new();
    let mut pending: Vec<Token> = Vec::new();
    for (token, conn) in server.connections.iter() {
        if let (Some(handle), Some(config)) = (conn.cgi.as_ref(), conn.assigned_config.as_ref()) {
            if handle.expired(config.send_timeout) {
                expired.push(*token);
            } else if handle.eof {
                pending.push(*token);
            }
        }
    }
    for token in expired {
        server.abort_cgi(poll, token, "CGI timeout");
    }
    for token in pending {
        server.finish_cgi_if_done(poll, token);
    }

    let assigned: Vec<Token> = server
        .connections
        .iter()
        .filter(|(_, conn)| conn.assigned_config.is_some())
        .map(|(token, _)| *token)
        .collect();

    for token in assigned {
        let Some(conn) = server.connections.get(&token) else {
            continue;
        };
        let Some(config) = conn.assigned_config.as_ref() else {
            continue;
        };
        let responding = conn.responding;
        let has_cgi = conn.cgi.is_some();
        let send_timeout = Duration::from_secs(config.send_timeout);
        let keep_alive_timeout = Duration::from_secs(config.keep_alive_timeout);
        let idle = now.saturating_duration_since(conn.last_activity);

        if responding {
            if idle > send_timeout {
                warn!("connection {:?} hit the send timeout", token);
                if has_cgi {
                    server.abort_cgi(poll, token, "CGI timeout");
                } else if let Some(conn) = server.connections.get_mut(&token) {
                    // the peer is not draining; drop the in-flight bytes
                    conn.write_buffer.clear();
                    conn.close_after_write = true;
                }
            }
        } else if idle > keep_alive_timeout {
            warn!("connection {:?} idled past the keep-alive timeout", token);
            if let Some(conn) = server.connections.get_mut(&token) {
                conn.close_after_write = true;
            }
        }
    }
}
