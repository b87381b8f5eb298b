use std::io::{Read as _, Write as _};
use std::net::{TcpListener as StdTcpListener, TcpStream as StdTcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mio::net::TcpStream;
use webserv::config::ServerConfig;
use webserv::http::{Connection, FramingOutcome};

fn socket_pair() -> (TcpStream, StdTcpStream) {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = StdTcpStream::connect(addr).unwrap();
    let (server_side, _) = listener.accept().unwrap();
    server_side.set_nonblocking(true).unwrap();
    (TcpStream::from_std(server_side), client)
}

fn candidates(max_body: usize) -> Vec<Arc<ServerConfig>> {
    vec![Arc::new(ServerConfig {
        listen_port: 8080,
        server_name: "localhost".to_string(),
        root_directory: PathBuf::from("./www"),
        index_file: "index.html".to_string(),
        directory_listing: false,
        client_max_body_size: max_body,
        keep_alive_timeout: 15,
        send_timeout: 30,
        locations: Vec::new(),
    })]
}

fn connection(max_body: usize) -> (Connection, StdTcpStream) {
    let (server_side, client) = socket_pair();
    (Connection::new(server_side, 8080, candidates(max_body)), client)
}

#[test]
fn framing_waits_for_the_header_terminator() {
    let (mut conn, _client) = connection(1024);

    conn.read_buffer
        .extend_from_slice(b"GET / HTTP/1.1\r\nHost: localhost\r\n");
    assert_eq!(conn.advance_framing(), FramingOutcome::Incomplete);
    assert!(!conn.headers_complete);

    conn.read_buffer.extend_from_slice(b"\r\n");
    assert_eq!(conn.advance_framing(), FramingOutcome::Complete);
    assert!(conn.headers_complete);
    assert_eq!(conn.content_length, 0);
    assert_eq!(
        conn.assigned_config.as_ref().unwrap().server_name,
        "localhost"
    );
}

#[test]
fn framing_counts_the_body_and_resets_after_the_request() {
    let (mut conn, _client) = connection(1024);

    conn.read_buffer
        .extend_from_slice(b"POST /api HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nab");
    assert_eq!(conn.advance_framing(), FramingOutcome::Incomplete);
    assert!(conn.headers_complete);
    assert_eq!(conn.content_length, 5);
    assert_eq!(conn.total_body_read, 2);

    // the rest of the body plus the start of a pipelined request
    conn.read_buffer.extend_from_slice(b"cdeGET /next");
    assert_eq!(conn.advance_framing(), FramingOutcome::Complete);

    let bytes = conn.take_request_bytes();
    assert!(bytes.ends_with(b"abcde"));

    // parse state is back to its post-accept shape
    assert!(!conn.headers_complete);
    assert_eq!(conn.header_end_index, 0);
    assert_eq!(conn.content_length, 0);
    assert_eq!(conn.total_body_read, 0);
    assert!(!conn.discard_body);

    // the pipelined prefix stays buffered for the next cycle
    assert_eq!(conn.read_buffer, b"GET /next");
}

#[test]
fn keep_alive_is_probed_from_the_headers() {
    let (mut conn, _client) = connection(1024);
    conn.read_buffer.extend_from_slice(
        b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: keep-alive\r\n\r\n",
    );
    assert_eq!(conn.advance_framing(), FramingOutcome::Complete);
    assert!(conn.keep_alive);
}

#[test]
fn oversized_bodies_are_flagged_and_drained() {
    let (mut conn, _client) = connection(10);

    conn.read_buffer.extend_from_slice(
        b"POST /uploads/ HTTP/1.1\r\nHost: localhost\r\nContent-Length: 50\r\n\r\n",
    );
    match conn.advance_framing() {
        FramingOutcome::TooLarge { declared, limit } => {
            assert_eq!(declared, 50);
            assert_eq!(limit, 10);
        }
        other => panic!("expected TooLarge, got {:?}", other),
    }
    assert!(conn.discard_body);

    // the declared body arrives in pieces and is dropped, not buffered
    conn.read_buffer.extend_from_slice(&[b'x'; 30]);
    conn.drain_discarded();
    assert!(conn.discard_body);
    assert!(conn.read_buffer.len() <= conn.header_end_index);

    conn.read_buffer.extend_from_slice(&[b'x'; 20]);
    conn.drain_discarded();
    assert!(!conn.discard_body);
    assert!(conn.read_buffer.is_empty());

    // the connection can frame a follow-up request afterwards
    conn.read_buffer
        .extend_from_slice(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert_eq!(conn.advance_framing(), FramingOutcome::Complete);
}

#[test]
fn sockets_move_bytes_through_the_buffers() {
    let (mut conn, mut client) = connection(1024);

    client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
    let mut waited = 0;
    while conn.read_buffer.is_empty() && waited < 100 {
        assert!(!conn.read_into_buffer());
        thread::sleep(Duration::from_millis(10));
        waited += 1;
    }
    assert_eq!(conn.read_buffer, b"GET / HTTP/1.1\r\n\r\n");

    conn.write_buffer.extend_from_slice(b"HTTP/1.1 200 OK\r\n\r\n");
    assert!(!conn.flush_write_buffer());
    assert!(conn.write_buffer.is_empty());

    let mut received = [0u8; 64];
    client
        .set_read_timeout(Some(Duration::from_secs(1)))
        .unwrap();
    let n = client.read(&mut received).unwrap();
    assert_eq!(&received[..n], b"HTTP/1.1 200 OK\r\n\r\n");
}

#[test]
fn peer_close_is_reported() {
    let (mut conn, client) = connection(1024);
    drop(client);

    let mut waited = 0;
    loop {
        if conn.read_into_buffer() {
            break;
        }
        waited += 1;
        assert!(waited < 100, "EOF never observed");
        thread::sleep(Duration::from_millis(10));
    }
}
