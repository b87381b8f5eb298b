use std::os::unix::net::UnixStream as StdUnixStream;
use std::process::Command;
use std::time::Instant;

use mio::Token;
use webserv::cgi::{cgi_env, completion_response, is_cgi_request, CgiHandle};
use webserv::http::{HttpRequest, Method};

#[test]
fn the_trigger_considers_the_query_delimiter() {
    assert!(is_cgi_request("/cgi/hello.py"));
    assert!(is_cgi_request("/cgi/hello.py?name=x"));
    assert!(!is_cgi_request("/cgi/hello.pyc"));
    assert!(!is_cgi_request("/page.html?path=/cgi/hello.py"));
    assert!(!is_cgi_request("/plain.html"));
}

#[test]
fn get_requests_pass_no_extra_environment() {
    let req = HttpRequest {
        method: Method::Get,
        target: "/cgi/hello.py".to_string(),
        ..Default::default()
    };
    assert!(cgi_env(&req).is_empty());
}

#[test]
fn post_requests_pass_the_body_in_the_environment() {
    let req = HttpRequest {
        method: Method::Post,
        target: "/cgi/hello.py".to_string(),
        body: b"name=webserv".to_vec(),
        ..Default::default()
    };
    let env = cgi_env(&req);
    assert_eq!(env.get("REQUEST_BODY").map(String::as_str), Some("name=webserv"));
}

#[test]
fn successful_children_answer_with_their_stdout() {
    let status = Command::new("true").status().unwrap();
    let res = completion_response(status, b"<h1>hi</h1>".to_vec());
    assert_eq!(res.status_code, 200);
    assert_eq!(res.header("Content-Type"), Some("text/html"));
    assert_eq!(res.body, b"<h1>hi</h1>");
}

#[test]
fn failing_children_answer_500() {
    let status = Command::new("false").status().unwrap();
    let res = completion_response(status, Vec::new());
    assert_eq!(res.status_code, 500);
    let body = String::from_utf8_lossy(&res.body).into_owned();
    assert!(body.contains("CGI script error"));
}

#[test]
fn dropping_the_handle_reaps_the_child() {
    let (parent_end, _child_end) = StdUnixStream::pair().unwrap();
    parent_end.set_nonblocking(true).unwrap();
    let stream = mio::net::UnixStream::from_std(parent_end);

    let child = Command::new("sleep").arg("30").spawn().unwrap();
    let pid = child.id() as libc::pid_t;

    let handle = CgiHandle {
        stream,
        child,
        started_at: Instant::now(),
        token: Token(99),
        output: Vec::new(),
        eof: false,
    };
    assert_eq!(unsafe { libc::kill(pid, 0) }, 0, "child should be running");

    drop(handle);

    // killed and reaped: the pid no longer exists
    assert_eq!(unsafe { libc::kill(pid, 0) }, -1, "child should be gone");
}

#[test]
fn deadlines_are_measured_from_the_start() {
    let (parent_end, _child_end) = StdUnixStream::pair().unwrap();
    parent_end.set_nonblocking(true).unwrap();
    let stream = mio::net::UnixStream::from_std(parent_end);
    let child = Command::new("sleep").arg("30").spawn().unwrap();

    let handle = CgiHandle {
        stream,
        child,
        started_at: Instant::now(),
        token: Token(7),
        output: Vec::new(),
        eof: false,
    };
    assert!(!handle.expired(30));
}
