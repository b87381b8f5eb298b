use std::os::fd::{FromRawFd, IntoRawFd};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::process::{Child, Command, ExitStatus, Stdio};

use mio::net::UnixStream;

use crate::prelude::*;

pub const CGI_EXTENSION: &str = ".py";
pub const CGI_INTERPRETER: &str = "python3";

/// True when the request target names a CGI script. The query string does
/// not count towards the suffix.
pub fn is_cgi_request(target: &str) -> bool {
    target
        .split('?')
        .next()
        .unwrap_or(target)
        .ends_with(CGI_EXTENSION)
}

/// Owning handle over a running CGI child: the read end of its stdout pipe,
/// the process itself, and the moment it started. Dropping the handle kills
/// and reaps the child, so no exit path leaks a zombie or a descriptor.
#[derive(Debug)]
pub struct CgiHandle {
    pub stream: UnixStream,
    pub child: Child,
    pub started_at: Instant,
    pub token: Token,
    pub output: Vec<u8>,
    pub eof: bool,
}

impl CgiHandle {
    /// Spawns the interpreter with the script as its only argument. The
    /// child's stdout is one end of a socket pair; the parent keeps the
    /// other end non-blocking for the poll set.
    pub fn spawn(
        script_path: &Path,
        request: &HttpRequest,
        token: Token,
    ) -> std::io::Result<CgiHandle> {
        let (parent_end, child_end) = StdUnixStream::pair()?;
        parent_end.set_nonblocking(true)?;
        let stream = UnixStream::from_std(parent_end);
        let child_stdout = unsafe { File::from_raw_fd(child_end.into_raw_fd()) };

        let mut cmd = Command::new(CGI_INTERPRETER);
        cmd.arg(script_path)
            .envs(cgi_env(request))
            .stdin(Stdio::null())
            .stdout(Stdio::from(child_stdout))
            .stderr(Stdio::null());

        let child = cmd.spawn()?;
        info!(
            "cgi child {} started for {}",
            child.id(),
            script_path.display()
        );
        Ok(CgiHandle {
            stream,
            child,
            started_at: Instant::now(),
            token,
            output: Vec::new(),
            eof: false,
        })
    }

    /// Drains whatever the script has written so far. `eof` latches once the
    /// write end closes, which is the cue to reap.
    pub fn read_output(&mut self) {
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => self.output.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => {
                    self.eof = true;
                    break;
                }
            }
        }
    }

    pub fn expired(&self, limit_secs: u64) -> bool {
        self.started_at.elapsed() > Duration::from_secs(limit_secs)
    }

    /// SIGKILL plus a blocking reap. The wait returns promptly once the kill
    /// is delivered.
    pub fn kill_and_reap(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for CgiHandle {
    fn drop(&mut self) {
        match self.child.try_wait() {
            Ok(Some(_)) => {} // already reaped
            _ => self.kill_and_reap(),
        }
    }
}

/// Minimal CGI environment: nothing beyond the inherited one for GET; the
/// raw request body for POST, in place of stdin streaming.
pub fn cgi_env(request: &HttpRequest) -> HashMap<String, String> {
    let mut env = HashMap::new();
    if request.method == Method::Post {
        env.insert(
            "REQUEST_BODY".to_string(),
            String::from_utf8_lossy(&request.body).into_owned(),
        );
    }
    env
}

/// Response for a reaped child: its stdout on success, a 500 otherwise.
pub fn completion_response(status: ExitStatus, output: Vec<u8>) -> HttpResponse {
    if status.success() {
        let mut res = HttpResponse::new(HTTP_OK);
        res.set_body(output, "text/html");
        res
    } else {
        errors!("cgi child exited with {}", status);
        generic_page(HTTP_INTERNAL_SERVER_ERROR, "CGI script error")
    }
}
