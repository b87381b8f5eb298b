use std::time::SystemTime;

use crate::prelude::*;

/// Response under construction. Headers keep their insertion order when
/// serialised; keys are replaced case-insensitively.
#[derive(Debug)]
pub struct HttpResponse {
    pub status_code: u16,
    pub status_text: String,
    headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            status_text: reason_phrase(status_code).to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn set_status(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.status_text = reason_phrase(code).to_string();
        self
    }

    pub fn set_header(&mut self, key: &str, value: &str) -> &mut Self {
        if let Some(entry) = self
            .headers
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
        {
            entry.1 = value.to_string();
        } else {
            self.headers.push((key.to_string(), value.to_string()));
        }
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    pub fn set_body(&mut self, body: Vec<u8>, content_type: &str) -> &mut Self {
        self.set_header("Content-Type", content_type);
        self.set_header("Content-Length", &body.len().to_string());
        self.body = body;
        self
    }

    pub fn set_keep_alive(&mut self, keep_alive: bool, timeout_secs: Option<u64>) -> &mut Self {
        if keep_alive {
            self.set_header("Connection", "keep-alive");
            if let Some(secs) = timeout_secs {
                self.set_header("Keep-Alive", &format!("timeout={}", secs));
            }
        } else {
            self.set_header("Connection", "close");
        }
        self
    }

    /// Wire form. `Content-Length` always reflects the actual body, and a
    /// `Date` header is stamped if none was set.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut res =
            format!("HTTP/1.1 {} {}\r\n", self.status_code, self.status_text).into_bytes();

        let mut has_length = false;
        let mut has_date = false;
        for (key, value) in &self.headers {
            if key.eq_ignore_ascii_case("content-length") {
                has_length = true;
                res.extend_from_slice(format!("{}: {}\r\n", key, self.body.len()).as_bytes());
                continue;
            }
            if key.eq_ignore_ascii_case("date") {
                has_date = true;
            }
            res.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
        }
        if !has_length {
            res.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        if !has_date {
            let date = httpdate::fmt_http_date(SystemTime::now());
            res.extend_from_slice(format!("Date: {}\r\n", date).as_bytes());
        }

        res.extend_from_slice(b"\r\n");
        res.extend_from_slice(&self.body);
        res
    }
}

pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        302 => "Found",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        _ => "Unknown",
    }
}

/// Content type from the target's suffix. Everything unrecognised is served
/// as HTML.
pub fn content_type_for(target: &str) -> &'static str {
    if target.ends_with(".css") {
        "text/css"
    } else if target.ends_with(".jpg") || target.ends_with(".jpeg") {
        "image/jpeg"
    } else if target.ends_with(".png") {
        "image/png"
    } else if target.ends_with(".pdf") {
        "application/pdf"
    } else if target.ends_with(".ico") {
        "image/x-icon"
    } else {
        "text/html"
    }
}

/// The generic HTML page used for error answers and plain status results.
pub fn generic_page(code: u16, message: &str) -> HttpResponse {
    let reason = reason_phrase(code);
    let html = format!(
        "<!DOCTYPE html>\
         <html lang=\"en\">\
         <head>\
         <meta charset=\"UTF-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\
         <title>Webserv - {code}</title>\
         <link rel=\"stylesheet\" href=\"/styles.css\">\
         <link rel=\"icon\" type=\"image/x-icon\" href=\"favicon.ico\">\
         </head>\
         <body class=\"background\">\
         <div class=\"error\">{code} - {reason}</div>\
         <hr>\
         <div class=\"info\">{message}</div>\
         <button onclick=\"window.history.back()\" class=\"back-button\">Back</button>\
         </body>\
         </html>"
    );
    let mut res = HttpResponse::new(code);
    res.set_body(html.into_bytes(), "text/html");
    res
}

pub fn directory_listing(full_path: &Path, uri: &str) -> HttpResponse {
    let Some(entries) = read_visible_entries(full_path) else {
        warn!("failed to open directory '{}', serving 404", full_path.display());
        return generic_page(HTTP_NOT_FOUND, "This should never happen! HOW?!");
    };

    let mut content = String::new();
    for name in entries {
        let link = join_uri(uri, &name);
        content.push_str(&format!("<li><a href='{}'>{}</a></li>", link, name));
    }
    listing_page(&format!("Directory Listing of {}", uri), &content)
}

/// Directory listing whose entries carry a client-side DELETE trigger.
pub fn delete_page(full_path: &Path, uri: &str) -> HttpResponse {
    let Some(entries) = read_visible_entries(full_path) else {
        warn!("failed to open directory '{}', serving 404", full_path.display());
        return generic_page(HTTP_NOT_FOUND, "This should never happen. Yet it did. How?");
    };

    let mut content = String::new();
    for name in entries {
        let link = join_uri(uri, &name);
        let delete_button = format!(
            "<button onclick=\"fetch('{link}', {{method: 'DELETE'}})\
             .then(function(response) {{ \
             if (response.ok) {{ window.location.reload(); }} \
             else {{ alert('Delete failed with status: ' + response.status); }} \
             }})\
             .catch(function(error) {{ alert('Network error or no response from server'); }})\
             \">Delete</button>"
        );
        content.push_str(&format!(
            "<li><a href='{}'>{}</a>{}</li>",
            link, name, delete_button
        ));
    }
    listing_page(&format!("Delete page of {}", uri), &content)
}

fn read_visible_entries(path: &Path) -> Option<Vec<String>> {
    let dir = fs::read_dir(path).ok()?;
    let mut names: Vec<String> = dir
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| !name.starts_with('.'))
        .collect();
    names.sort();
    Some(names)
}

fn join_uri(uri: &str, name: &str) -> String {
    if uri.ends_with('/') {
        format!("{}{}", uri, name)
    } else {
        format!("{}/{}", uri, name)
    }
}

fn listing_page(title: &str, items: &str) -> HttpResponse {
    let html = format!(
        "<!DOCTYPE html>\
         <html lang=\"en\">\
         <head>\
         <meta charset=\"UTF-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\
         <title>{title}</title>\
         <link rel=\"stylesheet\" href=\"/styles.css\">\
         <link rel=\"icon\" type=\"image/x-icon\" href=\"favicon.ico\">\
         </head>\
         <body class=\"background\">\
         <div class=\"error\">{title}</div>\
         <hr>\
         <div class=\"info\">{items}</div>\
         <button onclick=\"window.history.back()\" class=\"back-button\">Back</button>\
         </body>\
         </html>"
    );
    let mut res = HttpResponse::new(HTTP_OK);
    res.set_body(html.into_bytes(), "text/html");
    res
}
