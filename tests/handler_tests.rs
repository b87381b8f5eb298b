use std::fs;
use std::path::Path;

use tempfile::TempDir;
use webserv::config::ServerConfig;
use webserv::handlers::{handle_delete, handle_get, handle_upload, has_dotdot};
use webserv::http::{HttpRequest, Method};

fn test_config(root: &Path, directory_listing: bool) -> ServerConfig {
    ServerConfig {
        listen_port: 8080,
        server_name: "localhost".to_string(),
        root_directory: root.to_path_buf(),
        index_file: "index.html".to_string(),
        directory_listing,
        client_max_body_size: 1_048_576,
        keep_alive_timeout: 15,
        send_timeout: 30,
        locations: Vec::new(),
    }
}

fn request(method: Method, target: &str) -> HttpRequest {
    HttpRequest {
        method,
        target: target.to_string(),
        version: "HTTP/1.1".to_string(),
        ..Default::default()
    }
}

fn upload_request(target: &str, filename: &str, body: &[u8]) -> HttpRequest {
    HttpRequest {
        method: Method::Post,
        target: target.to_string(),
        version: "HTTP/1.1".to_string(),
        uploaded_filename: Some(filename.to_string()),
        uploaded_content_type: Some("text/plain".to_string()),
        body: body.to_vec(),
        ..Default::default()
    }
}

#[test]
fn get_serves_the_index_for_the_root_target() {
    let root = TempDir::new().unwrap();
    fs::write(root.path().join("index.html"), "<h1>home</h1>").unwrap();
    let config = test_config(root.path(), false);

    let res = handle_get(&request(Method::Get, "/"), &config);
    assert_eq!(res.status_code, 200);
    assert_eq!(res.header("Content-Type"), Some("text/html"));
    assert_eq!(res.body, b"<h1>home</h1>");

    // all-slash targets address the root as well
    let res = handle_get(&request(Method::Get, "///"), &config);
    assert_eq!(res.status_code, 200);
    assert_eq!(res.body, b"<h1>home</h1>");
}

#[test]
fn get_serves_regular_files_with_their_content_type() {
    let root = TempDir::new().unwrap();
    fs::write(root.path().join("styles.css"), "body {}").unwrap();
    let config = test_config(root.path(), false);

    let res = handle_get(&request(Method::Get, "/styles.css"), &config);
    assert_eq!(res.status_code, 200);
    assert_eq!(res.header("Content-Type"), Some("text/css"));
    assert_eq!(res.body, b"body {}");
}

#[test]
fn get_unknown_path_is_404() {
    let root = TempDir::new().unwrap();
    let config = test_config(root.path(), false);

    let res = handle_get(&request(Method::Get, "/nope"), &config);
    assert_eq!(res.status_code, 404);
    let body = String::from_utf8_lossy(&res.body).into_owned();
    assert!(body.contains("404 - Not Found"));
}

#[test]
fn directories_list_their_entries_when_enabled() {
    let root = TempDir::new().unwrap();
    fs::create_dir(root.path().join("files")).unwrap();
    fs::write(root.path().join("files/a.txt"), "a").unwrap();
    fs::write(root.path().join("files/.hidden"), "x").unwrap();
    let config = test_config(root.path(), true);

    let res = handle_get(&request(Method::Get, "/files"), &config);
    assert_eq!(res.status_code, 200);
    let body = String::from_utf8_lossy(&res.body).into_owned();
    assert!(body.contains("<a href='/files/a.txt'>a.txt</a>"));
    assert!(!body.contains(".hidden"));
}

#[test]
fn directories_answer_405_when_listing_is_disabled() {
    let root = TempDir::new().unwrap();
    fs::create_dir(root.path().join("files")).unwrap();
    let config = test_config(root.path(), false);

    let res = handle_get(&request(Method::Get, "/files"), &config);
    assert_eq!(res.status_code, 405);
    let body = String::from_utf8_lossy(&res.body).into_owned();
    assert!(body.contains("This Directory is over 9000!!!"));
}

#[test]
fn the_uploads_directory_serves_the_delete_page() {
    let root = TempDir::new().unwrap();
    fs::create_dir(root.path().join("uploads")).unwrap();
    fs::write(root.path().join("uploads/t.txt"), "x").unwrap();
    let config = test_config(root.path(), false);

    let res = handle_get(&request(Method::Get, "/uploads"), &config);
    assert_eq!(res.status_code, 200);
    let body = String::from_utf8_lossy(&res.body).into_owned();
    assert!(body.contains("Delete page of /uploads"));
    assert!(body.contains("fetch('/uploads/t.txt', {method: 'DELETE'})"));
}

#[test]
fn a_directory_may_carry_a_page_named_after_itself() {
    let root = TempDir::new().unwrap();
    fs::create_dir(root.path().join("blog")).unwrap();
    fs::write(root.path().join("blog/blog.html"), "<h1>posts</h1>").unwrap();
    let config = test_config(root.path(), false);

    let res = handle_get(&request(Method::Get, "/blog/"), &config);
    assert_eq!(res.status_code, 200);
    assert_eq!(res.body, b"<h1>posts</h1>");
}

#[test]
fn upload_then_get_then_delete_round_trip() {
    let root = TempDir::new().unwrap();
    fs::create_dir(root.path().join("uploads")).unwrap();
    let config = test_config(root.path(), false);

    // first upload lands the bytes verbatim
    let res = handle_upload(&upload_request("/uploads/", "t.txt", b"hello"), &config);
    assert_eq!(res.status_code, 201);
    assert_eq!(fs::read(root.path().join("uploads/t.txt")).unwrap(), b"hello");

    // the uploaded resource is retrievable
    let res = handle_get(&request(Method::Get, "/uploads/t.txt"), &config);
    assert_eq!(res.status_code, 200);
    assert_eq!(res.body, b"hello");

    // a second upload does not modify the file
    let res = handle_upload(&upload_request("/uploads/", "t.txt", b"other"), &config);
    assert_eq!(res.status_code, 302);
    assert_eq!(res.header("Location"), Some("/uploads/t.txt"));
    assert_eq!(fs::read(root.path().join("uploads/t.txt")).unwrap(), b"hello");

    // delete removes it; a second delete is a 404
    let res = handle_delete(&request(Method::Delete, "/uploads/t.txt"), &config);
    assert_eq!(res.status_code, 200);
    assert!(!root.path().join("uploads/t.txt").exists());

    let res = handle_delete(&request(Method::Delete, "/uploads/t.txt"), &config);
    assert_eq!(res.status_code, 404);

    let res = handle_get(&request(Method::Get, "/uploads/t.txt"), &config);
    assert_eq!(res.status_code, 404);
}

#[test]
fn upload_without_a_filename_is_400() {
    let root = TempDir::new().unwrap();
    let config = test_config(root.path(), false);

    let mut req = request(Method::Post, "/uploads/");
    req.body = b"data".to_vec();
    let res = handle_upload(&req, &config);
    assert_eq!(res.status_code, 400);
}

#[test]
fn upload_to_a_missing_directory_is_500() {
    let root = TempDir::new().unwrap();
    let config = test_config(root.path(), false);

    let res = handle_upload(&upload_request("/missing/", "t.txt", b"x"), &config);
    assert_eq!(res.status_code, 500);
}

#[test]
fn dotdot_segments_are_flagged() {
    assert!(has_dotdot("/../etc/passwd"));
    assert!(has_dotdot("/uploads/../../secret"));
    assert!(has_dotdot("/.."));
    assert!(!has_dotdot("/normal/path"));
    assert!(!has_dotdot("/file..name"));
    assert!(!has_dotdot("/a?x=/../y"));
}
