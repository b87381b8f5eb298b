use super::{join_under_root, strip_query};
use crate::prelude::*;

/// Static-file resolution for a GET.
///
/// Directories fall through: index file for the root target, then a
/// `<segment>.html` page named after the directory, then the delete page for
/// `/uploads`, then a listing when enabled, else 405. Regular files are
/// served with a suffix-derived content type.
pub fn handle_get(request: &HttpRequest, config: &ServerConfig) -> HttpResponse {
    let uri = strip_query(&request.target);
    let full_path = join_under_root(&config.root_directory, uri);

    if full_path.is_dir() {
        if is_effectively_root(uri) {
            if let Some(res) = serve_index(config) {
                return res;
            }
        }
        if let Some(res) = serve_folder_page(uri, &full_path) {
            return res;
        }
        if uri == "/uploads" {
            return delete_page(&full_path, uri);
        }
        if config.directory_listing {
            return directory_listing(&full_path, uri);
        }
        return generic_page(HTTP_METHOD_NOT_ALLOWED, "This Directory is over 9000!!!");
    }

    if full_path.is_file() {
        serve_regular_file(uri, &full_path)
    } else {
        warn!(
            "path '{}' could not be recognised, serving 404",
            full_path.display()
        );
        generic_page(HTTP_NOT_FOUND, "These Are Not the Files You Are Looking For")
    }
}

fn serve_regular_file(uri: &str, full_path: &Path) -> HttpResponse {
    match fs::read(full_path) {
        Ok(content) => {
            info!("serving file {}", full_path.display());
            let mut res = HttpResponse::new(HTTP_OK);
            res.set_body(content, content_type_for(uri));
            res
        }
        Err(e) => {
            warn!("file '{}' not readable: {}", full_path.display(), e);
            generic_page(HTTP_NOT_FOUND, "These Are Not the Files You Are Looking For")
        }
    }
}

// Empty or all-slash targets address the server root.
fn is_effectively_root(uri: &str) -> bool {
    uri.chars().all(|c| c == '/')
}

fn serve_index(config: &ServerConfig) -> Option<HttpResponse> {
    let index_path = config.root_directory.join(&config.index_file);
    let content = fs::read(&index_path).ok()?;
    info!("serving index {}", index_path.display());
    let mut res = HttpResponse::new(HTTP_OK);
    res.set_body(content, "text/html");
    Some(res)
}

// A directory may carry a page named after itself: `/blog/` is answered with
// `<root>/blog/blog.html` when that file exists.
fn serve_folder_page(uri: &str, full_path: &Path) -> Option<HttpResponse> {
    let name = folder_name(uri);
    if name.is_empty() {
        return None;
    }
    let page = full_path.join(format!("{}.html", name));
    let content = fs::read(&page).ok()?;
    info!("serving folder page {}", page.display());
    let mut res = HttpResponse::new(HTTP_OK);
    res.set_body(content, "text/html");
    Some(res)
}

fn folder_name(uri: &str) -> &str {
    uri.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}
