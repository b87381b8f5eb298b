use super::{join_under_root, strip_query};
use crate::prelude::*;

/// POST: land the uploaded file at `root ⊕ uri ⊕ filename`. An existing
/// file is never overwritten; the client is redirected at it instead.
pub fn handle_upload(request: &HttpRequest, config: &ServerConfig) -> HttpResponse {
    let Some(filename) = request.uploaded_filename.as_deref() else {
        return generic_page(HTTP_BAD_REQUEST, "No file data provided.");
    };

    let uri = strip_query(&request.target);
    let save_path = join_under_root(&config.root_directory, uri).join(filename);

    if save_path.exists() {
        warn!("file already exists: {}", save_path.display());
        let location = if uri.ends_with('/') {
            format!("{}{}", uri, filename)
        } else {
            format!("{}/{}", uri, filename)
        };
        let mut res = HttpResponse::new(HTTP_FOUND);
        res.set_header("Location", &location);
        return res;
    }

    match fs::write(&save_path, &request.body) {
        Ok(()) => {
            info!("file uploaded successfully: {}", save_path.display());
            generic_page(HTTP_CREATED, &save_path.display().to_string())
        }
        Err(e) => {
            errors!("unable to store file '{}': {}", save_path.display(), e);
            generic_page(HTTP_INTERNAL_SERVER_ERROR, "Failed to store file")
        }
    }
}
