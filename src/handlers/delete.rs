use super::{join_under_root, strip_query};
use crate::prelude::*;

pub fn handle_delete(request: &HttpRequest, config: &ServerConfig) -> HttpResponse {
    let uri = strip_query(&request.target);
    let target = join_under_root(&config.root_directory, uri);

    if !target.exists() {
        errors!("file does not exist: {}", target.display());
        return generic_page(HTTP_NOT_FOUND, &format!("File does not exist: {}", uri));
    }

    match fs::remove_file(&target) {
        Ok(()) => {
            info!("deleted file: {}", target.display());
            generic_page(HTTP_OK, &format!("Deleted file: {}", uri))
        }
        Err(e) => {
            errors!("could not delete file '{}': {}", target.display(), e);
            generic_page(HTTP_INTERNAL_SERVER_ERROR, "Could not delete file")
        }
    }
}
