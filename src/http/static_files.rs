//! Static file serving.

use std::path::Path;

use tower_http::services::ServeDir;

/// Create the static file service for `static_dir`.
///
/// Returns `None`, with a warning, when the directory does not exist so the
/// server still starts without it.
pub fn create_static_service(static_dir: &str) -> Option<ServeDir> {
    let path = Path::new(static_dir);
    if !path.is_dir() {
        tracing::warn!(path = %path.display(), "Static dir not found");
        return None;
    }
    tracing::debug!(path = %path.display(), "Serving static files");
    Some(ServeDir::new(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(create_static_service(&dir.path().display().to_string()).is_some());
    }

    #[test]
    fn test_missing_directory() {
        assert!(create_static_service("/nonexistent/static/dir").is_none());
    }
}
