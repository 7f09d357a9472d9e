//! Filesystem Resource Provider
//!
//! Serves `file://` URIs for regular files under the configured allowlist
//! roots. Validation compares the candidate path against each root with a
//! mandatory trailing separator, so `/allowed` never matches
//! `/allowedEvil`; existing paths are additionally canonicalized to keep
//! symlinks from escaping a root.
//!
//! Contents are text for textual MIME types (`text/*`, `application/json`,
//! `application/xml`) and base64 blobs otherwise; never both.

use super::{ResourceError, ResourceProvider};
use crate::protocol::{ResourceContents, ResourceDescriptor};
use base64::Engine;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use tracing::warn;
use walkdir::WalkDir;

const FILE_SCHEME: &str = "file://";

/// Resource provider over allowlisted directory roots.
#[derive(Debug)]
pub struct FileResourceProvider {
    /// Canonicalized allowlist roots. Roots that do not exist at
    /// construction are dropped (and skipped silently when listing).
    roots: Vec<PathBuf>,
}

impl FileResourceProvider {
    /// Create a provider over the given roots.
    pub fn new(roots: Vec<PathBuf>) -> Self {
        let roots = roots
            .into_iter()
            .filter_map(|root| match root.canonicalize() {
                Ok(canonical) => Some(canonical),
                Err(_) => {
                    warn!("Skipping non-existent resource root {:?}", root);
                    None
                }
            })
            .collect();
        Self { roots }
    }

    /// The allowed roots (for validation display).
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Whether `path` lies within an allowlist root. The comparison appends
    /// a separator to the root so sibling directories sharing a prefix do
    /// not match.
    fn is_allowed(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.roots.iter().any(|root| {
            let mut prefix = root.to_string_lossy().into_owned();
            if !prefix.ends_with(MAIN_SEPARATOR) {
                prefix.push(MAIN_SEPARATOR);
            }
            path_str.starts_with(&prefix)
        })
    }

    fn uri_to_path(&self, uri: &str) -> Result<PathBuf, ResourceError> {
        let path = uri
            .strip_prefix(FILE_SCHEME)
            .ok_or_else(|| ResourceError::InvalidUri(format!("Unsupported URI scheme: {}", uri)))?;
        if path.is_empty() || !path.starts_with('/') {
            return Err(ResourceError::InvalidUri(format!(
                "File URI must carry an absolute path: {}",
                uri
            )));
        }
        Ok(PathBuf::from(path))
    }

    fn mime_for(path: &Path) -> Option<String> {
        mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string())
    }

    fn is_textual(mime: &str) -> bool {
        mime.starts_with("text/") || mime == "application/json" || mime == "application/xml"
    }
}

impl ResourceProvider for FileResourceProvider {
    fn can_handle(&self, uri: &str) -> bool {
        uri.starts_with(FILE_SCHEME)
    }

    fn list_resources(&self) -> Vec<ResourceDescriptor> {
        let mut resources = Vec::new();
        for root in &self.roots {
            for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                resources.push(ResourceDescriptor {
                    uri: format!("{}{}", FILE_SCHEME, path.display()),
                    name: entry.file_name().to_string_lossy().into_owned(),
                    mime_type: Self::mime_for(path),
                });
            }
        }
        resources
    }

    fn read_resource(&self, uri: &str) -> Result<ResourceContents, ResourceError> {
        let path = self.uri_to_path(uri)?;

        if !self.is_allowed(&path) {
            return Err(ResourceError::AccessDenied(uri.to_string()));
        }

        if !path.exists() {
            return Err(ResourceError::NotFound(uri.to_string()));
        }

        // Re-validate after resolving symlinks.
        let canonical = path
            .canonicalize()
            .map_err(|_| ResourceError::NotFound(uri.to_string()))?;
        if !self.is_allowed(&canonical) {
            return Err(ResourceError::AccessDenied(uri.to_string()));
        }

        let bytes = std::fs::read(&canonical)
            .map_err(|e| ResourceError::Internal(format!("{}: {}", canonical.display(), e)))?;

        let mime_type = Self::mime_for(&canonical);
        let textual = mime_type.as_deref().map(Self::is_textual).unwrap_or(false);

        // Textual MIME but non-UTF-8 bytes falls back to a blob.
        let (text, blob) = if textual {
            match String::from_utf8(bytes) {
                Ok(text) => (Some(text), None),
                Err(e) => (
                    None,
                    Some(base64::engine::general_purpose::STANDARD.encode(e.into_bytes())),
                ),
            }
        } else {
            (
                None,
                Some(base64::engine::general_purpose::STANDARD.encode(&bytes)),
            )
        };

        Ok(ResourceContents {
            uri: uri.to_string(),
            mime_type,
            text,
            blob,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn provider_over(temp: &TempDir) -> FileResourceProvider {
        FileResourceProvider::new(vec![temp.path().to_path_buf()])
    }

    fn uri_for(path: &Path) -> String {
        format!("file://{}", path.canonicalize().unwrap().display())
    }

    #[test]
    fn test_list_enumerates_regular_files() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();
        std::fs::write(temp.path().join("a.txt"), "a").unwrap();
        std::fs::write(temp.path().join("sub/b.json"), "{}").unwrap();

        let provider = provider_over(&temp);
        let mut resources = provider.list_resources();
        resources.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].name, "a.txt");
        assert_eq!(resources[0].mime_type.as_deref(), Some("text/plain"));
        assert_eq!(resources[1].name, "b.json");
        assert_eq!(resources[1].mime_type.as_deref(), Some("application/json"));
    }

    #[test]
    fn test_nonexistent_roots_skipped_silently() {
        let provider =
            FileResourceProvider::new(vec![PathBuf::from("/definitely/not/a/real/root")]);
        assert!(provider.list_resources().is_empty());
        assert!(provider.roots().is_empty());
    }

    #[test]
    fn test_list_read_round_trip() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("data.txt"), "round trip").unwrap();

        let provider = provider_over(&temp);
        let listed = provider.list_resources();
        assert_eq!(listed.len(), 1);

        let contents = provider.read_resource(&listed[0].uri).unwrap();
        assert_eq!(contents.text.as_deref(), Some("round trip"));
        assert!(contents.blob.is_none());
    }

    #[test]
    fn test_binary_contents_are_base64() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("img.png");
        std::fs::write(&path, [0u8, 159, 146, 150]).unwrap();

        let provider = provider_over(&temp);
        let contents = provider.read_resource(&uri_for(&path)).unwrap();

        assert!(contents.text.is_none());
        let blob = contents.blob.unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(blob)
            .unwrap();
        assert_eq!(decoded, vec![0u8, 159, 146, 150]);
    }

    #[test]
    fn test_prefix_sibling_is_denied() {
        // /tmp/<x>/allowed is the root; /tmp/<x>/allowedEvil must not match.
        let temp = TempDir::new().unwrap();
        let allowed = temp.path().join("allowed");
        let evil = temp.path().join("allowedEvil");
        std::fs::create_dir(&allowed).unwrap();
        std::fs::create_dir(&evil).unwrap();
        std::fs::write(evil.join("secret.txt"), "secret").unwrap();

        let provider = FileResourceProvider::new(vec![allowed]);
        let result = provider.read_resource(&uri_for(&evil.join("secret.txt")));

        assert!(matches!(result, Err(ResourceError::AccessDenied(_))));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let provider = provider_over(&temp);
        let uri = format!(
            "file://{}/missing.txt",
            temp.path().canonicalize().unwrap().display()
        );

        assert!(matches!(
            provider.read_resource(&uri),
            Err(ResourceError::NotFound(_))
        ));
    }

    #[test]
    fn test_wrong_scheme_is_invalid_uri() {
        let temp = TempDir::new().unwrap();
        let provider = provider_over(&temp);

        assert!(!provider.can_handle("https://example.com/x"));
        assert!(matches!(
            provider.read_resource("https://example.com/x"),
            Err(ResourceError::InvalidUri(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_denied() {
        let temp = TempDir::new().unwrap();
        let inside = temp.path().join("inside");
        let outside = TempDir::new().unwrap();
        std::fs::create_dir(&inside).unwrap();
        std::fs::write(outside.path().join("target.txt"), "outside").unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("target.txt"),
            inside.join("link.txt"),
        )
        .unwrap();

        let provider = FileResourceProvider::new(vec![inside.clone()]);
        let uri = format!(
            "file://{}/link.txt",
            inside.canonicalize().unwrap().display()
        );

        assert!(matches!(
            provider.read_resource(&uri),
            Err(ResourceError::AccessDenied(_))
        ));
    }
}
